//! Domain types - core business entities
//!
//! These types are independent of any particular backend, persistence layer or
//! media stack.

pub mod config;
pub mod item;
