pub mod actor;
pub mod dirs;
pub mod feed;
pub mod filter;
pub mod media;

mod domain;
pub use domain::{config, item};

pub use actor::{AdvanceController, AdvanceOutcome, ControllerError, ControllerHandle, FeedStatus};
