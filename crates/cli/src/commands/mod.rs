//! CLI command implementations

mod config;
mod filter;
mod play;

pub use config::{cmd_config_init, cmd_config_show};
pub use filter::{cmd_filter_check, cmd_filter_reset, cmd_filter_stats};
pub use play::{PlayOptions, cmd_play};
