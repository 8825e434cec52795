//! CLI command implementations

mod config;
mod forward;

pub use config::{config_init, config_path, config_show, load_settings};
pub use forward::{forward_command, up_command, ForwardArgs};
