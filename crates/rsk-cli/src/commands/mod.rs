//! CLI command implementations

mod config;
mod interaction;
mod payload;

pub use config::{config_init, config_path, config_show, load_client_config};
pub use interaction::{fnf_command, request_command, stream_command, StreamLimits};
pub use payload::{build_payload, PayloadArgs};
