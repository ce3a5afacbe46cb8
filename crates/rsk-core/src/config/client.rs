//! Client configuration file

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::connection::ConnectionConfig;
use super::serde_utils::duration_millis;

/// Automatic reconnection after a connection failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,

    /// Fixed wait between a failure and the next connection attempt
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: Duration::from_millis(5000),
        }
    }
}

/// Contents of the `rsk` configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default server URL (`ws://`, `wss://` or `tcp://`)
    pub url: Option<String>,

    pub connection: ConnectionConfig,

    pub reconnect: ReconnectConfig,
}
