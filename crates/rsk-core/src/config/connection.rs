//! Connection setup configuration

use bytes::Bytes;
use rsk_protocol::frame::{MAJOR_VERSION, MINOR_VERSION};
use rsk_protocol::mime::{APPLICATION_JSON, MESSAGE_RSOCKET_COMPOSITE_METADATA};
use rsk_protocol::{Payload, MAX_REQUEST_N};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::error::{ConfigError, RSocketError};

/// Smallest accepted fragment size when fragmentation is enabled
pub const MIN_FRAGMENT_SIZE: usize = 64;

const MAX_MIME_TYPE_LENGTH: usize = u8::MAX as usize;

/// Parameters sent in the SETUP frame and used by the connection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub major_version: u16,
    pub minor_version: u16,

    /// Interval between keepalive probes
    #[serde(with = "duration_millis")]
    pub keepalive_interval: Duration,

    /// Time without a keepalive answer after which the connection is dead
    #[serde(with = "duration_millis")]
    pub max_lifetime: Duration,

    pub data_mime_type: String,
    pub metadata_mime_type: String,

    /// Maximum payload bytes per frame; 0 disables fragmentation
    pub fragment_size: usize,

    /// Lease honoring is not implemented; must stay false
    pub honors_lease: bool,

    /// Resumption is not implemented; must stay unset
    #[serde(skip)]
    pub resume_token: Option<Bytes>,

    /// Data and metadata carried by the SETUP frame
    #[serde(skip)]
    pub setup_payload: Payload,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            keepalive_interval: Duration::from_millis(30_000),
            max_lifetime: Duration::from_millis(100_000),
            data_mime_type: APPLICATION_JSON.name.to_string(),
            metadata_mime_type: MESSAGE_RSOCKET_COMPOSITE_METADATA.name.to_string(),
            fragment_size: 0,
            honors_lease: false,
            resume_token: None,
            setup_payload: Payload::default(),
        }
    }
}

impl ConnectionConfig {
    /// Check the configuration before sending SETUP
    pub fn validate(&self) -> Result<(), RSocketError> {
        if self.honors_lease {
            return Err(RSocketError::UnsupportedFeature("lease"));
        }
        if self.resume_token.is_some() {
            return Err(RSocketError::UnsupportedFeature("resume"));
        }
        if (self.major_version, self.minor_version) != (MAJOR_VERSION, MINOR_VERSION) {
            return Err(invalid(format!(
                "unsupported protocol version {}.{}",
                self.major_version, self.minor_version
            )));
        }
        if self.fragment_size != 0 && self.fragment_size < MIN_FRAGMENT_SIZE {
            return Err(invalid(format!(
                "fragment size must be 0 or at least {}, got {}",
                MIN_FRAGMENT_SIZE, self.fragment_size
            )));
        }
        for (field, mime_type) in [
            ("data_mime_type", &self.data_mime_type),
            ("metadata_mime_type", &self.metadata_mime_type),
        ] {
            if mime_type.is_empty() || mime_type.len() > MAX_MIME_TYPE_LENGTH || !mime_type.is_ascii()
            {
                return Err(invalid(format!(
                    "{} must be 1..={} ASCII characters",
                    field, MAX_MIME_TYPE_LENGTH
                )));
            }
        }
        if self.keepalive_interval.is_zero() {
            return Err(invalid("keepalive interval must be positive".to_string()));
        }
        if self.keepalive_ms() > MAX_REQUEST_N as u128 || self.max_lifetime_ms() > MAX_REQUEST_N as u128
        {
            return Err(invalid(format!(
                "keepalive interval and max lifetime must not exceed {} ms",
                MAX_REQUEST_N
            )));
        }
        if self.max_lifetime < self.keepalive_interval {
            return Err(invalid(
                "max lifetime must not be shorter than the keepalive interval".to_string(),
            ));
        }
        Ok(())
    }

    fn keepalive_ms(&self) -> u128 {
        self.keepalive_interval.as_millis()
    }

    fn max_lifetime_ms(&self) -> u128 {
        self.max_lifetime.as_millis()
    }

    /// Whether outbound payloads are split into fragments
    pub fn fragmentation_enabled(&self) -> bool {
        self.fragment_size > 0
    }
}

fn invalid(message: String) -> RSocketError {
    RSocketError::Config(ConfigError::Invalid(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ConnectionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.max_lifetime, Duration::from_secs(100));
        assert!(!config.fragmentation_enabled());
    }

    #[test]
    fn test_lease_and_resume_unsupported() {
        let config = ConnectionConfig {
            honors_lease: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RSocketError::UnsupportedFeature("lease"))
        ));

        let config = ConnectionConfig {
            resume_token: Some(Bytes::from_static(b"token")),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RSocketError::UnsupportedFeature("resume"))
        ));
    }

    #[test]
    fn test_fragment_size_bounds() {
        let small = ConnectionConfig {
            fragment_size: 63,
            ..Default::default()
        };
        assert!(matches!(small.validate(), Err(RSocketError::Config(_))));

        let ok = ConnectionConfig {
            fragment_size: 64,
            ..Default::default()
        };
        ok.validate().unwrap();
        assert!(ok.fragmentation_enabled());
    }

    #[test]
    fn test_rejects_lifetime_shorter_than_keepalive() {
        let config = ConnectionConfig {
            keepalive_interval: Duration::from_secs(10),
            max_lifetime: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_ascii_mime() {
        let config = ConnectionConfig {
            data_mime_type: "application/jsön".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_other_versions() {
        let config = ConnectionConfig {
            major_version: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_uses_milliseconds() {
        let config: ConnectionConfig =
            toml::from_str("keepalive_interval = 500\nmax_lifetime = 2000\n").unwrap();
        assert_eq!(config.keepalive_interval, Duration::from_millis(500));
        assert_eq!(config.max_lifetime, Duration::from_secs(2));
        assert_eq!(config.data_mime_type, "application/json");
    }
}
