//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;

use crate::dispatcher::DEFAULT_COMMAND_CAPACITY;
use crate::error::{ConfigError, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;

const HTTP_PORT_VAR: &str = "SHARE_SENDER_HTTP_PORT";
const HOTSPOT_HOST_VAR: &str = "SHARE_SENDER_HOTSPOT_HOST";
const EVENT_CAPACITY_VAR: &str = "SHARE_SENDER_EVENT_CAPACITY";
const COMMAND_CAPACITY_VAR: &str = "SHARE_SENDER_COMMAND_CAPACITY";
const LOG_DIR_VAR: &str = "SHARE_SENDER_LOG_DIR";

/// Sender daemon configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Port the HTTP/WebSocket control surface listens on.
    pub http_port: u16,
    /// Address of the receiving device on the hotspot network.
    pub hotspot_host: String,
    /// Capacity of the upload event broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the dispatcher command channel.
    pub command_capacity: usize,
    /// Directory for rolling log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            // Default gateway address of an Android hotspot.
            hotspot_host: "192.168.43.1".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            log_dir: None,
        }
    }
}

impl SenderConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let http_port = parse_or(&lookup, HTTP_PORT_VAR, defaults.http_port)?;
        let hotspot_host = lookup(HOTSPOT_HOST_VAR)
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults.hotspot_host);
        let event_capacity = parse_or(&lookup, EVENT_CAPACITY_VAR, defaults.event_capacity)?;
        let command_capacity =
            parse_or(&lookup, COMMAND_CAPACITY_VAR, defaults.command_capacity)?;

        for (key, value) in [
            (EVENT_CAPACITY_VAR, event_capacity),
            (COMMAND_CAPACITY_VAR, command_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                }
                .into());
            }
        }

        let log_dir = lookup(LOG_DIR_VAR)
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            http_port,
            hotspot_host,
            event_capacity,
            command_capacity,
            log_dir,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> std::result::Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}
