//! Node configuration: a JSON file deserialized into [`BankConfig`] and
//! validated against the bounds the server runtime assumes.

use std::{net::Ipv4Addr, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The configuration surface consumed by the server core.
///
/// `host` doubles as the node's bank code: the owner tag in account
/// addresses is compared against it verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct BankConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    pub storage_path: String,
    /// Seconds the durable engine may block before giving up.
    pub storage_timeout: f64,
    pub bank_workers: usize,
    /// Seconds a connection may stay idle before the handler exits.
    pub client_timeout: f64,
    pub max_requests_per_minute: usize,
    pub max_bad_commands: u32,
    /// Seconds an offending IP stays blacklisted.
    pub ban_duration: u64,
    /// Inclusive `[start, end]` port range scanned for peer banks.
    pub network_scan_port_range: [u16; 2],
    /// First three octets of the subnet to scan, e.g. `"10.1.2"`.
    pub network_scan_subnet: String,
    /// Seconds to wait on a peer bank before declaring it unreachable.
    pub network_timeout: f64,
}

impl BankConfig {
    /// Reads, parses and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: BankConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// The bank code clients see in account addresses and `BC` replies.
    pub fn bank_code(&self) -> String {
        self.host.to_string()
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.client_timeout)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.network_timeout)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port < 1 {
            return Err(invalid(format!(
                "port must be in range from 1 to 65535, found: {}",
                self.port
            )));
        }
        if self.storage_path.trim().is_empty() {
            return Err(invalid("storage_path must be a non-empty string"));
        }
        if let Some(parent) = Path::new(&self.storage_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(invalid(format!(
                "parent directory for storage does not exist: {}",
                parent.display()
            )));
        }
        if self.storage_timeout <= 0.0 || self.storage_timeout > 15.0 {
            return Err(invalid(format!(
                "storage_timeout must be in (0, 15], found: {}",
                self.storage_timeout
            )));
        }
        if self.bank_workers < 1 || self.bank_workers > 16 {
            return Err(invalid(format!(
                "bank_workers must be between 1 and 16, found: {}",
                self.bank_workers
            )));
        }
        if self.client_timeout <= 0.0 || self.client_timeout > 60.0 {
            return Err(invalid(format!(
                "client_timeout must be in (0, 60], found: {}",
                self.client_timeout
            )));
        }
        if self.max_requests_per_minute == 0 {
            return Err(invalid("max_requests_per_minute must be a positive number"));
        }
        if self.max_bad_commands == 0 {
            return Err(invalid("max_bad_commands must be a positive number"));
        }
        if self.ban_duration == 0 {
            return Err(invalid("ban_duration must be a positive number"));
        }
        let [start, end] = self.network_scan_port_range;
        if start < 1 || end < 1 {
            return Err(invalid("scan ports must be between 1 and 65535"));
        }
        if start > end {
            return Err(invalid("scan port start cannot be higher than end"));
        }
        if !valid_subnet(&self.network_scan_subnet) {
            return Err(invalid(
                "network_scan_subnet must be in format 'X.Y.Z' with numeric octets",
            ));
        }
        if self.network_timeout <= 0.0 || self.network_timeout > 15.0 {
            return Err(invalid(format!(
                "network_timeout must be in (0, 15], found: {}",
                self.network_timeout
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn valid_subnet(subnet: &str) -> bool {
    let octets: Vec<&str> = subnet.split('.').collect();
    octets.len() == 3 && octets.iter().all(|o| o.parse::<u8>().is_ok())
}
