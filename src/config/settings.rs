//! Component settings
//!
//! Each pipeline stage has its own settings block so the embedding
//! application can construct stages individually.
//!
//! # Main Types
//!
//! - [`ReceiverConfig`] - UDP port, bind address and worker timing
//! - [`DispatcherConfig`] - Delivery and notification queue sizes
//! - [`MonitorConfig`] - Heartbeat timeout and the subsystems to watch

use crate::error::{Result, TelemetryError};
use crate::monitor::SubsystemKind;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default UDP port for telemetry
pub const DEFAULT_PORT: u16 = 5000;

/// Lowest port the receiver accepts
pub const MIN_PORT: u16 = 1024;

/// Default socket read timeout; bounds how long a stop request waits
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default bound on waiting for the worker to acknowledge start/stop
pub const DEFAULT_WORKER_ACK_TIMEOUT_MS: u64 = 3000;

/// Default capacity of channels carrying records between threads.
/// 10,000 records ≈ 10s of backlog at 1 kHz.
pub const DEFAULT_RECORD_CHANNEL_CAPACITY: usize = 10_000;

/// Default heartbeat timeout
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = crate::types::DEFAULT_HEALTH_TIMEOUT_MS as u64;

/// Check that a port is in the accepted range
pub fn validate_port(port: u16) -> Result<u16> {
    if port < MIN_PORT {
        return Err(TelemetryError::InvalidPort(port));
    }
    Ok(port)
}

/// UDP receiver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// UDP port to listen on (1024-65535)
    pub port: u16,

    /// Local address to bind; unspecified means all interfaces
    pub bind_address: IpAddr,

    /// Socket read timeout in milliseconds
    pub read_timeout_ms: u64,

    /// How long `start()` waits for the worker to bind
    pub start_timeout_ms: u64,

    /// How long `stop()` waits for the worker to exit
    pub stop_timeout_ms: u64,

    /// Capacity of each subscriber channel
    pub subscriber_capacity: usize,

    /// Capacity of each `events()` observer channel
    pub event_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            start_timeout_ms: DEFAULT_WORKER_ACK_TIMEOUT_MS,
            stop_timeout_ms: DEFAULT_WORKER_ACK_TIMEOUT_MS,
            subscriber_capacity: DEFAULT_RECORD_CHANNEL_CAPACITY,
            event_capacity: 256,
        }
    }
}

impl ReceiverConfig {
    /// Settings for a given port, everything else default
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_port(self.port)?;
        if self.subscriber_capacity == 0 || self.event_capacity == 0 {
            return Err(TelemetryError::Config(
                "Receiver channel capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Capacity of the queue between routing and consumers
    pub delivery_capacity: usize,

    /// Capacity of each dispatch observer channel
    pub event_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            delivery_capacity: DEFAULT_RECORD_CHANNEL_CAPACITY,
            event_capacity: 1024,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.delivery_capacity == 0 || self.event_capacity == 0 {
            return Err(TelemetryError::Config(
                "Dispatcher queue capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// A subsystem the monitor process watches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemEntry {
    /// Subsystem identifier carried in telemetry
    pub id: String,

    /// Which alert table applies
    #[serde(default)]
    pub kind: SubsystemKind,
}

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// A subsystem with no update for this long counts as timed out
    pub health_timeout_ms: u64,

    /// How often the monitor process logs statistics
    pub stats_interval_ms: u64,

    /// Subsystems to register at startup
    pub subsystems: Vec<SubsystemEntry>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            stats_interval_ms: 10_000,
            subsystems: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.subsystems {
            if entry.id.is_empty() {
                return Err(TelemetryError::Config("Subsystem id must not be empty".to_string()));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(TelemetryError::Config(format!(
                    "Subsystem {} listed twice",
                    entry.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_defaults() {
        let config = ReceiverConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_range() {
        assert!(validate_port(1023).is_err());
        assert!(validate_port(1024).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(ReceiverConfig::with_port(80).validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DispatcherConfig {
            delivery_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_timeout_never_zero() {
        let config = ReceiverConfig {
            read_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.read_timeout(), Duration::from_millis(1));
    }

    #[test]
    fn test_duplicate_subsystems_rejected() {
        let entry = SubsystemEntry {
            id: "PSU-1".to_string(),
            kind: SubsystemKind::PowerSupply,
        };
        let config = MonitorConfig {
            subsystems: vec![entry.clone(), entry],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
