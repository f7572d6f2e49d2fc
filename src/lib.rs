//! # RHMS Telemetry: Subsystem Health Ingestion Core
//!
//! Receives health and telemetry datagrams from hardware subsystems over
//! UDP, decodes them from one of three wire formats, and routes each record
//! to the consumer registered for its subsystem id.
//!
//! ## Architecture
//!
//! - **Network**: [`UdpReceiver`] owns the socket on a dedicated worker thread
//! - **Codec**: binary, JSON and the fixed-header `RHMS` defense protocol
//! - **Dispatch**: [`TelemetryDispatcher`] maps subsystem ids to consumers
//! - **Monitor**: [`SubsystemMonitor`] tracks health and checks alert limits
//! - **Communication**: bounded crossbeam channels between every stage
//!
//! ## Configuration
//!
//! The `rhms-telemetry` binary reads `config.toml` from the platform config
//! directory. See [`config`] for the layout.
//!
//! ## Example
//!
//! ```ignore
//! use rhms_telemetry::{
//!     config::AppConfig, MonitorBoard, SubsystemKind, TelemetryDispatcher, UdpReceiver,
//! };
//! use std::time::Duration;
//!
//! let config = AppConfig::default();
//! let (dispatcher, deliveries) = TelemetryDispatcher::new(&config.dispatcher);
//!
//! let mut board = MonitorBoard::new(dispatcher.clone());
//! board.add("PSU-1", SubsystemKind::PowerSupply)?;
//!
//! let mut receiver = UdpReceiver::new(config.receiver.clone());
//! dispatcher.attach(receiver.subscribe())?;
//! receiver.start()?;
//!
//! while deliveries.run_once(Duration::from_millis(100)) {}
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod network;
pub mod types;

// Re-export commonly used types
pub use codec::{decode, decode_lenient, detect_format, encode, Format, WireFormat};
pub use config::AppConfig;
pub use dispatch::{
    consumer_handle, ConsumerHandle, DeliveryQueue, DispatchEvent, DispatchStats, RouteOutcome,
    TelemetryConsumer, TelemetryDispatcher,
};
pub use error::{Result, ResultExt, TelemetryError};
pub use monitor::{MonitorBoard, ParameterAlert, SubsystemKind, SubsystemMonitor};
pub use network::{ReceiverEvent, ReceiverState, ReceiverStats, UdpReceiver};
pub use types::{HealthCode, HealthStatus, ParameterValue, TelemetryRecord};
