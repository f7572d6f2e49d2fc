//! Core data types for the telemetry core
//!
//! This module contains the value types that flow through the ingestion
//! pipeline.
//!
//! # Main Types
//!
//! - [`HealthCode`] - Five-state severity classification carried by every record
//! - [`HealthStatus`] - Code + message with creation and last-update times
//! - [`ParameterValue`] - Tagged scalar carried in a record's parameter map
//! - [`TelemetryRecord`] - The decoded unit of telemetry
//!
//! # Timestamps
//!
//! All timestamps are milliseconds since the Unix epoch (`i64`), taken from
//! the wall clock via [`now_millis`].

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default heartbeat timeout for [`HealthStatus::is_timed_out`]
pub const DEFAULT_HEALTH_TIMEOUT_MS: i64 = 5000;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Health classification of a subsystem
///
/// The wire ordinal is the declaration order (`Ok = 0` .. `Unknown = 4`).
/// Ordinals outside that range decode as [`HealthCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum HealthCode {
    /// Subsystem operating normally
    Ok,
    /// Subsystem degraded but functional
    Warning,
    /// Subsystem failed or reported a critical error
    Error,
    /// Subsystem not responding
    Offline,
    /// Status not yet determined
    #[default]
    Unknown,
}

impl HealthCode {
    /// All codes in ordinal order
    pub fn all() -> &'static [HealthCode] {
        &[
            HealthCode::Ok,
            HealthCode::Warning,
            HealthCode::Error,
            HealthCode::Offline,
            HealthCode::Unknown,
        ]
    }

    /// Wire ordinal of this code
    pub fn ordinal(self) -> u8 {
        match self {
            HealthCode::Ok => 0,
            HealthCode::Warning => 1,
            HealthCode::Error => 2,
            HealthCode::Offline => 3,
            HealthCode::Unknown => 4,
        }
    }

    /// Map a signed wire ordinal (binary and JSON formats carry an `i32`)
    pub fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            0 => HealthCode::Ok,
            1 => HealthCode::Warning,
            2 => HealthCode::Error,
            3 => HealthCode::Offline,
            _ => HealthCode::Unknown,
        }
    }

    /// Sort key for display: higher is more severe.
    ///
    /// Only meant for ordering tables and lists. Routing never looks at it.
    pub fn severity(self) -> u8 {
        match self {
            HealthCode::Ok => 0,
            HealthCode::Unknown => 1,
            HealthCode::Warning => 2,
            HealthCode::Offline => 3,
            HealthCode::Error => 4,
        }
    }
}

impl From<u8> for HealthCode {
    fn from(value: u8) -> Self {
        HealthCode::from_ordinal(value as i64)
    }
}

impl From<HealthCode> for u8 {
    fn from(code: HealthCode) -> Self {
        code.ordinal()
    }
}

impl std::fmt::Display for HealthCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthCode::Ok => write!(f, "OK"),
            HealthCode::Warning => write!(f, "WARNING"),
            HealthCode::Error => write!(f, "ERROR"),
            HealthCode::Offline => write!(f, "OFFLINE"),
            HealthCode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// RGB color used by status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl StatusColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Health state of one subsystem
///
/// `created_at` is fixed at construction. `last_updated_at` is refreshed on
/// every mutation and never moves backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    code: HealthCode,
    message: String,
    #[serde(rename = "timestamp")]
    created_at: i64,
    #[serde(rename = "lastUpdate")]
    last_updated_at: i64,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new(HealthCode::Unknown, "Initializing")
    }
}

impl HealthStatus {
    /// Create a status with an explicit code and message
    pub fn new(code: HealthCode, message: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            code,
            message: message.into(),
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn code(&self) -> HealthCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Time the status was created (ms since epoch)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Time of the last mutation (ms since epoch)
    pub fn last_updated_at(&self) -> i64 {
        self.last_updated_at
    }

    /// Replace the code
    pub fn set_code(&mut self, code: HealthCode) {
        self.code = code;
        self.touch();
    }

    /// Replace the message
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.touch();
    }

    /// Apply a health update.
    ///
    /// The code is always replaced. The message is only replaced when the
    /// new one is non-empty, so periodic code-only heartbeats keep the last
    /// diagnostic text.
    pub fn update(&mut self, code: HealthCode, message: &str) {
        self.code = code;
        if !message.is_empty() {
            self.message = message.to_string();
        }
        self.touch();
    }

    fn touch(&mut self) {
        let now = now_millis();
        self.last_updated_at = now.max(self.last_updated_at).max(self.created_at);
    }

    /// Whether no update arrived within `timeout_ms`
    pub fn is_timed_out(&self, timeout_ms: i64) -> bool {
        self.is_timed_out_at(now_millis(), timeout_ms)
    }

    /// Timeout check against an explicit clock reading
    pub fn is_timed_out_at(&self, now_ms: i64, timeout_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_updated_at) > timeout_ms
    }

    pub fn is_healthy(&self) -> bool {
        self.code == HealthCode::Ok
    }

    pub fn is_warning(&self) -> bool {
        self.code == HealthCode::Warning
    }

    pub fn is_error(&self) -> bool {
        self.code == HealthCode::Error
    }

    pub fn is_offline(&self) -> bool {
        self.code == HealthCode::Offline
    }

    pub fn is_unknown(&self) -> bool {
        self.code == HealthCode::Unknown
    }

    /// Indicator color for the current code
    pub fn status_color(&self) -> StatusColor {
        match self.code {
            HealthCode::Ok => StatusColor::rgb(0, 255, 0),
            HealthCode::Warning => StatusColor::rgb(255, 165, 0),
            HealthCode::Error => StatusColor::rgb(255, 0, 0),
            HealthCode::Offline => StatusColor::rgb(128, 128, 128),
            HealthCode::Unknown => StatusColor::rgb(200, 200, 0),
        }
    }

    /// Upper-case label for the current code
    pub fn status_text(&self) -> &'static str {
        match self.code {
            HealthCode::Ok => "OK",
            HealthCode::Warning => "WARNING",
            HealthCode::Error => "ERROR",
            HealthCode::Offline => "OFFLINE",
            HealthCode::Unknown => "UNKNOWN",
        }
    }

    /// Single-glyph icon for the current code
    pub fn status_icon(&self) -> &'static str {
        match self.code {
            HealthCode::Ok => "✓",
            HealthCode::Warning => "⚠",
            HealthCode::Error => "✗",
            HealthCode::Offline => "○",
            HealthCode::Unknown => "?",
        }
    }

    /// Serialize to a compact JSON object
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            TelemetryError::Serialization(format!("Failed to serialize health status: {}", e))
        })
    }

    /// Restore a status previously produced by [`HealthStatus::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            TelemetryError::Serialization(format!("Failed to parse health status: {}", e))
        })
    }
}

/// A scalar telemetry parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// 64-bit float
    Float(f64),
    /// 32-bit signed integer
    Int(i32),
    /// UTF-8 text
    Text(String),
}

impl ParameterValue {
    /// Numeric view. Text is parsed if it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Integer view. Floats are truncated toward zero.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ParameterValue::Float(v) if v.is_finite() => Some(*v as i32),
            ParameterValue::Float(_) => None,
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Float(_) => "float64",
            ParameterValue::Int(_) => "int32",
            ParameterValue::Text(_) => "string",
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::Text(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        ParameterValue::Text(v)
    }
}

/// One decoded telemetry datagram
///
/// A record is routable when [`TelemetryRecord::is_valid`] holds: a
/// non-empty subsystem id and a positive timestamp. `Default` yields the
/// empty, invalid record that lenient decoding falls back to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryRecord {
    pub subsystem_id: String,
    pub health_code: HealthCode,
    pub health_message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub parameters: HashMap<String, ParameterValue>,
}

impl TelemetryRecord {
    /// Create a record stamped with the current time
    pub fn new(subsystem_id: impl Into<String>, health_code: HealthCode) -> Self {
        Self {
            subsystem_id: subsystem_id.into(),
            health_code,
            health_message: String::new(),
            timestamp: now_millis(),
            parameters: HashMap::new(),
        }
    }

    /// Builder-style message setter
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.health_message = message.into();
        self
    }

    /// Builder-style timestamp setter
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder-style parameter setter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.subsystem_id.is_empty() && self.timestamp > 0
    }

    /// Re-stamp the record with the current time
    pub fn touch(&mut self) {
        self.timestamp = now_millis();
    }

    pub fn add_parameter(&mut self, key: impl Into<String>, value: impl Into<ParameterValue>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn parameter(&self, key: &str) -> Option<&ParameterValue> {
        self.parameters.get(key)
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn clear_parameters(&mut self) {
        self.parameters.clear();
    }

    fn float_parameter(&self, key: &str) -> Option<f64> {
        self.parameter(key).and_then(ParameterValue::as_f64)
    }

    fn int_parameter(&self, key: &str) -> Option<i32> {
        self.parameter(key).and_then(ParameterValue::as_i32)
    }

    // Common telemetry fields

    pub fn temperature(&self) -> Option<f64> {
        self.float_parameter("temperature")
    }

    pub fn set_temperature(&mut self, celsius: f64) {
        self.add_parameter("temperature", celsius);
    }

    pub fn voltage(&self) -> Option<f64> {
        self.float_parameter("voltage")
    }

    pub fn set_voltage(&mut self, volts: f64) {
        self.add_parameter("voltage", volts);
    }

    pub fn current(&self) -> Option<f64> {
        self.float_parameter("current")
    }

    pub fn set_current(&mut self, amps: f64) {
        self.add_parameter("current", amps);
    }

    pub fn power(&self) -> Option<f64> {
        self.float_parameter("power")
    }

    pub fn set_power(&mut self, watts: f64) {
        self.add_parameter("power", watts);
    }

    pub fn frequency(&self) -> Option<f64> {
        self.float_parameter("frequency")
    }

    pub fn set_frequency(&mut self, hz: f64) {
        self.add_parameter("frequency", hz);
    }

    pub fn latency(&self) -> Option<i32> {
        self.int_parameter("latency")
    }

    pub fn set_latency(&mut self, ms: i32) {
        self.add_parameter("latency", ms);
    }

    pub fn error_count(&self) -> Option<i32> {
        self.int_parameter("error_count")
    }

    pub fn set_error_count(&mut self, errors: i32) {
        self.add_parameter("error_count", errors);
    }
}
