//! Subsystem monitors
//!
//! A [`SubsystemMonitor`] is a ready-made [`TelemetryConsumer`]: it tracks
//! the [`HealthStatus`] of one subsystem, keeps its latest parameters, and
//! checks them against the alert table of its [`SubsystemKind`].
//!
//! Kind-specific behaviour is data, not code: every kind maps to a static
//! list of [`AlertRule`]s and default properties, and the monitor evaluates
//! whichever table its kind selects.
//!
//! [`MonitorBoard`] owns a set of monitors and keeps their dispatcher
//! registrations in lockstep with their lifetime.

use crate::dispatch::{ConsumerHandle, TelemetryConsumer, TelemetryDispatcher};
use crate::error::{Result, TelemetryError};
use crate::types::{HealthCode, HealthStatus, ParameterValue, TelemetryRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Hardware subsystem type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    PowerSupply,
    CoolingSystem,
    AntennaServo,
    RfFrontend,
    SignalProcessor,
    DataFusion,
    EmbeddedController,
    NetworkInterface,
    Tracker,
    /// No kind-specific rules
    #[default]
    Generic,
}

/// Threshold applied to one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Limit {
    /// Alert when the value is strictly greater
    Above(f64),
    /// Alert when the value is strictly smaller
    Below(f64),
    /// Alert when the value leaves the closed range
    Outside(f64, f64),
    /// Alert when a text value differs
    NotEqual(&'static str),
    /// Alert above `fraction` of another property's value
    AboveFractionOf {
        property: &'static str,
        fraction: f64,
    },
}

/// One entry of a kind's alert table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRule {
    pub parameter: &'static str,
    pub limit: Limit,
    pub label: &'static str,
}

const fn rule(parameter: &'static str, limit: Limit, label: &'static str) -> AlertRule {
    AlertRule {
        parameter,
        limit,
        label,
    }
}

const POWER_SUPPLY_RULES: &[AlertRule] = &[
    rule("voltage", Limit::Outside(26.0, 30.0), "Power supply voltage out of range"),
    rule("efficiency", Limit::Below(80.0), "Power supply efficiency low"),
    rule("temperature", Limit::Above(70.0), "Power supply temperature high"),
];

const COOLING_RULES: &[AlertRule] = &[
    rule("fan_speed", Limit::Below(500.0), "Cooling fan speed low"),
    rule("coolant_temp", Limit::Above(60.0), "Coolant temperature high"),
    rule("flow_rate", Limit::Below(1.0), "Coolant flow rate low"),
    rule("pump_status", Limit::NotEqual("Running"), "Cooling pump not running"),
];

const ANTENNA_SERVO_RULES: &[AlertRule] = &[
    rule("motor_current", Limit::Above(10.0), "Antenna servo motor current high"),
    rule("position_error", Limit::Above(0.5), "Antenna position error high"),
];

const RF_FRONTEND_RULES: &[AlertRule] = &[
    rule("temperature", Limit::Above(85.0), "RF frontend temperature critical"),
    rule("vswr", Limit::Above(2.0), "RF frontend VSWR high"),
];

const SIGNAL_PROCESSOR_RULES: &[AlertRule] = &[
    rule("cpu_load", Limit::Above(90.0), "Signal processor CPU load critical"),
    rule("latency", Limit::Above(100.0), "Signal processor latency high"),
    rule("buffer_utilization", Limit::Above(85.0), "Signal processor buffer utilization high"),
];

const DATA_FUSION_RULES: &[AlertRule] = &[rule(
    "fusion_quality",
    Limit::Below(75.0),
    "Data fusion quality degraded",
)];

const EMBEDDED_CONTROLLER_RULES: &[AlertRule] = &[
    rule("cpu_load", Limit::Above(95.0), "Embedded controller CPU load critical"),
    rule("memory_usage", Limit::Above(90.0), "Embedded controller memory usage high"),
    rule("watchdog_status", Limit::NotEqual("OK"), "Watchdog reported a fault"),
];

const NETWORK_INTERFACE_RULES: &[AlertRule] = &[
    rule("link_status", Limit::NotEqual("Up"), "Network link down"),
    rule("bandwidth_utilization", Limit::Above(85.0), "Network bandwidth high"),
    rule("packet_loss", Limit::Above(1.0), "Network packet loss high"),
];

const TRACKER_RULES: &[AlertRule] = &[
    rule(
        "track_count",
        Limit::AboveFractionOf {
            property: "max_tracks",
            fraction: 0.9,
        },
        "Tracker approaching maximum capacity",
    ),
    rule("track_quality", Limit::Below(70.0), "Track quality degraded"),
];

/// Seed value for a default property
#[derive(Debug, Clone, Copy)]
enum Seed {
    F(f64),
    I(i32),
    S(&'static str),
}

impl From<Seed> for ParameterValue {
    fn from(seed: Seed) -> Self {
        match seed {
            Seed::F(v) => ParameterValue::Float(v),
            Seed::I(v) => ParameterValue::Int(v),
            Seed::S(v) => ParameterValue::Text(v.to_string()),
        }
    }
}

const POWER_SUPPLY_DEFAULTS: &[(&str, Seed)] = &[
    ("voltage_28v", Seed::F(28.0)),
    ("voltage_12v", Seed::F(12.0)),
    ("voltage_5v", Seed::F(5.0)),
    ("current", Seed::F(0.0)),
    ("power", Seed::F(0.0)),
    ("efficiency", Seed::F(95.0)),
    ("temperature", Seed::F(25.0)),
];

const COOLING_DEFAULTS: &[(&str, Seed)] = &[
    ("fan_speed", Seed::I(0)),
    ("coolant_temp", Seed::F(25.0)),
    ("flow_rate", Seed::F(0.0)),
    ("pump_status", Seed::S("Running")),
    ("ambient_temp", Seed::F(25.0)),
];

const ANTENNA_SERVO_DEFAULTS: &[(&str, Seed)] = &[
    ("azimuth", Seed::F(0.0)),
    ("elevation", Seed::F(0.0)),
    ("azimuth_rate", Seed::F(0.0)),
    ("elevation_rate", Seed::F(0.0)),
    ("motor_current", Seed::F(0.0)),
    ("position_error", Seed::F(0.0)),
    ("temperature", Seed::F(25.0)),
];

const RF_FRONTEND_DEFAULTS: &[(&str, Seed)] = &[
    ("frequency", Seed::F(9.5e9)),
    ("tx_power", Seed::F(100.0)),
    ("rx_sensitivity", Seed::F(-110.0)),
    ("temperature", Seed::F(25.0)),
    ("vswr", Seed::F(1.5)),
];

const SIGNAL_PROCESSOR_DEFAULTS: &[(&str, Seed)] = &[
    ("cpu_load", Seed::F(0.0)),
    ("latency", Seed::I(0)),
    ("buffer_utilization", Seed::F(0.0)),
    ("temperature", Seed::F(25.0)),
    ("error_rate", Seed::F(0.0)),
    ("throughput", Seed::F(0.0)),
];

const DATA_FUSION_DEFAULTS: &[(&str, Seed)] = &[
    ("active_sources", Seed::I(0)),
    ("fusion_quality", Seed::F(100.0)),
    ("latency", Seed::I(0)),
    ("cpu_load", Seed::F(0.0)),
    ("output_rate", Seed::F(10.0)),
];

const EMBEDDED_CONTROLLER_DEFAULTS: &[(&str, Seed)] = &[
    ("cpu_load", Seed::F(0.0)),
    ("memory_usage", Seed::F(0.0)),
    ("uptime", Seed::I(0)),
    ("watchdog_status", Seed::S("OK")),
    ("temperature", Seed::F(25.0)),
    ("firmware_version", Seed::S("1.0.0")),
];

const NETWORK_INTERFACE_DEFAULTS: &[(&str, Seed)] = &[
    ("link_status", Seed::S("Up")),
    ("bandwidth_utilization", Seed::F(0.0)),
    ("packet_loss", Seed::F(0.0)),
    ("latency", Seed::I(0)),
    ("error_count", Seed::I(0)),
    ("tx_rate", Seed::F(0.0)),
    ("rx_rate", Seed::F(0.0)),
];

const TRACKER_DEFAULTS: &[(&str, Seed)] = &[
    ("track_count", Seed::I(0)),
    ("update_rate", Seed::F(10.0)),
    ("track_quality", Seed::F(100.0)),
    ("cpu_load", Seed::F(0.0)),
    ("memory_usage", Seed::F(0.0)),
    ("max_tracks", Seed::I(200)),
];

impl SubsystemKind {
    /// All kinds
    pub fn all() -> &'static [SubsystemKind] {
        &[
            SubsystemKind::PowerSupply,
            SubsystemKind::CoolingSystem,
            SubsystemKind::AntennaServo,
            SubsystemKind::RfFrontend,
            SubsystemKind::SignalProcessor,
            SubsystemKind::DataFusion,
            SubsystemKind::EmbeddedController,
            SubsystemKind::NetworkInterface,
            SubsystemKind::Tracker,
            SubsystemKind::Generic,
        ]
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            SubsystemKind::PowerSupply => "Power Supply",
            SubsystemKind::CoolingSystem => "Cooling System",
            SubsystemKind::AntennaServo => "Antenna Servo",
            SubsystemKind::RfFrontend => "RF Frontend",
            SubsystemKind::SignalProcessor => "Signal Processor",
            SubsystemKind::DataFusion => "Data Fusion",
            SubsystemKind::EmbeddedController => "Embedded Controller",
            SubsystemKind::NetworkInterface => "Network Interface",
            SubsystemKind::Tracker => "Tracker",
            SubsystemKind::Generic => "Generic",
        }
    }

    /// Config/wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemKind::PowerSupply => "power_supply",
            SubsystemKind::CoolingSystem => "cooling_system",
            SubsystemKind::AntennaServo => "antenna_servo",
            SubsystemKind::RfFrontend => "rf_frontend",
            SubsystemKind::SignalProcessor => "signal_processor",
            SubsystemKind::DataFusion => "data_fusion",
            SubsystemKind::EmbeddedController => "embedded_controller",
            SubsystemKind::NetworkInterface => "network_interface",
            SubsystemKind::Tracker => "tracker",
            SubsystemKind::Generic => "generic",
        }
    }

    /// Alert table for this kind
    pub fn alert_rules(&self) -> &'static [AlertRule] {
        match self {
            SubsystemKind::PowerSupply => POWER_SUPPLY_RULES,
            SubsystemKind::CoolingSystem => COOLING_RULES,
            SubsystemKind::AntennaServo => ANTENNA_SERVO_RULES,
            SubsystemKind::RfFrontend => RF_FRONTEND_RULES,
            SubsystemKind::SignalProcessor => SIGNAL_PROCESSOR_RULES,
            SubsystemKind::DataFusion => DATA_FUSION_RULES,
            SubsystemKind::EmbeddedController => EMBEDDED_CONTROLLER_RULES,
            SubsystemKind::NetworkInterface => NETWORK_INTERFACE_RULES,
            SubsystemKind::Tracker => TRACKER_RULES,
            SubsystemKind::Generic => &[],
        }
    }

    fn default_properties(&self) -> &'static [(&'static str, Seed)] {
        match self {
            SubsystemKind::PowerSupply => POWER_SUPPLY_DEFAULTS,
            SubsystemKind::CoolingSystem => COOLING_DEFAULTS,
            SubsystemKind::AntennaServo => ANTENNA_SERVO_DEFAULTS,
            SubsystemKind::RfFrontend => RF_FRONTEND_DEFAULTS,
            SubsystemKind::SignalProcessor => SIGNAL_PROCESSOR_DEFAULTS,
            SubsystemKind::DataFusion => DATA_FUSION_DEFAULTS,
            SubsystemKind::EmbeddedController => EMBEDDED_CONTROLLER_DEFAULTS,
            SubsystemKind::NetworkInterface => NETWORK_INTERFACE_DEFAULTS,
            SubsystemKind::Tracker => TRACKER_DEFAULTS,
            SubsystemKind::Generic => &[],
        }
    }
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SubsystemKind {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self> {
        SubsystemKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TelemetryError::Config(format!("Unknown subsystem kind: {}", s)))
    }
}

/// A parameter that tripped its kind's alert rule
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAlert {
    pub subsystem_id: String,
    pub parameter: &'static str,
    pub value: ParameterValue,
    pub label: &'static str,
}

impl std::fmt::Display for ParameterAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({} = {})",
            self.subsystem_id, self.label, self.parameter, self.value
        )
    }
}

/// Health and parameter state of one subsystem
#[derive(Debug, Clone)]
pub struct SubsystemMonitor {
    subsystem_id: String,
    kind: SubsystemKind,
    status: HealthStatus,
    properties: HashMap<String, ParameterValue>,
    last_record: Option<TelemetryRecord>,
    alerts: Vec<ParameterAlert>,
    updates: u64,
}

impl SubsystemMonitor {
    /// Create a monitor in the `Unknown` state with the kind's default properties
    pub fn new(subsystem_id: impl Into<String>, kind: SubsystemKind) -> Self {
        let properties = kind
            .default_properties()
            .iter()
            .map(|(name, seed)| (name.to_string(), ParameterValue::from(*seed)))
            .collect();

        Self {
            subsystem_id: subsystem_id.into(),
            kind,
            status: HealthStatus::default(),
            properties,
            last_record: None,
            alerts: Vec::new(),
            updates: 0,
        }
    }

    pub fn subsystem_id(&self) -> &str {
        &self.subsystem_id
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    pub fn status(&self) -> &HealthStatus {
        &self.status
    }

    pub fn property(&self, name: &str) -> Option<&ParameterValue> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &HashMap<String, ParameterValue> {
        &self.properties
    }

    /// The most recent record applied
    pub fn last_record(&self) -> Option<&TelemetryRecord> {
        self.last_record.as_ref()
    }

    /// Alerts raised by the most recent record
    pub fn alerts(&self) -> &[ParameterAlert] {
        &self.alerts
    }

    /// Number of records applied
    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn is_timed_out(&self, timeout_ms: i64) -> bool {
        self.status.is_timed_out(timeout_ms)
    }

    /// Apply a record and return the alerts it raised
    pub fn apply(&mut self, record: &TelemetryRecord) -> &[ParameterAlert] {
        self.status.update(record.health_code, &record.health_message);
        for (key, value) in &record.parameters {
            self.properties.insert(key.clone(), value.clone());
        }
        self.last_record = Some(record.clone());
        self.updates += 1;

        self.alerts = self.evaluate(record);
        for alert in &self.alerts {
            tracing::warn!("{}", alert);
        }
        &self.alerts
    }

    /// Check the record's parameters against the kind's alert table
    fn evaluate(&self, record: &TelemetryRecord) -> Vec<ParameterAlert> {
        self.kind
            .alert_rules()
            .iter()
            .filter_map(|rule| {
                let value = record.parameter(rule.parameter)?;
                self.trips(rule.limit, value).then(|| ParameterAlert {
                    subsystem_id: self.subsystem_id.clone(),
                    parameter: rule.parameter,
                    value: value.clone(),
                    label: rule.label,
                })
            })
            .collect()
    }

    fn trips(&self, limit: Limit, value: &ParameterValue) -> bool {
        match limit {
            Limit::NotEqual(expected) => value.to_string() != expected,
            Limit::Above(max) => value.as_f64().is_some_and(|v| v > max),
            Limit::Below(min) => value.as_f64().is_some_and(|v| v < min),
            Limit::Outside(lo, hi) => value.as_f64().is_some_and(|v| v < lo || v > hi),
            Limit::AboveFractionOf { property, fraction } => {
                let Some(reference) = self.properties.get(property).and_then(ParameterValue::as_f64)
                else {
                    return false;
                };
                value.as_f64().is_some_and(|v| v > reference * fraction)
            }
        }
    }
}

impl TelemetryConsumer for SubsystemMonitor {
    fn apply_telemetry(&mut self, record: &TelemetryRecord) {
        self.apply(record);
    }
}

/// Shared handle to a monitor owned by a [`MonitorBoard`]
pub type SharedMonitor = Arc<Mutex<SubsystemMonitor>>;

/// Snapshot row of a [`MonitorBoard`]
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub subsystem_id: String,
    pub kind: SubsystemKind,
    pub code: HealthCode,
    pub message: String,
    pub updates: u64,
}

/// Set of monitors registered with one dispatcher
pub struct MonitorBoard {
    dispatcher: TelemetryDispatcher,
    monitors: HashMap<String, SharedMonitor>,
}

impl MonitorBoard {
    pub fn new(dispatcher: TelemetryDispatcher) -> Self {
        Self {
            dispatcher,
            monitors: HashMap::new(),
        }
    }

    /// Create a monitor and register it with the dispatcher
    pub fn add(&mut self, subsystem_id: &str, kind: SubsystemKind) -> Result<SharedMonitor> {
        let monitor: SharedMonitor = Arc::new(Mutex::new(SubsystemMonitor::new(subsystem_id, kind)));
        let handle: ConsumerHandle = monitor.clone();
        self.dispatcher.register(subsystem_id, handle)?;
        self.monitors.insert(subsystem_id.to_string(), monitor.clone());
        tracing::info!("Monitoring {} ({})", subsystem_id, kind);
        Ok(monitor)
    }

    /// Unregister and drop a monitor
    pub fn remove(&mut self, subsystem_id: &str) -> Option<SharedMonitor> {
        let monitor = self.monitors.remove(subsystem_id)?;
        self.dispatcher.unregister(subsystem_id);
        Some(monitor)
    }

    pub fn get(&self, subsystem_id: &str) -> Option<SharedMonitor> {
        self.monitors.get(subsystem_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Ids of monitors with no update within `timeout_ms`, sorted
    pub fn timed_out(&self, timeout_ms: i64) -> Vec<String> {
        let mut ids: Vec<String> = self
            .monitors
            .iter()
            .filter(|(_, m)| lock(m).is_timed_out(timeout_ms))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// One row per monitor, most severe first, then by id
    pub fn summary(&self) -> Vec<MonitorSummary> {
        let mut rows: Vec<MonitorSummary> = self
            .monitors
            .values()
            .map(|m| {
                let m = lock(m);
                MonitorSummary {
                    subsystem_id: m.subsystem_id().to_string(),
                    kind: m.kind(),
                    code: m.status().code(),
                    message: m.status().message().to_string(),
                    updates: m.updates(),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.code
                .severity()
                .cmp(&a.code.severity())
                .then_with(|| a.subsystem_id.cmp(&b.subsystem_id))
        });
        rows
    }
}

impl Drop for MonitorBoard {
    fn drop(&mut self) {
        for id in self.monitors.keys() {
            self.dispatcher.unregister(id);
        }
    }
}

fn lock(monitor: &SharedMonitor) -> std::sync::MutexGuard<'_, SubsystemMonitor> {
    monitor.lock().unwrap_or_else(PoisonError::into_inner)
}
