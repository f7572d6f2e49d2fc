//! Test data builders for creating test objects

use rhms_telemetry::{HealthCode, ParameterValue, TelemetryRecord};

/// Builder for creating test TelemetryRecords
pub struct RecordBuilder {
    subsystem_id: String,
    health_code: HealthCode,
    message: String,
    timestamp: i64,
    parameters: Vec<(String, ParameterValue)>,
}

impl RecordBuilder {
    pub fn new(subsystem_id: &str) -> Self {
        Self {
            subsystem_id: subsystem_id.to_string(),
            health_code: HealthCode::Ok,
            message: String::new(),
            timestamp: 1_700_000_000_000,
            parameters: Vec::new(),
        }
    }

    pub fn code(mut self, code: HealthCode) -> Self {
        self.health_code = code;
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<ParameterValue>) -> Self {
        self.parameters.push((key.to_string(), value.into()));
        self
    }

    pub fn build(self) -> TelemetryRecord {
        let mut record = TelemetryRecord::new(self.subsystem_id, self.health_code)
            .with_message(self.message)
            .with_timestamp(self.timestamp);
        for (key, value) in self.parameters {
            record.add_parameter(key, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = RecordBuilder::new("PSU-1")
            .code(HealthCode::Warning)
            .param("voltage", 27.5)
            .build();

        assert_eq!(record.subsystem_id, "PSU-1");
        assert_eq!(record.health_code, HealthCode::Warning);
        assert_eq!(record.voltage(), Some(27.5));
        assert!(record.is_valid());
    }
}
