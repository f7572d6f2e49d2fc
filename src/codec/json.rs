//! JSON wire format
//!
//! ```json
//! {"subsystem_id":"PSU-1","health_code":0,"health_message":"",
//!  "timestamp":1700000000000,"parameters":{"voltage":28.1,"mode":"auto"}}
//! ```
//!
//! Decoding is lenient: missing keys fall back to empty/zero, wrongly typed
//! values are ignored, and a document that is not a JSON object yields the
//! empty record (which fails [`TelemetryRecord::is_valid`]).

use super::EncodeError;
use crate::types::{HealthCode, ParameterValue, TelemetryRecord};
use serde_json::{Map, Value};

/// Encode a record as compact JSON
pub fn encode(record: &TelemetryRecord) -> Result<Vec<u8>, EncodeError> {
    let mut params = Map::new();
    let mut keys: Vec<&String> = record.parameters.keys().collect();
    keys.sort();
    for key in keys {
        let param = &record.parameters[key];
        if matches!(param, ParameterValue::Float(v) if !v.is_finite()) {
            return Err(EncodeError::NonFiniteFloat(key.clone()));
        }
        let value = serde_json::to_value(param)
            .map_err(|e| EncodeError::Json(e.to_string()))?;
        params.insert(key.clone(), value);
    }

    let doc = serde_json::json!({
        "subsystem_id": record.subsystem_id,
        "health_code": record.health_code.ordinal(),
        "health_message": record.health_message,
        "timestamp": record.timestamp,
        "parameters": params,
    });

    serde_json::to_vec(&doc).map_err(|e| EncodeError::Json(e.to_string()))
}

/// Decode a JSON datagram, never failing
pub fn decode(data: &[u8]) -> TelemetryRecord {
    let root = match serde_json::from_slice::<Value>(data) {
        Ok(Value::Object(root)) => root,
        Ok(_) => {
            tracing::debug!("JSON telemetry is not an object");
            return TelemetryRecord::default();
        }
        Err(e) => {
            tracing::debug!("Malformed JSON telemetry: {}", e);
            return TelemetryRecord::default();
        }
    };

    let mut record = TelemetryRecord {
        subsystem_id: string_field(&root, "subsystem_id"),
        health_code: HealthCode::from_ordinal(
            root.get("health_code").and_then(integer_value).unwrap_or(0),
        ),
        health_message: string_field(&root, "health_message"),
        timestamp: root.get("timestamp").and_then(integer_value).unwrap_or(0),
        ..Default::default()
    };

    if let Some(Value::Object(params)) = root.get("parameters") {
        for (key, value) in params {
            match scalar_value(value) {
                Some(v) => {
                    record.parameters.insert(key.clone(), v);
                }
                None => tracing::trace!("Skipping non-scalar parameter {}", key),
            }
        }
    }

    record
}

fn string_field(root: &Map<String, Value>, key: &str) -> String {
    root.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Integer view of a JSON value. Floats are truncated and numeric strings
/// are parsed, since some emitters quote or float-encode timestamps.
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

fn scalar_value(value: &Value) -> Option<ParameterValue> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(match i32::try_from(i) {
                    Ok(v) => ParameterValue::Int(v),
                    Err(_) => ParameterValue::Float(i as f64),
                })
            } else {
                n.as_f64().map(ParameterValue::Float)
            }
        }
        Value::String(s) => Some(ParameterValue::Text(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_mixed_parameters() {
        let record = TelemetryRecord::new("NET-1", HealthCode::Offline)
            .with_message("link lost")
            .with_timestamp(1_700_000_000_001)
            .with_parameter("packet_loss", 3.0)
            .with_parameter("error_count", 12)
            .with_parameter("link_status", "Down");
        let bytes = encode(&record).unwrap();
        assert_eq!(decode(&bytes), record);
    }

    #[test]
    fn test_whole_float_stays_float() {
        let record = TelemetryRecord::new("A", HealthCode::Ok)
            .with_timestamp(1)
            .with_parameter("x", 2.0);
        let text = String::from_utf8(encode(&record).unwrap()).unwrap();
        assert!(text.contains("\"x\":2.0"), "{}", text);
        assert_eq!(decode(text.as_bytes()).parameter("x"), Some(&ParameterValue::Float(2.0)));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        for bad in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let record = TelemetryRecord::new("A", HealthCode::Ok).with_parameter("x", bad);
            assert_eq!(encode(&record), Err(EncodeError::NonFiniteFloat("x".to_string())));
        }
    }

    #[test]
    fn test_keys() {
        let record = TelemetryRecord::new("A", HealthCode::Error).with_timestamp(7);
        let value: Value = serde_json::from_slice(&encode(&record).unwrap()).unwrap();
        assert_eq!(value["subsystem_id"], "A");
        assert_eq!(value["health_code"], 2);
        assert_eq!(value["health_message"], "");
        assert_eq!(value["timestamp"], 7);
        assert!(value["parameters"].is_object());
    }

    #[test]
    fn test_tolerant_timestamp() {
        let float_ts = br#"{"subsystem_id":"A","timestamp":1700000000000.0}"#;
        assert_eq!(decode(float_ts).timestamp, 1_700_000_000_000);

        let string_ts = br#"{"subsystem_id":"A","timestamp":"1700000000000"}"#;
        assert_eq!(decode(string_ts).timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_missing_keys_default() {
        let record = decode(br#"{"subsystem_id":"A"}"#);
        assert_eq!(record.subsystem_id, "A");
        assert_eq!(record.health_code, HealthCode::Ok);
        assert_eq!(record.timestamp, 0);
        assert!(record.parameters.is_empty());
        assert!(!record.is_valid());
    }

    #[test]
    fn test_malformed_yields_empty_record() {
        assert_eq!(decode(b"{\"subsystem_id\":"), TelemetryRecord::default());
        assert_eq!(decode(b"[1,2,3]"), TelemetryRecord::default());
    }

    #[test]
    fn test_non_scalar_parameters_skipped() {
        let record = decode(
            br#"{"subsystem_id":"A","timestamp":1,
                 "parameters":{"ok":1,"big":5000000000,"flag":true,"nested":{"a":1},"none":null}}"#,
        );
        assert_eq!(record.parameter("ok"), Some(&ParameterValue::Int(1)));
        assert_eq!(record.parameter("big"), Some(&ParameterValue::Float(5_000_000_000.0)));
        assert_eq!(record.parameters.len(), 2);
    }

    #[test]
    fn test_wrongly_typed_fields_ignored() {
        let record = decode(br#"{"subsystem_id":5,"health_code":"x","timestamp":true}"#);
        assert_eq!(record.subsystem_id, "");
        assert_eq!(record.health_code, HealthCode::Ok);
        assert_eq!(record.timestamp, 0);
    }
}
