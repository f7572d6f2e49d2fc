//! Native binary serialization
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! string   subsystem_id      u32 length + UTF-8
//! i32      health_code       wire ordinal
//! string   health_message    u32 length + UTF-8
//! i64      timestamp         ms since epoch
//! u32      parameter count
//! repeated key string, u8 tag, value
//!          tag 0 = f64 (IEEE-754 bits), 1 = i32, 2 = string
//! ```
//!
//! Parameters are written in key order so equal records encode to equal
//! bytes. Decoding rejects truncated input and trailing garbage.

use super::{ByteReader, DecodeError, EncodeError};
use crate::types::{HealthCode, ParameterValue, TelemetryRecord};

pub(crate) const TAG_FLOAT: u8 = 0;
pub(crate) const TAG_INT: u8 = 1;
pub(crate) const TAG_TEXT: u8 = 2;

/// Encode a record in the native binary layout
pub fn encode(record: &TelemetryRecord) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64 + record.parameters.len() * 24);

    write_string(&mut out, "subsystem_id", &record.subsystem_id)?;
    out.extend_from_slice(&(record.health_code.ordinal() as i32).to_be_bytes());
    write_string(&mut out, "health_message", &record.health_message)?;
    out.extend_from_slice(&record.timestamp.to_be_bytes());

    let count = u32::try_from(record.parameters.len())
        .map_err(|_| EncodeError::TooManyParameters(record.parameters.len()))?;
    out.extend_from_slice(&count.to_be_bytes());

    let mut keys: Vec<&String> = record.parameters.keys().collect();
    keys.sort();
    for key in keys {
        write_string(&mut out, "parameter key", key)?;
        match &record.parameters[key] {
            ParameterValue::Float(v) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            ParameterValue::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            ParameterValue::Text(s) => {
                out.push(TAG_TEXT);
                write_string(&mut out, "parameter value", s)?;
            }
        }
    }

    Ok(out)
}

/// Decode a record from the native binary layout
pub fn decode(data: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    let mut reader = ByteReader::new(data);

    let subsystem_id = read_string(&mut reader, "subsystem_id")?;
    let health_code = HealthCode::from_ordinal(i32::from_be_bytes(reader.array()?) as i64);
    let health_message = read_string(&mut reader, "health_message")?;
    let timestamp = i64::from_be_bytes(reader.array()?);
    let count = u32::from_be_bytes(reader.array()?);

    let mut record = TelemetryRecord {
        subsystem_id,
        health_code,
        health_message,
        timestamp,
        ..Default::default()
    };

    for _ in 0..count {
        let key = read_string(&mut reader, "parameter key")?;
        let value = match reader.u8()? {
            TAG_FLOAT => ParameterValue::Float(f64::from_be_bytes(reader.array()?)),
            TAG_INT => ParameterValue::Int(i32::from_be_bytes(reader.array()?)),
            TAG_TEXT => ParameterValue::Text(read_string(&mut reader, "parameter value")?),
            other => return Err(DecodeError::UnknownValueType(other)),
        };
        record.parameters.insert(key, value);
    }

    if reader.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }

    Ok(record)
}

fn write_string(out: &mut Vec<u8>, field: &str, value: &str) -> Result<(), EncodeError> {
    let len = u32::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
        field: field.to_string(),
        len: value.len(),
        max: u32::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_string(reader: &mut ByteReader<'_>, field: &'static str) -> Result<String, DecodeError> {
    let len = u32::from_be_bytes(reader.array()?) as usize;
    reader.utf8(len, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryRecord {
        TelemetryRecord::new("PSU-1", HealthCode::Warning)
            .with_message("efficiency low")
            .with_timestamp(1_700_000_000_123)
            .with_parameter("voltage", 27.5)
            .with_parameter("error_count", 3)
            .with_parameter("mode", "standby")
    }

    #[test]
    fn test_roundtrip() {
        let record = sample();
        let bytes = encode(&record).unwrap();
        assert_eq!(decode(&bytes).unwrap(), record);
    }

    #[test]
    fn test_layout_prefix() {
        let record = TelemetryRecord::new("AB", HealthCode::Error).with_timestamp(1);
        let bytes = encode(&record).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..6], b"AB");
        assert_eq!(&bytes[6..10], &[0, 0, 0, 2]);
        assert_eq!(bytes.len(), 4 + 2 + 4 + 4 + 8 + 4);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = sample();
        let b = sample();
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = encode(&sample()).unwrap();
        for len in 1..bytes.len() {
            let err = decode(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, DecodeError::Truncated { .. }),
                "len {} gave {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let record = TelemetryRecord::new("X", HealthCode::Ok)
            .with_timestamp(5)
            .with_parameter("k", 1);
        let mut bytes = encode(&record).unwrap();
        // tag sits right after the 1-byte key
        let tag_pos = bytes.len() - 5;
        bytes[tag_pos] = 9;
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownValueType(9)));
    }

    #[test]
    fn test_out_of_range_code_is_unknown() {
        let record = TelemetryRecord::new("X", HealthCode::Ok).with_timestamp(5);
        let mut bytes = encode(&record).unwrap();
        bytes[5..9].copy_from_slice(&42i32.to_be_bytes());
        assert_eq!(decode(&bytes).unwrap().health_code, HealthCode::Unknown);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut bytes = encode(&TelemetryRecord::new("XY", HealthCode::Ok)).unwrap();
        bytes[4] = 0xFF;
        assert_eq!(decode(&bytes), Err(DecodeError::Utf8("subsystem_id")));
    }
}
