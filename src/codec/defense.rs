//! "RHMS" defense protocol
//!
//! Fixed 31-byte header followed by a variable parameter section:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RHMS"
//! 4       16    subsystem id, UTF-8, NUL/space padded
//! 20      1     health code ordinal
//! 21      8     timestamp, i64 big-endian, ms
//! 29      2     parameter count, u16 big-endian
//! 31      ...   count x { u8 key_len, key, u8 value_type, value }
//! ```
//!
//! Value types: `0` = f64, `1` = i32, `2` = u8 length + UTF-8.
//!
//! Header integers are big-endian but f64/i32 parameter payloads are
//! little-endian. Deployed emitters write the payload with their host
//! layout (x86/ARM), and that byte order is kept here so existing
//! senders keep working.
//!
//! The parameter section is parsed defensively: as soon as a declared
//! length runs past the end of the datagram, or a value type is unknown,
//! parsing stops and the parameters read so far are kept.

use super::binary::{TAG_FLOAT, TAG_INT, TAG_TEXT};
use super::{ByteReader, DecodeError, EncodeError};
use crate::types::{HealthCode, ParameterValue, TelemetryRecord};

/// Magic prefix of every defense protocol datagram
pub const DEFENSE_MAGIC: &[u8; 4] = b"RHMS";

/// Width of the padded subsystem id field
pub const DEFENSE_ID_LEN: usize = 16;

/// Size of the fixed header, and the minimum datagram size
pub const DEFENSE_HEADER_LEN: usize = 31;

const ID_OFFSET: usize = 4;
const CODE_OFFSET: usize = ID_OFFSET + DEFENSE_ID_LEN;
const TIMESTAMP_OFFSET: usize = CODE_OFFSET + 1;
const COUNT_OFFSET: usize = TIMESTAMP_OFFSET + 8;

/// Decode a defense protocol datagram
pub fn decode(data: &[u8]) -> Result<TelemetryRecord, DecodeError> {
    if data.len() < DEFENSE_HEADER_LEN {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    if !data.starts_with(DEFENSE_MAGIC) {
        return Err(DecodeError::BadMagic);
    }

    // The id ends at the first NUL; anything after it is padding
    let id_field = &data[ID_OFFSET..CODE_OFFSET];
    let id_field = id_field.split(|&b| b == 0).next().unwrap_or_default();
    let subsystem_id = String::from_utf8_lossy(id_field).trim().to_string();

    let health_code = HealthCode::from_ordinal(data[CODE_OFFSET] as i64);

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&data[TIMESTAMP_OFFSET..COUNT_OFFSET]);
    let timestamp = i64::from_be_bytes(ts);

    let count = u16::from_be_bytes([data[COUNT_OFFSET], data[COUNT_OFFSET + 1]]);

    let mut record = TelemetryRecord {
        subsystem_id,
        health_code,
        timestamp,
        ..Default::default()
    };

    let mut reader = ByteReader::at(data, DEFENSE_HEADER_LEN);
    for index in 0..count {
        match read_parameter(&mut reader) {
            Ok((key, value)) => {
                record.parameters.insert(key, value);
            }
            Err(e) => {
                tracing::debug!(
                    "Defense packet from {} cut short at parameter {}/{}: {}",
                    record.subsystem_id,
                    index,
                    count,
                    e
                );
                break;
            }
        }
    }

    Ok(record)
}

fn read_parameter(reader: &mut ByteReader<'_>) -> Result<(String, ParameterValue), DecodeError> {
    let key_len = reader.u8()? as usize;
    let key = String::from_utf8_lossy(reader.take(key_len)?).into_owned();

    let value = match reader.u8()? {
        TAG_FLOAT => ParameterValue::Float(f64::from_le_bytes(reader.array()?)),
        TAG_INT => ParameterValue::Int(i32::from_le_bytes(reader.array()?)),
        TAG_TEXT => {
            let len = reader.u8()? as usize;
            ParameterValue::Text(String::from_utf8_lossy(reader.take(len)?).into_owned())
        }
        other => return Err(DecodeError::UnknownValueType(other)),
    };

    Ok((key, value))
}

/// Encode a record as a defense protocol datagram
///
/// The health message has no slot in this format and is not transmitted.
pub fn encode(record: &TelemetryRecord) -> Result<Vec<u8>, EncodeError> {
    let id = record.subsystem_id.as_bytes();
    if id.len() > DEFENSE_ID_LEN {
        return Err(EncodeError::FieldTooLong {
            field: "subsystem_id".to_string(),
            len: id.len(),
            max: DEFENSE_ID_LEN,
        });
    }
    let count = u16::try_from(record.parameters.len())
        .map_err(|_| EncodeError::TooManyParameters(record.parameters.len()))?;

    let mut out = Vec::with_capacity(DEFENSE_HEADER_LEN + record.parameters.len() * 16);
    out.extend_from_slice(DEFENSE_MAGIC);
    out.extend_from_slice(id);
    out.resize(ID_OFFSET + DEFENSE_ID_LEN, b' ');
    out.push(record.health_code.ordinal());
    out.extend_from_slice(&record.timestamp.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());

    let mut keys: Vec<&String> = record.parameters.keys().collect();
    keys.sort();
    for key in keys {
        write_short(&mut out, key, key)?;
        match &record.parameters[key] {
            ParameterValue::Float(v) => {
                out.push(TAG_FLOAT);
                out.extend_from_slice(&v.to_le_bytes());
            }
            ParameterValue::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&v.to_le_bytes());
            }
            ParameterValue::Text(s) => {
                out.push(TAG_TEXT);
                write_short(&mut out, key, s)?;
            }
        }
    }

    Ok(out)
}

fn write_short(out: &mut Vec<u8>, field: &str, value: &str) -> Result<(), EncodeError> {
    let len = u8::try_from(value.len()).map_err(|_| EncodeError::FieldTooLong {
        field: field.to_string(),
        len: value.len(),
        max: u8::MAX as usize,
    })?;
    out.push(len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: &[u8; 16], code: u8, timestamp: i64, count: u16) -> Vec<u8> {
        let mut data = b"RHMS".to_vec();
        data.extend_from_slice(id);
        data.push(code);
        data.extend_from_slice(&timestamp.to_be_bytes());
        data.extend_from_slice(&count.to_be_bytes());
        data
    }

    #[test]
    fn test_reference_packet() {
        let mut data = header(b"SENSOR-001      ", 0x00, 1_700_000_000_000, 1);
        data.push(4);
        data.extend_from_slice(b"temp");
        data.push(0);
        data.extend_from_slice(&42.5f64.to_le_bytes());

        let record = decode(&data).unwrap();
        assert_eq!(record.subsystem_id, "SENSOR-001");
        assert_eq!(record.health_code, HealthCode::Ok);
        assert_eq!(record.timestamp, 1_700_000_000_000);
        assert_eq!(record.parameters.len(), 1);
        assert_eq!(record.parameter("temp"), Some(&ParameterValue::Float(42.5)));
        assert!(record.is_valid());
    }

    #[test]
    fn test_nul_padding_trimmed() {
        let data = header(b"RADAR\0\0\0\0\0\0\0\0\0\0\0", 2, 10, 0);
        let record = decode(&data).unwrap();
        assert_eq!(record.subsystem_id, "RADAR");
        assert_eq!(record.health_code, HealthCode::Error);
    }

    #[test]
    fn test_id_ends_at_first_nul() {
        let data = header(b"AB\0CD\0\0\0\0\0\0\0\0\0\0\0", 0, 10, 0);
        assert_eq!(decode(&data).unwrap().subsystem_id, "AB");

        let data = header(b" PSU-1\0garbage!!", 0, 10, 0);
        assert_eq!(decode(&data).unwrap().subsystem_id, "PSU-1");
    }

    #[test]
    fn test_too_short() {
        let data = header(b"SENSOR-001      ", 0, 1, 0);
        assert_eq!(decode(&data[..30]), Err(DecodeError::TooShort { len: 30 }));
        assert_eq!(decode(b"RHMS"), Err(DecodeError::TooShort { len: 4 }));
    }

    #[test]
    fn test_bad_magic() {
        let mut data = header(b"SENSOR-001      ", 0, 1, 0);
        data[0] = b'X';
        assert_eq!(decode(&data), Err(DecodeError::BadMagic));
    }

    #[test]
    fn test_truncated_parameters_keep_prefix() {
        let mut data = header(b"TRK-1           ", 1, 99, 3);
        data.push(5);
        data.extend_from_slice(b"count");
        data.push(1);
        data.extend_from_slice(&250i32.to_le_bytes());
        // second parameter declares an 8-byte float but only 3 bytes follow
        data.push(1);
        data.extend_from_slice(b"q");
        data.push(0);
        data.extend_from_slice(&[1, 2, 3]);

        let record = decode(&data).unwrap();
        assert_eq!(record.parameters.len(), 1);
        assert_eq!(record.parameter("count"), Some(&ParameterValue::Int(250)));
        assert_eq!(record.health_code, HealthCode::Warning);
    }

    #[test]
    fn test_unknown_value_type_stops_parsing() {
        let mut data = header(b"X               ", 0, 1, 2);
        data.push(1);
        data.extend_from_slice(b"a");
        data.push(7);
        data.extend_from_slice(&[0; 16]);
        let record = decode(&data).unwrap();
        assert!(record.parameters.is_empty());
    }

    #[test]
    fn test_count_larger_than_payload() {
        let data = header(b"X               ", 0, 1, 500);
        let record = decode(&data).unwrap();
        assert!(record.parameters.is_empty());
        assert!(record.is_valid());
    }

    #[test]
    fn test_out_of_range_code() {
        let data = header(b"X               ", 200, 1, 0);
        assert_eq!(decode(&data).unwrap().health_code, HealthCode::Unknown);
    }

    #[test]
    fn test_encode_matches_reference_layout() {
        let record = TelemetryRecord::new("SENSOR-001", HealthCode::Ok)
            .with_timestamp(1_700_000_000_000)
            .with_parameter("temp", 42.5);
        let bytes = encode(&record).unwrap();

        let mut expected = header(b"SENSOR-001      ", 0, 1_700_000_000_000, 1);
        expected.push(4);
        expected.extend_from_slice(b"temp");
        expected.push(0);
        expected.extend_from_slice(&42.5f64.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_encode_string_parameter() {
        let record = TelemetryRecord::new("COOL-1", HealthCode::Warning)
            .with_timestamp(5)
            .with_parameter("pump_status", "Stopped");
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_encode_rejects_long_fields() {
        let long_id = TelemetryRecord::new("A-VERY-LONG-SUBSYSTEM-ID", HealthCode::Ok);
        assert!(matches!(
            encode(&long_id),
            Err(EncodeError::FieldTooLong { max: 16, .. })
        ));

        let long_value = TelemetryRecord::new("X", HealthCode::Ok).with_parameter("k", "v".repeat(300));
        assert!(matches!(
            encode(&long_value),
            Err(EncodeError::FieldTooLong { max: 255, .. })
        ));
    }
}
