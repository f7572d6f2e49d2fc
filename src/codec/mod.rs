//! Telemetry wire codec
//!
//! Encodes and decodes [`TelemetryRecord`]s in three wire representations:
//!
//! - [`binary`] - the native self-describing big-endian serialization
//! - [`json`] - UTF-8 JSON object with snake_case keys
//! - [`defense`] - the fixed-header "RHMS" defense protocol
//!
//! # Format detection
//!
//! [`detect_format`] is the contract emitters rely on, so it is kept
//! deliberately simple:
//!
//! 1. the first four bytes are ASCII `RHMS` → [`WireFormat::DefenseProtocol`]
//! 2. else the first byte after leading ASCII whitespace is `{` → [`WireFormat::Json`]
//! 3. else → [`WireFormat::Binary`]
//!
//! A native binary packet starts with the big-endian `u32` length of the
//! subsystem id, so its first byte is `0x00` for any id shorter than 16 MiB
//! and it never collides with the other two rules.
//!
//! # Example
//!
//! ```ignore
//! use rhms_telemetry::codec::{self, Format};
//!
//! let bytes = codec::encode(&record, Format::Json)?;
//! let decoded = codec::decode(&bytes, Format::Auto)?;
//! assert_eq!(decoded, record);
//! ```

pub mod binary;
pub mod defense;
pub mod json;

use crate::types::TelemetryRecord;
use thiserror::Error;

pub use defense::{DEFENSE_HEADER_LEN, DEFENSE_ID_LEN, DEFENSE_MAGIC};

/// Concrete wire representation of a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// Native self-describing binary serialization
    Binary,
    /// JSON text object
    Json,
    /// Fixed-header "RHMS" binary protocol
    DefenseProtocol,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireFormat::Binary => write!(f, "binary"),
            WireFormat::Json => write!(f, "json"),
            WireFormat::DefenseProtocol => write!(f, "defense"),
        }
    }
}

/// Format selector for [`decode`] and [`encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Detect the format from the payload (decode) / native binary (encode)
    #[default]
    Auto,
    Binary,
    Json,
    DefenseProtocol,
}

impl From<WireFormat> for Format {
    fn from(format: WireFormat) -> Self {
        match format {
            WireFormat::Binary => Format::Binary,
            WireFormat::Json => Format::Json,
            WireFormat::DefenseProtocol => Format::DefenseProtocol,
        }
    }
}

/// Reasons a datagram could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("defense packet too short: {len} bytes, need at least 31")]
    TooShort { len: usize },

    #[error("invalid defense protocol magic")]
    BadMagic,

    #[error("truncated at offset {offset}: need {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown parameter value type {0}")]
    UnknownValueType(u8),

    #[error("invalid UTF-8 in {0}")]
    Utf8(&'static str),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Reasons a record could not be encoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: String,
        len: usize,
        max: usize,
    },

    #[error("{0} parameters exceed the format limit")]
    TooManyParameters(usize),

    #[error("parameter {0} is not finite and has no JSON representation")]
    NonFiniteFloat(String),

    #[error("JSON encoding failed: {0}")]
    Json(String),
}

/// Classify a datagram without decoding it
pub fn detect_format(data: &[u8]) -> WireFormat {
    if data.starts_with(DEFENSE_MAGIC) {
        return WireFormat::DefenseProtocol;
    }

    let first = data.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'{') {
        return WireFormat::Json;
    }

    WireFormat::Binary
}

/// Decode a datagram
///
/// Empty input is always an error. With [`Format::Auto`] the format is
/// chosen by [`detect_format`].
pub fn decode(data: &[u8], format: Format) -> Result<TelemetryRecord, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = match format {
        Format::Auto => detect_format(data).into(),
        other => other,
    };

    match format {
        Format::Binary | Format::Auto => binary::decode(data),
        Format::Json => Ok(json::decode(data)),
        Format::DefenseProtocol => defense::decode(data),
    }
}

/// Decode with auto-detection, falling back to the empty (invalid) record
///
/// Callers that only act on [`TelemetryRecord::is_valid`] use this.
pub fn decode_lenient(data: &[u8]) -> TelemetryRecord {
    decode(data, Format::Auto).unwrap_or_else(|e| {
        tracing::debug!("Discarding undecodable telemetry: {}", e);
        TelemetryRecord::default()
    })
}

/// Encode a record. [`Format::Auto`] encodes as native binary.
pub fn encode(record: &TelemetryRecord, format: Format) -> Result<Vec<u8>, EncodeError> {
    match format {
        Format::Auto | Format::Binary => binary::encode(record),
        Format::Json => json::encode(record),
        Format::DefenseProtocol => defense::encode(record),
    }
}

/// Bounds-checked cursor over a datagram
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn utf8(&mut self, n: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::Utf8(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthCode;

    #[test]
    fn test_detect_defense_before_json() {
        let mut data = b"RHMS".to_vec();
        data.extend_from_slice(b"{\"subsystem_id\":\"x\"}");
        assert_eq!(detect_format(&data), WireFormat::DefenseProtocol);
    }

    #[test]
    fn test_detect_json_with_leading_whitespace() {
        assert_eq!(detect_format(b"  \r\n\t{\"a\":1}"), WireFormat::Json);
        assert_eq!(detect_format(b"{}"), WireFormat::Json);
    }

    #[test]
    fn test_detect_fallback_binary() {
        assert_eq!(detect_format(b""), WireFormat::Binary);
        assert_eq!(detect_format(b"RHM"), WireFormat::Binary);
        assert_eq!(detect_format(&[0, 0, 0, 4]), WireFormat::Binary);
        assert_eq!(detect_format(b"   "), WireFormat::Binary);
    }

    #[test]
    fn test_decode_empty_is_error() {
        for format in [Format::Auto, Format::Binary, Format::Json, Format::DefenseProtocol] {
            assert_eq!(decode(&[], format), Err(DecodeError::Empty));
        }
    }

    #[test]
    fn test_auto_dispatches_by_content() {
        let record = TelemetryRecord::new("RF-1", HealthCode::Warning)
            .with_timestamp(1_700_000_000_000)
            .with_parameter("vswr", 2.4);

        for format in [Format::Binary, Format::Json, Format::DefenseProtocol] {
            let bytes = encode(&record, format).unwrap();
            assert_eq!(decode(&bytes, Format::Auto).unwrap(), record, "{:?}", format);
        }
    }

    #[test]
    fn test_auto_encodes_binary() {
        let record = TelemetryRecord::new("RF-1", HealthCode::Ok);
        assert_eq!(
            encode(&record, Format::Auto).unwrap(),
            encode(&record, Format::Binary).unwrap()
        );
    }

    #[test]
    fn test_decode_lenient_never_fails() {
        assert!(!decode_lenient(b"RHMS-short").is_valid());
        assert!(!decode_lenient(&[0xFF; 3]).is_valid());
        assert!(!decode_lenient(b"{not json").is_valid());
        assert!(!decode_lenient(&[]).is_valid());
    }

    #[test]
    fn test_byte_reader_bounds() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert_eq!(reader.u8().unwrap(), 1);
        assert_eq!(
            reader.array::<4>(),
            Err(DecodeError::Truncated { offset: 1, needed: 2 })
        );
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.take(2).unwrap(), &[2, 3]);
    }
}
