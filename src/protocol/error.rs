//! Codec errors

use thiserror::Error;

use super::layout::FieldKind;

/// Errors raised while planning, encoding, decoding or framing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    // === Schema ===
    #[error("Unsupported field kind: {0}")]
    UnsupportedType(FieldKind),

    #[error("Unknown wire type: {0}")]
    UnknownWireType(String),

    #[error("Schema error in field '{field}': {source}")]
    Schema {
        field: String,
        #[source]
        source: Box<CodecError>,
    },

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    // === Encoding ===
    #[error("Value {value} of field '{field}' out of range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i128,
        min: i128,
        max: i128,
    },

    #[error("Type mismatch for field '{field}': expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Missing field: {0}")]
    MissingField(String),

    // === Decoding ===
    #[error("Payload length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Unknown message: module {module_key:#04x}, message {message_key:#04x}")]
    UnknownMessage { module_key: u8, message_key: u8 },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    // === Framing ===
    #[error("Truncated packet: need {needed} bytes, have {available}")]
    TruncatedPacket { needed: usize, available: usize },

    #[error("Malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("CRC mismatch: computed {expected:#06x}, header carries {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),

    #[error("Packet too large: {0} bytes (max: {1})")]
    PacketTooLarge(usize, usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = CodecError::OutOfRange {
            field: "level".to_string(),
            value: 256,
            min: 0,
            max: 255,
        };
        assert_eq!(
            err.to_string(),
            "Value 256 of field 'level' out of range [0, 255]"
        );
    }

    #[test]
    fn test_schema_error_source() {
        let err = CodecError::Schema {
            field: "name".to_string(),
            source: Box::new(CodecError::UnsupportedType(FieldKind::Text)),
        };
        assert!(err.to_string().contains("'name'"));
        assert!(err.source().is_some());
    }
}
