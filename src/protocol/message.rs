//! Message encoding and decoding
//!
//! A message is `[module_key:u8][message_key:u8][payload]`, where the payload
//! is exactly `layout.size()` bytes laid out by [`plan`](super::plan).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::layout::{BoolGroup, FieldKind, FieldSpec, Layout, LayoutElement};
use super::value::{FieldValues, Value};
use super::{CodecError, CodecResult, MESSAGE_HEADER_SIZE};

/// Identifies which schema a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub module_key: u8,
    pub message_key: u8,
}

impl MessageHeader {
    pub fn new(module_key: u8, message_key: u8) -> Self {
        Self {
            module_key,
            message_key,
        }
    }

    pub fn to_bytes(self) -> [u8; MESSAGE_HEADER_SIZE] {
        [self.module_key, self.message_key]
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        match bytes {
            [module_key, message_key, ..] => Ok(Self::new(*module_key, *message_key)),
            _ => Err(CodecError::MalformedHeader("message shorter than its header")),
        }
    }
}

/// An encoded message: header followed by payload, stored contiguously
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    bytes: Bytes,
}

impl Message {
    /// Wrap already-encoded message bytes without copying
    pub fn from_bytes(bytes: Bytes) -> CodecResult<Self> {
        let header = MessageHeader::from_bytes(&bytes)?;
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> MessageHeader {
        self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[MESSAGE_HEADER_SIZE..]
    }

    /// Header and payload bytes, as they go on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for header-only messages
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == MESSAGE_HEADER_SIZE
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Header-only message, used to request a message from a device
pub fn empty_message(module_key: u8, message_key: u8) -> Message {
    let header = MessageHeader::new(module_key, message_key);
    Message {
        header,
        bytes: Bytes::copy_from_slice(&header.to_bytes()),
    }
}

/// Encode field values into a message using `layout`.
pub fn encode(
    layout: &Layout,
    values: &FieldValues,
    module_key: u8,
    message_key: u8,
) -> CodecResult<Message> {
    let header = MessageHeader::new(module_key, message_key);
    let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + layout.size());
    buf.put_slice(&header.to_bytes());
    put_payload(layout, values, &mut buf)?;

    Ok(Message {
        header,
        bytes: buf.freeze(),
    })
}

/// Encode only the payload, without a message header
pub fn encode_payload(layout: &Layout, values: &FieldValues) -> CodecResult<Bytes> {
    let mut buf = BytesMut::with_capacity(layout.size());
    put_payload(layout, values, &mut buf)?;
    Ok(buf.freeze())
}

fn put_payload(layout: &Layout, values: &FieldValues, buf: &mut BytesMut) -> CodecResult<()> {
    let start = buf.len();

    for element in layout.elements() {
        match element {
            LayoutElement::Field(spec) => {
                let value = values
                    .value(&spec.name)
                    .ok_or_else(|| CodecError::MissingField(spec.name.clone()))?;
                put_field(spec, value, buf)?;
            }
            LayoutElement::Bools(group) => put_bools(group, values, buf)?,
        }
    }

    debug_assert_eq!(buf.len() - start, layout.size());
    Ok(())
}

fn put_field(spec: &FieldSpec, value: Value, buf: &mut BytesMut) -> CodecResult<()> {
    let wire = spec.wire_type;

    let value = match value {
        Value::Bool(b) if spec.kind == FieldKind::Boolean && wire.is_float() => {
            Value::Float(if b { 1.0 } else { 0.0 })
        }
        Value::Bool(b) if spec.kind == FieldKind::Boolean => Value::Int(b.into()),
        Value::Bool(_) => return Err(mismatch(spec, value)),
        other => other,
    };

    match (wire.integer_bounds(), value) {
        (None, Value::Float(f)) => wire.put_float(f, buf),
        (Some((min, max)), Value::Int(i)) => {
            if i < min || i > max {
                return Err(CodecError::OutOfRange {
                    field: spec.name.clone(),
                    value: i,
                    min,
                    max,
                });
            }
            wire.put_int(i, buf);
        }
        (_, other) => return Err(mismatch(spec, other)),
    }
    Ok(())
}

fn mismatch(spec: &FieldSpec, value: Value) -> CodecError {
    CodecError::TypeMismatch {
        field: spec.name.clone(),
        expected: if spec.kind == FieldKind::Boolean {
            "bool"
        } else if spec.wire_type.is_float() {
            "float"
        } else {
            "integer"
        },
        found: value.type_name(),
    }
}

fn put_bools(group: &BoolGroup, values: &FieldValues, buf: &mut BytesMut) -> CodecResult<()> {
    for chunk in group.fields().chunks(8) {
        let mut byte = 0u8;
        for (bit, name) in chunk.iter().enumerate() {
            match values.value(name) {
                Some(Value::Bool(true)) => byte |= 1 << bit,
                Some(Value::Bool(false)) => {}
                Some(other) => {
                    return Err(CodecError::TypeMismatch {
                        field: name.clone(),
                        expected: "bool",
                        found: other.type_name(),
                    })
                }
                None => return Err(CodecError::MissingField(name.clone())),
            }
        }
        buf.put_u8(byte);
    }
    Ok(())
}

/// Decode a message using the layout of the schema its header names.
pub fn decode(message: &Message, layout: &Layout) -> CodecResult<(MessageHeader, FieldValues)> {
    let values = decode_payload(message.payload(), layout)?;
    Ok((message.header, values))
}

/// Decode a borrowed `[header][payload]` slice, e.g. one returned by
/// [`decode_packet`](super::decode_packet).
pub fn decode_slice(bytes: &[u8], layout: &Layout) -> CodecResult<(MessageHeader, FieldValues)> {
    let header = MessageHeader::from_bytes(bytes)?;
    let values = decode_payload(&bytes[MESSAGE_HEADER_SIZE..], layout)?;
    Ok((header, values))
}

/// Decode a bare payload that carries no message header
pub fn decode_payload(payload: &[u8], layout: &Layout) -> CodecResult<FieldValues> {
    if payload.len() != layout.size() {
        return Err(CodecError::LengthMismatch {
            expected: layout.size(),
            actual: payload.len(),
        });
    }

    let mut buf = payload;
    let mut values = FieldValues::with_capacity(layout.field_count());

    for element in layout.elements() {
        match element {
            LayoutElement::Field(spec) => {
                let value = match (spec.kind, spec.wire_type.read(&mut buf)) {
                    (FieldKind::Boolean, Value::Int(i)) => Value::Bool(i != 0),
                    (FieldKind::Boolean, Value::Float(f)) => Value::Bool(f != 0.0),
                    (_, value) => value,
                };
                values.insert(spec.name.clone(), value);
            }
            LayoutElement::Bools(group) => {
                let (packed, rest) = buf.split_at(group.size());
                for (i, name) in group.fields().iter().enumerate() {
                    let bit = (packed[i / 8] >> (i % 8)) & 1;
                    values.insert(name.clone(), bit == 1);
                }
                buf = rest;
            }
        }
    }

    debug_assert!(!buf.has_remaining());
    Ok(values)
}
