//! Blueberry - Schema-driven binary codec
//!
//! Converts records into the compact, fixed-layout Blueberry wire format used
//! to talk to embedded devices, and back.
//!
//! ```
//! use blueberry::{decode, encode, plan, FieldValues, Schema, WireType};
//!
//! let schema = Schema::builder()
//!     .integer_as("a", WireType::U16)
//!     .boolean("flag1")
//!     .boolean("flag2")
//!     .float("b")
//!     .build();
//! let layout = plan(&schema).unwrap();
//!
//! let values = FieldValues::new()
//!     .with("a", 300u16)
//!     .with("flag1", true)
//!     .with("flag2", false)
//!     .with("b", 1.5f32);
//! let message = encode(&layout, &values, 0x01, 0x42).unwrap();
//! assert_eq!(message.payload().len(), 7);
//!
//! let (header, decoded) = decode(&message, &layout).unwrap();
//! assert_eq!((header.module_key, header.message_key), (0x01, 0x42));
//! assert_eq!(decoded, values);
//! ```

pub mod config;
pub mod protocol;
pub mod record;

pub use config::{ConfigError, ConfigResult, SchemaRegistry};
pub use protocol::{
    decode, decode_packet, decode_payload, decode_slice, empty_message, encode, encode_packet,
    encode_payload, plan, resolve,
    CodecError, CodecResult, FieldKind, FieldValues, Layout, Message, MessageHeader,
    PacketDecoder, PacketHeader, Schema, Value, WireType,
};
pub use record::{decode_record, encode_record, LayoutCache, Record};
