//! Protocol module - The Blueberry wire format
//!
//! Everything is little-endian.
//!
//! Message:
//! - 1 byte module key
//! - 1 byte message key
//! - Fixed-size payload laid out by the schema's [`Layout`]
//!
//! Packet:
//! - 4 bytes magic `"Blue"`
//! - 2 bytes total packet length in 4-byte words
//! - 2 bytes CRC-16/CCITT-FALSE over the rest of the packet
//! - Per message: 2 bytes length, then the message bytes
//! - Zero padding up to a word boundary

mod codec;
mod crc;
mod error;
mod layout;
mod message;
mod value;
mod wire;

pub use codec::*;
pub use crc::crc16_ccitt;
pub use error::*;
pub use layout::*;
pub use message::*;
pub use value::*;
pub use wire::*;

/// Magic bytes opening every packet
pub const PACKET_MAGIC: [u8; 4] = *b"Blue";

/// Packet header size: magic(4) + length(2) + crc(2) = 8 bytes
pub const PACKET_HEADER_SIZE: usize = 8;

/// Message header size: module key(1) + message key(1)
pub const MESSAGE_HEADER_SIZE: usize = 2;

/// Per-message length prefix inside a packet body
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Default port for Blueberry over UDP/TCP ("BB")
pub const BLUEBERRY_PORT: u16 = 0x4242;
