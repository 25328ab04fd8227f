//! Packet codec
//!
//! Frames encoded messages into packets and splits packets back into
//! message slices. Framing never looks inside a message past its length.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{trace, warn};

use super::crc::crc16_ccitt;
use super::{
    CodecError, CodecResult, LENGTH_PREFIX_SIZE, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE,
    PACKET_MAGIC,
};

/// Largest message a u16 length prefix can describe
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Largest packet a u16 word count can describe
pub const MAX_PACKET_SIZE: usize = u16::MAX as usize * 4;

/// Packet header: magic, total length in 4-byte words, body CRC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Total packet length in 4-byte words, header included
    pub length_words: u16,
    /// CRC-16/CCITT-FALSE over everything after the header
    pub crc: u16,
}

impl PacketHeader {
    /// Total packet length in bytes
    pub fn byte_len(&self) -> usize {
        self.length_words as usize * 4
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&PACKET_MAGIC);
        buf.put_u16_le(self.length_words);
        buf.put_u16_le(self.crc);
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(CodecError::MalformedHeader("packet shorter than its header"));
        }
        if data[0..4] != PACKET_MAGIC {
            return Err(CodecError::MalformedHeader("bad packet magic"));
        }

        let mut fields = &data[4..PACKET_HEADER_SIZE];
        let length_words = fields.get_u16_le();
        let crc = fields.get_u16_le();

        Ok(Self { length_words, crc })
    }
}

/// Frame messages into one packet.
///
/// Each message is written as a u16 length prefix followed by its bytes, in
/// input order. The body is zero-padded to a whole number of words.
pub fn encode_packet<M: AsRef<[u8]>>(messages: &[M]) -> CodecResult<Bytes> {
    let body_len: usize = messages
        .iter()
        .map(|message| LENGTH_PREFIX_SIZE + message.as_ref().len())
        .sum();
    let total = (PACKET_HEADER_SIZE + body_len).next_multiple_of(4);

    if total > MAX_PACKET_SIZE {
        return Err(CodecError::PacketTooLarge(total, MAX_PACKET_SIZE));
    }

    let mut buf = BytesMut::with_capacity(total);
    PacketHeader {
        length_words: (total / 4) as u16,
        crc: 0,
    }
    .encode(&mut buf);

    for message in messages {
        let bytes = message.as_ref();
        if bytes.len() < MESSAGE_HEADER_SIZE {
            return Err(CodecError::MalformedHeader("message shorter than its header"));
        }
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(bytes.len(), MAX_MESSAGE_SIZE));
        }
        buf.put_u16_le(bytes.len() as u16);
        buf.put_slice(bytes);
    }
    buf.resize(total, 0);

    let crc = crc16_ccitt(&buf[PACKET_HEADER_SIZE..]);
    buf[6..8].copy_from_slice(&crc.to_le_bytes());

    trace!(messages = messages.len(), bytes = total, crc, "Encoded packet");
    Ok(buf.freeze())
}

/// Split a packet into its message slices without decoding them.
///
/// Bytes past the declared packet length are ignored.
pub fn decode_packet(data: &[u8]) -> CodecResult<(PacketHeader, Vec<&[u8]>)> {
    let header = PacketHeader::decode(data)?;
    let total = header.byte_len();

    if total < PACKET_HEADER_SIZE {
        return Err(CodecError::MalformedHeader("declared length shorter than header"));
    }
    if data.len() < total {
        return Err(CodecError::TruncatedPacket {
            needed: total,
            available: data.len(),
        });
    }

    let body = &data[PACKET_HEADER_SIZE..total];
    let crc = crc16_ccitt(body);
    if crc != header.crc {
        return Err(CodecError::CrcMismatch {
            expected: crc,
            actual: header.crc,
        });
    }

    let mut messages = Vec::new();
    let mut offset = 0;
    while body.len() - offset >= LENGTH_PREFIX_SIZE {
        let len = u16::from_le_bytes([body[offset], body[offset + 1]]) as usize;
        // A zero prefix can only be word padding
        if len == 0 {
            break;
        }
        if len < MESSAGE_HEADER_SIZE {
            return Err(CodecError::MalformedHeader("message shorter than its header"));
        }

        let start = offset + LENGTH_PREFIX_SIZE;
        let end = start + len;
        if end > body.len() {
            return Err(CodecError::TruncatedPacket {
                needed: PACKET_HEADER_SIZE + end,
                available: total,
            });
        }

        messages.push(&body[start..end]);
        offset = end;
    }

    trace!(messages = messages.len(), bytes = total, "Decoded packet");
    Ok((header, messages))
}

/// Incremental packet framer for a receive buffer.
///
/// Discards bytes until the packet magic, waits for the length the header
/// declares, then yields the whole packet for [`decode_packet`]. A header
/// whose body fails its CRC is treated as a false magic: only the magic is
/// skipped and scanning resumes inside the would-be body. A complete valid
/// packet further along the buffer also ends the wait for a header whose
/// declared length has not arrived.
pub struct PacketDecoder {
    state: DecodeState,
}

#[derive(Default)]
enum DecodeState {
    #[default]
    Header,
    Body {
        length: usize,
        crc: u16,
    },
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Attempt to take one packet off the front of the buffer
    /// Returns Ok(None) if more data is needed
    pub fn decode(&mut self, buf: &mut BytesMut) -> CodecResult<Option<Bytes>> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if !sync_to_magic(buf) || buf.len() < PACKET_HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = PacketHeader::decode(&buf[..PACKET_HEADER_SIZE])?;
                    let length = header.byte_len();
                    if length < PACKET_HEADER_SIZE {
                        // Skip this magic so the next call resynchronises
                        buf.advance(PACKET_MAGIC.len());
                        return Err(CodecError::MalformedHeader(
                            "declared length shorter than header",
                        ));
                    }

                    self.state = DecodeState::Body {
                        length,
                        crc: header.crc,
                    };
                }
                DecodeState::Body { length, crc } => {
                    if buf.len() < length {
                        match find_packet(&buf[PACKET_MAGIC.len()..]) {
                            Some(pos) => {
                                let skip = PACKET_MAGIC.len() + pos;
                                warn!(
                                    declared = length,
                                    discarded = skip,
                                    "Abandoned incomplete packet for a later valid one"
                                );
                                buf.advance(skip);
                                self.state = DecodeState::Header;
                                continue;
                            }
                            None => return Ok(None),
                        }
                    }

                    self.state = DecodeState::Header;

                    let actual = crc16_ccitt(&buf[PACKET_HEADER_SIZE..length]);
                    if actual != crc {
                        warn!(expected = crc, actual, "Packet CRC mismatch, rescanning after magic");
                        buf.advance(PACKET_MAGIC.len());
                        continue;
                    }

                    return Ok(Some(buf.split_to(length).freeze()));
                }
            }
        }
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of a complete packet with a matching CRC at the start of `data`
fn complete_packet(data: &[u8]) -> Option<usize> {
    let header = PacketHeader::decode(data).ok()?;
    let length = header.byte_len();
    if length < PACKET_HEADER_SIZE || data.len() < length {
        return None;
    }
    (crc16_ccitt(&data[PACKET_HEADER_SIZE..length]) == header.crc).then_some(length)
}

/// Offset of the first complete, CRC-valid packet in `data`
fn find_packet(data: &[u8]) -> Option<usize> {
    data.windows(PACKET_MAGIC.len())
        .enumerate()
        .filter(|(_, window)| *window == PACKET_MAGIC)
        .map(|(pos, _)| pos)
        .find(|&pos| complete_packet(&data[pos..]).is_some())
}

/// Drop leading bytes that cannot start a packet. Returns true once the
/// buffer begins with the full magic.
fn sync_to_magic(buf: &mut BytesMut) -> bool {
    if let Some(pos) = buf
        .windows(PACKET_MAGIC.len())
        .position(|window| window == PACKET_MAGIC)
    {
        if pos > 0 {
            warn!(discarded = pos, "Skipped bytes before packet magic");
            buf.advance(pos);
        }
        return true;
    }

    // Keep a tail that may be the start of a magic split across reads
    let keep = (0..PACKET_MAGIC.len())
        .rev()
        .find(|&n| n <= buf.len() && buf[buf.len() - n..] == PACKET_MAGIC[..n])
        .unwrap_or(0);
    let discard = buf.len() - keep;
    if discard > 0 {
        warn!(discarded = discard, "Skipped bytes before packet magic");
        buf.advance(discard);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{empty_message, encode, plan, FieldValues, Message, Schema, WireType};

    fn message(value: u32, module_key: u8, message_key: u8) -> Message {
        let layout = plan(&Schema::builder().integer("value").build()).unwrap();
        let values = FieldValues::new().with("value", value);
        encode(&layout, &values, module_key, message_key).unwrap()
    }

    #[test]
    fn test_packet_layout() {
        let packet = encode_packet(&[message(1, 0, 0)]).unwrap();

        assert_eq!(&packet[..4], &PACKET_MAGIC);
        assert_eq!(packet.len() % 4, 0);
        // header(8) + prefix(2) + message(2 + 4) = 16
        assert_eq!(packet.len(), 16);
        assert_eq!(u16::from_le_bytes([packet[4], packet[5]]), 4);
        assert_eq!(
            u16::from_le_bytes([packet[6], packet[7]]),
            crc16_ccitt(&packet[8..])
        );
        assert_eq!(&packet[8..], &[0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let messages = vec![message(1, 1, 1), message(2, 2, 2), message(3, 3, 3)];
        let packet = encode_packet(&messages).unwrap();

        let (header, slices) = decode_packet(&packet).unwrap();
        assert_eq!(header.byte_len(), packet.len());
        assert_eq!(slices.len(), 3);
        for (slice, original) in slices.iter().zip(&messages) {
            assert_eq!(*slice, original.as_bytes());
        }
    }

    #[test]
    fn test_padding_is_not_a_message() {
        // 8 + (2 + 3) = 13 bytes, padded to 16: three bytes of zero padding
        let odd = Schema::builder().integer_as("v", WireType::U8).build();
        let layout = plan(&odd).unwrap();
        let msg = encode(&layout, &FieldValues::new().with("v", 7u8), 1, 2).unwrap();

        let packet = encode_packet(&[msg.clone()]).unwrap();
        assert_eq!(packet.len(), 16);

        let (_, slices) = decode_packet(&packet).unwrap();
        assert_eq!(slices, vec![msg.as_bytes()]);
    }

    #[test]
    fn test_empty_message_in_packet() {
        let packet = encode_packet(&[empty_message(1, 2)]).unwrap();
        let (_, slices) = decode_packet(&packet).unwrap();
        assert_eq!(slices, vec![&[1u8, 2][..]]);
    }

    #[test]
    fn test_empty_packet() {
        let packet = encode_packet::<Message>(&[]).unwrap();
        assert_eq!(packet.len(), PACKET_HEADER_SIZE);

        let (_, slices) = decode_packet(&packet).unwrap();
        assert!(slices.is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let mut packet = encode_packet(&[message(42, 1, 2)]).unwrap().to_vec();
        packet[0] = 0xFF;
        assert!(matches!(
            decode_packet(&packet),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            decode_packet(&PACKET_MAGIC),
            Err(CodecError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut packet = encode_packet(&[message(42, 1, 2)]).unwrap().to_vec();
        packet[6] ^= 0xFF;
        assert!(matches!(
            decode_packet(&packet),
            Err(CodecError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_packet() {
        let packet = encode_packet(&[message(42, 1, 2)]).unwrap();
        let cut = &packet[..packet.len() - 4];
        assert_eq!(
            decode_packet(cut),
            Err(CodecError::TruncatedPacket {
                needed: 16,
                available: 12
            })
        );
    }

    #[test]
    fn test_message_overrunning_packet() {
        // Valid header and CRC, but the prefix claims more than the body holds
        let mut buf = BytesMut::new();
        PacketHeader {
            length_words: 3,
            crc: 0,
        }
        .encode(&mut buf);
        buf.put_u16_le(9);
        buf.put_slice(&[1, 2]);
        let crc = crc16_ccitt(&buf[PACKET_HEADER_SIZE..]);
        buf[6..8].copy_from_slice(&crc.to_le_bytes());

        assert!(matches!(
            decode_packet(&buf),
            Err(CodecError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn test_declared_length_shorter_than_header() {
        let mut buf = BytesMut::new();
        PacketHeader {
            length_words: 1,
            crc: 0,
        }
        .encode(&mut buf);

        assert_eq!(
            decode_packet(&buf),
            Err(CodecError::MalformedHeader(
                "declared length shorter than header"
            ))
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let packet = encode_packet(&[message(5, 1, 1)]).unwrap();
        let mut data = packet.to_vec();
        data.extend_from_slice(&[0xAA, 0xBB]);

        let (_, slices) = decode_packet(&data).unwrap();
        assert_eq!(slices.len(), 1);
    }

    #[test]
    fn test_stream_decoder_resyncs_and_splits() {
        let first = encode_packet(&[message(1, 1, 1)]).unwrap();
        let second = encode_packet(&[message(2, 2, 2), message(3, 3, 3)]).unwrap();

        let mut decoder = PacketDecoder::new();
        let mut buf = BytesMut::new();

        // Line noise, then the first packet split mid-magic
        buf.put_slice(&[0x00, 0x13, 0x37]);
        buf.put_slice(&first[..2]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], &first[..2]);

        buf.put_slice(&first[2..]);
        buf.put_slice(&second);

        let packet = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, first);
        let packet = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, second);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        let (_, slices) = decode_packet(&packet).unwrap();
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_stream_decoder_waits_for_body() {
        let packet = encode_packet(&[message(9, 4, 4)]).unwrap();
        let mut decoder = PacketDecoder::new();
        let mut buf = BytesMut::from(&packet[..10]);

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        buf.put_slice(&packet[10..]);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), packet);
    }

    #[test]
    fn test_stream_decoder_rejects_short_declared_length() {
        let packet = encode_packet(&[message(7, 1, 1)]).unwrap();
        let mut buf = BytesMut::new();
        PacketHeader {
            length_words: 1,
            crc: 0,
        }
        .encode(&mut buf);
        buf.put_slice(&packet);

        let mut decoder = PacketDecoder::new();
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(CodecError::MalformedHeader(_))
        ));
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), packet);
    }

    #[test]
    fn test_stream_decoder_skips_false_header_with_huge_length() {
        let packets: Vec<Bytes> = (0..5)
            .map(|i| encode_packet(&[message(i, 1, i as u8)]).unwrap())
            .collect();

        let mut buf = BytesMut::new();
        buf.put_slice(b"Blue\xff\xff\x00\x00");
        for packet in &packets {
            buf.put_slice(packet);
        }
        assert_eq!(buf.len(), 88);

        let mut decoder = PacketDecoder::new();
        for packet in &packets {
            assert_eq!(&decoder.decode(&mut buf).unwrap().unwrap(), packet);
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stream_decoder_rescans_after_crc_mismatch() {
        let first = encode_packet(&[message(1, 1, 1)]).unwrap();
        let second = encode_packet(&[message(2, 2, 2)]).unwrap();

        // A false header whose declared body is exactly the first packet
        let mut buf = BytesMut::new();
        PacketHeader {
            length_words: ((PACKET_HEADER_SIZE + first.len()) / 4) as u16,
            crc: !crc16_ccitt(&first),
        }
        .encode(&mut buf);
        buf.put_slice(&first);
        buf.put_slice(&second);

        let mut decoder = PacketDecoder::new();
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), second);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_stream_decoder_waits_behind_unverified_header() {
        // Nothing valid follows, so the decoder keeps waiting for the body
        let mut buf = BytesMut::new();
        buf.put_slice(b"Blue\x10\x00\x00\x00");
        buf.put_slice(&[0xAA; 12]);

        let mut decoder = PacketDecoder::new();
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
    }
}
