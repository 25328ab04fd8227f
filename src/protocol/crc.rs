//! CRC-16/CCITT-FALSE
//!
//! Polynomial 0x1021, initial value 0xFFFF, no reflection, no final XOR.

const POLY: u16 = 0x1021;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Checksum carried in the packet header, computed over the packet body
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| {
        (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ byte) as usize]
    })
}
