//! CRC32 (IEEE 802.3, reflected polynomial 0xEDB88320)
//!
//! Bitwise, no lookup table: the bootloader has 3KB of flash to live in.

const POLYNOMIAL: u32 = 0xEDB8_8320;
const SEED: u32 = 0xFFFF_FFFF;

/// Starting state for a streaming calculation.
pub const fn init() -> u32 {
    SEED
}

/// Fold `data` into a running CRC state.
pub fn update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Final XOR, turns a running state into the CRC value.
pub const fn finish(crc: u32) -> u32 {
    crc ^ 0xFFFF_FFFF
}

pub fn crc32(data: &[u8]) -> u32 {
    finish(update(init(), data))
}
