/*
    Copyright (C) 2022  Rafal Michalski

    This file is part of AMSTRUSTY, a Rust library for building emulators.

    For the full copyright notice, see the lib.rs file.
*/
//! The TZX/CDT tape image container.
//!
//! Only the layout lives here: the signature, the per-block length table and
//! little-endian field readers. The pulse playback state machine is in
//! [crate::peripherals::tape].

/// The tape image signature: `"ZXTape!"` followed by 0x1A.
pub const SIGNATURE: [u8; 8] = *b"ZXTape!\x1a";

/// The offset of the first block: signature plus major and minor version bytes.
pub const FIRST_BLOCK_OFFSET: usize = 10;

/// Returns `true` if `image` starts with a valid tape image header.
pub fn check_header(image: &[u8]) -> bool {
    image.len() >= FIRST_BLOCK_OFFSET && image[..SIGNATURE.len()] == SIGNATURE
}

/// Converts a pulse length from the image's 3.5 MHz clock base to the
/// machine's 4 MHz clock.
#[inline]
pub const fn adjust_ticks(raw: u32) -> u64 {
    8 * raw as u64 / 7
}

#[inline]
pub(crate) fn block_u8(image: &[u8], index: usize) -> u8 {
    image.get(index).copied().unwrap_or(0)
}

#[inline]
pub(crate) fn block_u16(image: &[u8], index: usize) -> u16 {
    u16::from_le_bytes([block_u8(image, index), block_u8(image, index + 1)])
}

#[inline]
pub(crate) fn block_u24(image: &[u8], index: usize) -> u32 {
    u32::from_le_bytes([
        block_u8(image, index),
        block_u8(image, index + 1),
        block_u8(image, index + 2),
        0
    ])
}

/// Returns the total size in bytes of the block starting at `index`,
/// including its id byte, or `None` for an id the player cannot skip over.
pub fn block_size(image: &[u8], index: usize) -> Option<usize> {
    let block = image.get(index..).unwrap_or(&[]);
    let size = match block_u8(block, 0) {
        0x10 => 0x05 + usize::from(block_u16(block, 3)),
        0x11 => 0x13 + block_u24(block, 16) as usize,
        0x12 => 0x05,
        0x13 => 0x02 + usize::from(block_u8(block, 1)) * 2,
        0x14 => 0x0B + block_u24(block, 8) as usize,
        0x15 => 0x09 + block_u24(block, 8) as usize,
        0x20 => 0x03,
        0x21 => 0x02 + usize::from(block_u8(block, 1)),
        0x22 => 0x01,
        0x31 => 0x03 + usize::from(block_u8(block, 2)),
        0x32 => 0x03 + usize::from(block_u16(block, 1)),
        0x33 => 0x02 + usize::from(block_u8(block, 1)) * 3,
        _ => return None
    };
    Some(size)
}
