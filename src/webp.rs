//! Pixel dimensions from the header of a WebP file.
//!
//! Only the simple lossy (`VP8 `) and lossless (`VP8L`) layouts are read;
//! anything else yields `None`.

use std::path::Path;

const VP8_TAG: &[u8] = b"VP8 ";
const VP8L_TAG: &[u8] = b"VP8L";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

pub fn dimensions(bytes: &[u8]) -> Option<Dimensions> {
    if let Some(start) = find(bytes, VP8_TAG) {
        // chunk header (8) + frame tag (3) + start code (3)
        let width = read_u16_le(bytes, start + 14)? & 0x3fff;
        let height = read_u16_le(bytes, start + 16)? & 0x3fff;
        return Some(Dimensions {
            width: u32::from(width),
            height: u32::from(height),
        });
    }

    if let Some(start) = find(bytes, VP8L_TAG) {
        // chunk header (8) + signature byte (1)
        let bits = read_u32_le(bytes, start + 9)?;
        return Some(Dimensions {
            width: (bits & 0x3fff) + 1,
            height: ((bits >> 14) & 0x3fff) + 1,
        });
    }

    None
}

pub fn file_dimensions(path: &Path) -> Option<Dimensions> {
    match std::fs::read(path) {
        Ok(bytes) => dimensions(&bytes),
        Err(err) => {
            tracing::debug!(path = %path.display(), ?err, "cannot read webp header");
            None
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_u16_le(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at.checked_add(2)?)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
