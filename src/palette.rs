//! Fixed categorical palette shared by the overlay and every chart.
//!
//! A cluster must render in the same color everywhere within one report, so
//! all color lookups go through this module. The palette carries ten distinct
//! hues; a label at or beyond the capacity is an error, never a silent wrap.
//! Models with more clusters than the palette are rejected at load time.

use crate::error::{PatchsegError, Result};

/// Number of distinct hues available. Cluster models are capped at this K.
pub const PALETTE_SIZE: usize = 10;

const HUES: [[u8; 3]; PALETTE_SIZE] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

/// RGB triple for a label id.
pub fn color(label: usize) -> Result<[u8; 3]> {
    HUES.get(label).copied().ok_or(PatchsegError::Palette {
        label,
        capacity: PALETTE_SIZE,
    })
}

/// Hex string (`#rrggbb`) for a label id, as persisted in the stats records.
pub fn hex(label: usize) -> Result<String> {
    let [r, g, b] = color(label)?;
    Ok(format!("#{r:02x}{g:02x}{b:02x}"))
}
