//! Narrow error taxonomy for the synth core's I/O-adjacent boundaries.
//!
//! The render path itself never returns a `Result` — it always produces frames.
//! Errors only arise at the edges: patch persistence and invalid slot addressing.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch slot {0} is out of range (0..16)")]
    InvalidSlot(u8),

    #[error("no parameters loaded from patch")]
    NoParametersLoaded,

    #[error("patch I/O error: {0}")]
    Io(#[from] io::Error),
}
