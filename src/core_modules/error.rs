use std::path::PathBuf;

use thiserror::Error;

/// Errors that can surface while running the enrichment pipeline.
///
/// The taxonomy separates configuration problems (caught before any frame is
/// touched), geometry violations (a background window that should have been
/// excluded upstream), numeric conditions that must never degrade into a
/// silent NaN, and I/O failures while writing artifacts.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("background box side must be a positive even number, got {dim}")]
    OddBackgroundBox { dim: u32 },

    #[error(
        "background window around ({x:.1}, {y:.1}) in frame {frame} leaves the image bounds"
    )]
    BoxOutOfBounds { frame: usize, x: f64, y: f64 },

    #[error("pixel ({x}, {y}) of track {track} in frame {frame} is outside the image")]
    PixelOutOfBounds {
        frame: usize,
        track: usize,
        x: u32,
        y: u32,
    },

    #[error("channel '{channel}' has no frame {frame}")]
    MissingFrame { channel: String, frame: usize },

    #[error(
        "channel '{channel}' frame {frame} is {got_w}x{got_h}, expected {want_w}x{want_h}"
    )]
    DimensionMismatch {
        channel: String,
        frame: usize,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },

    #[error("no background pixels in the window around track {track} in frame {frame}")]
    EmptyBackground { frame: usize, track: usize },

    #[error("region of track {track} in frame {frame} contains no pixels")]
    EmptyRegion { frame: usize, track: usize },

    #[error(
        "non-finite enrichment ratio for track {track} in frame {frame} (normalized actin is zero)"
    )]
    NonFiniteRatio { frame: usize, track: usize },

    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
