#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod pool;
mod readback;

pub mod config;
pub mod encoder;
pub mod error;
pub mod host;
pub mod job;
pub mod registry;
pub mod session;
pub mod statistics;
pub mod template;

use serde::{Deserialize, Serialize};
use std::fmt;

#[doc(inline)]
pub use config::{CaptureConfig, CaptureSet};
#[doc(inline)]
pub use error::{CaptureError, SaveError};
#[doc(inline)]
pub use host::Host;
#[doc(inline)]
pub use job::FrameJob;
#[doc(inline)]
pub use registry::Sessions;
#[doc(inline)]
pub use session::{CaptureSession, SessionStatus};
#[doc(inline)]
pub use statistics::{Statistics, StatisticsStore};

/// One variant of a rendered frame that a capture set can write to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// The frame as presented, straight from the swap chain.
    Original,
    /// The frame right before the effect chain runs.
    Before,
    /// The frame right after the effect chain finished.
    After,
    /// The frame after the host's own UI overlay was composited.
    Overlay,
    /// Single channel floating point depth, read back from an auxiliary technique.
    Depth,
    /// An export of the current preset, written once per activation.
    Preset,
}

impl CaptureKind {
    /// Every kind, in the order they are captured within a frame.
    pub const ALL: [CaptureKind; 6] = [
        CaptureKind::Before,
        CaptureKind::After,
        CaptureKind::Depth,
        CaptureKind::Overlay,
        CaptureKind::Original,
        CaptureKind::Preset,
    ];

    /// Returns the lower case display name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            CaptureKind::Original => "original",
            CaptureKind::Before => "before",
            CaptureKind::After => "after",
            CaptureKind::Overlay => "overlay",
            CaptureKind::Depth => "depth",
            CaptureKind::Preset => "preset",
        }
    }

    /// Returns `true` for the kinds that produce an image file.
    pub fn is_image(self) -> bool {
        !matches!(self, CaptureKind::Preset)
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders a byte count the way the status and log messages show it.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
    ];

    for (unit, scale) in UNITS {
        if bytes >= scale {
            return format!("{:.3} {}", bytes as f64 / scale as f64, unit);
        }
    }
    format!("{} byte", bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512 byte");
        assert_eq!(format_size(1536), "1.500 KB");
        assert_eq!(format_size(3 << 30), "3.000 GB");
    }

    #[test]
    fn preset_is_not_an_image() {
        assert!(CaptureKind::Depth.is_image());
        assert!(!CaptureKind::Preset.is_image());
        assert_eq!(CaptureKind::Overlay.to_string(), "overlay");
    }
}
