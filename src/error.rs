//! Error types shared across the crate.

use crate::{encoder::EncodeError, host::TextureFormat, CaptureKind};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Coarse classification of a failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    /// Disk space floor not met; nothing was created.
    Admission,
    /// The destination could not be prepared or opened; nothing was created.
    Open,
    /// Writing started and failed; the partial file was removed.
    Write,
}

/// Why writing one kind of a frame job failed.
#[derive(Error, Debug)]
pub enum SaveError {
    /// The expanded path does not name a file.
    #[error("skipped saving '{kind}' image because the path has no file name: \"{}\"", .path.display())]
    MissingFileName {
        /// Kind being saved.
        kind: CaptureKind,
        /// Resolved path.
        path: PathBuf,
    },

    /// The destination directory could not be created.
    #[error("failed to create '{kind}' image directory \"{}\"", .path.display())]
    CreateDir {
        /// Kind being saved.
        kind: CaptureKind,
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The destination volume is below its configured free space floor.
    #[error(
        "blocked '{kind}' image due to disk space limitation: {} ({:.1}%) used of {}, {} ({:.1}%) free (limit {limit}{})",
        used(.free, .total),
        used_percent(.free, .total),
        size(.total),
        size(.free),
        free_percent(.free, .total),
        limit_unit(.limit)
    )]
    Admission {
        /// Kind being saved.
        kind: CaptureKind,
        /// Directory whose volume was checked.
        path: PathBuf,
        /// Free bytes on the volume.
        free: u64,
        /// Total bytes on the volume.
        total: u64,
        /// Configured floor.
        limit: u64,
    },

    /// The destination file could not be created.
    #[error("failed to open '{kind}' image \"{}\"", .path.display())]
    Open {
        /// Kind being saved.
        kind: CaptureKind,
        /// Destination file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Encoding or writing failed after the file was created.
    #[error("failed to write '{kind}' image \"{}\"", .path.display())]
    Write {
        /// Kind being saved.
        kind: CaptureKind,
        /// Destination file, already removed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: EncodeError,
    },

    /// The file was written but its modification time could not be set.
    #[error("failed to set the capture time of '{kind}' image \"{}\"", .path.display())]
    Timestamp {
        /// Kind being saved.
        kind: CaptureKind,
        /// Destination file, already removed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl SaveError {
    /// Maps the error onto the admission/open/write taxonomy.
    pub fn category(&self) -> FailureCategory {
        match self {
            SaveError::Admission { .. } => FailureCategory::Admission,
            SaveError::MissingFileName { .. }
            | SaveError::CreateDir { .. }
            | SaveError::Open { .. } => FailureCategory::Open,
            SaveError::Write { .. } | SaveError::Timestamp { .. } => FailureCategory::Write,
        }
    }

    /// The OS error code behind this failure, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            SaveError::CreateDir { source, .. }
            | SaveError::Open { source, .. }
            | SaveError::Timestamp { source, .. } => source.raw_os_error(),
            SaveError::Write {
                source: EncodeError::Io(source),
                ..
            } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Why a kind could not be captured on the render thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The host did not hand out the composited frame.
    #[error("the host failed to capture the screenshot")]
    Screenshot,
    /// The auxiliary depth technique is not loaded.
    #[error("depth technique \"{0}\" is not loaded")]
    TechniqueMissing(&'static str),
    /// The depth texture is not loaded or has no backing resource.
    #[error("depth texture \"{0}\" is not available")]
    TextureMissing(&'static str),
    /// The depth texture has a format the readback does not understand.
    #[error("screenshots are not supported for format {0:?}")]
    UnsupportedFormat(TextureFormat),
    /// No CPU readable staging texture could be created.
    #[error("failed to create system memory texture for screenshot capture")]
    StagingResource,
    /// The staging texture could not be mapped.
    #[error("failed to map system memory texture for screenshot capture")]
    Map,
}

/// Failure to read or write a persisted document.
#[derive(Error, Debug)]
pub enum PersistError {
    /// The file could not be read or written.
    #[error("failed to access \"{}\"", .path.display())]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is not a valid document.
    #[error("malformed document \"{}\"", .path.display())]
    Json {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

fn size(bytes: &u64) -> String {
    crate::format_size(*bytes)
}

fn used(free: &u64, total: &u64) -> String {
    crate::format_size(total.saturating_sub(*free))
}

fn free_percent(free: &u64, total: &u64) -> f64 {
    if *total == 0 {
        return 0.0;
    }
    *free as f64 * 100.0 / *total as f64
}

fn used_percent(free: &u64, total: &u64) -> f64 {
    100.0 - free_percent(free, total)
}

fn limit_unit(limit: &u64) -> &'static str {
    if *limit >= 100 {
        " MB"
    } else {
        "%"
    }
}
