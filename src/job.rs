//! Captured frames waiting to be written.

use crate::{config::CaptureSet, host::Environment, statistics::Statistics, CaptureKind};
use std::{collections::BTreeMap, time::SystemTime};

/// Pixel storage of a captured image, tagged by layout.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// Interleaved 8-bit RGBA.
    Rgba8(Vec<u8>),
    /// Interleaved 8-bit RGB.
    Rgb8(Vec<u8>),
    /// Single channel 32-bit float.
    R32Float(Vec<f32>),
}

impl PixelData {
    /// Number of channels per pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelData::Rgba8(_) => 4,
            PixelData::Rgb8(_) => 3,
            PixelData::R32Float(_) => 1,
        }
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            PixelData::Rgba8(data) | PixelData::Rgb8(data) => data.len(),
            PixelData::R32Float(data) => data.len() * std::mem::size_of::<f32>(),
        }
    }

    /// Drops the alpha byte of every RGBA pixel, reusing the buffer.
    /// Other layouts are returned unchanged.
    pub fn into_rgb8(self) -> Self {
        match self {
            PixelData::Rgba8(mut data) => {
                let pixels = data.len() / 4;
                for i in 0..pixels {
                    data.copy_within(i * 4..i * 4 + 3, i * 3);
                }
                data.truncate(pixels * 3);
                PixelData::Rgb8(data)
            }
            other => other,
        }
    }
}

/// One captured variant of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixels, row major without padding.
    pub pixels: PixelData,
}

impl CapturedImage {
    /// Number of pixel elements the dimensions call for.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixels.channels()
    }
}

/// Everything captured for one capture frame, plus what is needed to write it.
///
/// A job owns copies of the set and statistics taken at capture time, so edits made
/// on the render thread after it was queued never reach a worker.
#[derive(Debug, Clone)]
pub struct FrameJob {
    /// Set the frame was captured for.
    pub set: CaptureSet,
    /// Statistics as they were when the frame was captured.
    pub statistics: Statistics,
    /// Host facts used to name the files.
    pub environment: Environment,
    /// 0-based capture index within the activation.
    pub repeat_index: u32,
    /// When the frame was captured, also used as the files' modification time.
    pub frame_time: SystemTime,
    /// Screenshot width of the frame.
    pub width: u32,
    /// Screenshot height of the frame.
    pub height: u32,
    /// Captured images by kind.
    pub images: BTreeMap<CaptureKind, CapturedImage>,
}

impl FrameJob {
    /// Creates an empty job.
    pub fn new(
        set: CaptureSet,
        statistics: Statistics,
        environment: Environment,
        repeat_index: u32,
        (width, height): (u32, u32),
    ) -> Self {
        Self {
            set,
            statistics,
            environment,
            repeat_index,
            frame_time: SystemTime::now(),
            width,
            height,
            images: BTreeMap::new(),
        }
    }

    /// Memory held by the job's pixel buffers.
    pub fn byte_len(&self) -> usize {
        self.images
            .values()
            .map(|image| image.pixels.byte_len())
            .sum()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_is_dropped_in_place() {
        let rgba = PixelData::Rgba8(vec![1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 0]);
        assert_eq!(
            rgba.into_rgb8(),
            PixelData::Rgb8(vec![1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
    }

    #[test]
    fn float_pixels_are_left_alone() {
        let depth = PixelData::R32Float(vec![0.5; 4]);
        assert_eq!(depth.byte_len(), 16);
        assert_eq!(depth.clone().into_rgb8(), depth);
    }

    #[test]
    fn job_size_sums_buffers() {
        let mut job = FrameJob::new(
            CaptureSet::default(),
            Statistics::default(),
            Environment::default(),
            0,
            (2, 1),
        );
        assert!(job.is_empty());
        job.images.insert(
            CaptureKind::After,
            CapturedImage {
                width: 2,
                height: 1,
                pixels: PixelData::Rgba8(vec![0; 8]),
            },
        );
        job.images.insert(
            CaptureKind::Depth,
            CapturedImage {
                width: 2,
                height: 1,
                pixels: PixelData::R32Float(vec![0.0; 2]),
            },
        );
        assert_eq!(job.byte_len(), 16);
    }
}
