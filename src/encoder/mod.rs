//! Image encoders and the pipeline that writes a frame job to disk.

pub mod fast_png;
pub mod frames;
pub mod png;
pub mod tiff;

use crate::{
    config::{EncoderSettings, ImageFormat, TiffCompression},
    job::CapturedImage,
    CaptureKind,
};
use std::{fs::File, io, time::SystemTime};
use thiserror::Error;

/// An error that occurred during encoding.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Writing to the file failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The PNG back end failed.
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// The TIFF back end failed.
    #[error(transparent)]
    Tiff(#[from] ::tiff::TiffError),
    /// The pixel buffer does not match the image dimensions.
    #[error("pixel buffer holds {actual} elements, {expected} expected")]
    BufferSize {
        /// Elements the dimensions call for.
        expected: usize,
        /// Elements in the buffer.
        actual: usize,
    },
    /// The back end cannot write this pixel layout.
    #[error("{encoder} cannot write {channels} channel images of this type")]
    UnsupportedPixels {
        /// Name of the back end.
        encoder: &'static str,
        /// Channels of the rejected image.
        channels: usize,
    },
}

/// The result type for encoding operations.
pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// An encoder that writes one captured image into a file.
pub trait Encoder: Send {
    /// File extension of the output, without the dot.
    fn extension(&self) -> &'static str;

    /// Encodes `image` into `file`, which was just created and is empty.
    fn encode(&self, image: &CapturedImage, file: &mut File) -> Result<()>;
}

/// Returns the encoder `kind` is written with.
///
/// Depth is always a single channel float TIFF, every other kind follows `settings`.
pub fn for_kind(
    kind: CaptureKind,
    settings: &EncoderSettings,
    frame_time: SystemTime,
) -> Box<dyn Encoder> {
    if kind == CaptureKind::Depth {
        return Box::new(tiff::TiffEncoder::new(
            TiffCompression::Lzw,
            settings.file_write_buffer_size,
            frame_time,
        ));
    }

    match settings.image_format {
        ImageFormat::PngRgb | ImageFormat::PngRgba => Box::new(png::PngEncoder::new(settings)),
        ImageFormat::FastPngRgb | ImageFormat::FastPngRgba => Box::new(fast_png::FastPngEncoder),
        ImageFormat::TiffRgb | ImageFormat::TiffRgba => Box::new(tiff::TiffEncoder::new(
            settings.tiff_compression,
            settings.file_write_buffer_size,
            frame_time,
        )),
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(EncodeError::BufferSize { expected, actual })
    }
}
