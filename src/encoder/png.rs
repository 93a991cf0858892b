//! PNG with explicit control over filters and compression.

use super::{check_len, EncodeError, Encoder, Result};
use crate::{
    config::{CompressionStrategy, EncoderSettings, PngFilters},
    job::{CapturedImage, PixelData},
};
use image::{
    codecs::png::{self, CompressionType, FilterType},
    ExtendedColorType, ImageEncoder,
};
use std::{
    fs::File,
    io::{BufWriter, Write},
};

/// The tunable PNG encoder.
#[derive(Debug, Clone, Copy)]
pub struct PngEncoder {
    compression: CompressionType,
    filter: FilterType,
    buffer_size: usize,
}

impl PngEncoder {
    /// Creates an encoder from the set's compression level, strategy, filters and buffer size.
    pub fn new(settings: &EncoderSettings) -> Self {
        Self {
            compression: compression(settings.compression_level, settings.compression_strategy),
            filter: filter(settings.png_filters),
            buffer_size: settings.file_write_buffer_size.max(1),
        }
    }
}

impl Encoder for PngEncoder {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, image: &CapturedImage, file: &mut File) -> Result<()> {
        let (data, color) = color_bytes(image, "png")?;
        check_len(image.expected_len(), data.len())?;

        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        png::PngEncoder::new_with_quality(&mut writer, self.compression, self.filter)
            .write_image(data, image.width, image.height, color)?;
        writer.flush()?;
        Ok(())
    }
}

/// The 8-bit bytes of `image` and their color type.
pub(super) fn color_bytes<'a>(
    image: &'a CapturedImage,
    encoder: &'static str,
) -> Result<(&'a [u8], ExtendedColorType)> {
    match &image.pixels {
        PixelData::Rgb8(data) => Ok((data, ExtendedColorType::Rgb8)),
        PixelData::Rgba8(data) => Ok((data, ExtendedColorType::Rgba8)),
        PixelData::R32Float(_) => Err(EncodeError::UnsupportedPixels {
            encoder,
            channels: 1,
        }),
    }
}

fn compression(level: u8, strategy: CompressionStrategy) -> CompressionType {
    // Run length and Huffman-only streams trade ratio for speed regardless of level.
    if matches!(
        strategy,
        CompressionStrategy::HuffmanOnly | CompressionStrategy::Rle
    ) && level < 7
    {
        return CompressionType::Fast;
    }
    match level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn filter(filters: PngFilters) -> FilterType {
    const SINGLE: [(PngFilters, FilterType); 5] = [
        (PngFilters::NONE, FilterType::NoFilter),
        (PngFilters::SUB, FilterType::Sub),
        (PngFilters::UP, FilterType::Up),
        (PngFilters::AVG, FilterType::Avg),
        (PngFilters::PAETH, FilterType::Paeth),
    ];

    match filters.len() {
        0 => FilterType::NoFilter,
        1 => SINGLE
            .iter()
            .find(|(flag, _)| filters.contains(*flag))
            .map(|(_, filter)| *filter)
            .unwrap_or(FilterType::NoFilter),
        _ => FilterType::Adaptive,
    }
}
