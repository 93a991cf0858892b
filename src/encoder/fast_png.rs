//! PNG with a fixed, speed oriented configuration.

use super::{check_len, png::color_bytes, Encoder, Result};
use crate::job::CapturedImage;
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    ImageEncoder,
};
use std::{fs::File, io::Write};

/// Encodes the whole image in memory and writes it with a single call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastPngEncoder;

impl Encoder for FastPngEncoder {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn encode(&self, image: &CapturedImage, file: &mut File) -> Result<()> {
        let (data, color) = color_bytes(image, "fast png")?;
        check_len(image.expected_len(), data.len())?;

        let mut out = Vec::with_capacity(data.len() / 2);
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Sub)
            .write_image(data, image.width, image.height, color)?;
        file.write_all(&out)?;
        Ok(())
    }
}
