//! TIFF for 8-bit color and 32-bit float depth.

use super::{check_len, EncodeError, Encoder, Result};
use crate::{
    config::TiffCompression,
    job::{CapturedImage, PixelData},
};
use ::tiff::{
    encoder::{
        colortype::{self, ColorType},
        compression::{Compression, Lzw, Uncompressed},
        TiffEncoder as Writer, TiffValue,
    },
    tags::Tag,
};
use chrono::{DateTime, Utc};
use std::{
    fs::File,
    io::{BufWriter, Write},
    time::SystemTime,
};

const SOFTWARE: &str = concat!("multishot ", env!("CARGO_PKG_VERSION"));

/// Writes RGB8, RGBA8 or single channel float images as one TIFF page.
#[derive(Debug, Clone)]
pub struct TiffEncoder {
    compression: TiffCompression,
    buffer_size: usize,
    date_time: String,
}

impl TiffEncoder {
    /// Creates an encoder stamping `frame_time` into the `DateTime` tag.
    pub fn new(compression: TiffCompression, buffer_size: usize, frame_time: SystemTime) -> Self {
        Self {
            compression,
            buffer_size: buffer_size.max(1),
            date_time: DateTime::<Utc>::from(frame_time)
                .format("%Y:%m:%d %H:%M:%S")
                .to_string(),
        }
    }

    fn write<C: ColorType, D: Compression>(
        &self,
        file: &mut File,
        image: &CapturedImage,
        data: &[C::Inner],
        compression: D,
    ) -> Result<()>
    where
        [C::Inner]: TiffValue,
    {
        check_len(image.expected_len(), data.len())?;

        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut tiff = Writer::new(&mut writer)?;
        let mut page =
            tiff.new_image_with_compression::<C, D>(image.width, image.height, compression)?;
        page.encoder().write_tag(Tag::Software, SOFTWARE)?;
        page.encoder().write_tag(Tag::DateTime, self.date_time.as_str())?;
        page.write_data(data)?;
        drop(tiff);

        writer.flush()?;
        Ok(())
    }

    fn write_compressed<C: ColorType>(
        &self,
        file: &mut File,
        image: &CapturedImage,
        data: &[C::Inner],
        compression: TiffCompression,
    ) -> Result<()>
    where
        [C::Inner]: TiffValue,
    {
        match compression {
            TiffCompression::Lzw => self.write::<C, _>(file, image, data, Lzw),
            TiffCompression::Uncompressed => self.write::<C, _>(file, image, data, Uncompressed),
        }
    }
}

impl Encoder for TiffEncoder {
    fn extension(&self) -> &'static str {
        "tiff"
    }

    fn encode(&self, image: &CapturedImage, file: &mut File) -> Result<()> {
        match &image.pixels {
            PixelData::Rgb8(data) => {
                self.write_compressed::<colortype::RGB8>(file, image, data, self.compression)
            }
            PixelData::Rgba8(data) => {
                self.write_compressed::<colortype::RGBA8>(file, image, data, self.compression)
            }
            // Depth keeps its full precision and is always compressed.
            PixelData::R32Float(data) => self.write_compressed::<colortype::Gray32Float>(
                file,
                image,
                data,
                TiffCompression::Lzw,
            ),
        }
        .map_err(|err| match err {
            EncodeError::Tiff(::tiff::TiffError::IoError(err)) => EncodeError::Io(err),
            err => err,
        })
    }
}
