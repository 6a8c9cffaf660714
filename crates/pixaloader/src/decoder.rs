//! Bitmap decoding and encoding seams
//!
//! Real applications plug in a platform decoder; the built-in implementation
//! speaks only the `PIXA` raw bitmap format used by tests and demos:
//!
//! ```text
//! "PIXA"            4-byte magic
//! width: u32 LE
//! height: u32 LE
//! pixels            width * height * 4 bytes of RGBA
//! ```

use std::io::{self, Read, Write};

use pixacache::Bitmap;

use crate::downloader::Downloader;
use crate::types::{ImageScaleType, ImageSize};

/// Magic prefix of the raw bitmap format
pub const RAW_MAGIC: &[u8; 4] = b"PIXA";

/// Everything a decoder needs to produce a bitmap
pub struct DecodeRequest<'a> {
    /// URI to pull bytes from — either the original or a `file://` URI of
    /// the cached copy
    pub uri: &'a str,
    /// The original image URI of the request
    pub source_uri: &'a str,
    /// Desired output size
    pub target_size: ImageSize,
    /// How to approach the target size
    pub scale_type: ImageScaleType,
    /// Stream source
    pub downloader: &'a dyn Downloader,
    /// Opaque downloader payload from the request options
    pub extra: Option<&'a [u8]>,
}

/// Decodes a byte stream into a bitmap
pub trait ImageDecoder: Send + Sync {
    /// Decode the request's URI into a bitmap
    fn decode(&self, request: &DecodeRequest<'_>) -> io::Result<Bitmap>;
}

/// Serializes bitmaps for the disk cache
pub trait BitmapEncoder: Send + Sync {
    /// Write `bitmap` to `out` in the given format
    fn compress(
        &self,
        bitmap: &Bitmap,
        format: CompressFormat,
        quality: u8,
        out: &mut dyn Write,
    ) -> io::Result<()>;
}

/// On-disk bitmap serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressFormat {
    /// The uncompressed `PIXA` raw format
    #[default]
    Raw,
    /// PNG (requires a platform encoder)
    Png,
    /// JPEG (requires a platform encoder)
    Jpeg,
}

/// Decoder for the `PIXA` raw bitmap format
pub struct RawBitmapDecoder;

impl ImageDecoder for RawBitmapDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> io::Result<Bitmap> {
        let stream = request.downloader.stream(request.uri, request.extra)?;
        let mut reader = stream.reader;

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != RAW_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a raw bitmap stream",
            ));
        }

        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        let width = u32::from_le_bytes(word);
        reader.read_exact(&mut word)?;
        let height = u32::from_le_bytes(word);

        let expected = width as usize * height as usize * Bitmap::BYTES_PER_PIXEL;
        let mut pixels = vec![0u8; expected];
        reader.read_exact(&mut pixels)?;

        let bitmap = Bitmap::new(width, height, pixels);
        Ok(scale_down(bitmap, request.target_size, request.scale_type))
    }
}

/// Subsample a decoded bitmap towards the target size.
///
/// Power-of-two subsampling mirrors what platform decoders do natively; the
/// exact mode picks nearest source pixels.
fn scale_down(bitmap: Bitmap, target: ImageSize, scale_type: ImageScaleType) -> Bitmap {
    if target.width == 0 || target.height == 0 || bitmap.is_empty() {
        return bitmap;
    }
    match scale_type {
        ImageScaleType::None => bitmap,
        ImageScaleType::PowerOfTwo => {
            let mut sample = 1u32;
            while bitmap.width() / (sample * 2) >= target.width
                && bitmap.height() / (sample * 2) >= target.height
            {
                sample *= 2;
            }
            if sample == 1 {
                bitmap
            } else {
                resample(&bitmap, bitmap.width() / sample, bitmap.height() / sample)
            }
        }
        ImageScaleType::Exact => {
            if bitmap.width() <= target.width && bitmap.height() <= target.height {
                bitmap
            } else {
                resample(&bitmap, target.width, target.height)
            }
        }
    }
}

fn resample(bitmap: &Bitmap, width: u32, height: u32) -> Bitmap {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        let src_y = (y as u64 * bitmap.height() as u64 / height as u64) as usize;
        for x in 0..width {
            let src_x = (x as u64 * bitmap.width() as u64 / width as u64) as usize;
            let at = (src_y * bitmap.width() as usize + src_x) * 4;
            pixels.extend_from_slice(&bitmap.pixels()[at..at + 4]);
        }
    }
    Bitmap::new(width, height, pixels)
}

/// Encoder for the `PIXA` raw bitmap format.
///
/// `Png` and `Jpeg` need a platform encoder and are rejected here; `quality`
/// is meaningless for the raw format and ignored.
pub struct RawBitmapEncoder;

impl BitmapEncoder for RawBitmapEncoder {
    fn compress(
        &self,
        bitmap: &Bitmap,
        format: CompressFormat,
        _quality: u8,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        if format != CompressFormat::Raw {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "only the raw format is built in",
            ));
        }
        out.write_all(RAW_MAGIC)?;
        out.write_all(&bitmap.width().to_le_bytes())?;
        out.write_all(&bitmap.height().to_le_bytes())?;
        out.write_all(bitmap.pixels())
    }
}

/// Serialize a bitmap to raw-format bytes; test and demo helper
pub fn encode_raw(bitmap: &Bitmap) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12 + bitmap.byte_size());
    bytes.extend_from_slice(RAW_MAGIC);
    bytes.extend_from_slice(&bitmap.width().to_le_bytes());
    bytes.extend_from_slice(&bitmap.height().to_le_bytes());
    bytes.extend_from_slice(bitmap.pixels());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::FileDownloader;
    use std::fs;
    use tempfile::TempDir;

    fn decode_file(path: &std::path::Path, target: ImageSize, scale: ImageScaleType) -> io::Result<Bitmap> {
        let uri = format!("file://{}", path.display());
        RawBitmapDecoder.decode(&DecodeRequest {
            uri: &uri,
            source_uri: &uri,
            target_size: target,
            scale_type: scale,
            downloader: &FileDownloader,
            extra: None,
        })
    }

    #[test]
    fn test_decode_raw_stream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.pixa");
        let source = Bitmap::solid(4, 2, [9, 8, 7, 6]);
        fs::write(&path, encode_raw(&source)).unwrap();

        let decoded = decode_file(&path, ImageSize::new(4, 2), ImageScaleType::None).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.bin");
        fs::write(&path, b"JUNKxxxxxxxxxxxx").unwrap();

        assert!(decode_file(&path, ImageSize::new(4, 2), ImageScaleType::None).is_err());
    }

    #[test]
    fn test_power_of_two_subsampling() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.pixa");
        fs::write(&path, encode_raw(&Bitmap::solid(64, 64, [1, 1, 1, 1]))).unwrap();

        let decoded = decode_file(&path, ImageSize::new(16, 16), ImageScaleType::PowerOfTwo).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);
        assert_eq!(&decoded.pixels()[..4], &[1, 1, 1, 1]);
    }

    #[test]
    fn test_small_images_are_not_upscaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("img.pixa");
        fs::write(&path, encode_raw(&Bitmap::solid(8, 8, [2; 4]))).unwrap();

        let decoded = decode_file(&path, ImageSize::new(64, 64), ImageScaleType::Exact).unwrap();
        assert_eq!(decoded.width(), 8);
    }

    #[test]
    fn test_encoder_roundtrip() {
        let source = Bitmap::solid(3, 3, [4, 3, 2, 1]);
        let mut bytes = Vec::new();
        RawBitmapEncoder
            .compress(&source, CompressFormat::Raw, 100, &mut bytes)
            .unwrap();
        assert_eq!(bytes, encode_raw(&source));
    }

    #[test]
    fn test_encoder_rejects_unsupported_formats() {
        let source = Bitmap::solid(1, 1, [0; 4]);
        let mut bytes = Vec::new();
        assert!(RawBitmapEncoder
            .compress(&source, CompressFormat::Png, 100, &mut bytes)
            .is_err());
    }
}
