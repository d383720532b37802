use std::path::Path;

use crate::error::DecodeError;
use crate::PixelBuffer;

/// Opaque, possibly slow, possibly failing image producer. Runs on worker
/// threads only; implementations must not touch engine state.
pub trait Decoder: Send + Sync {
    fn decode(
        &self,
        filepath: &Path,
        thumbnail_path: Option<&Path>,
    ) -> Result<PixelBuffer, DecodeError>;
}

/// File-backed decoder: prefers the pre-rendered thumbnail, falls back to the
/// original image, and bounds the longest side before handing pixels back.
pub struct ImageFileDecoder {
    max_side: u32,
}

impl ImageFileDecoder {
    pub fn new(max_side: u32) -> Self {
        Self {
            max_side: max_side.max(1),
        }
    }

    fn load(&self, path: &Path) -> Result<PixelBuffer, DecodeError> {
        let reader = image::ImageReader::open(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let img = reader.decode().map_err(|source| DecodeError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        let img = if img.width().max(img.height()) > self.max_side {
            img.thumbnail(self.max_side, self.max_side)
        } else {
            img
        };
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(PixelBuffer::new(width, height, rgba.into_raw()))
    }
}

impl Default for ImageFileDecoder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Decoder for ImageFileDecoder {
    fn decode(
        &self,
        filepath: &Path,
        thumbnail_path: Option<&Path>,
    ) -> Result<PixelBuffer, DecodeError> {
        if let Some(thumb) = thumbnail_path
            && thumb.is_file()
            && let Ok(pixels) = self.load(thumb)
        {
            return Ok(pixels);
        }
        if filepath.is_file() {
            return self.load(filepath);
        }
        Err(DecodeError::NoSource {
            filepath: filepath.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_png(name: &str, w: u32, h: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("picgrid-decode-{}-{name}", std::process::id()));
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn decodes_and_bounds_longest_side() {
        let path = temp_png("large.png", 800, 400);
        let decoder = ImageFileDecoder::new(200);
        let pixels = decoder.decode(&path, None).unwrap();
        assert_eq!(pixels.width, 200);
        assert_eq!(pixels.height, 100);
        assert_eq!(pixels.data.len(), 200 * 100 * 4);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn prefers_thumbnail_over_original() {
        let original = temp_png("orig.png", 64, 64);
        let thumb = temp_png("thumb.png", 16, 16);
        let decoder = ImageFileDecoder::default();
        let pixels = decoder.decode(&original, Some(&thumb)).unwrap();
        assert_eq!((pixels.width, pixels.height), (16, 16));
        let _ = std::fs::remove_file(original);
        let _ = std::fs::remove_file(thumb);
    }

    #[test]
    fn missing_everything_is_no_source() {
        let decoder = ImageFileDecoder::default();
        let missing = Path::new("/nonexistent/picgrid/x.jpg");
        assert!(matches!(
            decoder.decode(missing, Some(missing)),
            Err(DecodeError::NoSource { .. })
        ));
    }
}
