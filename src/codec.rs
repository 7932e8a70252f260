//! Decoded images and the codec used to persist them.

use crate::errors::CacheError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::sync::Arc;

/// A decoded image. Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct Image {
    inner: Arc<DynamicImage>,
}

impl Image {
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self { inner: Arc::new(image) }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Bytes held by the decoded pixel buffer; this is what the memory tier charges.
    #[must_use]
    pub fn cost_bytes(&self) -> u64 {
        crate::utils::num::usize_to_u64(self.inner.as_bytes().len())
    }

    #[must_use]
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }

    /// True when both handles share one buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<DynamicImage> for Image {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.width() == other.width()
                && self.height() == other.height()
                && self.inner.color() == other.inner.color()
                && self.inner.as_bytes() == other.inner.as_bytes())
    }
}

/// Converts between stored bytes and decoded images.
pub trait ImageCodec: Send + Sync + 'static {
    fn decode(&self, bytes: &[u8]) -> Result<Image, CacheError>;

    /// `quality` is on a 0..=1 scale.
    fn encode(&self, image: &Image, quality: f32) -> Result<Vec<u8>, CacheError>;
}

/// Decodes any format the `image` crate was built with; encodes JPEG.
#[derive(Clone, Copy, Debug, Default)]
pub struct JpegCodec;

/// Maps a 0..=1 quality factor onto the JPEG 1..=100 scale.
#[must_use]
pub fn jpeg_quality(quality: f32) -> u8 {
    if !quality.is_finite() {
        return 80;
    }
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

impl ImageCodec for JpegCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Image, CacheError> {
        image::load_from_memory(bytes)
            .map(Image::new)
            .map_err(|e| CacheError::Decode(e.to_string()))
    }

    fn encode(&self, image: &Image, quality: f32) -> Result<Vec<u8>, CacheError> {
        // JPEG carries no alpha channel.
        let rgb = DynamicImage::ImageRgb8(image.as_dynamic().to_rgb8());
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality));
        rgb.write_with_encoder(encoder).map_err(|e| CacheError::Encode(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_onto_jpeg_scale() {
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(2.0), 100);
        assert_eq!(jpeg_quality(f32::NAN), 80);
    }

    #[test]
    fn jpeg_round_trip_keeps_dimensions() {
        let img = Image::new(DynamicImage::new_rgba8(8, 6));
        let bytes = JpegCodec.encode(&img, 0.8).unwrap();
        let back = JpegCodec.decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (8, 6));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(JpegCodec.decode(b"not an image"), Err(CacheError::Decode(_))));
    }
}
