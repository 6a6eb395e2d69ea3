//! Conversion of raw payloads into decoded images.

use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

/// A decoded image, shared cheaply between the fetcher and result sinks.
#[derive(Clone)]
pub struct ImageHandle {
    image: Arc<DynamicImage>,
}

impl ImageHandle {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Equality by decoded pixel content.
impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
            || (self.image.color() == other.image.color()
                && self.width() == other.width()
                && self.height() == other.height()
                && self.image.as_bytes() == other.image.as_bytes())
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("color", &self.image.color())
            .finish()
    }
}

/// Converts raw bytes into the target image type.
///
/// Implementations run on fetch worker tasks and must be thread-safe. The
/// error string becomes the reason in a `ConversionError`.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<ImageHandle, String>;
}

/// Decoder for the raster formats enabled on the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> std::result::Result<ImageHandle, String> {
        if bytes.is_empty() {
            return Err("empty payload".to_string());
        }
        image::load_from_memory(bytes)
            .map(ImageHandle::new)
            .map_err(|e| e.to_string())
    }
}
