// compression.rs - WebP recompression with dimension and size limits

use crate::error::ConvertError;
use image::{DynamicImage, GenericImageView};

/// Lowest quality the size-limit search will try, in percent.
const MIN_QUALITY: f32 = 10.0;
const QUALITY_STEP: f32 = 5.0;
/// Smallest fraction of the fitted size the size-limit search shrinks to.
const MIN_SCALE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    WebP,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::WebP => "image/webp",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::WebP => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecompressOptions {
    pub max_size_bytes: u64,
    pub max_dimension: u32,
    pub output_format: OutputFormat,
    /// 0.0 - 1.0
    pub quality: f32,
}

pub trait Recompressor: Send + Sync {
    fn recompress(&self, input: &[u8], options: &RecompressOptions) -> Result<Vec<u8>, ConvertError>;
}

#[derive(Debug, Default)]
pub struct WebpCompressor;

impl WebpCompressor {
    pub fn new() -> Self {
        Self
    }

    fn fit_dimension(&self, image: DynamicImage, max_dimension: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        let max_dimension = max_dimension.max(1);
        if width <= max_dimension && height <= max_dimension {
            return image;
        }
        let (new_width, new_height) = fitted_dimensions(width, height, max_dimension);
        image.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
    }

    fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>, ConvertError> {
        let (width, height) = image.dimensions();
        let encoded = if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            let encoded =
                webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode_simple(false, quality);
            encoded
        } else {
            let rgb = image.to_rgb8();
            let encoded =
                webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode_simple(false, quality);
            encoded
        };
        encoded
            .map(|memory| memory.to_vec())
            .map_err(|e| ConvertError::Encode(format!("{:?} for {}x{}", e, width, height)))
    }

    /// Lowers quality, then dimensions, until the output fits. Returns the
    /// smallest attempt when nothing fits.
    fn encode_within(
        &self,
        image: &DynamicImage,
        quality: f32,
        max_bytes: u64,
    ) -> Result<Vec<u8>, ConvertError> {
        let mut quality = quality;
        let mut best = self.encode(image, quality)?;

        while best.len() as u64 > max_bytes && quality > MIN_QUALITY {
            quality = (quality - QUALITY_STEP).max(MIN_QUALITY);
            let attempt = self.encode(image, quality)?;
            log::debug!("Quality {} gave {} bytes", quality, attempt.len());
            if attempt.len() < best.len() {
                best = attempt;
            }
        }

        let (width, height) = image.dimensions();
        let mut scale = 0.9;
        while best.len() as u64 > max_bytes && scale >= MIN_SCALE {
            let new_width = ((width as f32 * scale) as u32).max(1);
            let new_height = ((height as f32 * scale) as u32).max(1);
            let scaled =
                image.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3);
            let attempt = self.encode(&scaled, quality)?;
            log::debug!("Scale {:.2} gave {} bytes", scale, attempt.len());
            if attempt.len() < best.len() {
                best = attempt;
            }
            scale *= 0.9;
        }

        Ok(best)
    }
}

impl Recompressor for WebpCompressor {
    fn recompress(&self, input: &[u8], options: &RecompressOptions) -> Result<Vec<u8>, ConvertError> {
        let image = image::load_from_memory(input)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(ConvertError::Empty);
        }

        let image = self.fit_dimension(image, options.max_dimension);
        let quality = options.quality.clamp(0.0, 1.0) * 100.0;
        self.encode_within(&image, quality, options.max_size_bytes)
    }
}

/// Scales `(width, height)` so the longer side equals `max_dimension`,
/// keeping the aspect ratio. Sizes already within the limit are unchanged.
pub fn fitted_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let ratio = max_dimension as f64 / longest as f64;
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_dimension);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_dimension);
    (new_width, new_height)
}
