use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Lowest JPEG quality tried before shrinking the image further.
const MIN_JPEG_QUALITY: u8 = 40;
const QUALITY_STEP: u8 = 10;

/// Stop shrinking once the longest side reaches this many pixels.
const MIN_DIMENSION: u32 = 16;

#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Upper bound on `width * height`
    pub max_pixels: u32,
    /// Upper bound on the longest side
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Byte ceiling for the encoded output
    pub max_output_bytes: usize,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_pixels: 300_000,
            max_dimension: 2048,
            jpeg_quality: 80,
            max_output_bytes: 4 * 1024 * 1024,
        }
    }
}

/// A normalised image ready for the vision model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// RGB JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_format: ImageFormat,
}

/// Decode, downscale and re-encode an uploaded photo so the remote payload
/// stays bounded. Aspect ratio is preserved and images are never upscaled.
pub fn preprocess(data: &[u8], opts: &PreprocessOptions) -> Result<PreparedImage, PreprocessError> {
    let source_format = image::guess_format(data)
        .map_err(|e| PreprocessError::UnsupportedFormat(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(data, source_format)
        .map_err(|e| PreprocessError::UnsupportedFormat(e.to_string()))?;

    let (w, h) = fit_dimensions(
        decoded.width(),
        decoded.height(),
        opts.max_dimension,
        opts.max_pixels,
    );
    let mut rgb = flatten_onto_white(&decoded);
    if (w, h) != (rgb.width(), rgb.height()) {
        rgb = image::imageops::resize(&rgb, w, h, FilterType::Lanczos3);
    }

    let mut quality = opts.jpeg_quality.clamp(1, 100);
    let mut bytes = encode_jpeg(&rgb, quality)?;

    while bytes.len() > opts.max_output_bytes {
        if quality > MIN_JPEG_QUALITY {
            quality = quality.saturating_sub(QUALITY_STEP).max(MIN_JPEG_QUALITY);
        } else {
            let longest = rgb.width().max(rgb.height());
            if longest <= MIN_DIMENSION {
                break;
            }
            let nw = (rgb.width() * 3 / 4).max(1);
            let nh = (rgb.height() * 3 / 4).max(1);
            rgb = image::imageops::resize(&rgb, nw, nh, FilterType::Lanczos3);
        }
        bytes = encode_jpeg(&rgb, quality)?;
    }

    tracing::debug!(
        source_format = ?source_format,
        width = rgb.width(),
        height = rgb.height(),
        quality,
        bytes = bytes.len(),
        "Image preprocessed"
    );

    Ok(PreparedImage {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
        source_format,
    })
}

/// Largest size no bigger than the input that satisfies both bounds.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32, max_pixels: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let mut scale: f64 = 1.0;
    let longest = width.max(height) as f64;
    if max_dimension > 0 && longest > max_dimension as f64 {
        scale = scale.min(max_dimension as f64 / longest);
    }
    let pixels = width as f64 * height as f64;
    if max_pixels > 0 && pixels > max_pixels as f64 {
        scale = scale.min((max_pixels as f64 / pixels).sqrt());
    }
    if scale >= 1.0 {
        return (width, height);
    }

    let w = ((width as f64 * scale).floor() as u32).max(1);
    let h = ((height as f64 * scale).floor() as u32).max(1);
    (w, h)
}

fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(PreprocessError::Encode)?;
    Ok(buf)
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Unsupported or corrupt image: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}
