pub mod gemini;
pub mod local;

use crate::errors::RecognitionError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use dyn_clone::DynClone;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageResult, Rgb, RgbImage};
use std::borrow::Cow;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Images wider than this are scaled down before they reach a vision backend.
pub const MAX_IMAGE_WIDTH: u32 = 512;
const JPEG_QUALITY: u8 = 50;

/// A vision-capable model that can describe an image.
///
/// Implementations handle their own retry of rate-limited calls; the enrichment
/// pipeline takes care of concurrency and pacing.
#[async_trait]
pub trait VisionProvider: Send + Sync + Debug + DynClone {
    /// Describes `image` following `instruction`. The result is free text.
    async fn describe_image(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<String, RecognitionError>;
}

dyn_clone::clone_trait_object!(VisionProvider);

/// A text-extraction (OCR) backend.
#[async_trait]
pub trait TextRecognizer: Send + Sync + Debug {
    /// Returns the lines of text found in `image`, in reading order.
    async fn recognize_text(&self, image: &[u8]) -> Result<Vec<String>, RecognitionError>;
}

/// Guesses an image MIME type from its magic bytes, defaulting to JPEG.
pub fn sniff_image_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Encodes `bytes` as a `data:` URL suitable for multimodal chat requests.
pub fn image_data_url(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_image_mime(bytes),
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Downscales `bytes` to at most `max_width` pixels wide and re-encodes it as JPEG.
///
/// Transparent pixels are flattened onto white. Bytes that cannot be decoded are
/// returned unchanged.
pub fn compress_image(bytes: &[u8], max_width: u32) -> Cow<'_, [u8]> {
    match recompress(bytes, max_width) {
        Ok(jpeg) => {
            debug!("Compressed image from {} to {} bytes", bytes.len(), jpeg.len());
            Cow::Owned(jpeg)
        }
        Err(e) => {
            warn!("Could not compress image, sending it unchanged: {e}");
            Cow::Borrowed(bytes)
        }
    }
}

fn recompress(bytes: &[u8], max_width: u32) -> ImageResult<Vec<u8>> {
    let original = image::load_from_memory(bytes)?;
    let (width, height) = (original.width(), original.height());
    let scaled = if width > max_width {
        let new_height = (u64::from(height) * u64::from(max_width) / u64::from(width)).max(1);
        original.resize_exact(max_width, new_height as u32, FilterType::Triangle)
    } else {
        original
    };

    let rgba = scaled.to_rgba8();
    let flattened = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let over_white =
            |c: u8| ((u16::from(c) * u16::from(a) + 255 * (255 - u16::from(a))) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    });

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&flattened)?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 200, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn wide_images_are_scaled_to_jpeg() {
        let original = png_of(1024, 256);
        let compressed = compress_image(&original, MAX_IMAGE_WIDTH);
        assert_eq!(sniff_image_mime(&compressed), "image/jpeg");
        let decoded = image::load_from_memory(&compressed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (512, 128));
    }

    #[test]
    fn narrow_images_keep_their_size() {
        let original = png_of(100, 40);
        let compressed = compress_image(&original, MAX_IMAGE_WIDTH);
        let decoded = image::load_from_memory(&compressed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 40));
        assert_eq!(sniff_image_mime(&compressed), "image/jpeg");
    }

    #[test]
    fn undecodable_bytes_are_passed_through() {
        let garbage = [0x89, b'P', b'N', b'G', 0, 1, 2, 3];
        let compressed = compress_image(&garbage, MAX_IMAGE_WIDTH);
        assert!(matches!(compressed, Cow::Borrowed(_)));
        assert_eq!(&*compressed, &garbage);
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_image_mime(&[0x89, b'P', b'N', b'G', 0x0d]), "image/png");
        assert_eq!(sniff_image_mime(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_image_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_image_mime(&[0xff, 0xd8, 0xff]), "image/jpeg");
    }

    #[test]
    fn builds_data_url() {
        assert_eq!(image_data_url(&[0xff, 0xd8]), "data:image/jpeg;base64,/9g=");
    }
}
