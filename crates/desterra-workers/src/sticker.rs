//! Sticker rendering: any supported image in, 512×512 lossless WebP out.

use desterra_core::media::Media;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::ExtendedColorType;
use serde_json::{json, Value};
use tracing::debug;

use crate::WorkerError;

/// Sticker edge length in pixels.
pub const STICKER_SIZE: u32 = 512;

/// Render a sticker from a `{"media", "mimetype"}` payload.
pub fn render(payload: &Value) -> Result<Value, WorkerError> {
    let source = Media::from_value(payload)
        .map_err(|e| WorkerError::InvalidPayload(e.to_string()))?;
    let webp = to_webp_sticker(&source.data)?;
    debug!(input = source.data.len(), output = webp.len(), "sticker rendered");

    let mut reply = serde_json::to_value(Media::new("image/webp", webp).to_payload())
        .map_err(|e| WorkerError::InvalidPayload(e.to_string()))?;
    if let Some(obj) = reply.as_object_mut() {
        obj.insert("width".into(), json!(STICKER_SIZE));
        obj.insert("height".into(), json!(STICKER_SIZE));
    }
    Ok(reply)
}

/// Decode, crop-resize to fill the square, encode as lossless WebP.
pub fn to_webp_sticker(bytes: &[u8]) -> Result<Vec<u8>, WorkerError> {
    let img = image::load_from_memory(bytes)?;
    let rgba = img
        .resize_to_fill(STICKER_SIZE, STICKER_SIZE, FilterType::Lanczos3)
        .to_rgba8();

    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out).encode(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128u8])
        });
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_wide_image_becomes_square_webp() {
        let webp = to_webp_sticker(&png(300, 100)).unwrap();
        let decoded = image::load_from_memory_with_format(&webp, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (512, 512));
    }

    #[test]
    fn test_render_reply_shape() {
        let payload = serde_json::to_value(Media::new("image/png", png(64, 64)).to_payload())
            .unwrap();
        let reply = render(&payload).unwrap();
        assert_eq!(reply["mimetype"], "image/webp");
        assert_eq!(reply["width"], 512);
        assert_eq!(reply["height"], 512);

        let media = Media::from_value(&reply).unwrap();
        assert_eq!(media.extension(), "webp");
        assert!(image::load_from_memory(&media.data).is_ok());
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(matches!(
            to_webp_sticker(b"definitely not an image"),
            Err(WorkerError::Image(_))
        ));
    }

    #[test]
    fn test_missing_media_field_fails() {
        let err = render(&json!({"caption": "hola"})).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidPayload(_)));
    }
}
