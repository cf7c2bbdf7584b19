//! Image encoding: `DynamicImage` → PNG bytes → base64.
//!
//! PNG keeps rendered text crisp; JPEG artefacts around glyphs measurably
//! hurt OCR quality on small print.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode an image.
pub fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Base64 of the PNG encoding, as sent in request bodies.
pub fn png_base64(img: &DynamicImage) -> Result<String, image::ImageError> {
    let b64 = STANDARD.encode(png_bytes(img)?);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

/// `data:image/png;base64,…` URL for an OpenAI-style `image_url` part.
pub fn png_data_url(img: &DynamicImage) -> Result<String, image::ImageError> {
    Ok(format!("data:image/png;base64,{}", png_base64(img)?))
}

/// Encode a rasterised page for an `edgequake_llm` provider.
///
/// `detail: "high"` lets GPT-4-class models tile the image instead of
/// downscaling it to a single 512 px overview.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    Ok(ImageData::new(png_base64(img)?, "image/png").with_detail("high"))
}
