//! Moving pictures out of the markdown and into `images/`.
//!
//! Converters that export pictures inline produce references such as
//! `![Image](data:image/png;base64,iVBOR…)`. Those blow up file size and most
//! markdown viewers choke on them, so before writing a document we decode
//! every such payload to `images/image_<n>.<ext>` and point the reference at
//! the file instead. Converters that already export named files only need
//! their references prefixed with `images/`.

use crate::error::Pdf2MdError;
use crate::layout::IMAGE_DIR;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `![alt](data:image/<subtype>;base64,<payload>)`; the payload may wrap lines.
static RE_DATA_URI_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(data:image/([A-Za-z0-9.+-]+);base64,([^)]*)\)").unwrap()
});

/// A picture written to disk.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SavedImage {
    /// 1-based position among the matched references (0 for named images).
    pub index: usize,
    /// Path as written into the markdown, e.g. `images/image_1.png`.
    pub relative_path: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Result of [`extract_embedded_images`].
#[derive(Debug, Clone, Default)]
pub struct ExtractedMarkdown {
    pub markdown: String,
    pub images: Vec<SavedImage>,
    /// References left inline because their payload could not be saved.
    pub failed: usize,
}

/// A picture produced by a converter under a file name of its choosing.
#[derive(Debug, Clone)]
pub struct NamedImage {
    pub name: String,
    pub image: DynamicImage,
}

/// File extension for an image MIME subtype (`svg+xml` → `svg`).
fn extension_for(subtype: &str) -> String {
    subtype
        .split('+')
        .next()
        .unwrap_or(subtype)
        .to_ascii_lowercase()
}

/// Decode every inline base64 image into `<doc_dir>/images/` and rewrite the
/// references to relative paths.
///
/// References are numbered from 1 in document order. A payload that fails to
/// decode or write keeps its inline reference and still uses up its number,
/// so numbering is stable across re-runs of the same input.
pub fn extract_embedded_images(
    markdown: &str,
    doc_dir: &Path,
) -> Result<ExtractedMarkdown, Pdf2MdError> {
    extract_embedded_images_into(markdown, doc_dir, IMAGE_DIR)
}

/// [`extract_embedded_images`] with a caller-chosen folder under `doc_dir`.
/// Documents sharing a `doc_dir` need distinct folders.
pub fn extract_embedded_images_into(
    markdown: &str,
    doc_dir: &Path,
    image_dir: &str,
) -> Result<ExtractedMarkdown, Pdf2MdError> {
    if !RE_DATA_URI_IMAGE.is_match(markdown) {
        return Ok(ExtractedMarkdown {
            markdown: markdown.to_string(),
            ..Default::default()
        });
    }

    let img_dir = doc_dir.join(image_dir);
    std::fs::create_dir_all(&img_dir).map_err(|e| Pdf2MdError::ImageWriteFailed {
        path: img_dir.clone(),
        detail: e.to_string(),
    })?;

    let mut out = String::with_capacity(markdown.len() / 4);
    let mut images = Vec::new();
    let mut failed = 0usize;
    let mut last = 0usize;

    for (i, caps) in RE_DATA_URI_IMAGE.captures_iter(markdown).enumerate() {
        let index = i + 1;
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&markdown[last..whole.start()]);
        last = whole.end();

        let alt = &caps[1];
        let filename = format!("image_{index}.{}", extension_for(&caps[2]));
        let relative_path = format!("{image_dir}/{filename}");
        let path = img_dir.join(&filename);

        let payload: String = caps[3].chars().filter(|c| !c.is_whitespace()).collect();
        let saved = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                std::fs::write(&path, &bytes)
                    .map(|_| bytes.len())
                    .map_err(|e| e.to_string())
            });

        match saved {
            Ok(bytes) => {
                debug!("Saved {} ({} bytes)", path.display(), bytes);
                out.push_str(&format!("![{alt}]({relative_path})"));
                images.push(SavedImage {
                    index,
                    relative_path,
                    path,
                    bytes,
                });
            }
            Err(e) => {
                warn!("Failed to save image {}: {}", filename, e);
                failed += 1;
                out.push_str(whole.as_str());
            }
        }
    }
    out.push_str(&markdown[last..]);

    Ok(ExtractedMarkdown {
        markdown: out,
        images,
        failed,
    })
}

/// Write named images to `<doc_dir>/<image_dir>/<name>`, converted to RGB.
pub fn save_named_images(
    images: &[NamedImage],
    doc_dir: &Path,
    image_dir: &str,
) -> Result<Vec<SavedImage>, Pdf2MdError> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let img_dir = doc_dir.join(image_dir);
    std::fs::create_dir_all(&img_dir).map_err(|e| Pdf2MdError::ImageWriteFailed {
        path: img_dir.clone(),
        detail: e.to_string(),
    })?;

    let mut saved = Vec::with_capacity(images.len());
    for named in images {
        let path = img_dir.join(&named.name);
        let rgb = DynamicImage::ImageRgb8(named.image.to_rgb8());
        rgb.save(&path).map_err(|e| Pdf2MdError::ImageWriteFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let bytes = std::fs::metadata(&path).map(|m| m.len() as usize).unwrap_or(0);
        saved.push(SavedImage {
            index: 0,
            relative_path: format!("{image_dir}/{}", named.name),
            path,
            bytes,
        });
    }
    Ok(saved)
}

/// Point `](<name>)` references at `](<image_dir>/<name>)` for every known name.
pub fn relink_images<S: AsRef<str>>(markdown: &str, names: &[S], image_dir: &str) -> String {
    let mut text = markdown.to_string();
    for name in names {
        let name = name.as_ref();
        text = text.replace(&format!("]({name})"), &format!("]({image_dir}/{name})"));
    }
    text
}

/// Inline markdown reference carrying `png` bytes as a base64 data URI.
pub fn data_uri_reference(alt: &str, png: &[u8]) -> String {
    format!("![{alt}](data:image/png;base64,{})", STANDARD.encode(png))
}
