//! Text-layer extraction: pull the text and embedded pictures of each page
//! straight out of the PDF, without rendering or a model.

use crate::config::BatchConfig;
use crate::error::Pdf2MdError;
use crate::output::DocumentMetadata;
use crate::pipeline::pdfium::{bind, open_document};
use crate::pipeline::render::document_metadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Content pulled from one page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// 0-based page index.
    pub index: usize,
    pub text: String,
    /// Raster images in content-stream order.
    pub images: Vec<DynamicImage>,
}

/// Everything extracted from one document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub metadata: DocumentMetadata,
    pub pages: Vec<ExtractedPage>,
}

/// Extract the text layer and embedded images of the selected pages.
///
/// Images are only decoded when `with_images` is set. An image object pdfium
/// cannot decode is skipped with a warning; a page whose text cannot be read
/// fails the document.
pub async fn extract_document(
    pdf_path: &Path,
    config: &BatchConfig,
    with_images: bool,
) -> Result<ExtractedDocument, Pdf2MdError> {
    let path = pdf_path.to_path_buf();
    let password = config.password.clone();
    let selection = config.pages.clone();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind()?;
        let document = open_document(&pdfium, &path, password.as_deref())?;
        let metadata = document_metadata(&document);
        let indices = selection.select(metadata.page_count)?;
        info!(
            "Extracting {} of {} pages from {}",
            indices.len(),
            metadata.page_count,
            path.display()
        );

        let pages = document.pages();
        let mut out = Vec::with_capacity(indices.len());
        for idx in indices {
            let page = pages
                .get(idx as u16)
                .map_err(|e| Pdf2MdError::ExtractionFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;
            out.push(extract_page(&page, idx, with_images)?);
        }

        Ok(ExtractedDocument {
            metadata,
            pages: out,
        })
    })
    .await
    .map_err(|e| Pdf2MdError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_page(
    page: &PdfPage<'_>,
    index: usize,
    with_images: bool,
) -> Result<ExtractedPage, Pdf2MdError> {
    let text = page
        .text()
        .map_err(|e| Pdf2MdError::ExtractionFailed {
            page: index + 1,
            detail: format!("{:?}", e),
        })?
        .all();

    let mut images = Vec::new();
    if with_images {
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(img) => images.push(img),
                Err(e) => warn!("Page {}: skipping unreadable image: {:?}", index + 1, e),
            }
        }
    }

    debug!(
        "Page {}: {} chars, {} images",
        index + 1,
        text.len(),
        images.len()
    );

    Ok(ExtractedPage {
        index,
        text,
        images,
    })
}

/// Turn raw text-layer output into markdown paragraphs.
///
/// pdfium separates lines with `\r\n`; blank lines become paragraph breaks
/// and runs of blank lines collapse to one.
pub fn text_to_markdown(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n').map(|l| l.trim_end_matches('\r').trim_end()) {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_to_markdown_splits_paragraphs() {
        let raw = "Title\r\n\r\n\r\nFirst line\r\nsecond line   \r\n\r\nLast";
        assert_eq!(
            text_to_markdown(raw),
            "Title\n\nFirst line\nsecond line\n\nLast"
        );
    }

    #[test]
    fn text_to_markdown_empty_page() {
        assert_eq!(text_to_markdown("\r\n \r\n"), "");
    }
}
