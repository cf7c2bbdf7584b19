//! Conversion results and writing them to disk.
//!
//! A backend hands back a [`RenderedDocument`]; [`write_document`] turns it
//! into files under the document's [`DocumentPaths`]: pictures first, then
//! the sidecar JSON, and the markdown last so that its presence reliably
//! marks the document as done.

use crate::config::ImageMode;
use crate::error::{PageError, Pdf2MdError};
use crate::images::{self, NamedImage, SavedImage};
use crate::layout::DocumentPaths;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// PDF document metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Outcome of converting one page through a VLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u8,
    pub error: Option<PageError>,
}

impl PageResult {
    pub(crate) fn failed(page_num: usize, duration_ms: u64, retries: u8, error: PageError) -> Self {
        Self {
            page_num,
            markdown: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms,
            retries,
            error: Some(error),
        }
    }
}

/// Per-document statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub backend: String,
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Kind of a [`ContentBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    Image,
}

/// One entry of `<stem>_content_list.json`: a text run or a picture, in
/// reading order, tagged with its 0-based page index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img_path: Option<String>,
    pub page_idx: usize,
}

/// What a backend produced for one PDF, before anything touches the disk.
#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    pub markdown: String,
    /// Pictures referenced by file name from `markdown` (text backend,
    /// [`ImageMode::Referenced`]).
    pub images: Vec<NamedImage>,
    pub content_list: Vec<ContentBlock>,
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageResult>,
    pub stats: ConversionStats,
}

/// Contents of `<stem>_meta.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetaSidecar {
    pub source: PathBuf,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
    pub images: Vec<SavedImage>,
    pub pages: Vec<PageResult>,
}

/// Files produced for one document.
#[derive(Debug, Clone)]
pub struct WrittenDocument {
    pub markdown_path: PathBuf,
    pub images: Vec<SavedImage>,
    /// Markdown as written, with image references rewritten.
    pub markdown: String,
}

/// Write a converted document to its output location.
pub async fn write_document(
    source: &Path,
    paths: &DocumentPaths,
    rendered: RenderedDocument,
    image_mode: ImageMode,
) -> Result<WrittenDocument, Pdf2MdError> {
    tokio::fs::create_dir_all(&paths.doc_dir)
        .await
        .map_err(|e| Pdf2MdError::OutputWriteFailed {
            path: paths.doc_dir.clone(),
            source: e,
        })?;

    let RenderedDocument {
        markdown,
        images: named,
        mut content_list,
        metadata,
        pages,
        stats,
    } = rendered;

    // ── Pictures ─────────────────────────────────────────────────────────
    let doc_dir = paths.doc_dir.clone();
    let image_dir = paths.image_dir_name.clone();
    let (markdown, saved) = tokio::task::spawn_blocking(move || {
        let extracted = images::extract_embedded_images_into(&markdown, &doc_dir, &image_dir)?;
        let mut saved = extracted.images;
        let mut markdown = extracted.markdown;
        if image_mode == ImageMode::Referenced && !named.is_empty() {
            let names: Vec<&str> = named.iter().map(|n| n.name.as_str()).collect();
            saved.extend(images::save_named_images(&named, &doc_dir, &image_dir)?);
            markdown = images::relink_images(&markdown, &names, &image_dir);
        }
        Ok::<_, Pdf2MdError>((markdown, saved))
    })
    .await
    .map_err(|e| Pdf2MdError::Internal(format!("Image task panicked: {}", e)))??;

    let prefix = format!("{}/", paths.image_dir_name);
    for block in content_list.iter_mut() {
        if let Some(ref p) = block.img_path {
            if !p.starts_with(&prefix) {
                block.img_path = Some(format!("{prefix}{p}"));
            }
        }
    }

    // ── Sidecars ─────────────────────────────────────────────────────────
    if let Some(meta_path) = paths.meta_json() {
        let sidecar = MetaSidecar {
            source: source.to_path_buf(),
            metadata,
            stats,
            images: saved.clone(),
            pages,
        };
        write_json(&meta_path, &sidecar).await?;
    }
    if let Some(list_path) = paths.content_list_json() {
        write_json(&list_path, &content_list).await?;
    }

    // ── Markdown (last: its presence marks the document processed) ───────
    write_atomic(&paths.markdown, markdown.as_bytes()).await?;
    info!(
        "Saved {} ({} images)",
        paths.markdown.display(),
        saved.len()
    );

    Ok(WrittenDocument {
        markdown_path: paths.markdown.clone(),
        images: saved,
        markdown,
    })
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Pdf2MdError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| Pdf2MdError::Internal(format!("JSON serialisation failed: {e}")))?;
    write_atomic(path, &json).await?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write to a temp file in the target's directory, then rename over the target.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2MdError> {
    let target = path.to_path_buf();
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok::<_, std::io::Error>(())
    })
    .await
    .map_err(|e| Pdf2MdError::Internal(format!("Write task panicked: {}", e)))?
    .map_err(|e| Pdf2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// First `max_chars` characters of `markdown`, with `...` when truncated.
pub fn preview(markdown: &str, max_chars: usize) -> String {
    match markdown.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &markdown[..idx]),
        None => markdown.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputLayout;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    fn sample(markdown: &str) -> RenderedDocument {
        RenderedDocument {
            markdown: markdown.to_string(),
            content_list: vec![ContentBlock {
                block_type: BlockType::Text,
                text: Some("Hello".into()),
                img_path: None,
                page_idx: 0,
            }],
            metadata: DocumentMetadata {
                page_count: 1,
                pdf_version: "Pdf1_7".into(),
                ..Default::default()
            },
            stats: ConversionStats {
                backend: "text".into(),
                total_pages: 1,
                processed_pages: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn per_document_layout_writes_markdown_images_and_sidecars() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = DocumentPaths::new(tmp.path(), "doc", OutputLayout::PerDocument);
        let md = format!(
            "# Hello\n\n![Image](data:image/png;base64,{})\n",
            STANDARD.encode(b"png-bytes")
        );

        let written = write_document(
            Path::new("input/doc.pdf"),
            &paths,
            sample(&md),
            ImageMode::Embedded,
        )
        .await
        .unwrap();

        assert_eq!(written.images.len(), 1);
        let on_disk = std::fs::read_to_string(&paths.markdown).unwrap();
        assert_eq!(on_disk, "# Hello\n\n![Image](images/image_1.png)\n");
        assert!(paths.image_dir().join("image_1.png").is_file());

        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(paths.meta_json().unwrap()).unwrap()).unwrap();
        assert_eq!(meta["metadata"]["page_count"], 1);
        assert_eq!(meta["stats"]["backend"], "text");

        let list: serde_json::Value = serde_json::from_slice(
            &std::fs::read(paths.content_list_json().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(list[0]["type"], "text");
        assert_eq!(list[0]["page_idx"], 0);
        assert!(paths.is_processed());
    }

    #[tokio::test]
    async fn flat_layout_writes_markdown_only() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = DocumentPaths::new(tmp.path(), "doc", OutputLayout::Flat);

        write_document(
            Path::new("doc.pdf"),
            &paths,
            sample("# Flat\n"),
            ImageMode::Embedded,
        )
        .await
        .unwrap();

        assert!(tmp.path().join("doc_content.md").is_file());
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no sidecars or temp files expected");
    }

    #[tokio::test]
    async fn flat_documents_keep_their_images_apart() {
        let tmp = tempfile::tempdir().unwrap();
        for (stem, bytes) in [("a", b"AAAA-bytes"), ("b", b"BBBB-bytes")] {
            let paths = DocumentPaths::new(tmp.path(), stem, OutputLayout::Flat);
            let md = format!("![Image](data:image/png;base64,{})\n", STANDARD.encode(bytes));
            write_document(
                Path::new("in.pdf"),
                &paths,
                sample(&md),
                ImageMode::Embedded,
            )
            .await
            .unwrap();
        }

        let a_md = std::fs::read_to_string(tmp.path().join("a_content.md")).unwrap();
        assert_eq!(a_md, "![Image](a_images/image_1.png)\n");
        assert_eq!(
            std::fs::read(tmp.path().join("a_images/image_1.png")).unwrap(),
            b"AAAA-bytes"
        );
        assert_eq!(
            std::fs::read(tmp.path().join("b_images/image_1.png")).unwrap(),
            b"BBBB-bytes"
        );
        assert!(!tmp.path().join("images").exists());
    }

    #[tokio::test]
    async fn referenced_images_are_saved_and_relinked() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = DocumentPaths::new(tmp.path(), "doc", OutputLayout::PerDocument);
        let mut rendered = sample("![](_page_1_Picture_1.png)\n");
        rendered.images.push(NamedImage {
            name: "_page_1_Picture_1.png".into(),
            image: image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2)),
        });
        rendered.content_list.push(ContentBlock {
            block_type: BlockType::Image,
            text: None,
            img_path: Some("_page_1_Picture_1.png".into()),
            page_idx: 0,
        });

        let written = write_document(Path::new("doc.pdf"), &paths, rendered, ImageMode::Referenced)
            .await
            .unwrap();

        assert_eq!(written.markdown, "![](images/_page_1_Picture_1.png)\n");
        assert!(paths.image_dir().join("_page_1_Picture_1.png").is_file());
        let list: serde_json::Value = serde_json::from_slice(
            &std::fs::read(paths.content_list_json().unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(list[1]["img_path"], "images/_page_1_Picture_1.png");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
    }
}
