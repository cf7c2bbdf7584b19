//! Output locations for one document and the "already processed" check.
//!
//! A document counts as processed as soon as its markdown file exists.
//! The markdown is the last thing written (atomically, via rename), so a
//! crash mid-document leaves no markdown behind and the next run retries it.

use crate::config::OutputLayout;
use std::path::{Path, PathBuf};

/// Sub-directory (relative to the markdown file) holding extracted images.
pub const IMAGE_DIR: &str = "images";

/// Every path a single document's outputs can occupy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPaths {
    pub stem: String,
    pub layout: OutputLayout,
    /// Directory the markdown lives in; image references are relative to it.
    pub doc_dir: PathBuf,
    pub markdown: PathBuf,
    /// Image folder name under `doc_dir`. Flat documents share `doc_dir`, so
    /// each gets `<stem>_images`.
    pub image_dir_name: String,
}

impl DocumentPaths {
    pub fn new(output_dir: &Path, stem: &str, layout: OutputLayout) -> Self {
        match layout {
            OutputLayout::PerDocument => {
                let doc_dir = output_dir.join(stem);
                let markdown = doc_dir.join(format!("{stem}.md"));
                Self {
                    stem: stem.to_string(),
                    layout,
                    doc_dir,
                    markdown,
                    image_dir_name: IMAGE_DIR.to_string(),
                }
            }
            OutputLayout::Flat => Self {
                stem: stem.to_string(),
                layout,
                doc_dir: output_dir.to_path_buf(),
                markdown: output_dir.join(format!("{stem}_content.md")),
                image_dir_name: format!("{stem}_images"),
            },
        }
    }

    /// True when this document was converted by an earlier run.
    pub fn is_processed(&self) -> bool {
        self.markdown.is_file()
    }

    pub fn image_dir(&self) -> PathBuf {
        self.doc_dir.join(&self.image_dir_name)
    }

    /// `<stem>_meta.json`; only written in the per-document layout.
    pub fn meta_json(&self) -> Option<PathBuf> {
        self.sidecar("meta")
    }

    /// `<stem>_content_list.json`; only written in the per-document layout.
    pub fn content_list_json(&self) -> Option<PathBuf> {
        self.sidecar("content_list")
    }

    fn sidecar(&self, kind: &str) -> Option<PathBuf> {
        match self.layout {
            OutputLayout::PerDocument => {
                Some(self.doc_dir.join(format!("{}_{kind}.json", self.stem)))
            }
            OutputLayout::Flat => None,
        }
    }
}
