//! # pdf2md-batch
//!
//! Convert whole folders of PDF documents to Markdown.
//!
//! Three backends share one batch runner:
//!
//! | Backend | What it reads | Needs |
//! |---------|---------------|-------|
//! | `text`  | PDFium text layer and embedded pictures | nothing |
//! | `vlm`   | rendered page images, sent to an `edgequake_llm` provider | an API key |
//! | `api`   | rendered page images, POSTed to an OpenAI-compatible server | a running server |
//!
//! Every document gets its own markdown file. A document whose markdown is
//! already there is skipped, so an interrupted run can simply be restarted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/
//!  │
//!  ├─ 1. Scan     *.pdf, sorted, skip already converted
//!  ├─ 2. Convert  text layer  or  render → encode → VLM → polish
//!  ├─ 3. Images   inline base64 pictures → images/image_N.png
//!  └─ 4. Write    <stem>.md (+ _meta.json, _content_list.json)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_batch::{process_folder, Backend, BackendKind, BatchConfig, NoopProgressCallback};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .input_dir("./input")
//!         .output_dir("./output")
//!         .backend(BackendKind::Text)
//!         .build()?;
//!     let backend = Backend::from_config(&config).await?;
//!     let summary = process_folder(&config, &backend, &NoopProgressCallback).await?;
//!     eprintln!("converted {}/{}", summary.converted, summary.found);
//!     Ok(())
//! }
//! ```
//!
//! ## OpenAI-compatible shim
//!
//! [`proxy`] serves `POST /v1/chat/completions` on top of any
//! `edgequake_llm` provider, so the `api` backend (or any other
//! OpenAI-style client) can talk to Gemini through it.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-batch` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backends;
pub mod batch;
pub mod config;
pub mod error;
pub mod images;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod proxy;
pub mod scan;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backends::Backend;
pub use batch::{process_folder, BatchSummary, FailedDocument};
pub use config::{
    BackendKind, BatchConfig, BatchConfigBuilder, ImageMode, OutputLayout, PageSelection,
    PageSeparator,
};
pub use error::{PageError, Pdf2MdError};
pub use images::{
    extract_embedded_images, extract_embedded_images_into, ExtractedMarkdown, SavedImage,
};
pub use layout::DocumentPaths;
pub use output::{
    ConversionStats, DocumentMetadata, PageResult, RenderedDocument, WrittenDocument,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use proxy::{ProviderBackend, ProxyConfig, ProxyHandle, ProxyServer};
