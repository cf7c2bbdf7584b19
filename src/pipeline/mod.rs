//! Per-page stages used by the conversion backends.
//!
//! ## Data Flow
//!
//! ```text
//!              ┌─▶ extract ──────────────────────────────▶ (text backend)
//! pdfium ──────┤
//!              └─▶ render ──▶ encode ──▶ llm | api ──▶ postprocess
//! ```
//!
//! 1. [`pdfium`]  binds the shared library and opens documents
//! 2. [`extract`] reads the text layer and embedded pictures
//! 3. [`render`]  rasterises selected pages (in `spawn_blocking`)
//! 4. [`encode`]  PNG-encodes and base64-wraps page images
//! 5. [`llm`] / [`api`] send a page to a provider or an OpenAI-compatible
//!    server, with retry and backoff
//! 6. [`postprocess`] repairs the usual VLM formatting quirks

pub mod api;
pub mod encode;
pub mod extract;
pub mod llm;
pub mod pdfium;
pub mod postprocess;
pub mod render;
