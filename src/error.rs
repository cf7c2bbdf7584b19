//! Error types for the pdf2md-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2MdError`]: **Fatal** for the operation that returned it: the
//!   input folder is missing, a document cannot be opened, a VLM server is
//!   unreachable. The batch runner catches these per document, so one bad
//!   PDF never stops the rest of the folder.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed (render glitch,
//!   transient API error) but all other pages are fine. Stored inside
//!   [`crate::output::PageResult`] so callers can inspect partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2md-batch library.
#[derive(Debug, Error)]
pub enum Pdf2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The folder to scan for PDFs does not exist.
    #[error("Input folder not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Two inputs map to the same output stem; the later one is not written.
    #[error(
        "'{path}' has the same name as '{first}' and would overwrite its output\n\
Rename one of them or convert the folders separately."
    )]
    DuplicateOutput { path: PathBuf, first: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The text layer or an embedded image of a page could not be read.
    #[error("Extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── VLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// An OpenAI-compatible server could not be reached.
    #[error("Cannot reach VLM server at '{url}': {reason}\nMake sure the server is running and the model is loaded.")]
    ServerUnreachable { url: String, reason: String },

    /// An OpenAI-compatible server answered with a non-success status.
    #[error("VLM server at '{url}' answered HTTP {status}")]
    ServerStatus { url: String, status: u16 },

    /// Every page failed after all retries; output would be empty.
    #[error("All {total} pages failed after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (markdown, sidecar JSON).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an extracted image.
    #[error("Failed to save image '{path}': {detail}")]
    ImageWriteFailed { path: PathBuf, detail: String },

    /// The proxy could not bind its listening socket.
    #[error("Failed to bind proxy on {addr}: {source}")]
    ProxyBindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
pdf2md-batch executable, or install it on the system library path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// VLM call failed after retries.
    #[error("Page {page}: VLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// VLM call timed out.
    #[error("Page {page}: VLM call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The server answered but the reply carried no message content.
    #[error("Page {page}: VLM returned an empty response")]
    EmptyResponse { page: usize },
}

impl PageError {
    /// The 1-indexed page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::LlmFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::EmptyResponse { page } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_dir_not_found_display() {
        let e = Pdf2MdError::InputDirNotFound {
            path: PathBuf::from("./input"),
        };
        assert!(e.to_string().contains("./input"));
    }

    #[test]
    fn server_unreachable_mentions_url() {
        let e = Pdf2MdError::ServerUnreachable {
            url: "http://127.0.0.1:1234/v1/models".into(),
            reason: "connection refused".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("127.0.0.1:1234"), "got: {msg}");
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn all_pages_failed_display() {
        let e = Pdf2MdError::AllPagesFailed {
            total: 4,
            retries: 3,
            first_error: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 4 pages"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn page_error_reports_page() {
        assert_eq!(PageError::Timeout { page: 7, secs: 300 }.page(), 7);
        assert_eq!(PageError::EmptyResponse { page: 2 }.page(), 2);
        assert!(PageError::Timeout { page: 7, secs: 300 }
            .to_string()
            .contains("300s"));
    }
}
