//! Progress-callback trait for batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::batch::process_folder`] to hear about each document as the
//! batch runs. The CLI drives an `indicatif` bar from these events; a
//! library user can forward them to a channel or a log instead.
//!
//! # Example
//!
//! ```rust
//! use pdf2md_batch::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountConverted(AtomicUsize);
//!
//! impl BatchProgressCallback for CountConverted {
//!     fn on_document_complete(&self, index: usize, total: usize, name: &str, _preview: &str) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("[{index}/{total}] {name} ({done} converted so far)");
//!     }
//! }
//! ```

use crate::batch::BatchSummary;
use std::sync::Arc;

/// Called by the batch runner as it walks the input folder.
///
/// `index` is 1-based; `total` is the number of PDFs found. Every method
/// defaults to a no-op.
pub trait BatchProgressCallback: Send + Sync {
    /// Once, after scanning, before any document is touched.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// A document is about to be converted.
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// A document already has output and was left alone.
    fn on_document_skipped(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// A document was converted and written.
    ///
    /// `preview` is the start of the markdown, already truncated.
    fn on_document_complete(&self, index: usize, total: usize, name: &str, preview: &str) {
        let _ = (index, total, name, preview);
    }

    /// A document failed; the batch moves on.
    fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let _ = (index, total, name, error);
    }

    /// Once, after the last document.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared handle type accepted by the batch runner.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl BatchProgressCallback for Recorder {
        fn on_document_skipped(&self, index: usize, total: usize, name: &str) {
            self.0.lock().unwrap().push(format!("skip {index}/{total} {name}"));
        }

        fn on_document_error(&self, index: usize, total: usize, name: &str, error: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("error {index}/{total} {name}: {error}"));
        }
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_document_start(1, 2, "a.pdf");
        cb.on_document_complete(1, 2, "a.pdf", "# A");
        cb.on_document_error(2, 2, "b.pdf", "corrupt");
        cb.on_batch_complete(&BatchSummary::default());
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_document_start(1, 2, "a.pdf");
        rec.on_document_skipped(1, 2, "a.pdf");
        rec.on_document_error(2, 2, "b.pdf", "boom");
        assert_eq!(
            *rec.0.lock().unwrap(),
            vec!["skip 1/2 a.pdf", "error 2/2 b.pdf: boom"]
        );
    }
}
