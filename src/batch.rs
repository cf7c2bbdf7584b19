//! Folder-level batch conversion with resume.
//!
//! Every PDF in the input folder is converted in turn. A document whose
//! markdown already exists is skipped unless `force` is set, so an
//! interrupted run picks up where it stopped. A document that fails is
//! logged and recorded; it never stops the rest of the folder.

use crate::backends::Backend;
use crate::config::BatchConfig;
use crate::error::Pdf2MdError;
use crate::layout::DocumentPaths;
use crate::output::{preview, write_document, WrittenDocument};
use crate::progress::BatchProgressCallback;
use crate::scan::{document_stem, scan_pdfs, validate_pdf};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A document that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// PDFs found in the input folder.
    pub found: usize,
    /// Converted by this run.
    pub converted: usize,
    /// Left alone because their output already existed.
    pub skipped: usize,
    pub failed: Vec<FailedDocument>,
    pub duration_ms: u64,
}

impl BatchSummary {
    /// True when nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// File names of the failed documents.
    pub fn failed_names(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|f| {
                f.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.path.display().to_string())
            })
            .collect()
    }
}

/// Convert every PDF under `config.input_dir` into `config.output_dir`.
///
/// # Errors
/// Only for problems with the folders themselves: a missing input folder
/// or an output folder that cannot be created. Per-document failures are
/// reported in [`BatchSummary::failed`].
pub async fn process_folder(
    config: &BatchConfig,
    backend: &Backend,
    progress: &dyn BatchProgressCallback,
) -> Result<BatchSummary, Pdf2MdError> {
    let start = Instant::now();
    let pdfs = scan_pdfs(&config.input_dir, config.recursive)?;

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| Pdf2MdError::OutputWriteFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

    let mut summary = BatchSummary {
        found: pdfs.len(),
        ..Default::default()
    };

    if pdfs.is_empty() {
        warn!("No PDF files found in {}", config.input_dir.display());
        progress.on_batch_complete(&summary);
        return Ok(summary);
    }

    info!(
        "Found {} PDF files in {} (backend: {})",
        pdfs.len(),
        config.input_dir.display(),
        backend.describe()
    );
    progress.on_batch_start(pdfs.len());

    let total = pdfs.len();
    // Recursive scans can find `x/report.pdf` and `y/report.pdf`; both would
    // land on the same output, so only the first (in sorted order) is kept.
    let mut stems: HashMap<String, &Path> = HashMap::new();
    for (i, pdf) in pdfs.iter().enumerate() {
        let index = i + 1;
        let name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = document_stem(pdf);

        if let Some(first) = stems.get(&stem) {
            let e = Pdf2MdError::DuplicateOutput {
                path: pdf.clone(),
                first: first.to_path_buf(),
            };
            error!("Not converting {}: {}", pdf.display(), e);
            progress.on_document_error(index, total, &name, &e.to_string());
            summary.failed.push(FailedDocument {
                path: pdf.clone(),
                error: e.to_string(),
            });
            continue;
        }
        stems.insert(stem.clone(), pdf.as_path());

        let paths = DocumentPaths::new(&config.output_dir, &stem, config.layout);

        if paths.is_processed() && !config.force {
            info!(
                "Skipping {} (output exists: {})",
                name,
                paths.markdown.display()
            );
            summary.skipped += 1;
            progress.on_document_skipped(index, total, &name);
            continue;
        }

        info!("=== Processing {}/{}: {} ===", index, total, name);
        progress.on_document_start(index, total, &name);

        match convert_one(pdf, &paths, config, backend).await {
            Ok(written) => {
                record_converted(
                    &mut summary,
                    &written,
                    index,
                    total,
                    &name,
                    config.preview_chars,
                    progress,
                );
            }
            Err(e) => {
                error!("Failed to convert {}: {}", name, e);
                progress.on_document_error(index, total, &name, &e.to_string());
                summary.failed.push(FailedDocument {
                    path: pdf.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary.duration_ms = start.elapsed().as_millis() as u64;
    info!("=== Done: converted {}/{} ===", summary.converted, total);
    if summary.skipped > 0 {
        info!("Skipped {} already converted", summary.skipped);
    }
    if !summary.failed.is_empty() {
        warn!("Failed: {}", summary.failed_names().join(", "));
    }

    progress.on_batch_complete(&summary);
    Ok(summary)
}

/// Count a converted document and report its preview.
fn record_converted(
    summary: &mut BatchSummary,
    written: &WrittenDocument,
    index: usize,
    total: usize,
    name: &str,
    preview_chars: usize,
    progress: &dyn BatchProgressCallback,
) {
    summary.converted += 1;
    let shown = preview(&written.markdown, preview_chars);
    debug!("Preview of {}:\n{}", written.markdown_path.display(), shown);
    progress.on_document_complete(index, total, name, &shown);
}

async fn convert_one(
    pdf: &Path,
    paths: &DocumentPaths,
    config: &BatchConfig,
    backend: &Backend,
) -> Result<WrittenDocument, Pdf2MdError> {
    validate_pdf(pdf)?;
    let rendered = backend.convert(pdf, config).await?;
    write_document(pdf, paths, rendered, config.image_mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputLayout;
    use crate::progress::NoopProgressCallback;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl BatchProgressCallback for Events {
        fn on_batch_start(&self, total: usize) {
            self.0.lock().unwrap().push(format!("start {total}"));
        }
        fn on_document_skipped(&self, index: usize, _total: usize, name: &str) {
            self.0.lock().unwrap().push(format!("skip {index} {name}"));
        }
        fn on_document_complete(&self, index: usize, _total: usize, name: &str, preview: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("ok {index} {name} {preview}"));
        }
        fn on_document_error(&self, index: usize, _total: usize, name: &str, _error: &str) {
            self.0.lock().unwrap().push(format!("error {index} {name}"));
        }
        fn on_batch_complete(&self, summary: &BatchSummary) {
            self.0.lock().unwrap().push(format!(
                "done {}/{}/{}",
                summary.converted,
                summary.skipped,
                summary.failed.len()
            ));
        }
    }

    fn config(input: &Path, output: &Path, layout: OutputLayout) -> BatchConfig {
        BatchConfig::builder()
            .input_dir(input)
            .output_dir(output)
            .layout(layout)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_input_folder_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(&tmp.path().join("nope"), tmp.path(), OutputLayout::Flat);
        let err = process_folder(&cfg, &Backend::Text, &NoopProgressCallback)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2MdError::InputDirNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_folder_creates_output_and_reports_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("out/Gemini");
        std::fs::create_dir_all(&input).unwrap();

        let summary = process_folder(
            &config(&input, &output, OutputLayout::Flat),
            &Backend::Text,
            &NoopProgressCallback,
        )
        .await
        .unwrap();

        assert_eq!(summary.found, 0);
        assert!(output.is_dir());
    }

    #[tokio::test]
    async fn existing_output_is_skipped_and_bad_pdf_fails_without_stopping() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        // a.pdf was converted by an earlier run.
        std::fs::write(input.join("a.pdf"), b"%PDF-1.4\n").unwrap();
        std::fs::write(output.join("a_content.md"), "# A\n").unwrap();
        // b.pdf is not a PDF at all.
        std::fs::write(input.join("b.pdf"), b"hello world").unwrap();

        let events = Events::default();
        let summary = process_folder(
            &config(&input, &output, OutputLayout::Flat),
            &Backend::Text,
            &events,
        )
        .await
        .unwrap();

        assert_eq!(summary.found, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.converted, 0);
        assert_eq!(summary.failed_names(), vec!["b.pdf"]);
        assert!(!summary.is_success());
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 2", "skip 1 a.pdf", "error 2 b.pdf", "done 0/1/1"]
        );
        // The earlier output is untouched.
        assert_eq!(
            std::fs::read_to_string(output.join("a_content.md")).unwrap(),
            "# A\n"
        );
    }

    #[tokio::test]
    async fn force_reprocesses_existing_output() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(output.join("a")).unwrap();
        std::fs::write(input.join("a.pdf"), b"not a pdf").unwrap();
        std::fs::write(output.join("a/a.md"), "# A\n").unwrap();

        let mut cfg = config(&input, &output, OutputLayout::PerDocument);
        cfg.force = true;
        let summary = process_folder(&cfg, &Backend::Text, &NoopProgressCallback)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed.len(), 1);
    }

    #[tokio::test]
    async fn same_named_pdfs_in_subfolders_do_not_share_output() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("output");
        std::fs::create_dir_all(input.join("x")).unwrap();
        std::fs::create_dir_all(input.join("y")).unwrap();
        std::fs::create_dir_all(output.join("report")).unwrap();
        std::fs::write(input.join("x/report.pdf"), b"%PDF-1.4\n").unwrap();
        std::fs::write(input.join("y/report.pdf"), b"%PDF-1.4\n").unwrap();
        // x/report.pdf was converted by an earlier run.
        std::fs::write(output.join("report/report.md"), "# X\n").unwrap();

        let mut cfg = config(&input, &output, OutputLayout::PerDocument);
        cfg.recursive = true;
        let events = Events::default();
        let summary = process_folder(&cfg, &Backend::Text, &events).await.unwrap();

        assert_eq!(summary.found, 2);
        // y/report.pdf must not be mistaken for already converted.
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].path, input.join("y/report.pdf"));
        assert!(summary.failed[0].error.contains("x/report.pdf"));
        assert_eq!(
            *events.0.lock().unwrap(),
            vec!["start 2", "skip 1 report.pdf", "error 2 report.pdf", "done 0/1/1"]
        );
        assert_eq!(
            std::fs::read_to_string(output.join("report/report.md")).unwrap(),
            "# X\n"
        );
    }

    #[test]
    fn converted_document_is_counted_with_a_truncated_preview() {
        let written = WrittenDocument {
            markdown_path: PathBuf::from("out/a/a.md"),
            images: Vec::new(),
            markdown: "x".repeat(250),
        };
        let events = Events::default();
        let mut summary = BatchSummary {
            found: 1,
            ..Default::default()
        };

        record_converted(&mut summary, &written, 1, 1, "a.pdf", 200, &events);

        assert_eq!(summary.converted, 1);
        assert!(summary.is_success());
        assert_eq!(
            *events.0.lock().unwrap(),
            vec![format!("ok 1 a.pdf {}...", "x".repeat(200))]
        );
    }
}
