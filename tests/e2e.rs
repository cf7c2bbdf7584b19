//! End-to-end batch tests.
//!
//! These need a pdfium library and real PDF files in `./test_cases/`; the
//! VLM test also makes live API calls. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use pdf2md_batch::{
    process_folder, Backend, BackendKind, BatchConfig, ImageMode, NoopProgressCallback,
    OutputLayout, PageSelection,
};
use std::path::{Path, PathBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED is set and at least one PDF is in `test_cases/`.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let pdfs = pdf2md_batch::scan::scan_pdfs(&test_cases_dir(), false).unwrap_or_default();
        if pdfs.is_empty() {
            println!("SKIP — no PDF files in {}", test_cases_dir().display());
            return;
        }
        pdfs
    }};
}

/// Copy `pdfs` into a fresh `input/` folder under `root`.
fn stage_inputs(root: &Path, pdfs: &[PathBuf]) -> PathBuf {
    let input = root.join("input");
    std::fs::create_dir_all(&input).unwrap();
    for pdf in pdfs {
        std::fs::copy(pdf, input.join(pdf.file_name().unwrap())).unwrap();
    }
    input
}

fn assert_markdown_sane(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(
        !md.contains("\n\n\n\n"),
        "[{context}] Output has more than 3 consecutive blank lines"
    );
    assert!(
        !md.contains(";base64,"),
        "[{context}] Inline base64 images should have been extracted"
    );
    println!("[{context}] ✓  {} bytes", md.len());
}

// ── Text backend (no LLM) ────────────────────────────────────────────────────

#[tokio::test]
async fn test_text_backend_converts_then_resumes() {
    let pdfs = e2e_skip_unless_ready!();
    let tmp = tempfile::tempdir().unwrap();
    let input = stage_inputs(tmp.path(), &pdfs);
    let output = tmp.path().join("output");

    let config = BatchConfig::builder()
        .input_dir(&input)
        .output_dir(&output)
        .backend(BackendKind::Text)
        .build()
        .unwrap();
    let backend = Backend::from_config(&config).await.unwrap();

    let first = process_folder(&config, &backend, &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(first.found, pdfs.len());
    assert_eq!(first.converted + first.failed.len(), pdfs.len());
    assert_eq!(first.skipped, 0);

    for pdf in &pdfs {
        let stem = pdf2md_batch::scan::document_stem(pdf);
        let md_path = output.join(&stem).join(format!("{stem}.md"));
        if !md_path.exists() {
            continue;
        }
        let md = std::fs::read_to_string(&md_path).unwrap();
        assert_markdown_sane(&md, &stem);
        assert!(output.join(&stem).join(format!("{stem}_meta.json")).exists());
        assert!(output
            .join(&stem)
            .join(format!("{stem}_content_list.json"))
            .exists());
    }

    // Everything that converted is skipped the second time round.
    let second = process_folder(&config, &backend, &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(second.skipped, first.converted);
    assert_eq!(second.converted, 0);
}

#[tokio::test]
async fn test_text_backend_flat_layout_with_referenced_images() {
    let pdfs = e2e_skip_unless_ready!();
    let tmp = tempfile::tempdir().unwrap();
    let input = stage_inputs(tmp.path(), &pdfs[..1]);
    let output = tmp.path().join("output");

    let config = BatchConfig::builder()
        .input_dir(&input)
        .output_dir(&output)
        .layout(OutputLayout::Flat)
        .image_mode(ImageMode::Referenced)
        .pages(PageSelection::Range(1, 2))
        .build()
        .unwrap();
    let backend = Backend::from_config(&config).await.unwrap();

    let summary = process_folder(&config, &backend, &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(summary.converted, 1, "failed: {:?}", summary.failed);

    let stem = pdf2md_batch::scan::document_stem(&pdfs[0]);
    let md = std::fs::read_to_string(output.join(format!("{stem}_content.md"))).unwrap();
    assert_markdown_sane(&md, "flat");
    // No sidecars in the flat layout, and no image folder shared between documents.
    assert!(!output.join(format!("{stem}_meta.json")).exists());
    assert!(!output.join("images").exists());
}

// ── VLM backend (live API) ───────────────────────────────────────────────────

#[tokio::test]
async fn test_vlm_backend_first_page() {
    let pdfs = e2e_skip_unless_ready!();
    let has_key = ["OPENAI_API_KEY", "GEMINI_API_KEY", "ANTHROPIC_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).is_ok());
    if !has_key {
        println!("SKIP — no provider API key set");
        return;
    }

    let tmp = tempfile::tempdir().unwrap();
    let input = stage_inputs(tmp.path(), &pdfs[..1]);
    let output = tmp.path().join("output");

    let config = BatchConfig::builder()
        .input_dir(&input)
        .output_dir(&output)
        .backend(BackendKind::Vlm)
        .pages(PageSelection::Single(1))
        .build()
        .unwrap();
    let backend = Backend::from_config(&config).await.unwrap();

    let summary = process_folder(&config, &backend, &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(summary.converted, 1, "failed: {:?}", summary.failed);

    let stem = pdf2md_batch::scan::document_stem(&pdfs[0]);
    let md = std::fs::read_to_string(output.join(&stem).join(format!("{stem}.md"))).unwrap();
    assert_markdown_sane(&md, "vlm page 1");
    let first_line = md.lines().next().unwrap_or("");
    assert!(
        !first_line.starts_with("```"),
        "Output must not start with a code fence, got: {first_line:?}"
    );
}
