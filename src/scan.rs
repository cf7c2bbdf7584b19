//! Input discovery: find the PDFs a batch run will process.

use crate::error::Pdf2MdError;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// List the PDF files in `dir`, sorted by path.
///
/// Only regular files with a `pdf` extension (any case) are returned.
/// With `recursive = false` only the top level of `dir` is scanned.
pub fn scan_pdfs(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, Pdf2MdError> {
    if !dir.is_dir() {
        return Err(Pdf2MdError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut pdfs: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_pdf_path(p))
        .collect();

    pdfs.sort();
    debug!("Found {} PDF files under {}", pdfs.len(), dir.display());
    Ok(pdfs)
}

/// True when the path has a `.pdf` extension, case-insensitively.
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// The file stem that names every output of a document.
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Check that `path` exists, is readable, and starts with the `%PDF` magic.
///
/// Done before handing the file to pdfium so callers get a meaningful error
/// instead of a generic parse failure.
pub fn validate_pdf(path: &Path) -> Result<(), Pdf2MdError> {
    use std::io::Read;

    if !path.exists() {
        return Err(Pdf2MdError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(f) => {
            // Files shorter than the magic (or unreadable, like a directory)
            // fail too; `magic` holds what could be read, zero-padded.
            let mut head = Vec::with_capacity(4);
            let read = f.take(4).read_to_end(&mut head);
            if read.is_err() || head != b"%PDF" {
                let mut magic = [0u8; 4];
                magic[..head.len()].copy_from_slice(&head);
                return Err(Pdf2MdError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(Pdf2MdError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(Pdf2MdError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}
