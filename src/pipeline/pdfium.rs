//! Binding the PDFium shared library and opening documents.
//!
//! `Pdfium` is not `Send`, so every blocking task binds its own instance.
//! The dynamic loader caches the library after the first `dlopen`, which
//! makes repeat binds cheap.

use crate::error::Pdf2MdError;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Environment variable naming the PDFium library file to load.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind PDFium.
///
/// Lookup order:
/// 1. the file named by `PDFIUM_LIB_PATH`
/// 2. the platform library name next to the running executable
/// 3. the system library search path
pub fn bind() -> Result<Pdfium, Pdf2MdError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_ENV) {
        debug!(path = %path, "Binding PDFium from {}", PDFIUM_LIB_ENV);
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            Pdf2MdError::PdfiumBindingFailed(format!("{}={}: {}", PDFIUM_LIB_ENV, path, e))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib = Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            debug!(dir = %dir.display(), "Bound PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        Pdf2MdError::PdfiumBindingFailed(format!(
            "PDFium library not found ({}). Set {} or install libpdfium.",
            e, PDFIUM_LIB_ENV
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Open a PDF, mapping load failures to password or corruption errors.
pub fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2MdError> {
    pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| map_load_error(path, password.is_some(), &format!("{:?}", e)))
}

fn map_load_error(path: &Path, had_password: bool, detail: &str) -> Pdf2MdError {
    if detail.to_ascii_lowercase().contains("password") {
        if had_password {
            Pdf2MdError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2MdError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2MdError::CorruptPdf {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_classified() {
        let p = Path::new("secret.pdf");
        assert!(matches!(
            map_load_error(p, false, "PdfiumLibraryInternalError(PasswordError)"),
            Pdf2MdError::PasswordRequired { .. }
        ));
        assert!(matches!(
            map_load_error(p, true, "PdfiumLibraryInternalError(PasswordError)"),
            Pdf2MdError::WrongPassword { .. }
        ));
        assert!(matches!(
            map_load_error(p, false, "PdfiumLibraryInternalError(FormatError)"),
            Pdf2MdError::CorruptPdf { .. }
        ));
    }

    #[test]
    fn garbage_file_with_owned_password_is_an_error() {
        let Ok(pdfium) = bind() else {
            println!("SKIP: no pdfium library available");
            return;
        };
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("garbage.pdf");
        std::fs::write(&path, b"%PDF-not really").unwrap();

        // Borrowed from a local String, as the backends do with config.password.
        let password = String::from("secret");
        let err = open_document(&pdfium, &path, Some(password.as_str())).err();
        assert!(matches!(
            err,
            Some(Pdf2MdError::CorruptPdf { .. } | Pdf2MdError::WrongPassword { .. })
        ));
    }
}
