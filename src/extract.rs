//! Text extraction engine for uploaded binaries.
//!
//! Extraction never fails: every fault is converted into a marker string
//! (`[extraction failed: …]`, `[OCR not available: …]`, `[OCR failed: …]`)
//! so the background pipeline is uninterruptible and the caller always has
//! a textual result to persist.
//!
//! PDFs are parsed in-process via `pdf-extract`. Images go through the
//! external `tesseract` binary; a scanned PDF (readable structure but no
//! text layer) is retried through the same OCR path, with the fallback's
//! own failure swallowed in favor of the original text.
//!
//! Everything here is synchronous and CPU-bound; callers run it under
//! `tokio::task::spawn_blocking`.

use std::io;
use std::path::Path;
use std::process::Command;

use crate::config::ExtractionConfig;
use crate::models::FileKind;

/// Extract text from a stored file. Infallible by contract: faults come
/// back as marker strings, never as errors.
pub fn extract_text(path: &Path, kind: FileKind, config: &ExtractionConfig) -> String {
    match kind {
        FileKind::Pdf => extract_pdf(path, config),
        FileKind::Jpg | FileKind::Png => match ocr_image(path, config) {
            Ok(text) => text,
            Err(reason) => format!("[OCR failed: {reason}]"),
        },
    }
}

fn extract_pdf(path: &Path, config: &ExtractionConfig) -> String {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => return format!("[extraction failed: {e}]"),
    };

    let text = match pdf_extract::extract_text_from_mem(&bytes) {
        Ok(text) => text,
        Err(e) => return format!("[extraction failed: {e}]"),
    };

    // No text layer (scanned PDF): retry through OCR, best effort. The
    // fallback's own failure is swallowed and the original text returned.
    if text.trim().is_empty() {
        return match ocr_image(path, config) {
            Ok(ocr_text) => ocr_text,
            Err(_) => text,
        };
    }

    text
}

/// Run the external tesseract binary over a file.
///
/// A missing binary is not an error: OCR is an optional runtime capability
/// and its absence degrades to a clearly marked placeholder. Everything
/// else (spawn fault, non-zero exit) is an `Err` so callers can decide
/// whether to mark or swallow it.
fn ocr_image(path: &Path, config: &ExtractionConfig) -> Result<String, String> {
    let output = match Command::new(&config.tesseract_cmd)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(&config.language)
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(format!(
                "[OCR not available: {} is not installed]",
                config.tesseract_cmd
            ));
        }
        Err(e) => return Err(e.to_string()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let first_line = stderr.lines().next().unwrap_or("").trim();
        return Err(format!(
            "{} exited with {}: {}",
            config.tesseract_cmd, output.status, first_line
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
