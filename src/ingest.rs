//! Ingestion orchestration for uploads.
//!
//! Validates the payload, writes the bytes atomically under the configured
//! upload root, creates the document record, and dispatches extraction as
//! a background unit of work. The upload response never waits for
//! extraction: callers get the record back with `extracted_text` absent
//! and observe completion through a later read.
//!
//! The returned [`tokio::task::JoinHandle`] makes the dispatch testable —
//! the HTTP server drops it (fire-and-forget), while the CLI and tests
//! await it for deterministic completion.

use std::path::PathBuf;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, ExtractionConfig};
use crate::error::{DomainError, Result};
use crate::extract::extract_text;
use crate::models::{Document, FileKind};
use crate::store::DocumentStore;

/// Extensions accepted at upload, as presented to clients in errors.
pub const ALLOWED_EXTENSIONS: &str = "pdf, jpg, jpeg, png";

/// A created document plus the handle of its in-flight extraction task.
#[derive(Debug)]
pub struct UploadOutcome {
    pub document: Document,
    pub extraction: JoinHandle<()>,
}

/// Validate and persist an upload, then dispatch background extraction.
pub async fn upload(
    config: &Config,
    pool: &SqlitePool,
    owner_id: &str,
    original_filename: &str,
    title: Option<&str>,
    tag_names: &[String],
    bytes: Vec<u8>,
) -> Result<UploadOutcome> {
    let ext = PathBuf::from(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let kind = FileKind::from_extension(&ext).ok_or_else(|| {
        DomainError::Validation(format!(
            "File type '.{ext}' not allowed. Allowed: {ALLOWED_EXTENSIONS}"
        ))
    })?;

    if bytes.len() as u64 > config.storage.max_file_size_bytes() {
        return Err(DomainError::Validation(format!(
            "File too large. Maximum: {}MB",
            config.storage.max_file_size_mb
        )));
    }

    // The fresh id doubles as the on-disk filename stem, so user-supplied
    // names never influence the path. The original extension is kept.
    let id = Uuid::new_v4().to_string();
    let upload_dir = &config.storage.upload_dir;
    tokio::fs::create_dir_all(upload_dir).await?;
    let file_path = upload_dir.join(format!("{id}.{ext}"));

    // Write-then-rename so the final path only ever holds complete bytes
    let tmp_path = upload_dir.join(format!("{id}.{ext}.tmp"));
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, &file_path).await?;

    let title = match title {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => original_filename.to_string(),
    };

    let store = DocumentStore::new(pool.clone());
    let document = store
        .create_document(
            &id,
            &title,
            &file_path.to_string_lossy(),
            kind,
            bytes.len() as i64,
            owner_id,
            tag_names,
        )
        .await?;

    let extraction = tokio::spawn(run_extraction(
        pool.clone(),
        config.extraction.clone(),
        document.id.clone(),
        file_path,
        kind,
    ));

    Ok(UploadOutcome {
        document,
        extraction,
    })
}

/// Background unit of work: extract off the request path, then write the
/// result back in its own transaction. Faults are logged and swallowed —
/// the upload already succeeded and there is no caller left to notify.
pub async fn run_extraction(
    pool: SqlitePool,
    extraction: ExtractionConfig,
    document_id: String,
    path: PathBuf,
    kind: FileKind,
) {
    tracing::info!(document = %document_id, "starting text extraction");

    // OCR and PDF parsing are CPU-bound; keep them off the async scheduler
    let text = match tokio::task::spawn_blocking(move || extract_text(&path, kind, &extraction))
        .await
    {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(document = %document_id, error = %e, "extraction task failed");
            return;
        }
    };

    let store = DocumentStore::new(pool);
    match store.update_extracted_text(&document_id, &text).await {
        Ok(()) => {
            tracing::info!(document = %document_id, chars = text.len(), "extraction complete")
        }
        Err(e) => {
            tracing::error!(document = %document_id, error = %e, "failed to save extraction result")
        }
    }
}
