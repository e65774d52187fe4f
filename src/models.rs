//! Core data models.
//!
//! These types represent the documents, tags, and Q&A records that flow
//! through the ingestion, query, and question-answering pipeline.
//! Timestamps are unix seconds; insertion order (`rowid` / autoincrement
//! id) is the stable tie-break wherever rows share a timestamp.

use serde::Serialize;

/// File kinds accepted for upload. `jpeg` is normalized to [`FileKind::Jpg`]
/// at validation time, so the stored set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Jpg,
    Png,
}

impl FileKind {
    /// Map a lower-cased file extension (without dot) to its canonical kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(FileKind::Pdf),
            "jpg" | "jpeg" => Some(FileKind::Jpg),
            "png" => Some(FileKind::Png),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Pdf => "pdf",
            FileKind::Jpg => "jpg",
            FileKind::Png => "png",
        }
    }

    /// Parse the canonical stored form (never `jpeg`).
    pub fn from_str_stored(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(FileKind::Pdf),
            "jpg" => Some(FileKind::Jpg),
            "png" => Some(FileKind::Png),
            _ => None,
        }
    }
}

/// A stored document record. `extracted_text` stays `None` until the
/// background extraction unit writes it; `is_deleted` hides the row from
/// all public queries without removing it.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub file_kind: FileKind,
    pub file_size: i64,
    pub extracted_text: Option<String>,
    pub is_deleted: bool,
    pub owner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub tags: Vec<Tag>,
}

/// A tag shared across documents by reference. Names are stored
/// lower-cased and trimmed; tags are created lazily and never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Independently optional filters for document listing.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilters {
    pub owner_id: Option<String>,
    pub file_kind: Option<FileKind>,
    pub tag: Option<String>,
    pub title: Option<String>,
}

/// One page of documents plus the total over the same filter predicate.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub items: Vec<Document>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str_stored(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A persistent conversation thread tying one user to one document.
#[derive(Debug, Clone, Serialize)]
pub struct QaSession {
    pub id: i64,
    pub user_id: String,
    pub document_id: String,
    pub created_at: i64,
}

/// An immutable, append-only message within a session.
#[derive(Debug, Clone, Serialize)]
pub struct QaMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: i64,
}

/// Result of a Q&A exchange: the new answer plus the session's full
/// message history in ascending creation order.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub session_id: i64,
    pub messages: Vec<QaMessage>,
}

/// Administrative counters over the document store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub deleted_documents: i64,
    pub uploads_today: i64,
}
