//! QA session manager: per-document conversation threads.
//!
//! Owns the `qa_sessions` and `qa_messages` tables. A (user, document)
//! pair reuses its most recently created session for every question;
//! messages are append-only and returned in ascending creation order.
//! Context for the answer engine is built from the first chunks of the
//! document's extracted text — later chunks are dropped, a deliberate
//! bound on context size rather than a quality optimization.
//!
//! When no engine credential is configured, a keyword fallback answers
//! from matching paragraphs instead; that path is not an error.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::answer::AnswerEngine;
use crate::chunk::chunk_text;
use crate::config::QaConfig;
use crate::error::{DomainError, Result};
use crate::models::{AskResponse, MessageRole, QaMessage, QaSession};
use crate::store::DocumentStore;

/// How many leading chunks make up the engine context.
pub const CONTEXT_CHUNKS: usize = 3;

/// Separator placed between chunks in the assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

const NOTICE_EXCERPTS: &str = "AI is not configured. Here are relevant excerpts:\n\n";
const NOTICE_NO_MATCH: &str =
    "AI is not configured. No relevant excerpts found for your question.";

pub struct QaService {
    store: DocumentStore,
    chunk_max_chars: usize,
    engine: Option<Box<dyn AnswerEngine>>,
}

impl QaService {
    pub fn new(
        pool: SqlitePool,
        config: &QaConfig,
        engine: Option<Box<dyn AnswerEngine>>,
    ) -> Self {
        Self {
            store: DocumentStore::new(pool),
            chunk_max_chars: config.chunk_max_chars,
            engine,
        }
    }

    /// Answer a question about one document, recording the exchange in the
    /// caller's session for that document.
    ///
    /// Fails with `NotFound` for an unknown or soft-deleted document and
    /// with `Precondition` while extraction has not yet produced text. An
    /// engine fault propagates after the user message was persisted; that
    /// partial exchange is accepted, not repaired.
    pub async fn ask(
        &self,
        document_id: &str,
        user_id: &str,
        question: &str,
    ) -> Result<AskResponse> {
        let doc = self.store.get(document_id).await?;

        let text = match doc.extracted_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => {
                return Err(DomainError::Precondition(
                    "No extracted text available for this document. \
                     Extraction may still be processing."
                        .to_string(),
                ))
            }
        };

        let session = self.find_or_create_session(user_id, document_id).await?;
        self.add_message(session.id, MessageRole::User, question)
            .await?;

        let answer = match &self.engine {
            Some(engine) => {
                let chunks = chunk_text(text, self.chunk_max_chars);
                let context = chunks
                    .iter()
                    .take(CONTEXT_CHUNKS)
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(CONTEXT_SEPARATOR);
                engine.answer(question, &context).await?
            }
            None => fallback_answer(question, text),
        };

        self.add_message(session.id, MessageRole::Assistant, &answer)
            .await?;

        let messages = self.session_messages(session.id).await?;
        Ok(AskResponse {
            answer,
            session_id: session.id,
            messages,
        })
    }

    /// Reuse the most recently created session for (user, document), or
    /// start a new one. The lookup-then-create window under concurrency is
    /// accepted as a rare, non-corrupting duplication.
    async fn find_or_create_session(
        &self,
        user_id: &str,
        document_id: &str,
    ) -> Result<QaSession> {
        let existing = sqlx::query(
            "SELECT id, user_id, document_id, created_at FROM qa_sessions \
             WHERE user_id = ? AND document_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(document_id)
        .fetch_optional(self.store.pool())
        .await?;

        if let Some(row) = existing {
            return Ok(QaSession {
                id: row.get("id"),
                user_id: row.get("user_id"),
                document_id: row.get("document_id"),
                created_at: row.get("created_at"),
            });
        }

        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO qa_sessions (user_id, document_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(document_id)
        .bind(now)
        .execute(self.store.pool())
        .await?;

        Ok(QaSession {
            id: result.last_insert_rowid(),
            user_id: user_id.to_string(),
            document_id: document_id.to_string(),
            created_at: now,
        })
    }

    async fn add_message(
        &self,
        session_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<QaMessage> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO qa_messages (session_id, role, content, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(self.store.pool())
        .await?;

        Ok(QaMessage {
            id: result.last_insert_rowid(),
            session_id,
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Full history of a session in ascending creation order.
    async fn session_messages(&self, session_id: i64) -> Result<Vec<QaMessage>> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, created_at FROM qa_messages \
             WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(self.store.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = MessageRole::from_str_stored(&role_str).ok_or_else(|| {
                    DomainError::Db(sqlx::Error::Decode(
                        format!("unknown message role: {role_str}").into(),
                    ))
                })?;
                Ok(QaMessage {
                    id: row.get("id"),
                    session_id: row.get("session_id"),
                    role,
                    content: row.get("content"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}

/// Keyword-matched excerpt answer used when no engine is configured.
///
/// Keywords are the question's lower-cased words longer than three
/// characters; paragraphs containing any keyword as a case-insensitive
/// substring are returned (first three), behind a clear notice. Pure.
pub fn fallback_answer(question: &str, text: &str) -> String {
    let keywords: Vec<String> = question
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();

    let relevant: Vec<&str> = text
        .split("\n\n")
        .filter(|para| {
            let lowered = para.to_lowercase();
            keywords.iter().any(|k| lowered.contains(k.as_str()))
        })
        .take(3)
        .collect();

    if relevant.is_empty() {
        NOTICE_NO_MATCH.to_string()
    } else {
        format!("{NOTICE_EXCERPTS}{}", relevant.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::models::FileKind;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;

    struct CannedEngine(&'static str);

    #[async_trait]
    impl AnswerEngine for CannedEngine {
        async fn answer(&self, _question: &str, _context: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenEngine;

    #[async_trait]
    impl AnswerEngine for BrokenEngine {
        async fn answer(&self, _question: &str, _context: &str) -> Result<String> {
            Err(DomainError::AnswerEngine("completion endpoint returned 503".to_string()))
        }
    }

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();

        let store = DocumentStore::new(pool.clone());
        store
            .create_document(
                "doc-1",
                "Store Policies",
                "/uploads/doc-1.pdf",
                FileKind::Pdf,
                64,
                "user-1",
                &[],
            )
            .await
            .unwrap();
        pool
    }

    fn service(pool: SqlitePool, engine: Option<Box<dyn AnswerEngine>>) -> QaService {
        QaService::new(pool, &QaConfig::default(), engine)
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let pool = seeded_pool().await;
        let qa = service(pool, None);

        let err = qa.ask("ghost", "user-1", "Anything?").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_text_is_a_precondition_failure() {
        let pool = seeded_pool().await;
        let qa = service(pool, None);

        let err = qa
            .ask("doc-1", "user-1", "What is the total?")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Precondition(_)));
    }

    #[tokio::test]
    async fn empty_text_is_also_a_precondition_failure() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "")
            .await
            .unwrap();
        let qa = service(pool, None);

        let err = qa.ask("doc-1", "user-1", "Hello?").await.unwrap_err();
        assert!(matches!(err, DomainError::Precondition(_)));
    }

    #[tokio::test]
    async fn sequential_questions_reuse_the_session() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "Invoice total is 40 euro.\n\nDue by March 1.")
            .await
            .unwrap();
        let qa = service(pool, Some(Box::new(CannedEngine("It is 40 euro."))));

        let first = qa
            .ask("doc-1", "user-1", "What is the total?")
            .await
            .unwrap();
        let second = qa
            .ask("doc-1", "user-1", "When is it due?")
            .await
            .unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.messages.len(), 4);
        let roles: Vec<MessageRole> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant,
            ]
        );
        assert_eq!(second.messages[0].content, "What is the total?");
        assert_eq!(second.messages[2].content, "When is it due?");
    }

    #[tokio::test]
    async fn other_user_gets_their_own_session() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "Some text.")
            .await
            .unwrap();
        let qa = service(pool, Some(Box::new(CannedEngine("ok"))));

        let mine = qa.ask("doc-1", "user-1", "First?").await.unwrap();
        let theirs = qa.ask("doc-1", "user-2", "Second?").await.unwrap();
        assert_ne!(mine.session_id, theirs.session_id);
        assert_eq!(theirs.messages.len(), 2);
    }

    #[tokio::test]
    async fn engine_fault_propagates_with_user_message_kept() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "Some text.")
            .await
            .unwrap();
        let qa = service(pool.clone(), Some(Box::new(BrokenEngine)));

        let err = qa.ask("doc-1", "user-1", "Will this fail?").await.unwrap_err();
        assert!(matches!(err, DomainError::AnswerEngine(_)));

        // The question was persisted before the engine call failed
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_messages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn fallback_returns_matching_paragraphs() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text(
                "doc-1",
                "Shipping takes two weeks.\n\nOur refund policy lasts 30 days.\n\nContact us by mail.",
            )
            .await
            .unwrap();
        let qa = service(pool, None);

        let res = qa
            .ask("doc-1", "user-1", "What is the refund policy?")
            .await
            .unwrap();
        assert!(res.answer.starts_with("AI is not configured."));
        assert!(res.answer.contains("refund policy lasts 30 days"));
        assert_eq!(res.messages.len(), 2);
        assert_eq!(res.messages[1].content, res.answer);
    }

    #[tokio::test]
    async fn fallback_reports_no_match() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "Shipping takes two weeks.")
            .await
            .unwrap();
        let qa = service(pool, None);

        let res = qa
            .ask("doc-1", "user-1", "Anything about dinosaurs?")
            .await
            .unwrap();
        assert!(res.answer.contains("No relevant excerpts found"));
    }

    #[tokio::test]
    async fn fallback_reuses_the_session_too() {
        let pool = seeded_pool().await;
        DocumentStore::new(pool.clone())
            .update_extracted_text("doc-1", "The warranty covers parts.")
            .await
            .unwrap();
        let qa = service(pool, None);

        let first = qa
            .ask("doc-1", "user-1", "What about warranty?")
            .await
            .unwrap();
        let second = qa
            .ask("doc-1", "user-1", "And about parts?")
            .await
            .unwrap();
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.messages.len(), 4);
    }

    #[test]
    fn fallback_ignores_short_words() {
        // Only words longer than 3 chars count; "is", "the" never match
        let text = "is the\n\nNothing relevant here.";
        let answer = fallback_answer("Is the cat in?", text);
        assert!(answer.contains("No relevant excerpts found"));
    }

    #[test]
    fn fallback_word_length_counts_characters_not_bytes() {
        // "Что" is three characters but six bytes; it must not count as
        // a keyword any more than a three-letter ASCII word does
        let text = "что-то про доставку\n\nNothing else.";
        let answer = fallback_answer("Что это?", text);
        assert!(answer.contains("No relevant excerpts found"));
    }

    #[test]
    fn fallback_caps_excerpts_at_three() {
        let text = "refund a\n\nrefund b\n\nrefund c\n\nrefund d";
        let answer = fallback_answer("refund please", text);
        assert!(answer.contains("refund c"));
        assert!(!answer.contains("refund d"));
    }
}
