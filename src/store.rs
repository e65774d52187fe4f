//! Document store: record creation, tag association, filtered/paginated
//! listing, substring search, and the ownership-checked mutations.
//!
//! All queries exclude soft-deleted rows except the explicitly
//! administrative ones. Listing order is creation time descending with
//! `rowid` as the stable tie-break (insertion order). The count for a page
//! is computed over the same filter predicate as the slice itself.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{DomainError, Result};
use crate::models::{Document, DocumentFilters, DocumentPage, FileKind, StoreStats, Tag};

/// Role string that bypasses ownership checks on mutations.
pub const ADMIN_ROLE: &str = "admin";

/// Hard bounds on page size; requests outside are clamped, never rejected.
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new document record plus its tag associations in one
    /// transaction. The file bytes must already be on disk — the record
    /// becomes visible only after this commits.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_document(
        &self,
        id: &str,
        title: &str,
        file_path: &str,
        file_kind: FileKind,
        file_size: i64,
        owner_id: &str,
        tag_names: &[String],
    ) -> Result<Document> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, file_path, file_kind, file_size,
                                   extracted_text, is_deleted, owner_id,
                                   created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, 0, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(file_path)
        .bind(file_kind.as_str())
        .bind(file_size)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for name in tag_names {
            let Some(tag) = get_or_create_tag(&mut tx, name).await? else {
                continue;
            };
            sqlx::query(
                "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(tag.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Fetch a non-deleted document with its tags.
    pub async fn get(&self, id: &str) -> Result<Document> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut doc = row_to_document(&row)?;
                doc.tags = self.tags_for(&doc.id).await?;
                Ok(doc)
            }
            None => Err(DomainError::NotFound("Document not found".to_string())),
        }
    }

    /// Administrative fetch that ignores the soft-delete flag. Soft-deleted
    /// rows stay retrievable here even though every public query hides them.
    pub async fn get_including_deleted(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut doc = row_to_document(&row)?;
                doc.tags = self.tags_for(&doc.id).await?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Filtered, paginated listing over non-deleted documents.
    ///
    /// `page` is 1-indexed; `size` is clamped to `[1, MAX_PAGE_SIZE]`. A
    /// page past the end yields an empty item list with the correct total.
    pub async fn list(
        &self,
        filters: &DocumentFilters,
        page: i64,
        size: i64,
    ) -> Result<DocumentPage> {
        let mut where_sql = String::from("is_deleted = 0");
        let mut binds: Vec<String> = Vec::new();

        if let Some(owner) = &filters.owner_id {
            where_sql.push_str(" AND owner_id = ?");
            binds.push(owner.clone());
        }
        if let Some(kind) = filters.file_kind {
            where_sql.push_str(" AND file_kind = ?");
            binds.push(kind.as_str().to_string());
        }
        if let Some(title) = &filters.title {
            where_sql.push_str(" AND title LIKE ?");
            binds.push(format!("%{title}%"));
        }
        if let Some(tag) = &filters.tag {
            where_sql.push_str(
                " AND id IN (SELECT dt.document_id FROM document_tags dt \
                 JOIN tags t ON t.id = dt.tag_id WHERE t.name = ?)",
            );
            // Stored tag names are normalized, so normalize the filter too
            binds.push(tag.trim().to_lowercase());
        }

        self.fetch_page(&where_sql, &binds, page, size).await
    }

    /// Case-insensitive substring search over title OR extracted text,
    /// with the same ordering and pagination rules as [`Self::list`].
    pub async fn search(&self, query: &str, page: i64, size: i64) -> Result<DocumentPage> {
        let where_sql =
            "is_deleted = 0 AND (title LIKE ? OR extracted_text LIKE ?)".to_string();
        let pattern = format!("%{query}%");
        let binds = vec![pattern.clone(), pattern];
        self.fetch_page(&where_sql, &binds, page, size).await
    }

    async fn fetch_page(
        &self,
        where_sql: &str,
        binds: &[String],
        page: i64,
        size: i64,
    ) -> Result<DocumentPage> {
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let page = page.max(1);

        let count_sql = format!("SELECT COUNT(*) FROM documents WHERE {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT * FROM documents WHERE {where_sql} \
             ORDER BY created_at DESC, rowid ASC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query(&page_sql);
        for bind in binds {
            page_query = page_query.bind(bind);
        }
        // Saturate so an absurd page number stays a valid (empty) page
        let offset = (page - 1).saturating_mul(size);
        let rows = page_query
            .bind(size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut doc = row_to_document(row)?;
            doc.tags = self.tags_for(&doc.id).await?;
            items.push(doc);
        }

        let pages = if total > 0 {
            (total + size - 1) / size
        } else {
            0
        };

        Ok(DocumentPage {
            items,
            total,
            page,
            size,
            pages,
        })
    }

    /// Update title and/or replace the tag set. Only the owner or an admin
    /// may mutate; `None` fields are left untouched, `Some(vec![])` tags
    /// clears the association.
    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        role: &str,
        title: Option<String>,
        tag_names: Option<Vec<String>>,
    ) -> Result<Document> {
        let doc = self.get(id).await?;
        authorize_mutation(&doc, user_id, role, "update")?;

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        if let Some(title) = &title {
            sqlx::query("UPDATE documents SET title = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE documents SET updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(names) = &tag_names {
            sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for name in names {
                let Some(tag) = get_or_create_tag(&mut tx, name).await? else {
                    continue;
                };
                sqlx::query(
                    "INSERT OR IGNORE INTO document_tags (document_id, tag_id) VALUES (?, ?)",
                )
                .bind(id)
                .bind(tag.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Set the deletion flag. Idempotent; the record and its file remain.
    pub async fn soft_delete(&self, id: &str, user_id: &str, role: &str) -> Result<()> {
        let doc = self
            .get_including_deleted(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Document not found".to_string()))?;
        authorize_mutation(&doc, user_id, role, "delete")?;

        sqlx::query("UPDATE documents SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Write the extraction result. Runs in its own transaction — this is
    /// the background unit's independent write-back, decoupled from the
    /// upload that created the record.
    pub async fn update_extracted_text(&self, id: &str, text: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE documents SET extracted_text = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Administrative counters: live documents, deleted documents, and
    /// uploads since UTC midnight.
    pub async fn stats(&self) -> Result<StoreStats> {
        let documents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE is_deleted = 0")
                .fetch_one(&self.pool)
                .await?;
        let deleted_documents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE is_deleted = 1")
                .fetch_one(&self.pool)
                .await?;

        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let uploads_today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE is_deleted = 0 AND created_at >= ?",
        )
        .bind(today_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            documents,
            deleted_documents,
            uploads_today,
        })
    }

    async fn tags_for(&self, document_id: &str) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT t.id, t.name FROM tags t \
             JOIN document_tags dt ON dt.tag_id = t.id \
             WHERE dt.document_id = ? ORDER BY t.name ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Tag {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}

fn authorize_mutation(doc: &Document, user_id: &str, role: &str, verb: &str) -> Result<()> {
    if doc.owner_id != user_id && role != ADMIN_ROLE {
        return Err(DomainError::Forbidden(format!(
            "You can only {verb} your own documents"
        )));
    }
    Ok(())
}

/// Tag names are lower-cased and trimmed before lookup/creation, so the
/// UNIQUE constraint on `tags.name` is the case-insensitive identity.
/// Returns `None` for names that normalize to empty.
///
/// A concurrent insert of the same name surfaces as a uniqueness violation;
/// that is resolved by re-reading rather than failing the caller.
pub async fn get_or_create_tag(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Tag>> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return Ok(None);
    }

    if let Some(row) = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
        .bind(&normalized)
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok(Some(Tag {
            id: row.get("id"),
            name: row.get("name"),
        }));
    }

    let inserted = sqlx::query("INSERT INTO tags (name) VALUES (?)")
        .bind(&normalized)
        .execute(&mut *conn)
        .await;

    match inserted {
        Ok(result) => Ok(Some(Tag {
            id: result.last_insert_rowid(),
            name: normalized,
        })),
        Err(e) => {
            let unique_conflict = e
                .as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false);
            if !unique_conflict {
                return Err(e.into());
            }
            // Lost the race to another writer: the tag exists now
            let row = sqlx::query("SELECT id, name FROM tags WHERE name = ?")
                .bind(&normalized)
                .fetch_one(&mut *conn)
                .await?;
            Ok(Some(Tag {
                id: row.get("id"),
                name: row.get("name"),
            }))
        }
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let kind_str: String = row.get("file_kind");
    let file_kind = FileKind::from_str_stored(&kind_str).ok_or_else(|| {
        DomainError::Db(sqlx::Error::Decode(
            format!("unknown file_kind: {kind_str}").into(),
        ))
    })?;
    let is_deleted: i64 = row.get("is_deleted");

    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        file_kind,
        file_size: row.get("file_size"),
        extracted_text: row.get("extracted_text"),
        is_deleted: is_deleted != 0,
        owner_id: row.get("owner_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        tags: Vec::new(),
    })
}
