//! CRUD operations for [`Document`] records.
//!
//! Every read joins the owner row: the owner's role drives the department
//! gate, so a document is never handed out without it.

use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value};
use uuid::Uuid;

use varsity_shared::{DocumentCategory, FileRef};

use crate::convert;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Document, NewDocument, Owner};

const DOCUMENT_COLUMNS: &str = "d.id, d.title, d.description, d.locator, d.original_name, \
     d.mime_type, d.size, d.category, d.access_level, d.department, d.tags, \
     d.download_count, d.is_active, d.created_at, d.updated_at, \
     u.id, u.name, u.email, u.role";

const DOCUMENT_FROM: &str = "FROM documents d JOIN users u ON u.id = d.owner_id";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new document and return the stored record with its owner.
    pub fn create_document(&self, new: &NewDocument) -> Result<Document> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO documents (id, title, description, locator, original_name, mime_type,
                                    size, owner_id, category, access_level, department, tags,
                                    download_count, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, 1, ?13, ?13)",
            params![
                id.to_string(),
                new.title,
                new.description,
                new.file.locator,
                new.file.original_name,
                new.file.mime_type,
                new.file.size,
                new.owner_id.to_string(),
                new.category.as_str(),
                serde_json::to_string(&new.access_level)?,
                new.department,
                serde_json::to_string(&new.tags)?,
                now.to_rfc3339(),
            ],
        )?;

        self.get_document(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single document by UUID.
    pub fn get_document(&self, id: Uuid) -> Result<Document> {
        self.conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} {DOCUMENT_FROM} WHERE d.id = ?1"),
                params![id.to_string()],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all active documents, newest first, with optional server-side
    /// category/department filters. Visibility filtering happens in the
    /// policy layer, not here.
    pub fn list_active_documents(
        &self,
        category: Option<DocumentCategory>,
        department: Option<&str>,
    ) -> Result<Vec<Document>> {
        let mut clauses = vec!["d.is_active = 1".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = category {
            values.push(Value::from(category.as_str().to_string()));
            clauses.push(format!("d.category = ?{}", values.len()));
        }
        if let Some(dept) = department {
            values.push(Value::from(dept.to_string()));
            clauses.push(format!("d.department = ?{}", values.len()));
        }

        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} {DOCUMENT_FROM}
             WHERE {}
             ORDER BY d.created_at DESC",
            clauses.join(" AND ")
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_document)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row?);
        }
        Ok(documents)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist the mutable metadata fields of an already-fetched document.
    /// The stored file reference and the download counter are immutable here;
    /// the counter moves only through
    /// [`Database::increment_document_downloads`].
    pub fn update_document(&self, document: &Document) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET title = ?2, description = ?3, category = ?4, access_level = ?5,
                 department = ?6, tags = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                document.id.to_string(),
                document.title,
                document.description,
                document.category.as_str(),
                serde_json::to_string(&document.access_level)?,
                document.department,
                serde_json::to_string(&document.tags)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Atomically bump the download counter against the persisted value.
    ///
    /// Single read-modify-write statement, so concurrent downloads of the same
    /// document never lose an increment.
    pub fn increment_document_downloads(&self, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET download_count = download_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a document row. Returns `true` if a row was deleted.
    /// Releasing the underlying stored file is the caller's concern.
    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a joined `rusqlite::Row` to a [`Document`].
fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let locator: String = row.get(3)?;
    let original_name: String = row.get(4)?;
    let mime_type: String = row.get(5)?;
    let size: i64 = row.get(6)?;
    let category_str: String = row.get(7)?;
    let access_level_json: String = row.get(8)?;
    let department: Option<String> = row.get(9)?;
    let tags_json: String = row.get(10)?;
    let download_count: i64 = row.get(11)?;
    let is_active_int: i32 = row.get(12)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;
    let owner_id_str: String = row.get(15)?;
    let owner_name: String = row.get(16)?;
    let owner_email: String = row.get(17)?;
    let owner_role_str: String = row.get(18)?;

    Ok(Document {
        id: convert::uuid_col(0, &id_str)?,
        title,
        description,
        file: FileRef {
            locator,
            original_name,
            mime_type,
            size,
        },
        owner: Owner {
            id: convert::uuid_col(15, &owner_id_str)?,
            name: owner_name,
            email: owner_email,
            role: convert::enum_col(18, &owner_role_str)?,
        },
        category: convert::enum_col(7, &category_str)?,
        access_level: convert::json_col(8, &access_level_json)?,
        department,
        tags: convert::json_col(10, &tags_json)?,
        download_count,
        is_active: is_active_int != 0,
        created_at: convert::timestamp_col(13, &created_str)?,
        updated_at: convert::timestamp_col(14, &updated_str)?,
    })
}
