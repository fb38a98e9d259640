//! CRUD operations for [`Notice`] records.
//!
//! Attachments live inside the notice row as an ordered JSON array, so a
//! structural edit (remove/append) is persisted by a single `UPDATE` and can
//! never interleave half-applied with a concurrent edit. Per-attachment
//! download counters are bumped in place with SQLite's JSON functions.

use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value};
use uuid::Uuid;

use varsity_shared::NoticeCategory;

use crate::convert;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewNotice, Notice, Owner};

const NOTICE_COLUMNS: &str = "n.id, n.title, n.content, n.category, n.target_audience, \
     n.attachments, n.department, n.expiry_date, n.is_active, n.created_at, n.updated_at, \
     u.id, u.name, u.email, u.role";

const NOTICE_FROM: &str = "FROM notices n JOIN users u ON u.id = n.owner_id";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new notice and return the stored record with its owner.
    pub fn create_notice(&self, new: &NewNotice) -> Result<Notice> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO notices (id, title, content, category, owner_id, target_audience,
                                  attachments, department, expiry_date, is_active,
                                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            params![
                id.to_string(),
                new.title,
                new.content,
                new.category.as_str(),
                new.owner_id.to_string(),
                serde_json::to_string(&new.target_audience)?,
                serde_json::to_string(&new.attachments)?,
                new.department,
                new.expiry_date.map(|d| d.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )?;

        self.get_notice(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single notice by UUID.
    pub fn get_notice(&self, id: Uuid) -> Result<Notice> {
        self.conn()
            .query_row(
                &format!("SELECT {NOTICE_COLUMNS} {NOTICE_FROM} WHERE n.id = ?1"),
                params![id.to_string()],
                row_to_notice,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all active notices, newest first, with an optional server-side
    /// category filter. Expiry and visibility are applied by the policy
    /// layer over this snapshot.
    pub fn list_active_notices(&self, category: Option<NoticeCategory>) -> Result<Vec<Notice>> {
        let mut clauses = vec!["n.is_active = 1".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = category {
            values.push(Value::from(category.as_str().to_string()));
            clauses.push(format!("n.category = ?{}", values.len()));
        }

        let sql = format!(
            "SELECT {NOTICE_COLUMNS} {NOTICE_FROM}
             WHERE {}
             ORDER BY n.created_at DESC",
            clauses.join(" AND ")
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_notice)?;

        let mut notices = Vec::new();
        for row in rows {
            notices.push(row?);
        }
        Ok(notices)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist the mutable fields of an already-fetched notice, including the
    /// full attachment list, in one statement.
    pub fn update_notice(&self, notice: &Notice) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE notices
             SET title = ?2, content = ?3, category = ?4, target_audience = ?5,
                 attachments = ?6, department = ?7, expiry_date = ?8, updated_at = ?9
             WHERE id = ?1",
            params![
                notice.id.to_string(),
                notice.title,
                notice.content,
                notice.category.as_str(),
                serde_json::to_string(&notice.target_audience)?,
                serde_json::to_string(&notice.attachments)?,
                notice.department,
                notice.expiry_date.map(|d| d.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Atomically bump the download counter of the attachment at `index`.
    ///
    /// The read-modify-write happens inside one statement against the
    /// persisted JSON value, so concurrent downloads of the same attachment
    /// never lose an increment. An out-of-range index or unknown notice is
    /// `NotFound`.
    pub fn increment_attachment_downloads(&self, notice_id: Uuid, index: usize) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE notices
             SET attachments = json_set(
                     attachments,
                     '$[' || ?2 || '].download_count',
                     json_extract(attachments, '$[' || ?2 || '].download_count') + 1
                 ),
                 updated_at = ?3
             WHERE id = ?1
               AND json_array_length(attachments) > ?2",
            params![
                notice_id.to_string(),
                index as i64,
                Utc::now().to_rfc3339()
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a notice row. Returns `true` if a row was deleted.
    /// Releasing the attachments' stored files is the caller's concern.
    pub fn delete_notice(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM notices WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a joined `rusqlite::Row` to a [`Notice`].
fn row_to_notice(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notice> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let content: String = row.get(2)?;
    let category_str: String = row.get(3)?;
    let audience_json: String = row.get(4)?;
    let attachments_json: String = row.get(5)?;
    let department: Option<String> = row.get(6)?;
    let expiry_str: Option<String> = row.get(7)?;
    let is_active_int: i32 = row.get(8)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;
    let owner_id_str: String = row.get(11)?;
    let owner_name: String = row.get(12)?;
    let owner_email: String = row.get(13)?;
    let owner_role_str: String = row.get(14)?;

    Ok(Notice {
        id: convert::uuid_col(0, &id_str)?,
        title,
        content,
        category: convert::enum_col(3, &category_str)?,
        owner: Owner {
            id: convert::uuid_col(11, &owner_id_str)?,
            name: owner_name,
            email: owner_email,
            role: convert::enum_col(14, &owner_role_str)?,
        },
        target_audience: convert::json_col(4, &audience_json)?,
        attachments: convert::json_col(5, &attachments_json)?,
        department,
        expiry_date: convert::opt_timestamp_col(7, expiry_str)?,
        is_active: is_active_int != 0,
        created_at: convert::timestamp_col(9, &created_str)?,
        updated_at: convert::timestamp_col(10, &updated_str)?,
    })
}
