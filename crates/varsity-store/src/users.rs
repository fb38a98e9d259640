//! CRUD operations for [`User`] records.

use chrono::Utc;
use rusqlite::{params, params_from_iter, types::Value};
use uuid::Uuid;

use varsity_shared::{PageRequest, Role};

use crate::convert;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str =
    "id, name, email, role, department, student_id, is_active, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user and return the stored record.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO users (id, name, email, role, department, student_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
            params![
                id.to_string(),
                new.name,
                new.email,
                new.role.as_str(),
                new.department,
                new.student_id,
                now.to_rfc3339(),
            ],
        )?;

        self.get_user(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by UUID.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List users with optional role filter and name/email/student-id search,
    /// newest first, paginated in SQL. Returns the page plus the total match
    /// count.
    pub fn list_users(
        &self,
        role: Option<Role>,
        search: Option<&str>,
        page: &PageRequest,
    ) -> Result<(Vec<User>, usize)> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(role) = role {
            values.push(Value::from(role.as_str().to_string()));
            clauses.push(format!("role = ?{}", values.len()));
        }
        push_search_clause(&mut clauses, &mut values, search);

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        self.query_user_page(&where_sql, values, page)
    }

    /// List students, optionally restricted to one department, with the same
    /// search semantics as [`Database::list_users`].
    pub fn list_students(
        &self,
        department: Option<&str>,
        search: Option<&str>,
        page: &PageRequest,
    ) -> Result<(Vec<User>, usize)> {
        let mut clauses = vec!["role = 'student'".to_string()];
        let mut values: Vec<Value> = Vec::new();

        if let Some(dept) = department {
            values.push(Value::from(dept.to_string()));
            clauses.push(format!("department = ?{}", values.len()));
        }
        push_search_clause(&mut clauses, &mut values, search);

        let where_sql = format!("WHERE {}", clauses.join(" AND "));
        self.query_user_page(&where_sql, values, page)
    }

    /// All active students, optionally department-scoped. Used to resolve
    /// notice broadcast recipients.
    pub fn list_active_students(&self, department: Option<&str>) -> Result<Vec<User>> {
        let sql = match department {
            Some(_) => format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE role = 'student' AND is_active = 1 AND department = ?1
                 ORDER BY created_at DESC"
            ),
            None => format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE role = 'student' AND is_active = 1
                 ORDER BY created_at DESC"
            ),
        };

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = match department {
            Some(dept) => stmt.query_map(params![dept], row_to_user)?,
            None => stmt.query_map([], row_to_user)?,
        };

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Persist the mutable fields of an already-fetched user.
    pub fn update_user(&self, user: &User) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users
             SET name = ?2, email = ?3, role = ?4, department = ?5,
                 student_id = ?6, is_active = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.role.as_str(),
                user.department,
                user.student_id,
                user.is_active as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete: clear `is_active` but keep the row so referencing items
    /// stay resolvable. Returns `true` if a row was updated.
    pub fn deactivate_user(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn query_user_page(
        &self,
        where_sql: &str,
        values: Vec<Value>,
        page: &PageRequest,
    ) -> Result<(Vec<User>, usize)> {
        let total: usize = self.conn().query_row(
            &format!("SELECT COUNT(*) FROM users {where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {where_sql}
             ORDER BY created_at DESC
             LIMIT {} OFFSET {}",
            page.limit,
            page.offset()
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok((users, total))
    }
}

/// Append a case-insensitive name/email/student-id substring clause.
fn push_search_clause(clauses: &mut Vec<String>, values: &mut Vec<Value>, search: Option<&str>) {
    if let Some(term) = search {
        let pattern = format!("%{}%", term.to_lowercase());
        values.push(Value::from(pattern));
        let n = values.len();
        clauses.push(format!(
            "(lower(name) LIKE ?{n} OR lower(email) LIKE ?{n} OR lower(coalesce(student_id, '')) LIKE ?{n})"
        ));
    }
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let role_str: String = row.get(3)?;
    let department: Option<String> = row.get(4)?;
    let student_id: Option<String> = row.get(5)?;
    let is_active_int: i32 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(User {
        id: convert::uuid_col(0, &id_str)?,
        name,
        email,
        role: convert::enum_col(3, &role_str)?,
        department,
        student_id,
        is_active: is_active_int != 0,
        created_at: convert::timestamp_col(7, &created_str)?,
        updated_at: convert::timestamp_col(8, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn student(name: &str, email: &str, dept: Option<&str>) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Student,
            department: dept.map(String::from),
            student_id: Some(format!("S-{name}")),
        }
    }

    #[test]
    fn create_and_get_round_trip() {
        let (db, _dir) = test_db();
        let user = db.create_user(&student("ada", "ada@uni.edu", Some("CS"))).unwrap();

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched, user);
        assert!(fetched.is_active);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (db, _dir) = test_db();
        assert!(matches!(db.get_user(Uuid::new_v4()), Err(StoreError::NotFound)));
    }

    #[test]
    fn list_users_filters_and_paginates() {
        let (db, _dir) = test_db();
        for i in 0..5 {
            db.create_user(&student(&format!("s{i}"), &format!("s{i}@uni.edu"), Some("CS")))
                .unwrap();
        }
        db.create_user(&NewUser {
            name: "prof".into(),
            email: "prof@uni.edu".into(),
            role: Role::Faculty,
            department: Some("CS".into()),
            student_id: None,
        })
        .unwrap();

        let (page, total) = db
            .list_users(Some(Role::Student), None, &PageRequest::new(1, 3))
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 3);

        let (page, total) = db.list_users(None, Some("PROF"), &PageRequest::default()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "prof");
    }

    #[test]
    fn deactivate_hides_from_active_students() {
        let (db, _dir) = test_db();
        let kept = db.create_user(&student("kept", "kept@uni.edu", Some("CS"))).unwrap();
        let gone = db.create_user(&student("gone", "gone@uni.edu", Some("CS"))).unwrap();

        assert!(db.deactivate_user(gone.id).unwrap());

        let active = db.list_active_students(Some("CS")).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, kept.id);

        // but the row is still resolvable
        let fetched = db.get_user(gone.id).unwrap();
        assert!(!fetched.is_active);
    }

    #[test]
    fn list_students_scopes_by_department() {
        let (db, _dir) = test_db();
        db.create_user(&student("cs", "cs@uni.edu", Some("CS"))).unwrap();
        db.create_user(&student("ee", "ee@uni.edu", Some("EE"))).unwrap();

        let (page, total) = db
            .list_students(Some("EE"), None, &PageRequest::default())
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "ee");
    }
}
