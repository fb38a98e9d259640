//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `documents`, `notices`, and
//! `events`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    name        TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    role        TEXT NOT NULL,               -- admin | faculty | student
    department  TEXT,
    student_id  TEXT,
    is_active   INTEGER NOT NULL DEFAULT 1,  -- boolean 0/1
    created_at  TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role_dept ON users(role, department);

-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    title          TEXT NOT NULL,
    description    TEXT NOT NULL DEFAULT '',
    locator        TEXT NOT NULL,             -- opaque stored-file locator
    original_name  TEXT NOT NULL,
    mime_type      TEXT NOT NULL,
    size           INTEGER NOT NULL,
    owner_id       TEXT NOT NULL,             -- FK -> users(id)
    category       TEXT NOT NULL,
    access_level   TEXT NOT NULL,             -- JSON array of audience strings
    department     TEXT,
    tags           TEXT NOT NULL,             -- JSON array of strings
    download_count INTEGER NOT NULL DEFAULT 0,
    is_active      INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_documents_active_created
    ON documents(is_active, created_at DESC);

-- ----------------------------------------------------------------
-- Notices
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notices (
    id              TEXT PRIMARY KEY NOT NULL, -- UUID v4
    title           TEXT NOT NULL,
    content         TEXT NOT NULL,
    category        TEXT NOT NULL,
    owner_id        TEXT NOT NULL,             -- FK -> users(id)
    target_audience TEXT NOT NULL,             -- JSON array of audience strings
    attachments     TEXT NOT NULL,             -- ordered JSON array
    department      TEXT,
    expiry_date     TEXT,                      -- nullable ISO-8601
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_notices_active_created
    ON notices(is_active, created_at DESC);

-- ----------------------------------------------------------------
-- Calendar events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    event_type  TEXT NOT NULL,
    start_date  TEXT NOT NULL,               -- ISO-8601
    end_date    TEXT NOT NULL,
    owner_id    TEXT NOT NULL,               -- FK -> users(id)
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_events_active_start
    ON events(is_active, start_date);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
