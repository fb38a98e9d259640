//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use varsity_shared::{Audience, DocumentCategory, EventType, FileRef, NoticeCategory, Role};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered portal user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Meaningful for faculty and students; admins are department-less.
    pub department: Option<String>,
    /// Institutional student id, set for students only.
    pub student_id: Option<String>,
    /// Cleared instead of deleting the row (soft delete).
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new [`User`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub student_id: Option<String>,
}

/// Owner identity joined onto documents and notices.
///
/// The owner's role drives the department gate, so it is always fetched
/// together with the owned item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A standalone stored document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub file: FileRef,
    pub owner: Owner,
    pub category: DocumentCategory,
    /// Never empty; `all` is shorthand for every role.
    pub access_level: Vec<Audience>,
    pub department: Option<String>,
    pub tags: Vec<String>,
    /// Monotonic; only incremented on successful download.
    pub download_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new [`Document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: String,
    pub file: FileRef,
    pub owner_id: Uuid,
    pub category: DocumentCategory,
    pub access_level: Vec<Audience>,
    pub department: Option<String>,
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Notice
// ---------------------------------------------------------------------------

/// A file attached to a notice.
///
/// Attachments are owned by exactly one notice and have no persistent
/// identity of their own; while one exists it is addressed by its positional
/// index within the notice's current attachment list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    #[serde(flatten)]
    pub file: FileRef,
    #[serde(default)]
    pub download_count: i64,
}

impl Attachment {
    pub fn new(file: FileRef) -> Self {
        Self {
            file,
            download_count: 0,
        }
    }
}

/// A posted notice with an ordered attachment list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
    pub owner: Owner,
    pub target_audience: Vec<Audience>,
    /// Order is semantically significant: removal shifts later indices.
    pub attachments: Vec<Attachment>,
    pub department: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new [`Notice`].
#[derive(Debug, Clone)]
pub struct NewNotice {
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
    pub owner_id: Uuid,
    pub target_audience: Vec<Audience>,
    pub attachments: Vec<Attachment>,
    pub department: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Calendar event
// ---------------------------------------------------------------------------

/// An academic calendar event. Events are global: every authenticated user
/// sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub owner: Owner,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new [`CalendarEvent`].
#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub owner_id: Uuid,
}
