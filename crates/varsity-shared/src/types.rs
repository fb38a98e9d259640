use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when parsing one of the closed vocabulary enums fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Roles and audiences
// ---------------------------------------------------------------------------

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
            Role::Student => "student",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "faculty" => Ok(Role::Faculty),
            "student" => Ok(Role::Student),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a document access-level or notice target-audience set.
///
/// `All` is the shorthand meaning every role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Admin,
    Faculty,
    Student,
    All,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Admin => "admin",
            Audience::Faculty => "faculty",
            Audience::Student => "student",
            Audience::All => "all",
        }
    }
}

impl std::str::FromStr for Audience {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Audience::Admin),
            "faculty" => Ok(Audience::Faculty),
            "student" => Ok(Audience::Student),
            "all" => Ok(Audience::All),
            other => Err(ParseEnumError::new("audience", other)),
        }
    }
}

impl From<Role> for Audience {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => Audience::Admin,
            Role::Faculty => Audience::Faculty,
            Role::Student => Audience::Student,
        }
    }
}

/// The accessibility gate: does this audience set admit the given role?
pub fn audience_allows(audiences: &[Audience], role: Role) -> bool {
    audiences
        .iter()
        .any(|a| *a == Audience::All || *a == Audience::from(role))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// Category of a stored document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Academic,
    Administrative,
    Syllabus,
    Form,
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Academic => "academic",
            DocumentCategory::Administrative => "administrative",
            DocumentCategory::Syllabus => "syllabus",
            DocumentCategory::Form => "form",
            DocumentCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for DocumentCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "academic" => Ok(DocumentCategory::Academic),
            "administrative" => Ok(DocumentCategory::Administrative),
            "syllabus" => Ok(DocumentCategory::Syllabus),
            "form" => Ok(DocumentCategory::Form),
            "other" => Ok(DocumentCategory::Other),
            other => Err(ParseEnumError::new("document category", other)),
        }
    }
}

/// Category of a notice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeCategory {
    General,
    Academic,
    Event,
    Important,
}

impl NoticeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeCategory::General => "general",
            NoticeCategory::Academic => "academic",
            NoticeCategory::Event => "event",
            NoticeCategory::Important => "important",
        }
    }

    /// Fixed mapping used when a notice attachment is projected into the
    /// document feed.
    pub fn as_document_category(&self) -> DocumentCategory {
        match self {
            NoticeCategory::Academic => DocumentCategory::Academic,
            NoticeCategory::General => DocumentCategory::Other,
            NoticeCategory::Event => DocumentCategory::Other,
            NoticeCategory::Important => DocumentCategory::Administrative,
        }
    }
}

impl std::str::FromStr for NoticeCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(NoticeCategory::General),
            "academic" => Ok(NoticeCategory::Academic),
            "event" => Ok(NoticeCategory::Event),
            "important" => Ok(NoticeCategory::Important),
            other => Err(ParseEnumError::new("notice category", other)),
        }
    }
}

/// Kind of an academic calendar event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Holiday,
    Exam,
    Deadline,
    Event,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Holiday => "holiday",
            EventType::Exam => "exam",
            EventType::Deadline => "deadline",
            EventType::Event => "event",
            EventType::Other => "other",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "holiday" => Ok(EventType::Holiday),
            "exam" => Ok(EventType::Exam),
            "deadline" => Ok(EventType::Deadline),
            "event" => Ok(EventType::Event),
            "other" => Ok(EventType::Other),
            other => Err(ParseEnumError::new("event type", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// The authenticated identity performing an operation.
///
/// Resolved by an upstream authentication layer; this crate never
/// authenticates, only authorizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub department: Option<String>,
}

impl Actor {
    pub fn new(id: Uuid, role: Role, department: Option<String>) -> Self {
        Self {
            id,
            role,
            department,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ---------------------------------------------------------------------------
// Stored-file reference
// ---------------------------------------------------------------------------

/// Reference to a file held by the stored-file service.
///
/// The locator is opaque to everything except the file store implementation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub locator: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Build a page request, correcting out-of-range values instead of
    /// failing: page 0 becomes 1, limit is clamped to
    /// [`crate::constants::MAX_PAGE_LIMIT`] and 0 becomes the default.
    pub fn new(page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let limit = match limit {
            0 => crate::constants::DEFAULT_PAGE_LIMIT,
            n => n.min(crate::constants::MAX_PAGE_LIMIT),
        };
        Self { page, limit }
    }

    /// Number of leading items skipped by this page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, crate::constants::DEFAULT_PAGE_LIMIT)
    }
}
