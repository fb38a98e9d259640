//! The attachment projector: maps a visible notice's attachments into
//! synthetic document-shaped records so both entity families can flow through
//! one feed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use varsity_shared::{Audience, DocumentCategory, FileRef};
use varsity_store::{Notice, Owner};

/// The derived external identity of a notice attachment,
/// `notice_<noticeId>_<index>`.
///
/// The index is positional within the notice's current attachment list and is
/// not stable across structural edits; a stale id simply fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticId {
    pub notice_id: Uuid,
    pub index: usize,
}

impl SyntheticId {
    pub fn new(notice_id: Uuid, index: usize) -> Self {
        Self { notice_id, index }
    }

    /// Parse a synthetic id. Returns `None` on anything malformed: wrong
    /// prefix, wrong segment count, a non-UUID notice id, or a non-numeric
    /// index. Callers treat `None` as not-found, never as an authorization
    /// error.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('_');
        let prefix = parts.next()?;
        let notice_part = parts.next()?;
        let index_part = parts.next()?;
        if prefix != "notice" || parts.next().is_some() {
            return None;
        }

        let notice_id = Uuid::parse_str(notice_part).ok()?;
        let index = index_part.parse::<usize>().ok()?;
        Some(Self { notice_id, index })
    }
}

impl std::fmt::Display for SyntheticId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notice_{}_{}", self.notice_id, self.index)
    }
}

/// An ephemeral, read-only document-shaped view of one notice attachment.
///
/// Indistinguishable in shape from a real document to downstream consumers,
/// except for the explicit `is_notice_attachment` marker and the
/// back-references to the source notice and index. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectedAttachment {
    /// Synthetic id, `notice_<noticeId>_<index>`.
    pub id: String,
    /// The attachment's original filename.
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub file: FileRef,
    pub owner: Owner,
    /// Derived by the fixed notice-to-document category mapping.
    pub category: DocumentCategory,
    /// Projections are always student-scoped.
    pub access_level: Vec<Audience>,
    pub department: Option<String>,
    pub tags: Vec<String>,
    pub download_count: i64,
    pub is_active: bool,
    pub is_notice_attachment: bool,
    pub notice_id: Uuid,
    pub attachment_index: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project the attachment at `index` of `notice`, with no filtering.
/// Returns `None` when the index is out of range.
pub fn project_attachment(notice: &Notice, index: usize) -> Option<ProjectedAttachment> {
    let attachment = notice.attachments.get(index)?;

    Some(ProjectedAttachment {
        id: SyntheticId::new(notice.id, index).to_string(),
        title: attachment.file.original_name.clone(),
        description: format!("Attached to notice: {}", notice.title),
        file: attachment.file.clone(),
        owner: notice.owner.clone(),
        category: notice.category.as_document_category(),
        access_level: vec![Audience::Student],
        department: notice.department.clone(),
        tags: vec![notice.category.as_str().to_string()],
        download_count: attachment.download_count,
        is_active: true,
        is_notice_attachment: true,
        notice_id: notice.id,
        attachment_index: index,
        created_at: notice.created_at,
        updated_at: notice.updated_at,
    })
}

/// Project every attachment of an already-visible notice that passes the
/// feed's search and category filters.
///
/// A search term matches against the notice title or the attachment filename
/// (case-insensitive substring); a category filter compares against the fixed
/// notice-to-document mapping.
pub fn project_notice(
    notice: &Notice,
    search: Option<&str>,
    category: Option<DocumentCategory>,
) -> Vec<ProjectedAttachment> {
    if let Some(wanted) = category {
        if notice.category.as_document_category() != wanted {
            return Vec::new();
        }
    }

    let term = search.map(str::to_lowercase);

    notice
        .attachments
        .iter()
        .enumerate()
        .filter(|(_, attachment)| match &term {
            Some(term) => {
                notice.title.to_lowercase().contains(term)
                    || attachment.file.original_name.to_lowercase().contains(term)
            }
            None => true,
        })
        .filter_map(|(index, _)| project_attachment(notice, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use varsity_shared::{NoticeCategory, Role};
    use varsity_store::Attachment;

    fn notice_with(category: NoticeCategory, names: &[&str]) -> Notice {
        let now = Utc::now();
        Notice {
            id: Uuid::new_v4(),
            title: "Exam Schedule".to_string(),
            content: "see attached".to_string(),
            category,
            owner: Owner {
                id: Uuid::new_v4(),
                name: "prof".to_string(),
                email: "prof@uni.edu".to_string(),
                role: Role::Faculty,
            },
            target_audience: vec![Audience::All],
            attachments: names
                .iter()
                .map(|name| {
                    Attachment::new(FileRef {
                        locator: format!("loc-{name}"),
                        original_name: name.to_string(),
                        mime_type: "application/pdf".to_string(),
                        size: 1,
                    })
                })
                .collect(),
            department: Some("CS".to_string()),
            expiry_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn synthetic_id_round_trip() {
        let notice_id = Uuid::new_v4();
        let id = SyntheticId::new(notice_id, 2);
        let rendered = id.to_string();
        assert_eq!(rendered, format!("notice_{notice_id}_2"));
        assert_eq!(SyntheticId::parse(&rendered), Some(id));
    }

    #[test]
    fn malformed_ids_do_not_parse() {
        let id = Uuid::new_v4();
        assert_eq!(SyntheticId::parse("garbage"), None);
        assert_eq!(SyntheticId::parse("notice_not-a-uuid_0"), None);
        assert_eq!(SyntheticId::parse(&format!("notice_{id}_x")), None);
        assert_eq!(SyntheticId::parse(&format!("notice_{id}_-1")), None);
        assert_eq!(SyntheticId::parse(&format!("notice_{id}_0_extra")), None);
        assert_eq!(SyntheticId::parse(&format!("bulletin_{id}_0")), None);
        assert_eq!(SyntheticId::parse(&format!("notice_{id}")), None);
    }

    #[test]
    fn projection_is_document_shaped_and_marked() {
        let notice = notice_with(NoticeCategory::Important, &["grades.pdf"]);
        let projected = project_attachment(&notice, 0).unwrap();

        assert_eq!(projected.id, format!("notice_{}_0", notice.id));
        assert_eq!(projected.title, "grades.pdf");
        assert_eq!(projected.description, "Attached to notice: Exam Schedule");
        assert_eq!(projected.category, DocumentCategory::Administrative);
        assert_eq!(projected.access_level, vec![Audience::Student]);
        assert_eq!(projected.tags, vec!["important".to_string()]);
        assert!(projected.is_notice_attachment);
        assert_eq!(projected.notice_id, notice.id);
        assert_eq!(projected.attachment_index, 0);
        assert_eq!(projected.created_at, notice.created_at);
    }

    #[test]
    fn out_of_range_index_projects_nothing() {
        let notice = notice_with(NoticeCategory::General, &["a.pdf"]);
        assert!(project_attachment(&notice, 1).is_none());
    }

    #[test]
    fn search_matches_notice_title_or_filename() {
        let notice = notice_with(NoticeCategory::General, &["syllabus.pdf", "rooms.xlsx"]);

        // matches the notice title: every attachment qualifies
        let all = project_notice(&notice, Some("exam"), None);
        assert_eq!(all.len(), 2);

        // matches one filename only
        let one = project_notice(&notice, Some("SYLLABUS"), None);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].attachment_index, 0);

        let none = project_notice(&notice, Some("nothing"), None);
        assert!(none.is_empty());
    }

    #[test]
    fn category_filter_uses_fixed_mapping() {
        let notice = notice_with(NoticeCategory::Event, &["flyer.png"]);

        assert_eq!(
            project_notice(&notice, None, Some(DocumentCategory::Other)).len(),
            1
        );
        assert!(project_notice(&notice, None, Some(DocumentCategory::Academic)).is_empty());
    }

    #[test]
    fn indices_stay_positional_after_filtering() {
        // the second attachment keeps index 1 even when the first is filtered out
        let notice = notice_with(NoticeCategory::General, &["alpha.pdf", "beta.pdf"]);
        let projected = project_notice(&notice, Some("beta"), None);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].attachment_index, 1);
        assert_eq!(projected[0].id, format!("notice_{}_1", notice.id));
    }
}
