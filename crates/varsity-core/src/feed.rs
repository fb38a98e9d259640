//! The aggregation and pagination layer: one pipeline merging stored
//! documents and projected notice attachments into a single feed.

use chrono::{DateTime, Utc};
use serde::Serialize;

use varsity_shared::{Actor, DocumentCategory, PageRequest};
use varsity_store::{Document, Notice};

use crate::policy;
use crate::projector::{self, ProjectedAttachment};

/// Caller-supplied listing filters.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilters {
    pub category: Option<DocumentCategory>,
    /// Only honoured for admin actors; everyone else is filtered by policy.
    pub department: Option<String>,
    pub search: Option<String>,
}

/// One entry of the merged feed: a stored document or an ephemeral
/// projection of a notice attachment. Serializes untagged, so both arms
/// present the same document shape; projections additionally carry the
/// `is_notice_attachment` marker and their back-references.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FeedItem {
    Document(Document),
    Attachment(ProjectedAttachment),
}

impl FeedItem {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            FeedItem::Document(document) => document.created_at,
            FeedItem::Attachment(projected) => projected.created_at,
        }
    }
}

/// One page of the merged feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Length of `items`.
    pub count: usize,
    /// Visibility-passing documents (pre-pagination) plus visibility-passing
    /// projections.
    pub total: usize,
}

/// Does the search term match the document's title, description, or any tag
/// (case-insensitive substring)?
pub fn document_matches_search(document: &Document, term: &str) -> bool {
    let term = term.to_lowercase();
    document.title.to_lowercase().contains(&term)
        || document.description.to_lowercase().contains(&term)
        || document
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(&term))
}

/// Assemble one feed page from point-in-time snapshots of the active
/// documents and notices.
///
/// The pagination order is deliberate and preserved for compatibility:
/// documents are paginated alone first, then the full projection set is
/// merged in, the result re-sorted by recency, and -- only when projections
/// exist -- re-truncated to the page limit. Across page boundaries this can
/// under- or over-represent projections; see the boundary-quirk test below.
pub fn assemble(
    actor: &Actor,
    documents: Vec<Document>,
    notices: &[Notice],
    filters: &DocumentFilters,
    page: &PageRequest,
    now: DateTime<Utc>,
) -> FeedPage {
    // 1. visibility + search over the document candidates
    let visible: Vec<Document> = documents
        .into_iter()
        .filter(|document| policy::can_view_document(actor, document))
        .filter(|document| match filters.search.as_deref() {
            Some(term) => document_matches_search(document, term),
            None => true,
        })
        .collect();
    let total_documents = visible.len();

    // 2. paginate the document list alone
    let page_slice: Vec<Document> = visible
        .into_iter()
        .skip(page.offset())
        .take(page.limit as usize)
        .collect();

    // 3. the full projection set for the same filters, unpaginated
    let projections: Vec<ProjectedAttachment> = notices
        .iter()
        .filter(|notice| policy::can_view_notice(actor, notice, now))
        .flat_map(|notice| {
            projector::project_notice(notice, filters.search.as_deref(), filters.category)
        })
        .collect();
    let total_projections = projections.len();

    // 4. merge and sort by creation time, newest first
    let mut items: Vec<FeedItem> = page_slice
        .into_iter()
        .map(FeedItem::Document)
        .chain(projections.into_iter().map(FeedItem::Attachment))
        .collect();
    items.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

    // 5. re-truncate only when projections joined the page
    if total_projections > 0 {
        items.truncate(page.limit as usize);
    }

    FeedPage {
        count: items.len(),
        total: total_documents + total_projections,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;
    use varsity_shared::{Audience, FileRef, NoticeCategory, Role};
    use varsity_store::{Attachment, Owner};

    fn actor(role: Role, department: Option<&str>) -> Actor {
        Actor::new(Uuid::new_v4(), role, department.map(String::from))
    }

    fn owner(role: Role) -> Owner {
        Owner {
            id: Uuid::new_v4(),
            name: "owner".to_string(),
            email: "owner@uni.edu".to_string(),
            role,
        }
    }

    fn file(name: &str) -> FileRef {
        FileRef {
            locator: format!("loc-{name}"),
            original_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            size: 1,
        }
    }

    fn document_at(title: &str, created_at: DateTime<Utc>) -> Document {
        Document {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: "notes".to_string(),
            file: file(title),
            owner: owner(Role::Admin),
            category: DocumentCategory::Other,
            access_level: vec![Audience::All],
            department: None,
            tags: vec!["shared".to_string()],
            download_count: 0,
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    fn notice_at(title: &str, names: &[&str], created_at: DateTime<Utc>) -> Notice {
        Notice {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: "content".to_string(),
            category: NoticeCategory::General,
            owner: owner(Role::Admin),
            target_audience: vec![Audience::All],
            attachments: names.iter().map(|n| Attachment::new(file(n))).collect(),
            department: None,
            expiry_date: None,
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    fn titles(page: &FeedPage) -> Vec<String> {
        page.items
            .iter()
            .map(|item| match item {
                FeedItem::Document(d) => d.title.clone(),
                FeedItem::Attachment(p) => p.title.clone(),
            })
            .collect()
    }

    #[test]
    fn merge_then_truncate_prefers_recent_projections() {
        // two documents (t1 < t2) and one notice attachment at t3 > t2 with
        // page=1, limit=2: the merged page holds the projection and the t2
        // document, even though document pagination alone picked [t2, t1].
        let now = Utc::now();
        let docs = vec![
            document_at("t2", now - Duration::hours(1)),
            document_at("t1", now - Duration::hours(2)),
        ];
        let notices = vec![notice_at("n", &["t3.pdf"], now)];

        let page = assemble(
            &actor(Role::Student, None),
            docs,
            &notices,
            &DocumentFilters::default(),
            &PageRequest::new(1, 2),
            now,
        );

        assert_eq!(titles(&page), ["t3.pdf", "t2"]);
        assert_eq!(page.count, 2);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn page_boundary_quirk_is_preserved() {
        // Known boundary quirk kept for compatibility: projections are never
        // paginated, so page 2 re-merges the full projection set against the
        // second document slice instead of continuing where page 1 left off.
        let now = Utc::now();
        let docs = vec![
            document_at("d1", now - Duration::hours(1)),
            document_at("d2", now - Duration::hours(2)),
            document_at("d3", now - Duration::hours(3)),
        ];
        let notices = vec![notice_at("n", &["fresh.pdf"], now)];
        let student = actor(Role::Student, None);

        let second = assemble(
            &student,
            docs,
            &notices,
            &DocumentFilters::default(),
            &PageRequest::new(2, 2),
            now,
        );

        // the projection appears again on page 2, displacing d3
        assert_eq!(titles(&second), ["fresh.pdf", "d3"]);
        assert_eq!(second.total, 4);
    }

    #[test]
    fn without_projections_page_slice_is_returned_unmodified() {
        let now = Utc::now();
        let docs = vec![
            document_at("d1", now - Duration::hours(1)),
            document_at("d2", now - Duration::hours(2)),
            document_at("d3", now - Duration::hours(3)),
        ];

        let page = assemble(
            &actor(Role::Student, None),
            docs,
            &[],
            &DocumentFilters::default(),
            &PageRequest::new(1, 2),
            now,
        );

        assert_eq!(titles(&page), ["d1", "d2"]);
        assert_eq!(page.count, 2);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn search_spans_title_description_and_tags() {
        let now = Utc::now();
        let mut tagged = document_at("plain", now);
        tagged.tags = vec!["registrar".to_string()];
        let docs = vec![tagged, document_at("other", now)];

        let page = assemble(
            &actor(Role::Student, None),
            docs,
            &[],
            &DocumentFilters {
                search: Some("REGIS".to_string()),
                ..Default::default()
            },
            &PageRequest::default(),
            now,
        );

        assert_eq!(titles(&page), ["plain"]);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn invisible_documents_do_not_count_toward_total() {
        let now = Utc::now();
        let mut hidden = document_at("hidden", now);
        hidden.access_level = vec![Audience::Faculty];
        let docs = vec![hidden, document_at("shown", now)];

        let page = assemble(
            &actor(Role::Student, None),
            docs,
            &[],
            &DocumentFilters::default(),
            &PageRequest::default(),
            now,
        );

        assert_eq!(page.total, 1);
        assert_eq!(titles(&page), ["shown"]);
    }

    #[test]
    fn expired_notices_contribute_no_projections() {
        let now = Utc::now();
        let mut expired = notice_at("gone", &["gone.pdf"], now);
        expired.expiry_date = Some(now - Duration::minutes(5));
        let notices = vec![expired, notice_at("live", &["live.pdf"], now)];

        let page = assemble(
            &actor(Role::Student, None),
            vec![],
            &notices,
            &DocumentFilters::default(),
            &PageRequest::default(),
            now,
        );

        assert_eq!(titles(&page), ["live.pdf"]);
        assert_eq!(page.total, 1);
    }

    #[test]
    fn attachmentless_notices_are_skipped() {
        let now = Utc::now();
        let notices = vec![notice_at("empty", &[], now)];

        let page = assemble(
            &actor(Role::Student, None),
            vec![],
            &notices,
            &DocumentFilters::default(),
            &PageRequest::default(),
            now,
        );

        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }
}
