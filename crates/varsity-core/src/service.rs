//! The portal service: orchestrates the entity store, the visibility policy,
//! the projector/feed pipeline, and the two consumed collaborators.
//!
//! Every operation re-resolves its target and re-runs the policy at call
//! time; a previously computed "visible" flag is never trusted. Reads take a
//! point-in-time snapshot under the store lock and run the pure pipeline
//! outside of it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use varsity_shared::{
    constants::MAX_NOTICE_ATTACHMENTS, Actor, Audience, DocumentCategory, EventType, FileRef,
    NoticeCategory, PageRequest, PortalError, Result, Role,
};
use varsity_store::{
    Attachment, CalendarEvent, Database, Document, NewCalendarEvent, NewDocument, NewNotice,
    Notice, User,
};

use crate::feed::{self, DocumentFilters, FeedItem, FeedPage};
use crate::files::{FileStore, FileUpload};
use crate::notifier::{self, Notifier};
use crate::policy;
use crate::projector::{self, ProjectedAttachment, SyntheticId};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub description: String,
    pub category: Option<DocumentCategory>,
    pub access_level: Vec<Audience>,
    pub department: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<DocumentCategory>,
    pub access_level: Option<Vec<Audience>>,
    pub department: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateNoticeRequest {
    pub title: String,
    pub content: String,
    pub category: Option<NoticeCategory>,
    pub target_audience: Vec<Audience>,
    pub department: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateNoticeRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<NoticeCategory>,
    pub target_audience: Option<Vec<Audience>>,
    /// Admin only; an empty string clears the department.
    pub department: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Zero-based indices into the attachment list as it was fetched.
    pub remove_attachments: Vec<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub student_id: Option<String>,
    /// Honoured for admin actors only; silently dropped otherwise.
    pub role: Option<Role>,
    /// Honoured for admin actors only; silently dropped otherwise.
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: Option<EventType>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// A successfully authorized download: the file reference plus its bytes.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub file: FileRef,
    pub data: Vec<u8>,
}

/// One page of the notice listing.
#[derive(Debug, Clone)]
pub struct NoticePage {
    pub notices: Vec<Notice>,
    pub count: usize,
    pub total: usize,
}

/// One page of a user listing.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub count: usize,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Portal
// ---------------------------------------------------------------------------

/// The produced interface of the portal core.
#[derive(Clone)]
pub struct Portal {
    db: Arc<Mutex<Database>>,
    files: Arc<dyn FileStore>,
    notifier: Arc<dyn Notifier>,
}

impl Portal {
    pub fn new(db: Database, files: Arc<dyn FileStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            files,
            notifier,
        }
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    /// List the merged document feed for the actor.
    pub async fn list_documents(
        &self,
        actor: &Actor,
        filters: &DocumentFilters,
        page: &PageRequest,
    ) -> Result<FeedPage> {
        let (documents, notices) = {
            let db = self.db.lock().await;
            // the department filter is an admin-only convenience; everyone
            // else is scoped by the policy, not by the query
            let department = if actor.is_admin() {
                filters.department.as_deref()
            } else {
                None
            };
            (
                db.list_active_documents(filters.category, department)?,
                db.list_active_notices(None)?,
            )
        };

        Ok(feed::assemble(
            actor,
            documents,
            &notices,
            filters,
            page,
            Utc::now(),
        ))
    }

    /// Fetch a single feed item by real document id or synthetic
    /// `notice_<id>_<index>` id.
    pub async fn get_document(&self, actor: &Actor, raw_id: &str) -> Result<FeedItem> {
        if let Some(synthetic) = SyntheticId::parse(raw_id) {
            let (_, projected) = self.resolve_projection(actor, synthetic).await?;
            return Ok(FeedItem::Attachment(projected));
        }

        let id = parse_entity_id(raw_id)?;
        let document = self.db.lock().await.get_document(id)?;
        if !document.is_active {
            return Err(PortalError::NotFound);
        }
        if !policy::can_view_document(actor, &document) {
            return Err(PortalError::Forbidden);
        }
        Ok(FeedItem::Document(document))
    }

    /// Download a document or, through its synthetic id, a notice attachment.
    ///
    /// The counter is persisted before the bytes are handed back; a failure
    /// to read the bytes after incrementing leaves the counter high, which is
    /// accepted.
    pub async fn download_document(&self, actor: &Actor, raw_id: &str) -> Result<FileDownload> {
        if let Some(synthetic) = SyntheticId::parse(raw_id) {
            return self.download_projection(actor, synthetic).await;
        }

        let id = parse_entity_id(raw_id)?;
        let document = self.db.lock().await.get_document(id)?;
        if !document.is_active {
            return Err(PortalError::NotFound);
        }
        if !policy::can_download_document(actor, &document) {
            return Err(PortalError::Forbidden);
        }
        if !self.files.exists(&document.file.locator).await? {
            return Err(PortalError::NotFound);
        }

        self.db.lock().await.increment_document_downloads(id)?;
        let data = self.files.open(&document.file.locator).await?;

        info!(document = %id, actor = %actor.id, "document downloaded");
        Ok(FileDownload {
            file: document.file,
            data,
        })
    }

    /// Upload a new document. Admin and faculty only.
    pub async fn create_document(
        &self,
        actor: &Actor,
        request: CreateDocumentRequest,
        upload: FileUpload,
    ) -> Result<Document> {
        require_staff(actor)?;
        let title = require_field(&request.title, "title")?;

        let file = self.files.put(&upload).await?;
        let new = NewDocument {
            title,
            description: request.description,
            file,
            owner_id: actor.id,
            category: request.category.unwrap_or(DocumentCategory::Other),
            access_level: non_empty_access_level(request.access_level),
            department: normalize_department(request.department),
            tags: request.tags,
        };

        let created = { self.db.lock().await.create_document(&new) };
        match created {
            Ok(document) => {
                info!(document = %document.id, owner = %actor.id, "document created");
                Ok(document)
            }
            Err(e) => {
                // the row never landed; release the freshly stored file
                if let Err(del) = self.files.delete(&new.file.locator).await {
                    warn!(locator = %new.file.locator, error = %del, "orphan file cleanup failed");
                }
                Err(e.into())
            }
        }
    }

    /// Update document metadata. Owner or admin.
    pub async fn update_document(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateDocumentRequest,
    ) -> Result<Document> {
        let db = self.db.lock().await;
        let mut document = db.get_document(id)?;
        if !policy::can_manage_document(actor, &document) {
            return Err(PortalError::Forbidden);
        }

        if let Some(title) = request.title {
            document.title = title;
        }
        if let Some(description) = request.description {
            document.description = description;
        }
        if let Some(category) = request.category {
            document.category = category;
        }
        if let Some(access_level) = request.access_level {
            document.access_level = non_empty_access_level(access_level);
        }
        if let Some(department) = request.department {
            document.department = normalize_department(Some(department));
        }
        if let Some(tags) = request.tags {
            document.tags = tags;
        }

        db.update_document(&document)?;
        Ok(db.get_document(id)?)
    }

    /// Delete a document and release its stored file. Owner or admin.
    pub async fn delete_document(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let document = self.db.lock().await.get_document(id)?;
        if !policy::can_manage_document(actor, &document) {
            return Err(PortalError::Forbidden);
        }

        // best-effort: a missing file is not a reason to keep the row
        if let Err(e) = self.files.delete(&document.file.locator).await {
            warn!(document = %id, error = %e, "file release failed during delete");
        }

        self.db.lock().await.delete_document(id)?;
        info!(document = %id, actor = %actor.id, "document deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------

    /// List notices visible to the actor, newest first.
    pub async fn list_notices(
        &self,
        actor: &Actor,
        category: Option<NoticeCategory>,
        page: &PageRequest,
    ) -> Result<NoticePage> {
        let notices = { self.db.lock().await.list_active_notices(category)? };

        let now = Utc::now();
        let visible: Vec<Notice> = notices
            .into_iter()
            .filter(|notice| policy::can_view_notice(actor, notice, now))
            .collect();
        let total = visible.len();

        let page_slice: Vec<Notice> = visible
            .into_iter()
            .skip(page.offset())
            .take(page.limit as usize)
            .collect();

        Ok(NoticePage {
            count: page_slice.len(),
            total,
            notices: page_slice,
        })
    }

    /// Fetch a single notice.
    pub async fn get_notice(&self, actor: &Actor, id: Uuid) -> Result<Notice> {
        let notice = self.db.lock().await.get_notice(id)?;
        let now = Utc::now();
        if !notice.is_active || policy::is_notice_expired(&notice, now) {
            return Err(PortalError::NotFound);
        }
        if !policy::can_view_notice(actor, &notice, now) {
            return Err(PortalError::Forbidden);
        }
        Ok(notice)
    }

    /// Download the attachment at `index` of a notice.
    pub async fn download_attachment(
        &self,
        actor: &Actor,
        notice_id: Uuid,
        index: usize,
    ) -> Result<FileDownload> {
        self.download_projection(actor, SyntheticId::new(notice_id, index))
            .await
    }

    /// Post a new notice, then resolve and notify its student recipients.
    /// Admin and faculty only.
    pub async fn create_notice(
        &self,
        actor: &Actor,
        request: CreateNoticeRequest,
        uploads: Vec<FileUpload>,
    ) -> Result<Notice> {
        require_staff(actor)?;
        let title = require_field(&request.title, "title")?;
        let content = require_field(&request.content, "content")?;
        check_attachment_batch(&uploads)?;

        let target_audience = if request.target_audience.is_empty() {
            vec![Audience::All]
        } else {
            request.target_audience
        };

        // admins may address any department; faculty notices inherit theirs
        let department = if actor.is_admin() && request.department.is_some() {
            normalize_department(request.department)
        } else {
            actor.department.clone()
        };

        let mut attachments = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            attachments.push(Attachment::new(self.files.put(upload).await?));
        }

        let new = NewNotice {
            title,
            content,
            category: request.category.unwrap_or(NoticeCategory::General),
            owner_id: actor.id,
            target_audience,
            attachments,
            department,
            expiry_date: request.expiry_date,
        };

        let notice = { self.db.lock().await.create_notice(&new)? };
        info!(notice = %notice.id, owner = %actor.id, "notice created");

        self.broadcast(&notice).await;
        Ok(notice)
    }

    /// Update a notice, applying attachment removals before appending new
    /// uploads. Owner or admin.
    pub async fn update_notice(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateNoticeRequest,
        uploads: Vec<FileUpload>,
    ) -> Result<Notice> {
        let mut notice = { self.db.lock().await.get_notice(id)? };
        if !policy::can_manage_notice(actor, &notice) {
            return Err(PortalError::Forbidden);
        }
        check_attachment_batch(&uploads)?;

        // removals run in descending index order so a pending removal is
        // never invalidated by an earlier one; out-of-range indices are
        // silently skipped
        let mut indices = request.remove_attachments;
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        for index in indices {
            if index >= notice.attachments.len() {
                continue;
            }
            let removed = notice.attachments.remove(index);
            if let Err(e) = self.files.delete(&removed.file.locator).await {
                warn!(notice = %id, index, error = %e, "attachment file release failed");
            }
        }

        // new files are appended after all removals
        for upload in &uploads {
            notice
                .attachments
                .push(Attachment::new(self.files.put(upload).await?));
        }

        if let Some(title) = request.title {
            notice.title = title;
        }
        if let Some(content) = request.content {
            notice.content = content;
        }
        if let Some(category) = request.category {
            notice.category = category;
        }
        if let Some(target_audience) = request.target_audience {
            if !target_audience.is_empty() {
                notice.target_audience = target_audience;
            }
        }
        if let Some(expiry) = request.expiry_date {
            notice.expiry_date = Some(expiry);
        }
        if actor.is_admin() {
            if let Some(department) = request.department {
                notice.department = normalize_department(Some(department));
            }
        } else if notice.department.is_none() {
            notice.department = actor.department.clone();
        }

        // one statement persists the whole attachment list
        let db = self.db.lock().await;
        db.update_notice(&notice)?;
        Ok(db.get_notice(id)?)
    }

    /// Delete a notice and release its attachments' stored files.
    pub async fn delete_notice(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let notice = self.db.lock().await.get_notice(id)?;
        if !policy::can_delete_notice(actor, &notice) {
            return Err(PortalError::Forbidden);
        }

        for attachment in &notice.attachments {
            if let Err(e) = self.files.delete(&attachment.file.locator).await {
                warn!(notice = %id, error = %e, "attachment file release failed during delete");
            }
        }

        self.db.lock().await.delete_notice(id)?;
        info!(notice = %id, actor = %actor.id, "notice deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// List users. Admin only.
    pub async fn list_users(
        &self,
        actor: &Actor,
        role: Option<Role>,
        search: Option<&str>,
        page: &PageRequest,
    ) -> Result<UserPage> {
        if !actor.is_admin() {
            return Err(PortalError::Forbidden);
        }
        let (users, total) = self.db.lock().await.list_users(role, search, page)?;
        Ok(UserPage {
            count: users.len(),
            total,
            users,
        })
    }

    /// Fetch a single user. Students may fetch only themselves.
    pub async fn get_user(&self, actor: &Actor, id: Uuid) -> Result<User> {
        if actor.role == Role::Student && actor.id != id {
            return Err(PortalError::Forbidden);
        }
        Ok(self.db.lock().await.get_user(id)?)
    }

    /// Update a user. Admin or self; role and activation changes are
    /// admin-only and silently dropped for everyone else.
    pub async fn update_user(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateUserRequest,
    ) -> Result<User> {
        if !actor.is_admin() && actor.id != id {
            return Err(PortalError::Forbidden);
        }

        let db = self.db.lock().await;
        let mut user = db.get_user(id)?;

        if let Some(name) = request.name {
            user.name = name;
        }
        if let Some(email) = request.email {
            user.email = email;
        }
        if let Some(department) = request.department {
            user.department = normalize_department(Some(department));
        }
        if let Some(student_id) = request.student_id {
            user.student_id = Some(student_id);
        }
        if actor.is_admin() {
            if let Some(role) = request.role {
                user.role = role;
            }
            if let Some(is_active) = request.is_active {
                user.is_active = is_active;
            }
        }

        db.update_user(&user)?;
        Ok(db.get_user(id)?)
    }

    /// Soft-delete a user. Admin only.
    pub async fn delete_user(&self, actor: &Actor, id: Uuid) -> Result<()> {
        if !actor.is_admin() {
            return Err(PortalError::Forbidden);
        }
        if !self.db.lock().await.deactivate_user(id)? {
            return Err(PortalError::NotFound);
        }
        info!(user = %id, actor = %actor.id, "user deactivated");
        Ok(())
    }

    /// List students. Faculty are locked to their own department; admins may
    /// filter by any.
    pub async fn list_students(
        &self,
        actor: &Actor,
        department: Option<&str>,
        search: Option<&str>,
        page: &PageRequest,
    ) -> Result<UserPage> {
        let scoped_department = match actor.role {
            Role::Admin => department.map(str::to_string),
            Role::Faculty => actor.department.clone(),
            Role::Student => return Err(PortalError::Forbidden),
        };

        let (users, total) =
            self.db
                .lock()
                .await
                .list_students(scoped_department.as_deref(), search, page)?;
        Ok(UserPage {
            count: users.len(),
            total,
            users,
        })
    }

    // ------------------------------------------------------------------
    // Calendar
    // ------------------------------------------------------------------

    /// List active calendar events, soonest first. Visible to every
    /// authenticated user.
    pub async fn list_events(
        &self,
        _actor: &Actor,
        event_type: Option<EventType>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .db
            .lock()
            .await
            .list_active_events(event_type, from, to)?)
    }

    /// Fetch a single calendar event.
    pub async fn get_event(&self, _actor: &Actor, id: Uuid) -> Result<CalendarEvent> {
        let event = self.db.lock().await.get_event(id)?;
        if !event.is_active {
            return Err(PortalError::NotFound);
        }
        Ok(event)
    }

    /// Create a calendar event. Admin and faculty only.
    pub async fn create_event(
        &self,
        actor: &Actor,
        request: CreateEventRequest,
    ) -> Result<CalendarEvent> {
        require_staff(actor)?;
        let title = require_field(&request.title, "title")?;

        let new = NewCalendarEvent {
            title,
            description: request.description,
            event_type: request.event_type.unwrap_or(EventType::Other),
            start_date: request.start_date,
            end_date: request.end_date,
            owner_id: actor.id,
        };

        let event = { self.db.lock().await.create_event(&new)? };
        info!(event = %event.id, owner = %actor.id, "calendar event created");
        Ok(event)
    }

    /// Update a calendar event. Owner or admin.
    pub async fn update_event(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateEventRequest,
    ) -> Result<CalendarEvent> {
        let db = self.db.lock().await;
        let mut event = db.get_event(id)?;
        if !policy::can_manage_event(actor, &event) {
            return Err(PortalError::Forbidden);
        }

        if let Some(title) = request.title {
            event.title = title;
        }
        if let Some(description) = request.description {
            event.description = description;
        }
        if let Some(event_type) = request.event_type {
            event.event_type = event_type;
        }
        if let Some(start_date) = request.start_date {
            event.start_date = start_date;
        }
        if let Some(end_date) = request.end_date {
            event.end_date = end_date;
        }

        db.update_event(&event)?;
        Ok(db.get_event(id)?)
    }

    /// Delete a calendar event. Owner or admin.
    pub async fn delete_event(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let db = self.db.lock().await;
        let event = db.get_event(id)?;
        if !policy::can_manage_event(actor, &event) {
            return Err(PortalError::Forbidden);
        }
        db.delete_event(id)?;
        info!(event = %id, actor = %actor.id, "calendar event deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolve a synthetic id into its source notice and projection.
    /// Inactive/expired notices and out-of-range indices are not-found;
    /// only a policy rejection is forbidden.
    async fn resolve_projection(
        &self,
        actor: &Actor,
        synthetic: SyntheticId,
    ) -> Result<(Notice, ProjectedAttachment)> {
        let notice = self.db.lock().await.get_notice(synthetic.notice_id)?;
        let now = Utc::now();
        if !notice.is_active || policy::is_notice_expired(&notice, now) {
            return Err(PortalError::NotFound);
        }
        let projected =
            projector::project_attachment(&notice, synthetic.index).ok_or(PortalError::NotFound)?;
        if !policy::can_view_notice(actor, &notice, now) {
            return Err(PortalError::Forbidden);
        }
        Ok((notice, projected))
    }

    async fn download_projection(
        &self,
        actor: &Actor,
        synthetic: SyntheticId,
    ) -> Result<FileDownload> {
        let (_, projected) = self.resolve_projection(actor, synthetic).await?;

        if !self.files.exists(&projected.file.locator).await? {
            return Err(PortalError::NotFound);
        }

        self.db
            .lock()
            .await
            .increment_attachment_downloads(synthetic.notice_id, synthetic.index)?;
        let data = self.files.open(&projected.file.locator).await?;

        info!(
            notice = %synthetic.notice_id,
            index = synthetic.index,
            actor = %actor.id,
            "attachment downloaded"
        );
        Ok(FileDownload {
            file: projected.file,
            data,
        })
    }

    /// Resolve recipients and hand the notice to the notifier. Failures are
    /// logged and swallowed; broadcast never fails notice creation.
    async fn broadcast(&self, notice: &Notice) {
        if !notifier::wants_student_broadcast(notice) {
            return;
        }

        let recipients = {
            let db = self.db.lock().await;
            match db.list_active_students(notice.department.as_deref()) {
                Ok(recipients) => recipients,
                Err(e) => {
                    warn!(notice = %notice.id, error = %e, "recipient resolution failed");
                    return;
                }
            }
        };
        if recipients.is_empty() {
            return;
        }

        if let Err(e) = self.notifier.notice_created(notice, &recipients).await {
            warn!(notice = %notice.id, error = %e, "notice broadcast failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_staff(actor: &Actor) -> Result<()> {
    match actor.role {
        Role::Admin | Role::Faculty => Ok(()),
        Role::Student => Err(PortalError::Forbidden),
    }
}

fn require_field(value: &str, name: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PortalError::Validation(format!("{name} is required")));
    }
    Ok(trimmed.to_string())
}

fn check_attachment_batch(uploads: &[FileUpload]) -> Result<()> {
    if uploads.len() > MAX_NOTICE_ATTACHMENTS {
        return Err(PortalError::Validation(format!(
            "at most {MAX_NOTICE_ATTACHMENTS} attachments per request"
        )));
    }
    Ok(())
}

/// The access level must never be empty; an empty request falls back to the
/// student default instead of failing.
fn non_empty_access_level(access_level: Vec<Audience>) -> Vec<Audience> {
    if access_level.is_empty() {
        vec![Audience::Student]
    } else {
        access_level
    }
}

fn normalize_department(department: Option<String>) -> Option<String> {
    department
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Real entity ids are UUIDs; anything else is simply not found.
fn parse_entity_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| PortalError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use varsity_store::NewUser;

    // ------------------------------------------------------------------
    // Test collaborators
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MemoryFileStore {
        files: StdMutex<HashMap<String, Vec<u8>>>,
        next: AtomicUsize,
    }

    #[async_trait]
    impl FileStore for MemoryFileStore {
        async fn put(&self, upload: &FileUpload) -> Result<FileRef> {
            let locator = format!("mem-{}", self.next.fetch_add(1, Ordering::SeqCst));
            self.files
                .lock()
                .unwrap()
                .insert(locator.clone(), upload.data.clone());
            Ok(FileRef {
                locator,
                original_name: upload.original_name.clone(),
                mime_type: upload.mime_type.clone(),
                size: upload.data.len() as i64,
            })
        }

        async fn exists(&self, locator: &str) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(locator))
        }

        async fn open(&self, locator: &str) -> Result<Vec<u8>> {
            self.files
                .lock()
                .unwrap()
                .get(locator)
                .cloned()
                .ok_or(PortalError::NotFound)
        }

        async fn delete(&self, locator: &str) -> Result<()> {
            self.files.lock().unwrap().remove(locator);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        broadcasts: StdMutex<Vec<(Uuid, Vec<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notice_created(&self, notice: &Notice, recipients: &[User]) -> Result<()> {
            self.broadcasts.lock().unwrap().push((
                notice.id,
                recipients.iter().map(|u| u.email.clone()).collect(),
            ));
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Fixture
    // ------------------------------------------------------------------

    struct Fixture {
        portal: Portal,
        notifier: Arc<RecordingNotifier>,
        admin: Actor,
        faculty_cs: Actor,
        student_cs: Actor,
        student_ee: Actor,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();

        let seed = |name: &str, role: Role, dept: Option<&str>| -> Actor {
            let user = db
                .create_user(&NewUser {
                    name: name.to_string(),
                    email: format!("{name}@uni.edu"),
                    role,
                    department: dept.map(String::from),
                    student_id: (role == Role::Student).then(|| format!("S-{name}")),
                })
                .unwrap();
            Actor::new(user.id, role, dept.map(String::from))
        };

        let admin = seed("admin", Role::Admin, None);
        let faculty_cs = seed("prof", Role::Faculty, Some("CS"));
        let student_cs = seed("ada", Role::Student, Some("CS"));
        let student_ee = seed("lin", Role::Student, Some("EE"));

        let notifier = Arc::new(RecordingNotifier::default());
        let portal = Portal::new(
            db,
            Arc::new(MemoryFileStore::default()),
            notifier.clone(),
        );

        Fixture {
            portal,
            notifier,
            admin,
            faculty_cs,
            student_cs,
            student_ee,
            _dir: dir,
        }
    }

    fn upload(name: &str) -> FileUpload {
        FileUpload {
            original_name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            data: name.as_bytes().to_vec(),
        }
    }

    fn doc_request(title: &str) -> CreateDocumentRequest {
        CreateDocumentRequest {
            title: title.to_string(),
            description: "desc".to_string(),
            access_level: vec![Audience::All],
            ..Default::default()
        }
    }

    fn notice_request(title: &str) -> CreateNoticeRequest {
        CreateNoticeRequest {
            title: title.to_string(),
            content: "content".to_string(),
            ..Default::default()
        }
    }

    async fn attachment_names(fx: &Fixture, actor: &Actor, id: Uuid) -> Vec<String> {
        fx.portal
            .get_notice(actor, id)
            .await
            .unwrap()
            .attachments
            .iter()
            .map(|a| a.file.original_name.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn merged_feed_picks_projection_over_old_document() {
        let fx = fixture();
        fx.portal
            .create_document(&fx.faculty_cs, doc_request("t1"), upload("t1.pdf"))
            .await
            .unwrap();
        fx.portal
            .create_document(&fx.faculty_cs, doc_request("t2"), upload("t2.pdf"))
            .await
            .unwrap();
        fx.portal
            .create_notice(&fx.faculty_cs, notice_request("n"), vec![upload("t3.pdf")])
            .await
            .unwrap();

        let page = fx
            .portal
            .list_documents(
                &fx.student_cs,
                &DocumentFilters::default(),
                &PageRequest::new(1, 2),
            )
            .await
            .unwrap();

        assert_eq!(page.count, 2);
        assert_eq!(page.total, 3);
        assert!(matches!(&page.items[0], FeedItem::Attachment(p) if p.title == "t3.pdf"));
        assert!(matches!(&page.items[1], FeedItem::Document(d) if d.title == "t2"));
    }

    #[tokio::test]
    async fn department_filter_is_admin_only() {
        let fx = fixture();
        let mut request = doc_request("ee-only");
        request.department = Some("EE".to_string());
        fx.portal
            .create_document(&fx.admin, request, upload("ee.pdf"))
            .await
            .unwrap();
        fx.portal
            .create_document(&fx.admin, doc_request("everywhere"), upload("all.pdf"))
            .await
            .unwrap();

        let filters = DocumentFilters {
            department: Some("EE".to_string()),
            ..Default::default()
        };

        let admin_page = fx
            .portal
            .list_documents(&fx.admin, &filters, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(admin_page.total, 1);

        // the same filter is ignored for a student
        let student_page = fx
            .portal
            .list_documents(&fx.student_cs, &filters, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(student_page.total, 2);
    }

    // ------------------------------------------------------------------
    // Downloads and accounting
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn document_download_increments_counter() {
        let fx = fixture();
        let document = fx
            .portal
            .create_document(&fx.faculty_cs, doc_request("counted"), upload("c.pdf"))
            .await
            .unwrap();

        let download = fx
            .portal
            .download_document(&fx.student_cs, &document.id.to_string())
            .await
            .unwrap();
        assert_eq!(download.data, b"c.pdf");

        let fetched = fx
            .portal
            .get_document(&fx.student_cs, &document.id.to_string())
            .await
            .unwrap();
        assert!(matches!(fetched, FeedItem::Document(d) if d.download_count == 1));
    }

    #[tokio::test]
    async fn forbidden_download_does_not_increment() {
        let fx = fixture();
        let mut request = doc_request("staff-only");
        request.access_level = vec![Audience::Faculty];
        let document = fx
            .portal
            .create_document(&fx.faculty_cs, request, upload("s.pdf"))
            .await
            .unwrap();

        let err = fx
            .portal
            .download_document(&fx.student_cs, &document.id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        let fetched = fx
            .portal
            .get_document(&fx.faculty_cs, &document.id.to_string())
            .await
            .unwrap();
        assert!(matches!(fetched, FeedItem::Document(d) if d.download_count == 0));
    }

    #[tokio::test]
    async fn synthetic_id_round_trips_to_the_same_attachment() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(
                &fx.faculty_cs,
                notice_request("exam"),
                vec![upload("a.pdf"), upload("b.pdf"), upload("c.pdf")],
            )
            .await
            .unwrap();

        let synthetic = format!("notice_{}_2", notice.id);
        let download = fx
            .portal
            .download_document(&fx.student_cs, &synthetic)
            .await
            .unwrap();
        assert_eq!(download.file.original_name, "c.pdf");
        assert_eq!(download.data, b"c.pdf");

        // the direct attachment route is the same operation
        let direct = fx
            .portal
            .download_attachment(&fx.student_cs, notice.id, 2)
            .await
            .unwrap();
        assert_eq!(direct.file.original_name, "c.pdf");

        let fetched = fx.portal.get_notice(&fx.student_cs, notice.id).await.unwrap();
        assert_eq!(fetched.attachments[2].download_count, 2);
        assert_eq!(fetched.attachments[0].download_count, 0);
    }

    #[tokio::test]
    async fn malformed_synthetic_ids_are_not_found() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(&fx.faculty_cs, notice_request("n"), vec![upload("a.pdf")])
            .await
            .unwrap();

        for raw in [
            "definitely-not-an-id".to_string(),
            format!("notice_{}_9", notice.id),      // out of range
            format!("notice_{}_x", notice.id),      // non-numeric index
            format!("notice_{}_0_y", notice.id),    // wrong segment count
            format!("notice_{}_0", Uuid::new_v4()), // unknown notice
        ] {
            let err = fx
                .portal
                .download_document(&fx.student_cs, &raw)
                .await
                .unwrap_err();
            assert!(matches!(err, PortalError::NotFound), "id {raw:?}");
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found_and_uncounted() {
        let fx = fixture();
        let document = fx
            .portal
            .create_document(&fx.faculty_cs, doc_request("vanished"), upload("v.pdf"))
            .await
            .unwrap();

        // the file disappears behind the store's back
        fx.portal.files.delete(&document.file.locator).await.unwrap();

        let err = fx
            .portal
            .download_document(&fx.student_cs, &document.id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::NotFound));

        let fetched = fx
            .portal
            .get_document(&fx.student_cs, &document.id.to_string())
            .await
            .unwrap();
        assert!(matches!(fetched, FeedItem::Document(d) if d.download_count == 0));
    }

    // ------------------------------------------------------------------
    // Notice lifecycle
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn removal_applies_descending_then_appends() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(
                &fx.faculty_cs,
                notice_request("n"),
                vec![
                    upload("a0.pdf"),
                    upload("a1.pdf"),
                    upload("a2.pdf"),
                    upload("a3.pdf"),
                    upload("a4.pdf"),
                ],
            )
            .await
            .unwrap();

        let request = UpdateNoticeRequest {
            remove_attachments: vec![3, 1],
            ..Default::default()
        };
        fx.portal
            .update_notice(&fx.faculty_cs, notice.id, request, vec![upload("new.pdf")])
            .await
            .unwrap();

        assert_eq!(
            attachment_names(&fx, &fx.faculty_cs, notice.id).await,
            ["a0.pdf", "a2.pdf", "a4.pdf", "new.pdf"]
        );
    }

    #[tokio::test]
    async fn ascending_removal_input_behaves_identically() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(
                &fx.faculty_cs,
                notice_request("n"),
                vec![
                    upload("a0.pdf"),
                    upload("a1.pdf"),
                    upload("a2.pdf"),
                    upload("a3.pdf"),
                    upload("a4.pdf"),
                ],
            )
            .await
            .unwrap();

        let request = UpdateNoticeRequest {
            remove_attachments: vec![1, 3],
            ..Default::default()
        };
        fx.portal
            .update_notice(&fx.faculty_cs, notice.id, request, vec![])
            .await
            .unwrap();

        assert_eq!(
            attachment_names(&fx, &fx.faculty_cs, notice.id).await,
            ["a0.pdf", "a2.pdf", "a4.pdf"]
        );
    }

    #[tokio::test]
    async fn out_of_range_removal_indices_are_skipped() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(
                &fx.faculty_cs,
                notice_request("n"),
                vec![upload("keep.pdf"), upload("drop.pdf")],
            )
            .await
            .unwrap();

        let request = UpdateNoticeRequest {
            remove_attachments: vec![99, 1, 7],
            ..Default::default()
        };
        fx.portal
            .update_notice(&fx.faculty_cs, notice.id, request, vec![])
            .await
            .unwrap();

        assert_eq!(
            attachment_names(&fx, &fx.faculty_cs, notice.id).await,
            ["keep.pdf"]
        );
    }

    #[tokio::test]
    async fn attachment_batch_cap_is_enforced() {
        let fx = fixture();
        let uploads: Vec<FileUpload> = (0..=MAX_NOTICE_ATTACHMENTS)
            .map(|i| upload(&format!("f{i}.pdf")))
            .collect();

        let err = fx
            .portal
            .create_notice(&fx.faculty_cs, notice_request("too many"), uploads)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));
    }

    #[tokio::test]
    async fn faculty_cannot_delete_admin_notice() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(&fx.admin, notice_request("from above"), vec![])
            .await
            .unwrap();

        let err = fx
            .portal
            .delete_notice(&fx.faculty_cs, notice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        fx.portal.delete_notice(&fx.admin, notice.id).await.unwrap();
    }

    #[tokio::test]
    async fn faculty_notice_inherits_their_department() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(&fx.faculty_cs, notice_request("dept"), vec![])
            .await
            .unwrap();
        assert_eq!(notice.department.as_deref(), Some("CS"));

        // hidden from the EE student by the department gate
        let err = fx
            .portal
            .get_notice(&fx.student_ee, notice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn broadcast_scopes_to_department_students() {
        let fx = fixture();
        let notice = fx
            .portal
            .create_notice(&fx.faculty_cs, notice_request("cs only"), vec![])
            .await
            .unwrap();

        let broadcasts = fx.notifier.broadcasts.lock().unwrap().clone();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, notice.id);
        assert_eq!(broadcasts[0].1, ["ada@uni.edu"]);
    }

    #[tokio::test]
    async fn staff_only_audience_is_not_broadcast() {
        let fx = fixture();
        let mut request = notice_request("faculty meeting");
        request.target_audience = vec![Audience::Faculty];
        fx.portal
            .create_notice(&fx.admin, request, vec![])
            .await
            .unwrap();

        assert!(fx.notifier.broadcasts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_students_receive_nothing() {
        let fx = fixture();
        fx.portal
            .delete_user(&fx.admin, fx.student_cs.id)
            .await
            .unwrap();

        fx.portal
            .create_notice(&fx.faculty_cs, notice_request("after"), vec![])
            .await
            .unwrap();

        assert!(fx.notifier.broadcasts.lock().unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Documents: creation defaults and authorization
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn empty_access_level_defaults_to_student() {
        let fx = fixture();
        let mut request = doc_request("defaulted");
        request.access_level = vec![];
        let document = fx
            .portal
            .create_document(&fx.faculty_cs, request, upload("d.pdf"))
            .await
            .unwrap();
        assert_eq!(document.access_level, vec![Audience::Student]);

        // and the same correction applies on update
        let updated = fx
            .portal
            .update_document(
                &fx.faculty_cs,
                document.id,
                UpdateDocumentRequest {
                    access_level: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.access_level, vec![Audience::Student]);
    }

    #[tokio::test]
    async fn students_cannot_create_or_manage_documents() {
        let fx = fixture();
        let err = fx
            .portal
            .create_document(&fx.student_cs, doc_request("nope"), upload("n.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        let document = fx
            .portal
            .create_document(&fx.faculty_cs, doc_request("owned"), upload("o.pdf"))
            .await
            .unwrap();
        let err = fx
            .portal
            .delete_document(&fx.student_cs, document.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));
    }

    #[tokio::test]
    async fn faculty_cannot_touch_other_faculty_documents() {
        let fx = fixture();
        let document = fx
            .portal
            .create_document(&fx.admin, doc_request("admins"), upload("a.pdf"))
            .await
            .unwrap();

        let err = fx
            .portal
            .update_document(
                &fx.faculty_cs,
                document.id,
                UpdateDocumentRequest {
                    title: Some("hijacked".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn non_admin_role_changes_are_dropped() {
        let fx = fixture();
        let request = UpdateUserRequest {
            name: Some("Ada L.".to_string()),
            role: Some(Role::Admin),
            is_active: Some(false),
            ..Default::default()
        };

        let updated = fx
            .portal
            .update_user(&fx.student_cs, fx.student_cs.id, request)
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada L.");
        assert_eq!(updated.role, Role::Student);
        assert!(updated.is_active);
    }

    #[tokio::test]
    async fn students_cannot_read_other_profiles() {
        let fx = fixture();
        let err = fx
            .portal
            .get_user(&fx.student_cs, fx.student_ee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        // but their own is fine
        fx.portal
            .get_user(&fx.student_cs, fx.student_cs.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn faculty_student_listing_is_department_locked() {
        let fx = fixture();
        let page = fx
            .portal
            .list_students(&fx.faculty_cs, Some("EE"), None, &PageRequest::default())
            .await
            .unwrap();

        // the requested EE filter is overridden by the faculty department
        assert_eq!(page.total, 1);
        assert_eq!(page.users[0].name, "ada");
    }

    // ------------------------------------------------------------------
    // Calendar
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn calendar_events_are_staff_authored_and_globally_visible() {
        let fx = fixture();
        let request = CreateEventRequest {
            title: "Finals week".to_string(),
            description: String::new(),
            event_type: Some(EventType::Exam),
            start_date: Utc::now(),
            end_date: Utc::now() + chrono::Duration::days(5),
        };

        let err = fx
            .portal
            .create_event(&fx.student_cs, request.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        let event = fx.portal.create_event(&fx.faculty_cs, request).await.unwrap();
        let listed = fx
            .portal
            .list_events(&fx.student_ee, None, None, None)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, event.id);
    }

    #[tokio::test]
    async fn only_the_owner_or_admin_manages_an_event() {
        let fx = fixture();
        let event = fx
            .portal
            .create_event(
                &fx.admin,
                CreateEventRequest {
                    title: "Holiday".to_string(),
                    description: String::new(),
                    event_type: Some(EventType::Holiday),
                    start_date: Utc::now(),
                    end_date: Utc::now() + chrono::Duration::days(1),
                },
            )
            .await
            .unwrap();

        let err = fx
            .portal
            .delete_event(&fx.faculty_cs, event.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        fx.portal.delete_event(&fx.admin, event.id).await.unwrap();
    }

    #[tokio::test]
    async fn listing_users_is_admin_only() {
        let fx = fixture();
        let err = fx
            .portal
            .list_users(&fx.faculty_cs, None, None, &PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Forbidden));

        let page = fx
            .portal
            .list_users(&fx.admin, Some(Role::Student), None, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }
}
