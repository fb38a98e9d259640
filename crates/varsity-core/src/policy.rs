//! The visibility policy: pure, total predicates deciding what an actor may
//! see, download, or manage.
//!
//! Every predicate takes the actor and a candidate fetched from the store and
//! returns a plain boolean; nothing here performs I/O or fails. The same
//! predicate is applied uniformly to candidates from any store query, so the
//! store is free to pre-filter only what it can do efficiently.

use chrono::{DateTime, Utc};

use varsity_shared::{audience_allows, Actor, Role};
use varsity_store::{CalendarEvent, Document, Notice};

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// May the actor see this document?
///
/// Decision sequence:
/// 1. the accessibility gate: the actor's role must be in the document's
///    access level (or the level contains `all`);
/// 2. admin-owned content is global;
/// 3. admin actors never lose visibility to a department mismatch;
/// 4. faculty-owned content is gated to the owner's department when both the
///    document and the actor carry one.
pub fn can_view_document(actor: &Actor, document: &Document) -> bool {
    if !document.is_active {
        return false;
    }
    if !audience_allows(&document.access_level, actor.role) {
        return false;
    }
    if document.owner.role == Role::Admin {
        return true;
    }
    if actor.role == Role::Admin {
        return true;
    }
    if document.owner.role == Role::Faculty {
        return match (&document.department, &actor.department) {
            (Some(doc_dept), Some(actor_dept)) => doc_dept == actor_dept,
            _ => true,
        };
    }
    true
}

/// Download authorization reuses the viewing decision; the additional
/// stored-file existence check lives with the caller because a missing file
/// is a not-found condition, not a policy denial.
pub fn can_download_document(actor: &Actor, document: &Document) -> bool {
    can_view_document(actor, document)
}

/// May the actor mutate or delete this document? Owner or admin; students
/// never manage documents.
pub fn can_manage_document(actor: &Actor, document: &Document) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Faculty => document.owner.id == actor.id,
        Role::Student => false,
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

/// Has this notice expired as of `now`?
///
/// Expiry is a hard filter applied before policy evaluation, never a denial:
/// an expired notice is simply not part of the visible universe.
pub fn is_notice_expired(notice: &Notice, now: DateTime<Utc>) -> bool {
    matches!(notice.expiry_date, Some(expiry) if expiry < now)
}

/// May the actor see this notice?
///
/// The owner exception is evaluated first: an owner always sees their own
/// (active, non-expired) notice regardless of audience and department.
/// Admin actors are exempt from the audience gate but not from expiry.
pub fn can_view_notice(actor: &Actor, notice: &Notice, now: DateTime<Utc>) -> bool {
    if !notice.is_active || is_notice_expired(notice, now) {
        return false;
    }
    if notice.owner.id == actor.id {
        return true;
    }
    if actor.role != Role::Admin && !audience_allows(&notice.target_audience, actor.role) {
        return false;
    }
    if notice.owner.role == Role::Admin {
        return true;
    }
    if actor.role == Role::Admin {
        return true;
    }
    if notice.owner.role == Role::Faculty {
        return match (&notice.department, &actor.department) {
            (Some(notice_dept), Some(actor_dept)) => notice_dept == actor_dept,
            _ => true,
        };
    }
    true
}

/// May the actor update this notice? Owner or admin.
pub fn can_manage_notice(actor: &Actor, notice: &Notice) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Faculty => notice.owner.id == actor.id,
        Role::Student => false,
    }
}

/// May the actor delete this notice?
///
/// Admin may delete any notice. Faculty may delete only notices they own AND
/// whose owner role is not admin -- the ownership check already implies the
/// second condition, but the explicit guard survives role changes after
/// creation.
pub fn can_delete_notice(actor: &Actor, notice: &Notice) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Faculty => notice.owner.id == actor.id && notice.owner.role != Role::Admin,
        Role::Student => false,
    }
}

// ---------------------------------------------------------------------------
// Calendar events
// ---------------------------------------------------------------------------

/// May the actor mutate or delete this calendar event? Owner or admin.
/// Events themselves are visible to every authenticated user.
pub fn can_manage_event(actor: &Actor, event: &CalendarEvent) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Faculty => event.owner.id == actor.id,
        Role::Student => false,
    }
}
