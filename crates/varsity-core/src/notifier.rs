//! The notice broadcast boundary.
//!
//! Recipient scoping happens here, in the forward direction of the audience
//! logic: who *receives* word of a new notice, not who may later view it.
//! Transport (email or otherwise) is behind the [`Notifier`] trait; a failing
//! notifier must never fail notice creation, so the portal service logs and
//! swallows its errors.

use async_trait::async_trait;

use varsity_shared::{audience_allows, Result, Role};
use varsity_store::{Notice, User};

/// Broadcast sink for freshly created notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver word of `notice` to each recipient. Implementations handle
    /// individual recipient failures themselves; an `Err` here means the
    /// whole broadcast could not be attempted.
    async fn notice_created(&self, notice: &Notice, recipients: &[User]) -> Result<()>;
}

/// Should this notice be broadcast to students at all?
///
/// Notices aimed only at faculty or admins are not announced to the student
/// body.
pub fn wants_student_broadcast(notice: &Notice) -> bool {
    audience_allows(&notice.target_audience, Role::Student)
}
