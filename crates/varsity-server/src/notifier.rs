//! Tracing-backed notice broadcast.
//!
//! Real delivery (email or otherwise) lives outside this service; this
//! implementation records each would-be delivery in the log, one line per
//! recipient, and never fails the broadcast.

use async_trait::async_trait;
use tracing::info;

use varsity_core::Notifier;
use varsity_shared::Result;
use varsity_store::{Notice, User};

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notice_created(&self, notice: &Notice, recipients: &[User]) -> Result<()> {
        for recipient in recipients {
            info!(
                notice = %notice.id,
                title = %notice.title,
                recipient = %recipient.email,
                "notice broadcast"
            );
        }
        info!(
            notice = %notice.id,
            recipients = recipients.len(),
            "notice broadcast complete"
        );
        Ok(())
    }
}
