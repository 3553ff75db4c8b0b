use async_trait::async_trait;

use crate::{dispatch::OutboundPost, domain::ChatId, Result};

/// Cross-messenger port.
///
/// Failures are reported as [`crate::Error::SendFailed`] so the poller can isolate
/// one bad destination from the rest of the fan-out.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_post(&self, chat_id: ChatId, post: &OutboundPost) -> Result<()>;
}
