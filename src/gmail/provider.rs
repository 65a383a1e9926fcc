//! Mail provider abstraction
//!
//! The tool layer talks to a mailbox only through [`MailProvider`], so it can
//! run against Gmail in production and an in-memory double in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::gmail::types::{AttachmentData, Message, MessageList};

/// Read-only access to a mailbox
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List message references matching a search query.
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageList>;

    /// Fetch a message with only the summary headers populated.
    async fn get_message_metadata(&self, message_id: &str) -> Result<Message>;

    /// Fetch a message with its full MIME part tree.
    async fn get_message(&self, message_id: &str) -> Result<Message>;

    /// Fetch the base64url data of one attachment.
    async fn get_attachment(&self, message_id: &str, attachment_id: &str)
        -> Result<AttachmentData>;
}
