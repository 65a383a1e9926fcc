//! Gmail API client
//!
//! [`MailProvider`] implementation backed by the Gmail v1 REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::gmail::{API_BASE_URL, METADATA_HEADERS, USER_ID};
use crate::error::{GmailApiError, GmailMcpError, Result};
use crate::gmail::auth::Authenticator;
use crate::gmail::provider::MailProvider;
use crate::gmail::types::{AttachmentData, Message, MessageList};

use std::sync::Arc;

/// Gmail API client
pub struct GmailClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth authenticator
    authenticator: Arc<Authenticator>,
}

impl GmailClient {
    /// Create a new Gmail client
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            authenticator,
        }
    }

    /// Get a valid access token
    async fn access_token(&self) -> Result<String> {
        self.authenticator.get_access_token().await
    }

    /// Base URL for messages
    fn messages_url() -> String {
        format!("{}/users/{}/messages", API_BASE_URL, USER_ID)
    }

    /// Build the list URL for a search
    fn list_url(query: &str, page_token: Option<&str>, max_results: u32) -> String {
        let mut url = format!(
            "{}?q={}&maxResults={}",
            Self::messages_url(),
            urlencoding::encode(query),
            max_results
        );

        if let Some(token) = page_token.filter(|t| !t.is_empty()) {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }

        url
    }

    /// Build the metadata-format URL for a message
    fn metadata_url(message_id: &str) -> String {
        let headers: String = METADATA_HEADERS
            .iter()
            .map(|h| format!("&metadataHeaders={}", h))
            .collect();

        format!(
            "{}/{}?format=metadata{}",
            Self::messages_url(),
            urlencoding::encode(message_id),
            headers
        )
    }

    /// GET a JSON resource, mapping 404 to `not_found`
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        action: &str,
        not_found: impl FnOnce() -> GmailApiError,
    ) -> Result<T> {
        let token = self.access_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else if response.status().as_u16() == 404 {
            Err(GmailMcpError::Gmail(not_found()))
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(GmailMcpError::Gmail(GmailApiError::RequestFailed {
                message: format!("Failed to {} ({}): {}", action, status, text),
            }))
        }
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageList> {
        tracing::debug!("Listing messages for query {:?}", query);
        let url = Self::list_url(query, page_token, max_results);

        self.get_json(&url, "search messages", || GmailApiError::RequestFailed {
            message: "Message list endpoint not found".to_string(),
        })
        .await
    }

    async fn get_message_metadata(&self, message_id: &str) -> Result<Message> {
        let url = Self::metadata_url(message_id);

        self.get_json(&url, "get message metadata", || {
            GmailApiError::MessageNotFound {
                message_id: message_id.to_string(),
            }
        })
        .await
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        let url = format!(
            "{}/{}?format=full",
            Self::messages_url(),
            urlencoding::encode(message_id)
        );

        self.get_json(&url, "get message", || GmailApiError::MessageNotFound {
            message_id: message_id.to_string(),
        })
        .await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentData> {
        let url = format!(
            "{}/{}/attachments/{}",
            Self::messages_url(),
            urlencoding::encode(message_id),
            urlencoding::encode(attachment_id)
        );

        self.get_json(&url, "get attachment", || GmailApiError::AttachmentNotFound {
            attachment_id: attachment_id.to_string(),
        })
        .await
    }
}
