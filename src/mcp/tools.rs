//! MCP Tool definitions and handlers
//!
//! The three read-only tools: `search_messages`, `get_messages`, and
//! `preview_attachments`.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::config::gmail::{DEFAULT_MAX_RESULTS, MAX_RESULTS_LIMIT};
use crate::error::{GmailApiError, GmailMcpError, McpError, Result, ValidationError};
use crate::format::DocumentConverter;
use crate::gmail::extract::{
    decode_attachment, extract_attachments, extract_message_bodies, find_attachment_part,
    Attachment, MessageBodies, PreviewKind,
};
use crate::gmail::summary::{extract_message_summary, MessageSummary};
use crate::gmail::MailProvider;
use crate::mcp::types::{CallToolResult, Tool};

pub const SEARCH_MESSAGES: &str = "search_messages";
pub const GET_MESSAGES: &str = "get_messages";
pub const PREVIEW_ATTACHMENTS: &str = "preview_attachments";

/// Arguments for `search_messages`
#[derive(Debug, Clone, Deserialize, JsonSchema, Validate)]
pub struct SearchMessagesArgs {
    /// Gmail search query, e.g. `from:alice@example.com is:unread`
    pub query: String,

    /// Maximum messages per page (default 10, at most 50 are returned)
    #[serde(default)]
    #[validate(range(max = 500))]
    pub max_results: Option<u32>,

    /// `next_page_token` from a previous search
    #[serde(default)]
    pub page_token: Option<String>,
}

/// Result of `search_messages`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchMessagesResult {
    pub messages: Vec<MessageSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    /// Number of messages in this page
    pub total_results: usize,
}

/// Arguments for `get_messages`
#[derive(Debug, Clone, Deserialize, JsonSchema, Validate)]
pub struct GetMessagesArgs {
    /// IDs of the messages to retrieve
    #[validate(length(min = 1))]
    pub message_ids: Vec<String>,
}

/// A message with its body rendered as text
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MessageContent {
    pub summary: MessageSummary,

    /// Plain-text body, or the HTML body converted to Markdown
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body_text: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Result of `get_messages`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetMessagesResult {
    pub messages: Vec<MessageContent>,
}

/// Arguments for `preview_attachments`
#[derive(Debug, Clone, Deserialize, JsonSchema, Validate)]
pub struct PreviewAttachmentsArgs {
    /// ID of the message containing the attachments
    pub message_id: String,

    /// Part IDs of the attachments, as listed by `get_messages`
    #[validate(length(min = 1))]
    pub attachment_ids: Vec<String>,
}

/// Extracted text of one attachment, or why there is none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PreviewOutcome {
    Content(String),
    Error(String),
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AttachmentPreview {
    /// Part ID
    pub id: String,
    pub filename: String,
    pub mime_type: String,

    #[serde(flatten)]
    pub outcome: PreviewOutcome,
}

/// Result of `preview_attachments`
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PreviewAttachmentsResult {
    pub attachments: Vec<AttachmentPreview>,
}

/// Clamp a requested page size to the supported range
pub fn normalize_max_results(max_results: Option<u32>) -> u32 {
    match max_results {
        None | Some(0) => DEFAULT_MAX_RESULTS,
        Some(n) => n.min(MAX_RESULTS_LIMIT),
    }
}

/// Tool handler
pub struct ToolHandler {
    provider: Arc<dyn MailProvider>,
    converter: Arc<dyn DocumentConverter>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(provider: Arc<dyn MailProvider>, converter: Arc<dyn DocumentConverter>) -> Self {
        Self {
            provider,
            converter,
        }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def::<SearchMessagesArgs, SearchMessagesResult>(
                SEARCH_MESSAGES,
                "Searches Gmail messages using Gmail search syntax and returns message summaries",
            ),
            tool_def::<GetMessagesArgs, GetMessagesResult>(
                GET_MESSAGES,
                "Retrieves full messages by ID, with HTML bodies converted to Markdown",
            ),
            tool_def::<PreviewAttachmentsArgs, PreviewAttachmentsResult>(
                PREVIEW_ATTACHMENTS,
                "Extracts text from message attachments (text files, CSV, Markdown, PDF)",
            ),
        ]
    }

    /// Call a tool by name
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        tracing::debug!("Calling tool {}", name);

        let result = match name {
            SEARCH_MESSAGES => self.dispatch(args, |a| self.search_messages(a)).await,
            GET_MESSAGES => self.dispatch(args, |a| self.get_messages(a)).await,
            PREVIEW_ATTACHMENTS => self.dispatch(args, |a| self.preview_attachments(a)).await,
            _ => Err(McpError::UnknownTool {
                name: name.to_string(),
            }
            .into()),
        };

        match result {
            Ok(value) => CallToolResult::structured(value),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }

    async fn dispatch<A, R, F, Fut>(&self, args: Value, handler: F) -> Result<Value>
    where
        A: DeserializeOwned + Validate,
        R: Serialize,
        F: FnOnce(A) -> Fut,
        Fut: std::future::Future<Output = Result<R>>,
    {
        let args = parse_args::<A>(args)?;
        let result = handler(args).await?;
        Ok(serde_json::to_value(result)?)
    }

    // ==================== Tool Handlers ====================

    /// Search messages and summarize each hit.
    ///
    /// Any failed metadata fetch fails the whole search.
    pub async fn search_messages(&self, args: SearchMessagesArgs) -> Result<SearchMessagesResult> {
        let max_results = normalize_max_results(args.max_results);

        let list = self
            .provider
            .list_messages(&args.query, args.page_token.as_deref(), max_results)
            .await?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for reference in &list.messages {
            let message = self.provider.get_message_metadata(&reference.id).await?;
            messages.push(extract_message_summary(&message));
        }

        Ok(SearchMessagesResult {
            total_results: messages.len(),
            messages,
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Fetch messages with their bodies as text, in request order
    pub async fn get_messages(&self, args: GetMessagesArgs) -> Result<GetMessagesResult> {
        let mut messages = Vec::with_capacity(args.message_ids.len());

        for message_id in &args.message_ids {
            let message = self.provider.get_message(message_id).await?;

            let mut content = MessageContent {
                summary: extract_message_summary(&message),
                body_text: String::new(),
                attachments: Vec::new(),
            };

            if let Some(payload) = &message.payload {
                content.attachments = extract_attachments(payload);
                content.body_text = self.preview_text(extract_message_bodies(payload)).await?;
            }

            tracing::debug!(
                "Message {}: {} body chars, {} attachments",
                message_id,
                content.body_text.len(),
                content.attachments.len()
            );
            messages.push(content);
        }

        Ok(GetMessagesResult { messages })
    }

    /// Plain text wins; HTML is converted; otherwise empty
    async fn preview_text(&self, bodies: MessageBodies) -> Result<String> {
        if !bodies.text.is_empty() {
            return Ok(bodies.text);
        }
        if bodies.html.is_empty() {
            return Ok(String::new());
        }

        self.converter.html_to_markdown(bodies.html.as_bytes()).await
    }

    /// Preview attachments by part ID.
    ///
    /// Fetch failures abort the call; extraction failures are reported per item.
    pub async fn preview_attachments(
        &self,
        args: PreviewAttachmentsArgs,
    ) -> Result<PreviewAttachmentsResult> {
        let message = self.provider.get_message(&args.message_id).await?;

        let mut attachments = Vec::with_capacity(args.attachment_ids.len());
        for part_id in &args.attachment_ids {
            let found = message
                .payload
                .as_ref()
                .and_then(|payload| find_attachment_part(payload, part_id))
                .and_then(|part| part.attachment_id().map(|id| (part, id)));

            let Some((part, attachment_id)) = found else {
                return Err(GmailApiError::MissingAttachmentId {
                    message_id: args.message_id.clone(),
                    part_id: part_id.clone(),
                }
                .into());
            };

            let data = self
                .provider
                .get_attachment(&args.message_id, attachment_id)
                .await?;

            let outcome = match self
                .extract_attachment_content(&data.data, &part.mime_type, &part.filename)
                .await
            {
                Ok(content) => PreviewOutcome::Content(content),
                Err(e) => PreviewOutcome::Error(item_error(e)),
            };

            attachments.push(AttachmentPreview {
                id: part_id.clone(),
                filename: part.filename.clone(),
                mime_type: part.mime_type.clone(),
                outcome,
            });
        }

        Ok(PreviewAttachmentsResult { attachments })
    }

    async fn extract_attachment_content(
        &self,
        data: &str,
        mime_type: &str,
        filename: &str,
    ) -> Result<String> {
        let bytes = decode_attachment(data)?;

        match PreviewKind::detect(mime_type, filename) {
            PreviewKind::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            PreviewKind::Pdf => self.converter.pdf_to_text(&bytes).await,
            PreviewKind::Unsupported => Err(crate::error::ConversionError::UnsupportedType {
                mime_type: mime_type.to_string(),
            }
            .into()),
        }
    }
}

/// Per-attachment error text, without the top-level category prefix
fn item_error(error: GmailMcpError) -> String {
    match error {
        GmailMcpError::Conversion(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

fn parse_args<T: DeserializeOwned + Validate>(args: Value) -> Result<T> {
    let args: T = serde_json::from_value(args).map_err(|e| McpError::InvalidArguments {
        message: e.to_string(),
    })?;
    args.validate().map_err(ValidationError::from)?;
    Ok(args)
}

fn tool_def<A: JsonSchema, R: JsonSchema>(name: &str, description: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: schema_value::<A>(),
        output_schema: Some(schema_value::<R>()),
    }
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|e| {
        tracing::warn!("Failed to serialize tool schema: {}", e);
        serde_json::json!({"type": "object"})
    })
}
