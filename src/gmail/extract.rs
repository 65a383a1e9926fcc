//! Body and attachment extraction from MIME part trees
//!
//! Gmail returns a message as a tree of parts. These helpers pick out the
//! plain-text and HTML bodies, list the attachments, and decide how an
//! attachment can be previewed.

use base64::{
    engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use schemars::JsonSchema;
use serde::Serialize;

use crate::error::ConversionError;
use crate::gmail::types::MessagePart;

/// Coarse classification of a part's MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeCategory {
    PlainText,
    Html,
    Multipart,
    Other,
}

impl MimeCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type {
            "text/plain" => Self::PlainText,
            "text/html" => Self::Html,
            m if m.starts_with("multipart/") => Self::Multipart,
            _ => Self::Other,
        }
    }
}

/// Text bodies found in a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBodies {
    pub text: String,
    pub html: String,
}

/// Attachment metadata as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Attachment {
    /// Part ID, which `preview_attachments` accepts
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
}

/// How an attachment's bytes can be turned into text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Text,
    Pdf,
    Unsupported,
}

impl PreviewKind {
    /// MIME type wins over the file extension.
    pub fn detect(mime_type: &str, filename: &str) -> Self {
        if mime_type.starts_with("text/") {
            Self::Text
        } else if mime_type == "application/pdf" {
            Self::Pdf
        } else if [".txt", ".md", ".csv"]
            .iter()
            .any(|ext| filename.ends_with(ext))
        {
            Self::Text
        } else {
            Self::Unsupported
        }
    }
}

fn decode_base64url_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
}

/// Decode a base64url body, padded or not.
///
/// Never fails: data that decodes under neither variant is returned as is.
pub fn decode_base64url(data: &str) -> String {
    match decode_base64url_bytes(data) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::debug!("Body is not base64url, using raw data: {}", e);
            data.to_string()
        }
    }
}

/// Decode attachment data, padded or not
pub fn decode_attachment(data: &str) -> Result<Vec<u8>, ConversionError> {
    decode_base64url_bytes(data).map_err(|e| ConversionError::Decode {
        message: e.to_string(),
    })
}

/// Direct text body of a single part, if it has one
fn part_body(part: &MessagePart) -> MessageBodies {
    let mut bodies = MessageBodies::default();

    let Some(data) = part
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .filter(|data| !data.is_empty())
    else {
        return bodies;
    };

    match MimeCategory::from_mime(&part.mime_type) {
        MimeCategory::PlainText => bodies.text = decode_base64url(data),
        MimeCategory::Html => bodies.html = decode_base64url(data),
        MimeCategory::Multipart | MimeCategory::Other => {}
    }

    bodies
}

/// Collect the plain-text and HTML bodies of a message.
///
/// The part itself is checked first, then each child in order. A child's
/// nested parts are searched only to fill slots that are still empty, so the
/// shallowest body of each kind wins.
pub fn extract_message_bodies(payload: &MessagePart) -> MessageBodies {
    let mut bodies = part_body(payload);

    for child in &payload.parts {
        let direct = part_body(child);
        fill_empty(&mut bodies, direct);

        if !child.parts.is_empty() {
            let nested = extract_message_bodies(child);
            fill_empty(&mut bodies, nested);
        }
    }

    bodies
}

fn fill_empty(bodies: &mut MessageBodies, found: MessageBodies) {
    if bodies.text.is_empty() {
        bodies.text = found.text;
    }
    if bodies.html.is_empty() {
        bodies.html = found.html;
    }
}

/// List attachments depth-first, each part before its children
pub fn extract_attachments(payload: &MessagePart) -> Vec<Attachment> {
    let mut attachments = Vec::new();
    collect_attachments(payload, &mut attachments);
    attachments
}

fn collect_attachments(part: &MessagePart, attachments: &mut Vec<Attachment>) {
    if let Some(attachment_id) = part.attachment_id() {
        let id = if part.part_id.is_empty() {
            attachment_id
        } else {
            &part.part_id
        };

        attachments.push(Attachment {
            id: id.to_string(),
            filename: part.filename.clone(),
            mime_type: part.mime_type.clone(),
            size: part.body.as_ref().map(|body| body.size).unwrap_or_default(),
        });
    }

    for child in &part.parts {
        collect_attachments(child, attachments);
    }
}

/// Find the first part with the given part ID, depth-first
pub fn find_attachment_part<'a>(part: &'a MessagePart, part_id: &str) -> Option<&'a MessagePart> {
    if part.body.is_some() && part.part_id == part_id {
        return Some(part);
    }

    part.parts
        .iter()
        .find_map(|child| find_attachment_part(child, part_id))
}
