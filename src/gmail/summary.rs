//! Message summaries built from metadata-format messages

use schemars::JsonSchema;
use serde::Serialize;

use crate::gmail::address::EmailAddress;
use crate::gmail::types::Message;

/// Normalized view of a message's headers and snippet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,

    /// Raw `Date` header value
    pub timestamp: String,

    pub from: EmailAddress,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<EmailAddress>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<EmailAddress>,

    pub subject: String,
    pub snippet: String,
}

/// Build a summary from a message.
///
/// Header names are matched exactly as Gmail returns them (`From`, `To`,
/// `Cc`, `Subject`, `Date`). A repeated header overwrites the earlier one.
pub fn extract_message_summary(message: &Message) -> MessageSummary {
    let mut summary = MessageSummary {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        snippet: message.snippet.clone(),
        ..Default::default()
    };

    let headers = message
        .payload
        .as_ref()
        .map(|payload| payload.headers.as_slice())
        .unwrap_or_default();

    for header in headers {
        match header.name.as_str() {
            "From" => summary.from = EmailAddress::parse(&header.value),
            "To" => summary.to = EmailAddress::parse_list(&header.value),
            "Cc" => summary.cc = EmailAddress::parse_list(&header.value),
            "Subject" => summary.subject = header.value.clone(),
            "Date" => summary.timestamp = header.value.clone(),
            _ => {}
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::types::{Header, MessagePart};

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn message_with_headers(headers: Vec<Header>) -> Message {
        Message {
            id: "msg-1".to_string(),
            thread_id: "thread-1".to_string(),
            snippet: "Hello there".to_string(),
            payload: Some(MessagePart {
                headers,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_summary() {
        let message = message_with_headers(vec![
            header("From", "Alice <alice@example.com>"),
            header("To", "bob@example.com, Carol <carol@example.com>"),
            header("Cc", "dave@example.com"),
            header("Subject", "Quarterly report"),
            header("Date", "Mon, 2 Jan 2024 10:00:00 +0000"),
            header("X-Mailer", "ignored"),
        ]);

        let summary = extract_message_summary(&message);
        assert_eq!(summary.id, "msg-1");
        assert_eq!(summary.thread_id, "thread-1");
        assert_eq!(summary.snippet, "Hello there");
        assert_eq!(summary.from.name, "Alice");
        assert_eq!(summary.from.email, "alice@example.com");
        assert_eq!(summary.to.len(), 2);
        assert_eq!(summary.to[1].name, "Carol");
        assert_eq!(summary.cc[0].email, "dave@example.com");
        assert_eq!(summary.subject, "Quarterly report");
        assert_eq!(summary.timestamp, "Mon, 2 Jan 2024 10:00:00 +0000");
    }

    #[test]
    fn test_header_names_are_case_sensitive() {
        let message = message_with_headers(vec![header("subject", "lowercase")]);
        assert_eq!(extract_message_summary(&message).subject, "");
    }

    #[test]
    fn test_missing_payload() {
        let message = Message {
            id: "msg-2".to_string(),
            ..Default::default()
        };
        let summary = extract_message_summary(&message);
        assert_eq!(summary.id, "msg-2");
        assert!(summary.to.is_empty());
        assert_eq!(summary.from, EmailAddress::default());
    }

    #[test]
    fn test_empty_recipient_lists_omitted() {
        let message = message_with_headers(vec![header("From", "a@example.com")]);
        let json = serde_json::to_value(extract_message_summary(&message)).unwrap();
        assert!(json.get("to").is_none());
        assert!(json.get("cc").is_none());
        assert_eq!(json["from"]["email"], "a@example.com");
        assert_eq!(json["thread_id"], "thread-1");
    }
}
