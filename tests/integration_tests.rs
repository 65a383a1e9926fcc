//! Integration tests for Gmail MCP Reader
//!
//! These tests drive the tool handler and the JSON-RPC server against an
//! in-memory mailbox and converter. No Gmail API calls or external tools.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};

use gmail_mcp_reader::error::{ConversionError, GmailApiError, GmailMcpError, Result};
use gmail_mcp_reader::format::{unwrap_table_layout, DocumentConverter};
use gmail_mcp_reader::gmail::types::{
    AttachmentData, Header, Message, MessageList, MessagePart, MessagePartBody, MessageRef,
};
use gmail_mcp_reader::gmail::MailProvider;
use gmail_mcp_reader::mcp::server::McpServer;
use gmail_mcp_reader::mcp::tools::ToolHandler;

// ==================== Test doubles ====================

#[derive(Default)]
struct MockMailbox {
    messages: HashMap<String, Message>,
    attachments: HashMap<String, String>,
    next_page_token: Option<String>,
    list_calls: Mutex<Vec<(String, Option<String>, u32)>>,
}

impl MockMailbox {
    fn with_message(mut self, message: Message) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    fn with_attachment(mut self, attachment_id: &str, content: &[u8]) -> Self {
        self.attachments
            .insert(attachment_id.to_string(), URL_SAFE_NO_PAD.encode(content));
        self
    }

    fn with_raw_attachment(mut self, attachment_id: &str, data: &str) -> Self {
        self.attachments
            .insert(attachment_id.to_string(), data.to_string());
        self
    }

    fn list_calls(&self) -> Vec<(String, Option<String>, u32)> {
        self.list_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailProvider for MockMailbox {
    async fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessageList> {
        self.list_calls.lock().unwrap().push((
            query.to_string(),
            page_token.map(str::to_string),
            max_results,
        ));

        let mut ids: Vec<&String> = self.messages.keys().collect();
        ids.sort();

        Ok(MessageList {
            messages: ids
                .into_iter()
                .map(|id| MessageRef {
                    id: id.clone(),
                    thread_id: format!("thread-{}", id),
                })
                .collect(),
            next_page_token: self.next_page_token.clone(),
            result_size_estimate: self.messages.len() as u32,
        })
    }

    async fn get_message_metadata(&self, message_id: &str) -> Result<Message> {
        self.get_message(message_id).await
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        self.messages.get(message_id).cloned().ok_or_else(|| {
            GmailMcpError::Gmail(GmailApiError::MessageNotFound {
                message_id: message_id.to_string(),
            })
        })
    }

    async fn get_attachment(
        &self,
        _message_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentData> {
        let data = self.attachments.get(attachment_id).cloned().ok_or_else(|| {
            GmailMcpError::Gmail(GmailApiError::AttachmentNotFound {
                attachment_id: attachment_id.to_string(),
            })
        })?;

        Ok(AttachmentData {
            size: data.len() as i64,
            data,
        })
    }
}

/// Converter that returns the simplified HTML itself and a fixed PDF text
struct MockConverter {
    fail_pdf: bool,
}

#[async_trait]
impl DocumentConverter for MockConverter {
    async fn html_to_markdown(&self, html: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(&unwrap_table_layout(html)).into_owned())
    }

    async fn pdf_to_text(&self, _pdf: &[u8]) -> Result<String> {
        if self.fail_pdf {
            return Err(ConversionError::Failed {
                tool: "pdftotext".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Syntax Error: Couldn't find trailer dictionary".to_string(),
            }
            .into());
        }
        Ok("Extracted PDF text".to_string())
    }
}

// ==================== Fixtures ====================

fn header(name: &str, value: &str) -> Header {
    Header {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn body_part(part_id: &str, mime_type: &str, content: &str) -> MessagePart {
    MessagePart {
        part_id: part_id.to_string(),
        mime_type: mime_type.to_string(),
        body: Some(MessagePartBody {
            data: Some(URL_SAFE_NO_PAD.encode(content)),
            size: content.len() as i64,
            attachment_id: None,
        }),
        ..Default::default()
    }
}

fn attachment_part(part_id: &str, filename: &str, mime_type: &str) -> MessagePart {
    MessagePart {
        part_id: part_id.to_string(),
        mime_type: mime_type.to_string(),
        filename: filename.to_string(),
        body: Some(MessagePartBody {
            attachment_id: Some(format!("att-{}", part_id)),
            size: 2048,
            data: None,
        }),
        ..Default::default()
    }
}

fn message(id: &str, subject: &str, parts: Vec<MessagePart>) -> Message {
    Message {
        id: id.to_string(),
        thread_id: format!("thread-{}", id),
        snippet: format!("Snippet of {}", subject),
        payload: Some(MessagePart {
            mime_type: "multipart/mixed".to_string(),
            headers: vec![
                header("From", "\"Alice Example\" <alice@example.com>"),
                header("To", "bob@example.com, Carol <carol@example.com>"),
                header("Subject", subject),
                header("Date", "Tue, 3 Sep 2024 09:15:00 +0000"),
            ],
            body: Some(MessagePartBody::default()),
            parts,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn handler(mailbox: MockMailbox) -> (ToolHandler, Arc<MockMailbox>) {
    handler_with(mailbox, false)
}

fn handler_with(mailbox: MockMailbox, fail_pdf: bool) -> (ToolHandler, Arc<MockMailbox>) {
    let mailbox = Arc::new(mailbox);
    let handler = ToolHandler::new(mailbox.clone(), Arc::new(MockConverter { fail_pdf }));
    (handler, mailbox)
}

fn structured(result: &gmail_mcp_reader::mcp::types::CallToolResult) -> Value {
    assert!(!result.is_error, "tool failed: {:?}", result.first_text());
    let text = result.first_text().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(Some(&parsed), result.structured_content.as_ref());
    parsed
}

// ==================== search_messages ====================

mod search_messages_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_returns_summaries() {
        let mailbox = MockMailbox {
            next_page_token: Some("page-2".to_string()),
            ..Default::default()
        }
        .with_message(message("m1", "First", vec![]))
        .with_message(message("m2", "Second", vec![]));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("search_messages", json!({"query": "from:alice"}))
            .await;
        let value = structured(&result);

        assert_eq!(value["total_results"], 2);
        assert_eq!(value["next_page_token"], "page-2");
        let first = &value["messages"][0];
        assert_eq!(first["id"], "m1");
        assert_eq!(first["thread_id"], "thread-m1");
        assert_eq!(first["subject"], "First");
        assert_eq!(first["from"]["name"], "Alice Example");
        assert_eq!(first["from"]["email"], "alice@example.com");
        assert_eq!(first["to"][1]["name"], "Carol");
        assert!(first.get("cc").is_none());
        assert_eq!(first["timestamp"], "Tue, 3 Sep 2024 09:15:00 +0000");
    }

    #[tokio::test]
    async fn test_page_size_clamped() {
        let (handler, mailbox) = handler(MockMailbox::default());

        for requested in [json!(null), json!(0), json!(25), json!(200)] {
            let result = handler
                .call_tool(
                    "search_messages",
                    json!({"query": "is:unread", "max_results": requested, "page_token": "tok"}),
                )
                .await;
            assert!(!result.is_error);
        }

        let sizes: Vec<u32> = mailbox.list_calls().iter().map(|c| c.2).collect();
        assert_eq!(sizes, vec![10, 10, 25, 50]);
        assert_eq!(mailbox.list_calls()[0].1.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_empty_search_omits_page_token() {
        let (handler, _) = handler(MockMailbox::default());
        let result = handler
            .call_tool("search_messages", json!({"query": "nothing"}))
            .await;
        let value = structured(&result);
        assert_eq!(value["total_results"], 0);
        assert_eq!(value["messages"], json!([]));
        assert!(value.get("next_page_token").is_none());
    }

    #[tokio::test]
    async fn test_oversized_page_rejected() {
        let (handler, mailbox) = handler(MockMailbox::default());
        let result = handler
            .call_tool("search_messages", json!({"query": "x", "max_results": 1000}))
            .await;
        assert!(result.is_error);
        assert!(mailbox.list_calls().is_empty());
    }
}

// ==================== get_messages ====================

mod get_messages_tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_preferred() {
        let mailbox = MockMailbox::default().with_message(message(
            "m1",
            "Both",
            vec![
                body_part("0", "text/plain", "Plain body"),
                body_part("1", "text/html", "<p>HTML body</p>"),
            ],
        ));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("get_messages", json!({"message_ids": ["m1"]}))
            .await;
        let value = structured(&result);
        assert_eq!(value["messages"][0]["body_text"], "Plain body");
        assert_eq!(value["messages"][0]["summary"]["subject"], "Both");
    }

    #[tokio::test]
    async fn test_html_only_body_is_simplified_and_converted() {
        let html = "<html><body><table id=\"main\"><tbody>\
                    <tr><td>Content line 1</td></tr>\
                    <tr><td>Content line 2</td></tr>\
                    </tbody></table></body></html>";
        let mailbox = MockMailbox::default()
            .with_message(message("m1", "Newsletter", vec![body_part("0", "text/html", html)]));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("get_messages", json!({"message_ids": ["m1"]}))
            .await;
        let value = structured(&result);
        let body = value["messages"][0]["body_text"].as_str().unwrap();
        assert!(body.contains("Content line 1\nContent line 2\n"));
        assert!(!body.contains("<table"));
    }

    #[tokio::test]
    async fn test_attachments_listed_by_part_id() {
        let mailbox = MockMailbox::default().with_message(message(
            "m1",
            "Files",
            vec![
                body_part("0", "text/plain", "See attached"),
                attachment_part("1", "report.pdf", "application/pdf"),
                attachment_part("2", "data.csv", "text/csv"),
            ],
        ));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("get_messages", json!({"message_ids": ["m1"]}))
            .await;
        let value = structured(&result);
        let attachments = value["messages"][0]["attachments"].as_array().unwrap();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0]["id"], "1");
        assert_eq!(attachments[0]["filename"], "report.pdf");
        assert_eq!(attachments[0]["mime_type"], "application/pdf");
        assert_eq!(attachments[0]["size"], 2048);
        assert_eq!(attachments[1]["id"], "2");
    }

    #[tokio::test]
    async fn test_message_without_body_omits_fields() {
        let mailbox = MockMailbox::default().with_message(message("m1", "Empty", vec![]));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("get_messages", json!({"message_ids": ["m1"]}))
            .await;
        let value = structured(&result);
        assert!(value["messages"][0].get("body_text").is_none());
        assert!(value["messages"][0].get("attachments").is_none());
    }

    #[tokio::test]
    async fn test_unknown_message_fails_whole_call() {
        let mailbox = MockMailbox::default().with_message(message("m1", "Known", vec![]));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool("get_messages", json!({"message_ids": ["m1", "missing"]}))
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("missing"));
    }
}

// ==================== preview_attachments ====================

mod preview_attachments_tests {
    use super::*;

    fn mailbox_with_files() -> MockMailbox {
        MockMailbox::default()
            .with_message(message(
                "m1",
                "Files",
                vec![
                    body_part("0", "text/plain", "See attached"),
                    attachment_part("1", "notes.txt", "text/plain"),
                    attachment_part("2", "report.pdf", "application/pdf"),
                    attachment_part("3", "logo.png", "image/png"),
                    attachment_part("4", "table.csv", "application/octet-stream"),
                    attachment_part("5", "broken.txt", "text/plain"),
                ],
            ))
            .with_attachment("att-1", b"Meeting notes")
            .with_attachment("att-2", b"%PDF-1.4")
            .with_attachment("att-3", &[0x89, 0x50, 0x4e, 0x47])
            .with_attachment("att-4", b"a,b\n1,2\n")
            .with_raw_attachment("att-5", "***")
    }

    #[tokio::test]
    async fn test_partial_success() {
        let (handler, _) = handler(mailbox_with_files());

        let result = handler
            .call_tool(
                "preview_attachments",
                json!({"message_id": "m1", "attachment_ids": ["1", "2", "3", "4", "5"]}),
            )
            .await;
        let value = structured(&result);
        let previews = value["attachments"].as_array().unwrap();
        assert_eq!(previews.len(), 5);

        assert_eq!(previews[0]["id"], "1");
        assert_eq!(previews[0]["content"], "Meeting notes");
        assert!(previews[0].get("error").is_none());

        assert_eq!(previews[1]["content"], "Extracted PDF text");

        assert_eq!(previews[2]["error"], "unsupported file type: image/png");
        assert!(previews[2].get("content").is_none());

        assert_eq!(previews[3]["content"], "a,b\n1,2\n");

        let decode_error = previews[4]["error"].as_str().unwrap();
        assert!(decode_error.starts_with("Failed to decode attachment"));
    }

    #[tokio::test]
    async fn test_pdf_conversion_failure_is_per_item() {
        let (handler, _) = handler_with(mailbox_with_files(), true);

        let result = handler
            .call_tool(
                "preview_attachments",
                json!({"message_id": "m1", "attachment_ids": ["2", "1"]}),
            )
            .await;
        let value = structured(&result);
        assert!(value["attachments"][0]["error"]
            .as_str()
            .unwrap()
            .contains("pdftotext"));
        assert_eq!(value["attachments"][1]["content"], "Meeting notes");
    }

    #[tokio::test]
    async fn test_unknown_part_fails_call() {
        let (handler, _) = handler(mailbox_with_files());

        let result = handler
            .call_tool(
                "preview_attachments",
                json!({"message_id": "m1", "attachment_ids": ["1", "9"]}),
            )
            .await;
        assert!(result.is_error);
        assert!(result
            .first_text()
            .unwrap()
            .contains("No attachment ID found for m1/9"));
    }

    #[tokio::test]
    async fn test_body_part_is_not_an_attachment() {
        let (handler, _) = handler(mailbox_with_files());

        let result = handler
            .call_tool(
                "preview_attachments",
                json!({"message_id": "m1", "attachment_ids": ["0"]}),
            )
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_missing_attachment_data_fails_call() {
        let mailbox = MockMailbox::default().with_message(message(
            "m1",
            "Files",
            vec![attachment_part("1", "notes.txt", "text/plain")],
        ));
        let (handler, _) = handler(mailbox);

        let result = handler
            .call_tool(
                "preview_attachments",
                json!({"message_id": "m1", "attachment_ids": ["1"]}),
            )
            .await;
        assert!(result.is_error);
        assert!(result.first_text().unwrap().contains("att-1"));
    }
}

// ==================== JSON-RPC server ====================

mod mcp_server_tests {
    use super::*;

    async fn run_session(input: &str) -> Vec<Value> {
        let (handler, _) = handler(
            MockMailbox::default().with_message(message("m1", "Hello", vec![])),
        );
        let mut server = McpServer::new(handler);
        let mut output = Vec::new();
        server.run(input.as_bytes(), &mut output).await.unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_handshake_and_tool_list() {
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test-client", "version": "1.0.0"},
                "capabilities": {}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ]
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");

        let responses = run_session(&input).await;
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert!(responses[0]["result"]["capabilities"]["tools"].is_object());

        let tools = responses[1]["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec!["search_messages", "get_messages", "preview_attachments"]
        );
        for tool in tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
            assert!(tool["outputSchema"].is_object());
        }
    }

    #[tokio::test]
    async fn test_tool_call_over_stdio() {
        let input = json!({"jsonrpc": "2.0", "id": "call-1", "method": "tools/call", "params": {
            "name": "get_messages",
            "arguments": {"message_ids": ["m1"]}
        }})
        .to_string();

        let responses = run_session(&input).await;
        assert_eq!(responses[0]["id"], "call-1");
        let result = &responses[0]["result"];
        assert!(result.get("isError").is_none());
        assert_eq!(
            result["structuredContent"]["messages"][0]["summary"]["subject"],
            "Hello"
        );
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let input = [
            "not json".to_string(),
            String::new(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}).to_string(),
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {
                "name": "send_email", "arguments": {}
            }})
            .to_string(),
            json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}).to_string(),
        ]
        .join("\n");

        let responses = run_session(&input).await;
        assert_eq!(responses.len(), 4);

        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[0]["error"]["code"], -32700);

        assert_eq!(responses[1]["id"], 7);
        assert_eq!(responses[1]["error"]["code"], -32601);

        assert_eq!(responses[2]["result"]["isError"], true);
        assert!(responses[2]["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Unknown tool: send_email"));

        assert_eq!(responses[3]["id"], 9);
        assert_eq!(responses[3]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_initialized_notification_sets_flag() {
        let (handler, _) = handler(MockMailbox::default());
        let mut server = McpServer::new(handler);
        assert!(!server.is_initialized());

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .unwrap();
        assert!(response.is_none());
        assert!(server.is_initialized());
    }
}
