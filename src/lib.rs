//! Gmail MCP Reader Library
//!
//! A read-only Model Context Protocol (MCP) server for Gmail.
//! Provides tools for searching messages, reading their bodies as text, and
//! previewing attachments.

pub mod config;
pub mod error;
pub mod format;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use error::{GmailMcpError, Result};
