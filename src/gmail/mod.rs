//! Gmail API module
//!
//! Contains types, authentication, the mail provider abstraction, and the
//! helpers that turn raw messages into summaries, bodies, and attachments.

pub mod address;
pub mod auth;
pub mod client;
pub mod extract;
pub mod provider;
pub mod summary;
pub mod types;

pub use provider::MailProvider;
