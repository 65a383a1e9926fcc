//! Document formatting
//!
//! HTML cleanup and conversion of message bodies and attachments to text.

pub mod converter;
pub mod html_simplifier;

pub use converter::{DocumentConverter, ExternalConverter};
pub use html_simplifier::unwrap_table_layout;
