//! External document converters
//!
//! HTML goes to Markdown through pandoc and PDF goes to text through
//! pdftotext. Both tools read from a file, so input is staged in a temporary
//! file that lives only for the duration of one call.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ConverterConfig;
use crate::error::{ConversionError, Result};
use crate::format::html_simplifier::unwrap_table_layout;

/// Turns message bodies and attachments into plain text
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert an HTML document to Markdown.
    async fn html_to_markdown(&self, html: &[u8]) -> Result<String>;

    /// Extract the text of a PDF document, keeping its physical layout.
    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<String>;
}

/// Converter backed by the pandoc and pdftotext executables
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    config: ConverterConfig,
}

impl ExternalConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Stage `input` in a temp file, run `program` on it and return stdout.
    ///
    /// The temp file is removed on every path; a failed removal is logged.
    async fn run_on_file(
        &self,
        program: &str,
        input: &[u8],
        suffix: &str,
        args: impl FnOnce(&Path) -> Vec<OsString>,
    ) -> Result<String> {
        let mut staged = tempfile::Builder::new()
            .prefix("gmail-mcp-")
            .suffix(suffix)
            .tempfile()?;
        staged.write_all(input)?;
        staged.flush()?;

        let result = self.execute(program, args(staged.path())).await;

        if let Err(e) = staged.close() {
            tracing::warn!("Failed to remove temporary file: {}", e);
        }

        result
    }

    async fn execute(&self, program: &str, args: Vec<OsString>) -> Result<String> {
        tracing::debug!("Running {} {:?}", program, args);

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.config.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ConversionError::Spawn {
                    tool: program.to_string(),
                    source,
                }
                .into())
            }
            Err(_) => {
                return Err(ConversionError::TimedOut {
                    tool: program.to_string(),
                    secs: self.config.timeout.as_secs(),
                }
                .into())
            }
        };

        if !output.status.success() {
            return Err(ConversionError::Failed {
                tool: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DocumentConverter for ExternalConverter {
    async fn html_to_markdown(&self, html: &[u8]) -> Result<String> {
        let simplified = unwrap_table_layout(html);

        self.run_on_file(&self.config.pandoc_bin, &simplified, ".html", |path| {
            vec![
                "-f".into(),
                "html".into(),
                "-t".into(),
                "markdown".into(),
                "--wrap=none".into(),
                path.as_os_str().to_owned(),
            ]
        })
        .await
    }

    async fn pdf_to_text(&self, pdf: &[u8]) -> Result<String> {
        self.run_on_file(&self.config.pdftotext_bin, pdf, ".pdf", |path| {
            vec!["-layout".into(), path.as_os_str().to_owned(), "-".into()]
        })
        .await
    }
}
