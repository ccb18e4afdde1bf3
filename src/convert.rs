//! DOCX to PDF conversion through a headless office runtime.
//!
//! The partitioning engine works on PDF input; uploaded DOCX documents are
//! converted once and the stored blob is replaced. Conversion shells out to
//! a LibreOffice-compatible binary via scratch files in the system temp
//! directory.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

/// Errors raised during document conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Scratch file or process I/O failed.
    #[error("conversion I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Converter process exited unsuccessfully.
    #[error("converter exited with an error: {0}")]
    CommandFailed(String),
    /// Converter reported success but produced no output file.
    #[error("converted output missing at {0}")]
    OutputMissing(PathBuf),
}

/// Converts a DOCX blob into PDF bytes.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert the given DOCX content to PDF.
    async fn docx_to_pdf(&self, data: &[u8]) -> Result<Vec<u8>, ConvertError>;
}

/// Shell-out converter driving `libreoffice --headless --convert-to pdf`.
pub struct OfficeConverter {
    binary: String,
}

impl OfficeConverter {
    /// Use the default `libreoffice` binary from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("libreoffice")
    }

    /// Use a specific converter binary.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentConverter for OfficeConverter {
    async fn docx_to_pdf(&self, data: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let scratch_dir = std::env::temp_dir();
        let stem = format!("ragserve-convert-{}", Uuid::new_v4());
        let input = scratch_dir.join(format!("{stem}.docx"));
        let output = scratch_dir.join(format!("{stem}.pdf"));

        tokio::fs::write(&input, data).await?;

        let result = Command::new(&self.binary)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&scratch_dir)
            .arg(&input)
            .output()
            .await;

        tokio::fs::remove_file(&input).await.ok();
        let command_output = result?;

        if !command_output.status.success() {
            let stderr = String::from_utf8_lossy(&command_output.stderr).trim().to_string();
            tracing::error!(binary = %self.binary, stderr = %stderr, "Conversion failed");
            return Err(ConvertError::CommandFailed(stderr));
        }

        let pdf = match tokio::fs::read(&output).await {
            Ok(bytes) => bytes,
            Err(_) => return Err(ConvertError::OutputMissing(output)),
        };
        tokio::fs::remove_file(&output).await.ok();

        tracing::info!(bytes = pdf.len(), "Document converted to PDF");
        Ok(pdf)
    }
}
