//! Format-polymorphic text extraction for corpus documents.
//!
//! Dispatches over the closed [`DocumentFormat`] set: plain text and
//! markdown are read directly, PDFs go through `pdf-extract`, and images
//! go through the remote OCR client. Extraction errors are per-file;
//! ingestion logs them and skips the file.

use crate::config::Config;
use crate::corpus::CorpusEntry;
use crate::error::TriageError;
use crate::models::DocumentFormat;
use crate::ocr;

/// Extract UTF-8 text from one corpus entry.
pub async fn extract_text(entry: &CorpusEntry, config: &Config) -> Result<String, TriageError> {
    match entry.format {
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let bytes = std::fs::read(&entry.path)
                .map_err(|e| TriageError::Other(anyhow::anyhow!("read {}: {}", entry.relative, e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        DocumentFormat::Pdf => {
            let bytes = std::fs::read(&entry.path)
                .map_err(|e| TriageError::Other(anyhow::anyhow!("read {}: {}", entry.relative, e)))?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| TriageError::Other(anyhow::anyhow!("PDF extraction failed: {}", e)))
        }
        DocumentFormat::Image => {
            if !config.ocr.is_enabled() {
                return Err(TriageError::UnsupportedFormat(
                    "image (OCR provider disabled)".to_string(),
                ));
            }
            let bytes = std::fs::read(&entry.path)
                .map_err(|e| TriageError::Other(anyhow::anyhow!("read {}: {}", entry.relative, e)))?;
            ocr::recognize(&config.ocr, &bytes)
                .await
                .map_err(TriageError::Other)
        }
    }
}
