//! Remote OCR client for image knowledge-base documents.
//!
//! Sends base64-encoded image bytes to a configured OCR HTTP endpoint and
//! returns the recognized plain text. When the provider is `"disabled"`
//! (the default), image files are skipped at extraction time.

use anyhow::{bail, Result};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::config::OcrConfig;

#[derive(Debug, Deserialize)]
struct OcrResponse {
    text: String,
}

/// Recognize text in an image via the remote OCR endpoint.
///
/// Retries on 429/5xx with exponential backoff; other client errors fail
/// immediately.
pub async fn recognize(config: &OcrConfig, image_bytes: &[u8]) -> Result<String> {
    if !config.is_enabled() {
        bail!("OCR provider is disabled");
    }

    let url = config
        .url
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("ocr.url required for remote provider"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
    });

    let mut last_err = None;

    for attempt in 0..=3u32 {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1));
            tokio::time::sleep(delay).await;
        }

        let resp = client.post(url).json(&body).send().await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let parsed: OcrResponse = response.json().await?;
                    return Ok(parsed.text);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("OCR API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("OCR API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("OCR connection error ({}): {}", url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OCR failed after retries")))
}
