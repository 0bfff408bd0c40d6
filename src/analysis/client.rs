use anyhow::{Context, Result};
use reqwest::{multipart, Client};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::result::AnalysisResult;
use crate::config::AnalysisConfig;
use crate::recording::container::base_mime_type;
use crate::recording::RecordingArtifact;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Analysis service returned status {0}")]
    Status(u16),
    #[error("Invalid analysis payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected analysis response: {0}")]
    Malformed(String),
}

/// Remove a surrounding markdown code fence (```json ... ```), if any
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Decode an analysis service response body
///
/// The service wraps its report as `{"analysis": "<json text>"}`, often
/// inside a code fence. A report object sent directly is accepted too. A
/// report needs a summary or an overall sentiment; objects without either
/// (error bodies, `{}`) are rejected.
pub fn decode_response(body: &str) -> Result<AnalysisResult, AnalysisError> {
    let value: Value = serde_json::from_str(body)?;

    let result: AnalysisResult = match value.get("analysis") {
        Some(Value::String(inner)) => serde_json::from_str(strip_code_fence(inner))?,
        Some(inner @ Value::Object(_)) => serde_json::from_value(inner.clone())?,
        Some(other) => {
            return Err(AnalysisError::Malformed(format!(
                "analysis field is neither text nor object: {}",
                other
            )))
        }
        None if value.is_object() => serde_json::from_value(value)?,
        None => return Err(AnalysisError::Malformed(format!("expected an object, got {}", value))),
    };

    if !result.has_content() {
        return Err(AnalysisError::Malformed(format!(
            "response carries no report: {}",
            truncate(body, 200)
        )));
    }

    Ok(result)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Uploads finalized recordings to the analysis service
pub struct AnalysisClient {
    client: Client,
    endpoint: String,
}

impl AnalysisClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Analyse `artifact`; never fails
    ///
    /// Any service problem degrades to `AnalysisResult::fallback()`.
    pub async fn submit(&self, artifact: &RecordingArtifact) -> AnalysisResult {
        match self.try_submit(artifact).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Analysis unavailable ({}), using fallback report", e);
                AnalysisResult::fallback()
            }
        }
    }

    pub async fn try_submit(&self, artifact: &RecordingArtifact) -> Result<AnalysisResult, AnalysisError> {
        let url = format!("{}/analyze", self.endpoint);
        let file_name = artifact.file_name();

        info!("Uploading {} ({} bytes) for analysis", file_name, artifact.len());

        let part = multipart::Part::bytes(artifact.bytes().to_vec())
            .file_name(file_name)
            .mime_str(base_mime_type(artifact.mime_type()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("Analysis response: {} bytes", body.len());

        let result = decode_response(&body)?;
        info!("Analysis complete (sentiment: {})", result.overall_sentiment);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_decode_wrapped_and_direct() {
        let wrapped = r#"{"analysis":"```json\n{\"summary\":\"ok\",\"overall_sentiment\":\"Neutral\"}\n```"}"#;
        let result = decode_response(wrapped).unwrap();
        assert_eq!(result.summary, "ok");
        assert_eq!(result.overall_sentiment, "Neutral");

        let direct = r#"{"summary":"direct"}"#;
        assert_eq!(decode_response(direct).unwrap().summary, "direct");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_response("not json").is_err());
        assert!(decode_response("[1,2,3]").is_err());
        assert!(decode_response(r#"{"analysis":"```json\nnope\n```"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_empty_reports() {
        for body in [
            r#"{"detail":"model overloaded"}"#,
            r#"{"analysis":"{}"}"#,
            r#"{"analysis":{}}"#,
            r#"{"summary":"  ","overall_sentiment":""}"#,
        ] {
            let err = decode_response(body).unwrap_err();
            assert!(matches!(err, AnalysisError::Malformed(_)), "{}", body);
        }

        // Sentiment alone is enough
        let result = decode_response(r#"{"overall_sentiment":"Negative"}"#).unwrap();
        assert_eq!(result.overall_sentiment, "Negative");
    }
}
