use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::error::{GeminiError, GeminiResult};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Clone)]
pub struct GenerateClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GenerateClient {
    pub fn new(base_url: String, model: String, api_key: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    /// Generate text for a single prompt
    pub async fn generate_content(&self, prompt: &str) -> GeminiResult<String> {
        if self.api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(prompt.to_string()) }],
            }],
        };

        let response = self
            .client
            .post(&format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GeminiError::ServiceUnavailable(format!(
                "Status: {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        extract_text(&body)
    }
}

/// Concatenate the text parts of the first candidate
pub(crate) fn extract_text(body: &str) -> GeminiResult<String> {
    let response: GenerateResponse = serde_json::from_str(body)?;

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        let reason = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        GeminiError::EmptyResponse(reason)
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GeminiError::InvalidResponse(format!(
            "candidate had no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text.trim().to_string())
}
