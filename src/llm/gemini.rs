//! Gemini API client for generating static web app files.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;

use super::{AppGenerator, GenerationError};
use crate::task::{GeneratedFileSet, TaskSubmission};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client producing a path -> content file map for a task.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClient {
    /// Create a new Gemini client against the public API.
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_api_base(api_key, model, GEMINI_API_BASE.to_string())
    }

    /// Create a client against a custom API base URL.
    pub fn with_api_base(api_key: String, model: String, api_base: String) -> Self {
        let client = Client::builder()
            .user_agent(concat!("pageforge/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Execute a single generateContent request.
    async fn execute_request(&self, prompt: String) -> Result<String, GenerationError> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::InvalidOutput(format!("unexpected response shape: {}", e))
        })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| GenerationError::InvalidOutput("no candidates in response".to_string()))
    }
}

#[async_trait]
impl AppGenerator for GeminiClient {
    async fn generate_app(
        &self,
        submission: &TaskSubmission,
    ) -> Result<GeneratedFileSet, GenerationError> {
        let prompt = build_prompt(submission);
        tracing::debug!("Requesting generation: model={}", self.model);

        let text = self.execute_request(prompt).await?;
        let files = extract_file_map(&text)?;

        tracing::info!(
            "Generation produced {} files: {:?}",
            files.len(),
            files.paths()
        );
        Ok(files)
    }
}

/// Assemble the generation prompt from the submission.
fn build_prompt(submission: &TaskSubmission) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are generating a small, self-contained static web application. \
         Respond with a single JSON object mapping relative file paths to full \
         file contents. Include an index.html entry point. Do not include any \
         text outside the JSON object.\n\n",
    );
    prompt.push_str(&format!("Task: {}\n", submission.task));

    if let Some(brief) = &submission.brief {
        prompt.push_str(&format!("Brief: {}\n", brief));
    }

    if !submission.checks.is_empty() {
        prompt.push_str("Requirements:\n");
        for (i, check) in submission.checks.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, check));
        }
    }

    if !submission.attachments.is_empty() {
        prompt.push_str("Attachments:\n");
        for attachment in &submission.attachments {
            prompt.push_str(&format!("- {}: {}\n", attachment.name, attachment.url));
        }
    }

    prompt
}

/// Parse the model's text output into a file set.
///
/// Tolerates a Markdown code fence around the JSON object.
fn extract_file_map(text: &str) -> Result<GeneratedFileSet, GenerationError> {
    let trimmed = strip_code_fence(text.trim());

    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(trimmed)
        .map_err(|e| GenerationError::InvalidOutput(format!("not a JSON object: {}", e)))?;

    Ok(GeneratedFileSet::from_json_map(map))
}

/// Strip a leading/trailing Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}

/// Gemini generateContent request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

/// Gemini generateContent response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}
