//! Gemini answering backend.
//!
//! Builds one prompt from the course catalog and the user's question and
//! sends it to Gemini's `generateContent` endpoint. Gemini has no mood
//! classifier, so every reply is tagged neutral.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::courses::CourseSource;
use super::AnsweringService;
use crate::config::GeminiConfig;
use crate::turn::ReplyResult;
use crate::{Error, Result};

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiService {
    url: String,
    api_key: String,
    client: Client,
    courses: Arc<dyn CourseSource>,
}

impl GeminiService {
    pub fn new(config: &GeminiConfig, courses: Arc<dyn CourseSource>) -> Self {
        Self {
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key: config.api_key.clone(),
            client: Client::new(),
            courses,
        }
    }

    /// Course records for the prompt. A failed fetch means no context, not a failed turn.
    async fn context(&self) -> Vec<Value> {
        match self.courses.fetch().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Continuing without course context: {e}");
                Vec::new()
            }
        }
    }
}

/// Course JSON and the question are inserted verbatim; neither is scanned
/// for placeholders.
pub fn build_prompt(courses: &[Value], question: &str) -> String {
    let courses = serde_json::to_string_pretty(courses).unwrap_or_else(|_| "[]".to_string());
    let question = question.trim();
    format!(
        r#"You are an AI assistant for a course platform.
The user may ask about available courses.

Here are the courses:
{courses}

Rules for your reply:
- Keep answers short and clear
- Use bullet points
- Mention course name, duration, and price/free
- No extra explanations

User: {question}"#
    )
}

#[async_trait]
impl AnsweringService for GeminiService {
    async fn answer(&self, query: &str) -> Result<ReplyResult> {
        let courses = self.context().await;
        let prompt = build_prompt(&courses, query);
        debug!("Sending prompt to Gemini ({} courses, {} chars)", courses.len(), prompt.len());

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let resp = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Gemini request failed: {e}");
                Error::NetworkFailure(e.to_string())
            })?;

        if !resp.status().is_success() {
            warn!("Gemini returned status {}", resp.status());
            return Err(Error::NetworkFailure(format!("status {}", resp.status())));
        }

        let data: GenerateResponse = resp.json().await.map_err(|e| {
            warn!("Failed to parse Gemini response: {e}");
            Error::MalformedResponse(e.to_string())
        })?;

        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            warn!("Gemini returned no text");
            return Err(Error::MalformedResponse("no candidate text".into()));
        }

        Ok(ReplyResult::neutral(text))
    }
}
