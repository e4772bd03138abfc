//! Local answering endpoint.
//!
//! Sends the question to `{base_url}/ask` and reads back the answer and the
//! mood the backend's emotion classifier picked for it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::AnsweringService;
use crate::config::LocalConfig;
use crate::turn::{Mood, ReplyResult};
use crate::{Error, Result};

#[derive(Deserialize)]
struct AskResponse {
    answer: Option<String>,
    mood: Option<String>,
}

pub struct LocalEndpoint {
    url: String,
    client: Client,
}

impl LocalEndpoint {
    pub fn new(config: &LocalConfig) -> Self {
        let mut builder = Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder.build().expect("Failed to create HTTP client");

        Self {
            url: format!("{}/ask", config.base_url.trim_end_matches('/')),
            client,
        }
    }
}

#[async_trait]
impl AnsweringService for LocalEndpoint {
    async fn answer(&self, query: &str) -> Result<ReplyResult> {
        debug!("Asking local backend at {}: {query}", self.url);

        let resp = match self
            .client
            .post(&self.url)
            .json(&json!({ "query": query }))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_connect() {
                    warn!("Cannot connect to backend at {}", self.url);
                } else if e.is_timeout() {
                    warn!("Backend request timed out");
                } else {
                    warn!("Backend request failed: {e}");
                }
                return Err(Error::NetworkFailure(e.to_string()));
            }
        };

        if !resp.status().is_success() {
            warn!("Backend returned status {}", resp.status());
            return Err(Error::NetworkFailure(format!("status {}", resp.status())));
        }

        let body: AskResponse = resp.json().await.map_err(|e| {
            warn!("Failed to parse backend response: {e}");
            Error::MalformedResponse(e.to_string())
        })?;

        let answer = body.answer.unwrap_or_default();
        if answer.trim().is_empty() {
            warn!("Backend response has no answer");
            return Err(Error::MalformedResponse("missing answer".into()));
        }

        let mood = body.mood.as_deref().map(Mood::from_label).unwrap_or_default();
        debug!("Backend answered ({mood}): '{answer}'");
        Ok(ReplyResult::new(answer, mood))
    }
}
