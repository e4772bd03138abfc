//! Course records from the hosted document store.
//!
//! Reads the whole `courses` collection through the Firestore REST API and
//! flattens Firestore's typed values into plain JSON. Records are opaque to
//! the rest of the crate: they only get serialized into the Gemini prompt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::CoursesConfig;
use crate::{Error, Result};

#[async_trait]
pub trait CourseSource: Send + Sync {
    /// Fetch every course record.
    async fn fetch(&self) -> Result<Vec<Value>>;

    /// Drop cached records so the next fetch goes to the store.
    fn refresh(&self) {}
}

/// Source used when no document store is configured.
pub struct NoCourses;

#[async_trait]
impl CourseSource for NoCourses {
    async fn fetch(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

#[derive(Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    fields: Map<String, Value>,
}

pub struct FirestoreCourses {
    url: String,
    api_key: String,
    client: Client,
    cache: Option<Cache<(), Arc<Vec<Value>>>>,
}

impl FirestoreCourses {
    pub fn new(config: &CoursesConfig) -> Self {
        let url = format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            config.base_url.trim_end_matches('/'),
            config.project_id,
            config.collection,
        );

        let cache = (config.cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build()
        });

        Self {
            url,
            api_key: config.api_key.clone(),
            client: Client::new(),
            cache,
        }
    }

    async fn fetch_remote(&self) -> Result<Vec<Value>> {
        let mut request = self.client.get(&self.url);
        if !self.api_key.is_empty() {
            request = request.query(&[("key", self.api_key.as_str())]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::ContextFetchFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::ContextFetchFailure(format!("status {}", resp.status())));
        }

        let body: ListDocumentsResponse = resp
            .json()
            .await
            .map_err(|e| Error::ContextFetchFailure(e.to_string()))?;

        Ok(body
            .documents
            .into_iter()
            .map(|doc| Value::Object(decode_fields(doc.fields)))
            .collect())
    }
}

#[async_trait]
impl CourseSource for FirestoreCourses {
    async fn fetch(&self) -> Result<Vec<Value>> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&())) {
            debug!("Using {} cached course records", cached.len());
            return Ok(cached.as_ref().clone());
        }

        let records = self.fetch_remote().await.inspect_err(|e| {
            warn!("Course fetch failed: {e}");
        })?;
        info!("Fetched {} course records", records.len());

        if let Some(cache) = &self.cache {
            cache.insert((), Arc::new(records.clone()));
        }
        Ok(records)
    }

    fn refresh(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            info!("Course cache cleared");
        }
    }
}

fn decode_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(name, value)| (name, decode_value(value)))
        .collect()
}

/// Convert one Firestore typed value (`{"stringValue": "x"}`) to plain JSON.
fn decode_value(value: Value) -> Value {
    let Value::Object(typed) = value else {
        return value;
    };
    if typed.len() != 1 {
        return Value::Object(typed);
    }
    let Some((kind, inner)) = typed.into_iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "nullValue" => Value::Null,
        "integerValue" => match &inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(inner),
            _ => inner,
        },
        "mapValue" => match inner {
            Value::Object(mut map) => match map.remove("fields") {
                Some(Value::Object(fields)) => Value::Object(decode_fields(fields)),
                _ => Value::Object(Map::new()),
            },
            _ => Value::Object(Map::new()),
        },
        "arrayValue" => match inner {
            Value::Object(mut array) => match array.remove("values") {
                Some(Value::Array(values)) => {
                    Value::Array(values.into_iter().map(decode_value).collect())
                }
                _ => Value::Array(Vec::new()),
            },
            _ => Value::Array(Vec::new()),
        },
        // stringValue, booleanValue, doubleValue, timestampValue, referenceValue, ...
        _ => inner,
    }
}
