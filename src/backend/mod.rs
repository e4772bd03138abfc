//! Remote Answering Services.
//!
//! Two interchangeable backends produce a [`ReplyResult`] for questions the
//! canned rules do not cover:
//! - `local`: JSON POST to a local `/ask` endpoint that also classifies mood
//! - `gemini`: Gemini `generateContent` call with course records as context
//! - `courses`: best-effort course record source for the Gemini prompt

pub mod courses;
pub mod gemini;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendMode, Config};
use crate::turn::ReplyResult;
use crate::Result;

use self::courses::{CourseSource, FirestoreCourses, NoCourses};

/// A backend that turns a user question into a reply.
///
/// Implementations make a single request per call and never retry; the
/// caller converts errors into an apology turn.
#[async_trait]
pub trait AnsweringService: Send + Sync {
    async fn answer(&self, query: &str) -> Result<ReplyResult>;
}

/// The selected answering service plus the course source behind it, kept so
/// the front ends can force a context refresh.
#[derive(Clone)]
pub struct Backend {
    pub service: Arc<dyn AnsweringService>,
    pub courses: Arc<dyn CourseSource>,
}

impl Backend {
    pub fn from_config(mode: BackendMode, config: &Config) -> Self {
        match mode {
            BackendMode::Local => Self {
                service: Arc::new(local::LocalEndpoint::new(&config.local)),
                courses: Arc::new(NoCourses),
            },
            BackendMode::Gemini => {
                let courses: Arc<dyn CourseSource> = if config.courses.enabled {
                    Arc::new(FirestoreCourses::new(&config.courses))
                } else {
                    Arc::new(NoCourses)
                };
                Self {
                    service: Arc::new(gemini::GeminiService::new(&config.gemini, courses.clone())),
                    courses,
                }
            }
        }
    }
}
