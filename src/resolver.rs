//! Reply resolution: canned rules first, remote backend otherwise.
//!
//! Rules are checked in order on the trimmed, lower-cased input:
//! 1. exactly "hey" or "hello" → greeting
//! 2. contains "course" or "show" → catalog listing
//! 3. anything else → the configured answering service, given the raw input
//!
//! The keyword rule is a blunt substring match ("show me a movie" gets the
//! catalog too). Keep it that way.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::AnsweringService;
use crate::turn::{Mood, ReplyResult};

pub const GREETING_REPLY: &str = "Hey there! How can I help you today?";

pub const CATALOG_REPLY: &str = "Here are our courses:\n\
- Web Development Bootcamp: 12 weeks, paid\n\
- Python for Beginners: 4 weeks, free\n\
- Data Science Essentials: 8 weeks, paid\n\
- UI/UX Design Basics: 6 weeks, free\n\
Ask me about any of them for details.";

const GREETINGS: [&str; 2] = ["hey", "hello"];
const CATALOG_KEYWORDS: [&str; 2] = ["course", "show"];

#[derive(Clone)]
pub struct ReplyResolver {
    service: Arc<dyn AnsweringService>,
}

impl ReplyResolver {
    pub fn new(service: Arc<dyn AnsweringService>) -> Self {
        Self { service }
    }

    /// Resolve a reply for raw user input. Never fails: backend errors
    /// become an apology with `Mood::Error`.
    pub async fn resolve(&self, raw_input: &str) -> ReplyResult {
        let text = raw_input.trim().to_lowercase();

        if GREETINGS.contains(&text.as_str()) {
            debug!("Greeting shortcut");
            return ReplyResult::new(GREETING_REPLY, Mood::Joy);
        }

        if CATALOG_KEYWORDS.iter().any(|k| text.contains(k)) {
            debug!("Catalog shortcut");
            return ReplyResult::new(CATALOG_REPLY, Mood::Neutral);
        }

        match self.service.answer(raw_input).await {
            Ok(reply) => {
                info!("Backend replied ({} chars, mood: {})", reply.text.len(), reply.mood);
                reply
            }
            Err(e) => {
                warn!("Reply failed: {e}");
                ReplyResult::error(e.apology())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::BACKEND_APOLOGY;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answering service stub that records every query it receives.
    pub(crate) struct StubService {
        reply: std::result::Result<ReplyResult, String>,
        delay: Duration,
        pub calls: AtomicUsize,
        pub queries: Mutex<Vec<String>>,
    }

    impl StubService {
        fn build(reply: std::result::Result<ReplyResult, String>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay,
                calls: AtomicUsize::new(0),
                queries: Mutex::new(Vec::new()),
            })
        }

        pub fn replying(reply: ReplyResult) -> Arc<Self> {
            Self::build(Ok(reply), Duration::ZERO)
        }

        pub fn replying_after(reply: ReplyResult, delay: Duration) -> Arc<Self> {
            Self::build(Ok(reply), delay)
        }

        /// Fails every call with a network failure.
        pub fn unreachable() -> Arc<Self> {
            Self::build(Err("connection refused".into()), Duration::ZERO)
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnsweringService for StubService {
        async fn answer(&self, query: &str) -> Result<ReplyResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(Error::NetworkFailure)
        }
    }

    #[tokio::test]
    async fn greetings_skip_the_backend() {
        let stub = StubService::replying(ReplyResult::neutral("unused"));
        let resolver = ReplyResolver::new(stub.clone());

        for input in ["Hello", "hey", "  HEY  ", "hello\n"] {
            let reply = resolver.resolve(input).await;
            assert_eq!(reply, ReplyResult::new(GREETING_REPLY, Mood::Joy), "{input:?}");
        }
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn greeting_must_be_the_whole_input() {
        let stub = StubService::replying(ReplyResult::neutral("Hi!"));
        let resolver = ReplyResolver::new(stub.clone());

        let reply = resolver.resolve("hello there").await;
        assert_eq!(reply.text, "Hi!");
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn catalog_keywords_skip_the_backend() {
        let stub = StubService::replying(ReplyResult::neutral("unused"));
        let resolver = ReplyResolver::new(stub.clone());

        for input in ["show me the courses", "Which COURSES are free?", "showcase"] {
            let reply = resolver.resolve(input).await;
            assert_eq!(reply, ReplyResult::new(CATALOG_REPLY, Mood::Neutral), "{input:?}");
        }
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn other_input_is_delegated_once_and_passed_through() {
        let stub = StubService::replying(ReplyResult::new("Paris", Mood::Neutral));
        let resolver = ReplyResolver::new(stub.clone());

        let reply = resolver.resolve("What is the capital of France?").await;
        assert_eq!(reply, ReplyResult::new("Paris", Mood::Neutral));
        assert_eq!(stub.call_count(), 1);
        assert_eq!(
            stub.queries.lock().unwrap().as_slice(),
            ["What is the capital of France?"]
        );
    }

    #[tokio::test]
    async fn backend_receives_the_raw_input() {
        let stub = StubService::replying(ReplyResult::neutral("Rust is a language."));
        let resolver = ReplyResolver::new(stub.clone());

        resolver.resolve("  What is Rust?\n").await;
        assert_eq!(stub.queries.lock().unwrap().as_slice(), ["  What is Rust?\n"]);
    }

    #[tokio::test]
    async fn backend_mood_is_kept() {
        let stub = StubService::replying(ReplyResult::new("Cheer up!", Mood::Sadness));
        let reply = ReplyResolver::new(stub).resolve("I am so tired").await;
        assert_eq!(reply.mood, Mood::Sadness);
    }

    #[tokio::test]
    async fn backend_failure_becomes_apology() {
        let stub = StubService::unreachable();
        let reply = ReplyResolver::new(stub).resolve("What is Rust?").await;
        assert_eq!(reply.mood, Mood::Error);
        assert_eq!(reply.text, BACKEND_APOLOGY);
        assert!(!reply.text.is_empty());
    }
}
