//! Error types for courseteen-chat.

use thiserror::Error;

/// Result type alias for courseteen-chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Apology shown when the answering backend cannot be reached or replies
/// with something we cannot read.
pub const BACKEND_APOLOGY: &str = "Backend is not responding.";

/// Apology shown for any other failure while producing a reply.
pub const GENERIC_APOLOGY: &str = "Sorry, something went wrong.";

#[derive(Debug, Error)]
pub enum Error {
    /// The host has no speech recognition or synthesis capability
    #[error("{0} is not available on this host")]
    CapabilityUnavailable(&'static str),

    /// Remote call unreachable or answered with a non-2xx status
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Remote call answered with an unexpected body
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Course records could not be read from the document store
    #[error("context fetch failed: {0}")]
    ContextFetchFailure(String),

    /// Speech capture session failed after it started
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech synthesis failed
    #[error("speech output error: {0}")]
    Synthesis(String),

    /// A reply is pending or a capture session is active
    #[error("conversation is busy ({0})")]
    Busy(&'static str),

    /// Submitted text was blank
    #[error("input is empty")]
    EmptyInput,

    /// Controller task is gone
    #[error("conversation controller has stopped")]
    ControllerStopped,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Text shown to the user when this error ends a reply.
    pub fn apology(&self) -> &'static str {
        match self {
            Self::NetworkFailure(_) | Self::MalformedResponse(_) => BACKEND_APOLOGY,
            _ => GENERIC_APOLOGY,
        }
    }
}
