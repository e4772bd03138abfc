//! Speech capture and output.
//!
//! The host's speech capabilities are injected as trait objects so the
//! controller can run against fakes:
//! - `Recognizer`: one finalized utterance → transcript
//! - `Synthesizer`: text → audible output, cancellable
//!
//! `capture` and `output` wrap them with the session bookkeeping the
//! controller relies on. `command` speaks through an external TTS program;
//! `native` (feature `native-speech`) records the microphone with cpal and
//! transcribes with Whisper.

pub mod capture;
pub mod command;
#[cfg(feature = "native-speech")]
pub mod native;
pub mod output;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::Result;

pub use capture::{CaptureEvent, CaptureHandle, SpeechCapture};
pub use output::SpeechOutput;

/// Speech-to-text capability for a single utterance.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Listen until one utterance is finalized or `stop` fires.
    /// Returns `None` when nothing intelligible was heard.
    async fn recognize(&self, locale: &str, stop: CancellationToken) -> Result<Option<String>>;
}

/// Text-to-speech capability.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, returning early once `cancel` fires.
    async fn speak(&self, text: &str, locale: &str, cancel: CancellationToken) -> Result<()>;
}

/// Speech recognition available on this host, if any.
#[cfg(feature = "native-speech")]
pub fn detect_recognizer(config: &Config) -> Option<Arc<dyn Recognizer>> {
    match native::WhisperRecognizer::load(&config.capture) {
        Ok(recognizer) => Some(Arc::new(recognizer)),
        Err(e) => {
            tracing::warn!("Speech recognition unavailable: {e}");
            None
        }
    }
}

/// Speech recognition available on this host, if any.
#[cfg(not(feature = "native-speech"))]
pub fn detect_recognizer(_config: &Config) -> Option<Arc<dyn Recognizer>> {
    info!("Built without native-speech; voice input disabled");
    None
}

/// Speech output available on this host, if any.
pub fn detect_synthesizer(config: &Config) -> Option<Arc<dyn Synthesizer>> {
    if !config.speech.output {
        info!("Speech output disabled in config");
        return None;
    }
    command::CommandSynthesizer::detect(&config.speech).map(|s| Arc::new(s) as Arc<dyn Synthesizer>)
}
