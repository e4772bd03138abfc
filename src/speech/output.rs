//! Speech Output Adapter.
//!
//! Speaks one utterance at a time: a new `speak` interrupts whatever is
//! still playing. Speaking is fire-and-forget for the caller.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Synthesizer;

struct Utterance {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct SpeechOutput {
    synthesizer: Option<Arc<dyn Synthesizer>>,
    locale: String,
    current: Mutex<Option<Utterance>>,
}

impl SpeechOutput {
    pub fn new(synthesizer: Option<Arc<dyn Synthesizer>>, locale: impl Into<String>) -> Self {
        Self {
            synthesizer,
            locale: locale.into(),
            current: Mutex::new(None),
        }
    }

    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|u| !u.task.is_finished())
    }

    /// Speak `text` in `locale` (the configured locale if `None`), cancelling
    /// the previous utterance first. Without a synthesizer this does nothing.
    pub fn speak(&self, text: &str, locale: Option<&str>) {
        let Some(synthesizer) = self.synthesizer.clone() else {
            debug!("No speech output available, skipping");
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let mut current = self.current.lock().unwrap();
        if let Some(previous) = current.take() {
            if !previous.task.is_finished() {
                info!("Interrupting previous utterance");
            }
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let text = text.to_string();
        let locale = locale.unwrap_or(&self.locale).to_string();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                let preview: String = text.chars().take(80).collect();
                debug!("Speaking: \"{}\"", preview.replace('\n', " "));
                if let Err(e) = synthesizer.speak(&text, &locale, cancel).await {
                    warn!("Speech output failed: {e}");
                }
            }
        });

        *current = Some(Utterance { cancel, task });
    }

    /// Cancel current speech immediately.
    pub fn cancel(&self) {
        if let Some(utterance) = self.current.lock().unwrap().take() {
            utterance.cancel.cancel();
            info!("Speech cancelled");
        }
    }
}
