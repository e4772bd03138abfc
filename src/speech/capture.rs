//! Speech Capture Adapter.
//!
//! Runs one recognition session per `start` and reports it on a channel:
//! `Listening { listening: true }`, at most one `Transcript`, then
//! `Listening { listening: false }`. The closing event is sent on every exit
//! path (transcript, silence, stop, error) so a front end never stays stuck
//! in the listening state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Recognizer;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Listening { session: u64, listening: bool },
    Transcript { session: u64, text: String },
}

impl CaptureEvent {
    pub fn session(&self) -> u64 {
        match self {
            Self::Listening { session, .. } | Self::Transcript { session, .. } => *session,
        }
    }
}

/// Ownership of one running capture session. Dropping it does not stop the
/// session; pass it to [`SpeechCapture::stop`].
#[derive(Debug)]
pub struct CaptureHandle {
    session: u64,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl CaptureHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct SpeechCapture {
    recognizer: Option<Arc<dyn Recognizer>>,
    locale: String,
    next_session: AtomicU64,
}

impl SpeechCapture {
    pub fn new(recognizer: Option<Arc<dyn Recognizer>>, locale: impl Into<String>) -> Self {
        Self {
            recognizer,
            locale: locale.into(),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Start a single-utterance session.
    ///
    /// Fails with `CapabilityUnavailable` without emitting any event when the
    /// host has no recognizer.
    pub fn start(&self, events: mpsc::Sender<CaptureEvent>) -> Result<CaptureHandle> {
        let Some(recognizer) = self.recognizer.clone() else {
            return Err(Error::CapabilityUnavailable("speech recognition"));
        };

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let locale = self.locale.clone();

        let task = tokio::spawn({
            let stop = stop.clone();
            async move {
                let _ = events.send(CaptureEvent::Listening { session, listening: true }).await;
                info!("Capture session {session} started ({locale})");

                match recognizer.recognize(&locale, stop).await {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        debug!("Capture session {session} heard: '{text}'");
                        let _ = events
                            .send(CaptureEvent::Transcript {
                                session,
                                text: text.trim().to_string(),
                            })
                            .await;
                    }
                    Ok(_) => info!("Capture session {session} ended without speech"),
                    Err(e) => warn!("Capture session {session} failed: {e}"),
                }

                let _ = events.send(CaptureEvent::Listening { session, listening: false }).await;
            }
        });

        Ok(CaptureHandle { session, stop, task })
    }

    /// Stop a session. A session that already ended is left alone.
    pub fn stop(&self, handle: CaptureHandle) {
        if handle.is_active() {
            info!("Stopping capture session {}", handle.session);
            handle.stop.cancel();
        } else {
            debug!("Capture session {} already ended", handle.session);
        }
    }
}
