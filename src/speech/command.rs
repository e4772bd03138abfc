//! Speech output through an external TTS program.
//!
//! Runs an espeak-compatible program (`espeak-ng` by default) once per
//! utterance. Cancelling kills the child so a new reply can start speaking
//! right away.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Synthesizer;
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// espeak defaults: pitch 50 (0-99), 175 words per minute.
const BASE_PITCH: f32 = 50.0;
const BASE_WPM: f32 = 175.0;

pub struct CommandSynthesizer {
    program: PathBuf,
    pitch: f32,
    rate: f32,
}

impl CommandSynthesizer {
    /// Locate the configured program on `PATH`.
    pub fn detect(config: &SpeechConfig) -> Option<Self> {
        match which::which(&config.program) {
            Ok(program) => {
                info!("Speech output via {}", program.display());
                Some(Self {
                    program,
                    pitch: config.pitch,
                    rate: config.rate,
                })
            }
            Err(e) => {
                warn!("Speech output unavailable ({}: {e})", config.program);
                None
            }
        }
    }

    fn args(&self, text: &str, locale: &str) -> Vec<String> {
        let pitch = (BASE_PITCH * self.pitch).clamp(0.0, 99.0).round() as u32;
        let wpm = (BASE_WPM * self.rate).clamp(80.0, 450.0).round() as u32;
        vec![
            "-v".into(),
            locale.to_lowercase(),
            "-p".into(),
            pitch.to_string(),
            "-s".into(),
            wpm.to_string(),
            "--".into(),
            text.to_string(),
        ]
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn speak(&self, text: &str, locale: &str, cancel: CancellationToken) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(self.args(text, locale))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Synthesis(format!("Failed to spawn {}: {e}", self.program.display())))?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if !status.success() {
                    return Err(Error::Synthesis(format!(
                        "{} exited with {status}",
                        self.program.display()
                    )));
                }
                debug!("Utterance finished");
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop speech process: {e}");
                }
                debug!("Utterance interrupted");
            }
        }
        Ok(())
    }
}
