//! Native speech recognition: cpal microphone + Whisper.

mod recorder;
mod whisper;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use self::recorder::{is_silent, UtteranceRecorder};
use self::whisper::WhisperTranscriber;
use super::Recognizer;
use crate::config::{AudioConfig, CaptureConfig, SilenceConfig};
use crate::{Error, Result};

pub struct WhisperRecognizer {
    transcriber: WhisperTranscriber,
    audio: AudioConfig,
    silence: SilenceConfig,
    debug_wav: Option<PathBuf>,
}

impl WhisperRecognizer {
    pub fn load(config: &CaptureConfig) -> Result<Self> {
        Ok(Self {
            transcriber: WhisperTranscriber::load(&config.whisper.model)?,
            audio: config.audio.clone(),
            silence: config.silence.clone(),
            debug_wav: config.debug_wav.clone(),
        })
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(&self, locale: &str, stop: CancellationToken) -> Result<Option<String>> {
        let recorder = UtteranceRecorder::new(self.audio.clone(), self.silence.clone());
        let transcriber = self.transcriber.clone();
        let threshold = self.silence.threshold;
        let debug_wav = self.debug_wav.clone();
        let channels = self.audio.channels;
        let locale = locale.to_string();

        tokio::task::spawn_blocking(move || {
            let samples = recorder.record(&stop)?;
            if samples.is_empty() || is_silent(&samples, threshold) {
                info!("Utterance is silent, skipping transcription");
                return Ok(None);
            }
            if let Some(path) = &debug_wav {
                save_wav(path, &samples, channels, recorder.sample_rate());
            }
            let text = transcriber.transcribe(&samples, recorder.sample_rate(), &locale)?;
            Ok((!text.is_empty()).then_some(text))
        })
        .await
        .map_err(|e| Error::Capture(format!("Recognition task failed: {e}")))?
    }
}

/// Save the last utterance as 16-bit WAV for debugging.
fn save_wav(path: &std::path::Path, samples: &[f32], channels: u16, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    match hound::WavWriter::create(path, spec) {
        Ok(mut writer) => {
            for &sample in samples {
                // f32 [-1, 1] → i16
                let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                if writer.write_sample(s).is_err() {
                    break;
                }
            }
            if writer.finalize().is_ok() {
                info!("Saved WAV to {}", path.display());
            }
        }
        Err(e) => warn!("Failed to save WAV: {e}"),
    }
}
