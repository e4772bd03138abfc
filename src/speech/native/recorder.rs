//! Microphone recording with cpal, bounded to one utterance.
//!
//! The stream is opened per utterance and closed when the speaker falls
//! silent, the maximum duration passes, or the session is stopped. cpal
//! streams are not `Send`, so `record` blocks its calling thread.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AudioConfig, SilenceConfig};
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Utterance {
    buffer: Vec<f32>,
    max_samples: usize,
    started: Instant,
    silence_start: Option<Instant>,
    done: bool,
}

pub struct UtteranceRecorder {
    audio: AudioConfig,
    silence: SilenceConfig,
}

impl UtteranceRecorder {
    pub fn new(audio: AudioConfig, silence: SilenceConfig) -> Self {
        Self { audio, silence }
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    /// Record one utterance. Returns mono f32 samples at the configured rate.
    pub fn record(&self, stop: &CancellationToken) -> Result<Vec<f32>> {
        let max_samples =
            (self.silence.max_recording_duration * self.audio.sample_rate as f64) as usize;
        let shared = Arc::new(Mutex::new(Utterance {
            buffer: Vec::with_capacity(max_samples),
            max_samples,
            started: Instant::now(),
            silence_start: None,
            done: false,
        }));

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(Error::CapabilityUnavailable("audio input device"))?;
        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let stream_config = StreamConfig {
            channels: self.audio.channels,
            sample_rate: SampleRate(self.audio.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.audio.chunk_size),
        };

        let callback_state = Arc::clone(&shared);
        let silence = self.silence.clone();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let Ok(mut inner) = callback_state.lock() else {
                        return;
                    };
                    if inner.done {
                        return;
                    }

                    let remaining = inner.max_samples.saturating_sub(inner.buffer.len());
                    let to_copy = data.len().min(remaining);
                    inner.buffer.extend_from_slice(&data[..to_copy]);
                    if inner.buffer.len() >= inner.max_samples {
                        info!("Max utterance duration reached ({}s)", silence.max_recording_duration);
                        inner.done = true;
                        return;
                    }

                    // Don't check silence until minimum speech duration
                    if inner.started.elapsed().as_secs_f64() < silence.min_speech_duration {
                        return;
                    }

                    if rms_energy(data) < silence.threshold {
                        let silence_start = *inner.silence_start.get_or_insert_with(Instant::now);
                        if silence_start.elapsed().as_secs_f64() >= silence.duration {
                            debug!("Silence detected for {}s, ending utterance", silence.duration);
                            inner.done = true;
                        }
                    } else {
                        inner.silence_start = None;
                    }
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| Error::Capture(format!("Failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::Capture(format!("Failed to start audio stream: {e}")))?;
        debug!("Recording utterance");

        loop {
            std::thread::sleep(POLL_INTERVAL);
            if stop.is_cancelled() {
                debug!("Recording stopped by caller");
                break;
            }
            if shared.lock().map(|inner| inner.done).unwrap_or(true) {
                break;
            }
        }
        drop(stream);

        let samples = shared
            .lock()
            .map(|mut inner| std::mem::take(&mut inner.buffer))
            .map_err(|_| Error::Capture("recorder state poisoned".into()))?;
        let duration = samples.len() as f64 / self.audio.sample_rate as f64;
        info!("Recorded {:.1}s ({} samples)", duration, samples.len());
        Ok(samples)
    }
}

/// Check if audio data is silent.
pub fn is_silent(samples: &[f32], threshold: f32) -> bool {
    let rms = rms_energy(samples);
    debug!("Audio RMS energy: {rms:.4} (threshold: {threshold})");
    rms < threshold
}

/// Calculate RMS energy of audio samples.
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_zero_audio_are_silent() {
        assert!(is_silent(&[], 0.01));
        assert!(is_silent(&[0.0; 1600], 0.01));
    }

    #[test]
    fn speech_level_audio_is_not_silent() {
        let tone: Vec<f32> = (0..1600).map(|i| 0.3 * (i as f32 * 0.1).sin()).collect();
        assert!(!is_silent(&tone, 0.01));
    }

    #[test]
    fn rms_of_constant_signal_is_its_amplitude() {
        assert!((rms_energy(&[0.5; 100]) - 0.5).abs() < 1e-6);
    }
}
