//! Whisper transcription using whisper-rs (whisper.cpp bindings).
//!
//! The model is loaded once; each call transcribes one finished utterance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::{Error, Result};

/// Shared handle to a loaded Whisper model.
#[derive(Clone)]
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
}

impl WhisperTranscriber {
    /// Load the Whisper GGML model named in config (or a direct path to one).
    pub fn load(model: &str) -> Result<Self> {
        let model_path = find_model(model)?;
        let path_str = model_path
            .to_str()
            .ok_or_else(|| Error::Config(format!("Non UTF-8 model path: {}", model_path.display())))?;

        info!("Loading Whisper model from {}", model_path.display());
        let t0 = Instant::now();
        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| Error::Capture(format!("Failed to load Whisper model: {e}")))?;
        info!("Whisper model loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self { ctx: Arc::new(ctx) })
    }

    /// Transcribe one utterance of mono samples. `locale` like `en-US`
    /// selects the language; `sample_rate` is only used for logging.
    pub fn transcribe(&self, samples: &[f32], sample_rate: u32, locale: &str) -> Result<String> {
        let started = Instant::now();
        let language = whisper_language(locale);

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language.as_str()));
        params.set_single_segment(true);
        params.set_token_timestamps(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| Error::Capture(format!("Failed to create whisper state: {e}")))?;
        state
            .full(params, samples)
            .map_err(|e| Error::Capture(format!("Whisper inference failed: {e}")))?;

        let pieces: Vec<String> = (0..state.full_n_segments())
            .filter_map(|i| state.get_segment(i))
            .filter_map(|segment| segment.to_str_lossy().ok().map(|t| t.trim().to_string()))
            .filter(|t| !t.is_empty())
            .collect();
        let text = pieces.join(" ");

        let seconds = samples.len() as f64 / f64::from(sample_rate.max(1));
        info!(
            "Transcribed {seconds:.1}s of {language} audio in {}ms",
            started.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// `en-US` → `en`.
fn whisper_language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .filter(|l| !l.is_empty())
        .unwrap_or("en")
        .to_lowercase()
}

/// Places a model named `model` may live, most specific first. A value that
/// already looks like a file path is tried as is.
fn model_candidates(model: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let as_path = PathBuf::from(model);
    if as_path.extension().is_some() {
        candidates.push(as_path);
    }

    let dirs = [
        dirs::data_dir().map(|d| d.join("courseteen-chat").join("models")),
        dirs::cache_dir().map(|d| d.join("whisper")),
        std::env::current_dir().ok(),
    ];
    let file = format!("ggml-{}.bin", model.replace('/', "-"));
    for dir in dirs.into_iter().flatten() {
        candidates.push(dir.join(&file));
        candidates.push(dir.join("ggml-base.bin"));
    }
    candidates
}

fn find_model(model: &str) -> Result<PathBuf> {
    model_candidates(model)
        .into_iter()
        .find(|path| path.is_file())
        .ok_or(Error::CapabilityUnavailable("Whisper GGML model"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_maps_to_whisper_language() {
        assert_eq!(whisper_language("en-US"), "en");
        assert_eq!(whisper_language("pt_BR"), "pt");
        assert_eq!(whisper_language("DE"), "de");
        assert_eq!(whisper_language(""), "en");
    }

    #[test]
    fn explicit_model_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.en.bin");
        std::fs::write(&path, b"ggml").unwrap();

        assert_eq!(find_model(path.to_str().unwrap()).unwrap(), path);
    }

    #[test]
    fn named_model_is_looked_up_as_ggml_file() {
        let candidates = model_candidates("small.en");
        assert!(candidates.iter().all(|p| p.extension().is_some()));
        assert!(candidates
            .iter()
            .any(|p| p.file_name().is_some_and(|f| f == "ggml-small.en.bin")));
    }

    #[test]
    fn missing_model_is_unavailable() {
        let err = find_model("no-such-model-7c1d").unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)));
    }
}
