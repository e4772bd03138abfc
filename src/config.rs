//! Configuration management for courseteen-chat.
//!
//! Loads config from YAML files in standard locations, then applies
//! environment overrides for secrets and the backend URL.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which Remote Answering Service answers non-canned questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Local HTTP endpoint (`POST /ask`)
    #[default]
    Local,
    /// Gemini completion with course records as context
    Gemini,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub base_url: String,
    /// Request timeout in seconds; 0 leaves requests unbounded.
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-1.5-flash".into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoursesConfig {
    pub enabled: bool,
    pub project_id: String,
    pub collection: String,
    pub api_key: String,
    pub base_url: String,
    /// How long fetched records are reused; 0 re-fetches every turn.
    pub cache_ttl_secs: u64,
}

impl Default for CoursesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: String::new(),
            collection: "courses".into(),
            api_key: String::new(),
            base_url: "https://firestore.googleapis.com".into(),
            cache_ttl_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub locale: String,
    /// Speak bot replies aloud.
    pub output: bool,
    /// External TTS program used for speech output.
    pub program: String,
    pub pitch: f32,
    pub rate: f32,
    /// Delay between a finished capture and the automatic submit.
    pub auto_submit_delay_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            output: true,
            program: "espeak-ng".into(),
            pitch: 1.0,
            rate: 1.0,
            auto_submit_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_size: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SilenceConfig {
    pub threshold: f32,
    pub duration: f64,
    pub min_speech_duration: f64,
    pub max_recording_duration: f64,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            duration: 1.5,
            min_speech_duration: 0.5,
            max_recording_duration: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    pub model: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "base".into(),
        }
    }
}

/// Native microphone recognizer settings (used with the `native-speech` feature).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub audio: AudioConfig,
    pub silence: SilenceConfig,
    pub whisper: WhisperConfig,
    /// Write each captured utterance to this WAV file.
    pub debug_wav: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8770,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub local: LocalConfig,
    pub gemini: GeminiConfig,
    pub courses: CoursesConfig,
    pub speech: SpeechConfig,
    pub capture: CaptureConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from YAML file, then apply environment overrides.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/courseteen-chat/config.yaml
    /// 3. /etc/courseteen-chat/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::load_file(path);
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    fn load_file(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/courseteen-chat/config.yaml")),
                Some(PathBuf::from("/etc/courseteen-chat/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    /// Secrets and the backend URL may come from the environment instead of the file.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Some(key) = non_empty("FIRESTORE_API_KEY") {
            self.courses.api_key = key;
        }
        if let Some(url) = non_empty("COURSETEEN_BACKEND_URL") {
            self.local.base_url = url;
        }
    }
}
