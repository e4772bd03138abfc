//! courseteen-chat: voice-enabled course assistant in the terminal.

use clap::Parser;
use courseteen_chat::api::{self, ApiState};
use courseteen_chat::backend::Backend;
use courseteen_chat::config::{BackendMode, Config};
use courseteen_chat::controller::ConversationController;
use courseteen_chat::repl;
use courseteen_chat::resolver::ReplyResolver;
use courseteen_chat::speech::{self, SpeechCapture, SpeechOutput};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "courseteen-chat", about = "Course assistant chat with voice input and output")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answering backend (overrides backend.mode in config)
    #[arg(short, long, value_enum)]
    backend: Option<BackendMode>,

    /// Serve the state API for a widget front end
    #[arg(long)]
    api: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins over the flag; keep HTTP client internals quiet
    let default_filter = if args.verbose {
        "debug,hyper=info,reqwest=info,whisper_rs=info"
    } else {
        "info,hyper=warn,reqwest=warn,whisper_rs=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("courseteen-chat starting");

    let config = Config::load(args.config.as_deref());
    let mode = args.backend.unwrap_or(config.backend.mode);
    info!("Answering backend: {:?}", mode);

    let backend = Backend::from_config(mode, &config);
    let resolver = ReplyResolver::new(backend.service.clone());

    // Speech capabilities (the Whisper model load blocks for a few seconds)
    let recognizer = tokio::task::spawn_blocking({
        let config = config.clone();
        move || speech::detect_recognizer(&config)
    })
    .await?;
    let capture = SpeechCapture::new(recognizer, config.speech.locale.clone());
    let voice_input = capture.is_available();
    let output = Arc::new(SpeechOutput::new(
        speech::detect_synthesizer(&config),
        config.speech.locale.clone(),
    ));
    info!(
        "Voice input: {}, voice output: {}",
        if voice_input { "on" } else { "off" },
        if output.is_available() { "on" } else { "off" }
    );

    let controller = ConversationController::spawn(
        resolver,
        capture,
        output.clone(),
        Duration::from_millis(config.speech.auto_submit_delay_ms),
    );

    if args.api || config.api.enabled {
        let state = ApiState {
            controller: controller.clone(),
            courses: backend.courses.clone(),
            output,
            voice_input,
        };
        api::start_api(state, config.api.port).await;
    }

    repl::run(controller, backend.courses).await?;

    info!("Goodbye");
    Ok(())
}
