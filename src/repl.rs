//! Terminal front end.
//!
//! Reads one line per question from stdin. Lines starting with `/` are
//! commands: `/listen`, `/stop`, `/cancel`, `/refresh`, `/help`, `/quit`.
//! A render task prints new turns as the controller publishes them.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::backend::courses::CourseSource;
use crate::controller::ControllerHandle;
use crate::turn::{ConversationState, Role, Turn};
use crate::Result;

const HELP: &str = "Type a question and press Enter.\n\
/listen   ask by voice\n\
/stop     stop listening\n\
/cancel   stop speaking\n\
/refresh  reload course records\n\
/quit     exit";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Ask(&'a str),
    Listen,
    Stop,
    CancelSpeech,
    Refresh,
    Help,
    Quit,
    Unknown(&'a str),
    Blank,
}

fn parse_line(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Ask(line);
    };
    match command.to_lowercase().as_str() {
        "listen" | "l" => Input::Listen,
        "stop" | "s" => Input::Stop,
        "cancel" => Input::CancelSpeech,
        "refresh" => Input::Refresh,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Unknown(line),
    }
}

/// `You: ...` for user turns, `Bot (MOOD): ...` for bot turns.
pub fn render_turn(turn: &Turn) -> String {
    match (turn.role, turn.mood) {
        (Role::User, _) => format!("You: {}", turn.text),
        (Role::Bot, Some(mood)) => {
            format!("Bot ({}): {}", mood.as_str().to_uppercase(), turn.text)
        }
        (Role::Bot, None) => format!("Bot: {}", turn.text),
    }
}

/// Turns published state snapshots into terminal lines, printing each turn
/// once and each indicator change once.
#[derive(Default)]
struct Renderer {
    printed: usize,
    pending_reply: bool,
    listening: bool,
}

impl Renderer {
    fn update(&mut self, state: &ConversationState) -> Vec<String> {
        let mut lines: Vec<String> = state.turns[self.printed.min(state.turns.len())..]
            .iter()
            .map(render_turn)
            .collect();
        self.printed = state.turns.len();

        if state.listening && !self.listening {
            lines.push("Listening...".into());
        }
        if state.pending_reply && !self.pending_reply {
            lines.push("Typing...".into());
        }
        self.listening = state.listening;
        self.pending_reply = state.pending_reply;
        lines
    }
}

async fn render(mut states: watch::Receiver<ConversationState>) {
    let mut renderer = Renderer::default();
    loop {
        let lines = renderer.update(&states.borrow_and_update());
        for line in lines {
            println!("{line}");
        }
        if states.changed().await.is_err() {
            break;
        }
    }
}

/// Run the chat loop until `/quit` or end of input.
pub async fn run(controller: ControllerHandle, courses: Arc<dyn CourseSource>) -> Result<()> {
    println!("Courseteen chat. {HELP}");
    let renderer = tokio::spawn(render(controller.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let outcome = match parse_line(&line) {
            Input::Blank => Ok(()),
            Input::Ask(text) => controller.submit(text).await,
            Input::Listen => controller.start_listening().await,
            Input::Stop => controller.stop_listening().await,
            Input::CancelSpeech => controller.cancel_speech().await,
            Input::Refresh => {
                courses.refresh();
                println!("Course records will be reloaded on the next question.");
                Ok(())
            }
            Input::Help => {
                println!("{HELP}");
                Ok(())
            }
            Input::Unknown(command) => {
                println!("Unknown command {command}. Try /help.");
                Ok(())
            }
            Input::Quit => break,
        };

        if let Err(e) = outcome {
            debug!("Input rejected: {e}");
            println!("! {e}");
        }
    }

    renderer.abort();
    if let Err(e) = controller.cancel_speech().await {
        warn!("Could not stop speech on exit: {e}");
    }
    Ok(())
}
