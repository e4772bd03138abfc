//! Conversation controller with state machine.
//!
//! IDLE → AWAITING_REPLY → IDLE
//! IDLE → LISTENING → IDLE (→ AWAITING_REPLY when a transcript arrives)
//!
//! One task owns the transcript and handles commands, resolved replies and
//! capture events in order. Submitting or starting to listen while a reply
//! is pending, or while a captured transcript waits for its auto-submit, is
//! rejected with `Busy`; a reply whose request token is not the current one
//! is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::resolver::ReplyResolver;
use crate::speech::{CaptureEvent, CaptureHandle, SpeechCapture, SpeechOutput};
use crate::turn::{ConversationState, ReplyResult, Turn};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    AwaitingReply,
    Listening,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::AwaitingReply => write!(f, "AWAITING_REPLY"),
            Self::Listening => write!(f, "LISTENING"),
        }
    }
}

enum Command {
    Submit {
        text: String,
        done: oneshot::Sender<Result<()>>,
    },
    StartListening {
        done: oneshot::Sender<Result<()>>,
    },
    StopListening,
    CancelSpeech,
}

enum Internal {
    Resolved { request: u64, reply: ReplyResult },
    AutoSubmit { transcript: String },
}

/// Cloneable front-end handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConversationState>,
}

impl ControllerHandle {
    /// Submit typed text as a user turn.
    pub async fn submit(&self, text: impl Into<String>) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Submit {
            text: text.into(),
            done,
        })
        .await?;
        rx.await.map_err(|_| Error::ControllerStopped)?
    }

    pub async fn start_listening(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Command::StartListening { done }).await?;
        rx.await.map_err(|_| Error::ControllerStopped)?
    }

    pub async fn stop_listening(&self) -> Result<()> {
        self.send(Command::StopListening).await
    }

    pub async fn cancel_speech(&self) -> Result<()> {
        self.send(Command::CancelSpeech).await
    }

    /// Current transcript and flags.
    pub fn state(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    /// Receiver that changes on every transcript or flag update.
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ControllerStopped)
    }
}

pub struct ConversationController {
    resolver: ReplyResolver,
    capture: SpeechCapture,
    output: Arc<SpeechOutput>,
    auto_submit_delay: Duration,
    state: ControllerState,
    turns: Vec<Turn>,
    request: u64,
    capture_handle: Option<CaptureHandle>,
    /// A captured transcript is waiting out the auto-submit delay.
    transcript_pending: bool,
    snapshot: watch::Sender<ConversationState>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    capture_tx: mpsc::Sender<CaptureEvent>,
    capture_rx: mpsc::Receiver<CaptureEvent>,
}

impl ConversationController {
    pub fn new(
        resolver: ReplyResolver,
        capture: SpeechCapture,
        output: Arc<SpeechOutput>,
        auto_submit_delay: Duration,
    ) -> (Self, ControllerHandle) {
        let (command_tx, commands) = mpsc::channel(16);
        let (internal_tx, internal_rx) = mpsc::channel(16);
        let (capture_tx, capture_rx) = mpsc::channel(16);
        let (snapshot, state) = watch::channel(ConversationState::default());

        let controller = Self {
            resolver,
            capture,
            output,
            auto_submit_delay,
            state: ControllerState::Idle,
            turns: Vec::new(),
            request: 0,
            capture_handle: None,
            transcript_pending: false,
            snapshot,
            commands,
            internal_tx,
            internal_rx,
            capture_tx,
            capture_rx,
        };
        let handle = ControllerHandle {
            commands: command_tx,
            state,
        };
        (controller, handle)
    }

    /// Spawn the controller on the current runtime.
    pub fn spawn(
        resolver: ReplyResolver,
        capture: SpeechCapture,
        output: Arc<SpeechOutput>,
        auto_submit_delay: Duration,
    ) -> ControllerHandle {
        let (controller, handle) = Self::new(resolver, capture, output, auto_submit_delay);
        tokio::spawn(controller.run());
        handle
    }

    /// Process events until every handle is dropped.
    pub async fn run(mut self) {
        info!("Conversation ready");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.on_command(command),
                        None => {
                            debug!("All controller handles dropped");
                            break;
                        }
                    }
                }
                Some(event) = self.internal_rx.recv() => self.on_internal(event),
                Some(event) = self.capture_rx.recv() => self.on_capture(event),
            }
        }

        if let Some(handle) = self.capture_handle.take() {
            self.capture.stop(handle);
        }
        self.output.cancel();
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, done } => {
                let _ = done.send(self.submit(&text));
            }
            Command::StartListening { done } => {
                let _ = done.send(self.start_listening());
            }
            Command::StopListening => self.stop_listening(),
            Command::CancelSpeech => self.output.cancel(),
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Resolved { request, reply } => self.on_resolved(request, reply),
            Internal::AutoSubmit { transcript } => {
                self.transcript_pending = false;
                if self.state == ControllerState::Idle {
                    self.send_request(&transcript);
                } else {
                    warn!("Dropping transcript '{transcript}': controller is {}", self.state);
                    self.publish();
                }
            }
        }
    }

    fn submit(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyInput);
        }
        match self.state {
            ControllerState::AwaitingReply => return Err(Error::Busy("reply pending")),
            ControllerState::Listening => return Err(Error::Busy("listening")),
            ControllerState::Idle if self.transcript_pending => {
                return Err(Error::Busy("transcript pending"))
            }
            ControllerState::Idle => {}
        }

        self.send_request(text);
        Ok(())
    }

    /// Append the user turn and resolve it in the background. Caller checks
    /// that the controller is idle.
    fn send_request(&mut self, text: &str) {
        self.turns.push(Turn::user(text));
        self.request += 1;
        let request = self.request;
        self.transition(ControllerState::AwaitingReply);

        let resolver = self.resolver.clone();
        let internal_tx = self.internal_tx.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            let reply = resolver.resolve(&text).await;
            let _ = internal_tx.send(Internal::Resolved { request, reply }).await;
        });
    }

    fn on_resolved(&mut self, request: u64, reply: ReplyResult) {
        if self.state != ControllerState::AwaitingReply || request != self.request {
            warn!("Discarding stale reply for request {request}");
            return;
        }

        self.output.speak(&reply.text, None);
        self.turns.push(Turn::bot(reply));
        self.transition(ControllerState::Idle);
    }

    fn start_listening(&mut self) -> Result<()> {
        match self.state {
            ControllerState::Listening => return Err(Error::Busy("already listening")),
            ControllerState::AwaitingReply => return Err(Error::Busy("reply pending")),
            ControllerState::Idle if self.transcript_pending => {
                return Err(Error::Busy("transcript pending"))
            }
            ControllerState::Idle => {}
        }

        let handle = self.capture.start(self.capture_tx.clone())?;
        self.capture_handle = Some(handle);
        self.transition(ControllerState::Listening);
        Ok(())
    }

    fn stop_listening(&mut self) {
        let Some(handle) = self.capture_handle.take() else {
            debug!("Stop requested with no capture session");
            return;
        };
        self.capture.stop(handle);
        if self.state == ControllerState::Listening {
            self.transition(ControllerState::Idle);
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        let current = self.capture_handle.as_ref().map(CaptureHandle::session);
        if current != Some(event.session()) {
            debug!("Ignoring event from ended capture session {}", event.session());
            return;
        }

        match event {
            CaptureEvent::Listening { listening: true, .. } => {}
            CaptureEvent::Listening { listening: false, .. } => {
                self.capture_handle = None;
                self.transition(ControllerState::Idle);
            }
            CaptureEvent::Transcript { text, .. } => {
                self.capture_handle = None;
                self.transcript_pending = true;
                self.transition(ControllerState::Idle);

                info!("Transcript captured, submitting in {}ms", self.auto_submit_delay.as_millis());
                let internal_tx = self.internal_tx.clone();
                let delay = self.auto_submit_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = internal_tx.send(Internal::AutoSubmit { transcript: text }).await;
                });
            }
        }
    }

    fn transition(&mut self, next: ControllerState) {
        if self.state != next {
            info!("State: {} → {}", self.state, next);
            self.state = next;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(ConversationState {
            turns: self.turns.clone(),
            pending_reply: self.state == ControllerState::AwaitingReply || self.transcript_pending,
            listening: self.state == ControllerState::Listening,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BACKEND_APOLOGY;
    use crate::resolver::tests::StubService;
    use crate::resolver::{CATALOG_REPLY, GREETING_REPLY};
    use crate::speech::capture::tests::ScriptedRecognizer;
    use crate::speech::output::tests::{RecordingSynthesizer, Spoken};
    use crate::speech::Recognizer;
    use crate::turn::{Mood, Role};

    const AUTO_SUBMIT: Duration = Duration::from_millis(50);

    struct Harness {
        handle: ControllerHandle,
        service: Arc<StubService>,
        synth: Arc<RecordingSynthesizer>,
    }

    fn harness(service: Arc<StubService>, recognizer: Option<Arc<dyn Recognizer>>) -> Harness {
        harness_with_delay(service, recognizer, AUTO_SUBMIT)
    }

    fn harness_with_delay(
        service: Arc<StubService>,
        recognizer: Option<Arc<dyn Recognizer>>,
        auto_submit: Duration,
    ) -> Harness {
        let synth = RecordingSynthesizer::new(Duration::from_millis(5));
        let output = Arc::new(SpeechOutput::new(Some(synth.clone()), "en-US"));
        let handle = ConversationController::spawn(
            ReplyResolver::new(service.clone()),
            SpeechCapture::new(recognizer, "en-US"),
            output,
            auto_submit,
        );
        Harness {
            handle,
            service,
            synth,
        }
    }

    async fn wait_until(
        handle: &ControllerHandle,
        predicate: impl FnMut(&ConversationState) -> bool,
    ) -> ConversationState {
        let mut rx = handle.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(3), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for conversation state")
            .expect("controller stopped");
        state.clone()
    }

    #[tokio::test]
    async fn greeting_turn_is_answered_and_spoken() {
        let h = harness(StubService::replying(ReplyResult::neutral("unused")), None);

        h.handle.submit("Hello").await.unwrap();
        let state = wait_until(&h.handle, |s| s.turns.len() == 2).await;

        assert_eq!(state.turns[0], Turn::user("Hello"));
        assert_eq!(state.turns[1].role, Role::Bot);
        assert_eq!(state.turns[1].text, GREETING_REPLY);
        assert_eq!(state.turns[1].mood, Some(Mood::Joy));
        assert!(!state.pending_reply);
        assert_eq!(h.service.call_count(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.synth.spoken(),
            vec![Spoken::Finished(GREETING_REPLY.into(), "en-US".into())]
        );
    }

    #[tokio::test]
    async fn backend_failure_appends_exactly_one_error_turn() {
        let h = harness(StubService::unreachable(), None);

        h.handle.submit("What is the capital of France?").await.unwrap();
        wait_until(&h.handle, |s| s.turns.len() == 2 && !s.pending_reply).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = h.handle.state();
        assert_eq!(state.turns.len(), 2);
        assert_eq!(state.turns[1].mood, Some(Mood::Error));
        assert_eq!(state.turns[1].text, BACKEND_APOLOGY);
    }

    #[tokio::test]
    async fn pending_reply_is_visible_and_blocks_new_input() {
        let h = harness(
            StubService::replying_after(ReplyResult::new("Paris", Mood::Neutral), Duration::from_millis(200)),
            None,
        );

        h.handle.submit("What is the capital of France?").await.unwrap();
        let state = h.handle.state();
        assert!(state.pending_reply);
        assert_eq!(state.turns, vec![Turn::user("What is the capital of France?")]);

        let err = h.handle.submit("and Spain?").await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");
        let err = h.handle.start_listening().await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");

        let state = wait_until(&h.handle, |s| !s.pending_reply).await;
        assert_eq!(
            state.turns,
            vec![
                Turn::user("What is the capital of France?"),
                Turn::bot(ReplyResult::new("Paris", Mood::Neutral)),
            ]
        );
        assert_eq!(h.service.call_count(), 1);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let h = harness(StubService::replying(ReplyResult::neutral("unused")), None);

        let err = h.handle.submit("   ").await.unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
        assert!(h.handle.state().turns.is_empty());
    }

    #[tokio::test]
    async fn listening_without_capability_fails_and_stays_idle() {
        let h = harness(StubService::replying(ReplyResult::neutral("unused")), None);

        let err = h.handle.start_listening().await.unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)), "{err}");
        let state = h.handle.state();
        assert!(!state.listening);
        assert!(!state.pending_reply);
    }

    #[tokio::test]
    async fn captured_transcript_is_submitted_like_typed_text() {
        let h = harness(
            StubService::replying(ReplyResult::neutral("unused")),
            Some(ScriptedRecognizer::hearing("show me the courses")),
        );

        h.handle.start_listening().await.unwrap();
        assert!(h.handle.state().listening);

        let state = wait_until(&h.handle, |s| s.turns.len() == 2).await;
        assert_eq!(state.turns[0], Turn::user("show me the courses"));
        assert_eq!(state.turns[1].text, CATALOG_REPLY);
        assert!(!state.listening);
        assert!(!state.pending_reply);
        assert_eq!(h.service.call_count(), 0);
    }

    #[tokio::test]
    async fn transcript_goes_through_the_backend_when_no_rule_matches() {
        let h = harness(
            StubService::replying(ReplyResult::new("Paris", Mood::Neutral)),
            Some(ScriptedRecognizer::hearing("What is the capital of France?")),
        );

        h.handle.start_listening().await.unwrap();
        let state = wait_until(&h.handle, |s| s.turns.len() == 2).await;
        assert_eq!(state.turns[1], Turn::bot(ReplyResult::new("Paris", Mood::Neutral)));
        assert_eq!(h.service.call_count(), 1);
    }

    #[tokio::test]
    async fn stop_listening_returns_to_idle_without_turns() {
        let h = harness(
            StubService::replying(ReplyResult::neutral("unused")),
            Some(ScriptedRecognizer::silent_for(Duration::from_secs(30))),
        );

        h.handle.start_listening().await.unwrap();
        h.handle.stop_listening().await.unwrap();
        wait_until(&h.handle, |s| !s.listening).await;

        tokio::time::sleep(AUTO_SUBMIT * 3).await;
        assert!(h.handle.state().turns.is_empty());
        // the controller accepts a new session afterwards
        h.handle.start_listening().await.unwrap();
    }

    #[tokio::test]
    async fn failed_capture_clears_listening() {
        let h = harness(
            StubService::replying(ReplyResult::neutral("unused")),
            Some(ScriptedRecognizer::broken()),
        );

        h.handle.start_listening().await.unwrap();
        let state = wait_until(&h.handle, |s| !s.listening).await;
        assert!(state.turns.is_empty());
    }

    #[tokio::test]
    async fn second_listen_while_listening_is_busy() {
        let h = harness(
            StubService::replying(ReplyResult::neutral("unused")),
            Some(ScriptedRecognizer::silent_for(Duration::from_secs(30))),
        );

        h.handle.start_listening().await.unwrap();
        let err = h.handle.start_listening().await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");
        let err = h.handle.submit("typed while listening").await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");
    }

    #[tokio::test]
    async fn typed_input_cannot_overtake_a_captured_transcript() {
        let h = harness_with_delay(
            StubService::replying_after(ReplyResult::neutral("Paris"), Duration::from_millis(50)),
            Some(ScriptedRecognizer::hearing("What is the capital of France?")),
            Duration::from_millis(300),
        );

        h.handle.start_listening().await.unwrap();
        let state = wait_until(&h.handle, |s| !s.listening).await;
        assert!(state.pending_reply);
        assert!(state.turns.is_empty());

        let err = h.handle.submit("typed follow-up").await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");
        let err = h.handle.start_listening().await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");

        let state = wait_until(&h.handle, |s| s.turns.len() == 2).await;
        assert_eq!(
            state.turns,
            vec![
                Turn::user("What is the capital of France?"),
                Turn::bot(ReplyResult::neutral("Paris")),
            ]
        );
        assert_eq!(
            h.service.queries.lock().unwrap().as_slice(),
            ["What is the capital of France?"]
        );

        h.handle.submit("typed follow-up").await.unwrap();
    }

    #[tokio::test]
    async fn transcript_waits_for_the_auto_submit_delay() {
        let h = harness_with_delay(
            StubService::replying(ReplyResult::neutral("unused")),
            Some(ScriptedRecognizer::hearing("hello")),
            Duration::from_millis(300),
        );

        let started = tokio::time::Instant::now();
        h.handle.start_listening().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.handle.state().turns.is_empty());

        let state = wait_until(&h.handle, |s| !s.turns.is_empty()).await;
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(state.turns[0], Turn::user("hello"));
    }

    #[tokio::test]
    async fn reply_with_an_old_request_token_is_discarded() {
        let output = Arc::new(SpeechOutput::new(None, "en-US"));
        let (mut controller, handle) = ConversationController::new(
            ReplyResolver::new(StubService::replying_after(
                ReplyResult::neutral("unused"),
                Duration::from_secs(30),
            )),
            SpeechCapture::new(None, "en-US"),
            output,
            AUTO_SUBMIT,
        );

        controller.submit("first question").unwrap();
        let current = controller.request;
        controller.on_internal(Internal::Resolved {
            request: current - 1,
            reply: ReplyResult::neutral("late answer"),
        });
        assert_eq!(controller.state, ControllerState::AwaitingReply);
        assert_eq!(handle.state().turns, vec![Turn::user("first question")]);
        assert!(handle.state().pending_reply);

        controller.on_internal(Internal::Resolved {
            request: current,
            reply: ReplyResult::neutral("right answer"),
        });
        assert_eq!(controller.state, ControllerState::Idle);
        assert_eq!(
            handle.state().turns,
            vec![
                Turn::user("first question"),
                Turn::bot(ReplyResult::neutral("right answer")),
            ]
        );
    }
}
