//! Speech session controller.
//!
//! Owns the single in-flight spoken utterance. Callers enqueue requests with
//! [`SpeechController::speak`] and observe progress through a `watch`
//! snapshot; one background task takes each request through
//!
//! ```text
//! Idle → Humanizing → Synthesizing → Playing → Cleanup → Idle
//!                          │
//!                          └─ (chain exhausted / playback error) → Failed → Idle
//! ```
//!
//! A new `speak` cancels the active request at its next checkpoint and
//! replaces any request still waiting, so only the most recent request ever
//! reaches `Playing`. Synthesis runs on its own task under a per-engine
//! timeout; a failure walks the selector's fallback chain down to
//! `TextOnly`. Every rendered resource is disposed on every exit path.

use crate::audio::AudioSink;
use crate::config::ProcessingConfig;
use crate::emotion::{EmotionProfile, EmotionTable, Humanizer};
use crate::error::{SynthesisError, SynthesisErrorKind};
use crate::runtime::SpeechEvent;
use crate::tts::{AudioResource, EngineKind, EngineSelector, PlaybackOutcome};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the current speech session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Humanizing,
    Synthesizing,
    Playing,
    Cleanup,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Humanizing => "humanizing",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
            Self::Cleanup => "cleanup",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Request being realized; `None` while idle.
    pub request_id: Option<u64>,
    /// Whether a request is waiting to start.
    pub pending: bool,
}

impl SessionSnapshot {
    /// Idle with nothing waiting.
    pub fn is_settled(&self) -> bool {
        self.state == SessionState::Idle && !self.pending
    }
}

/// One `speak` call. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub id: u64,
    pub text: String,
    pub emotion: Arc<EmotionProfile>,
    cancel: CancellationToken,
}

impl SpeechRequest {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Collaborators the controller is built from.
pub struct SessionDeps {
    pub selector: Arc<EngineSelector>,
    pub emotions: Arc<EmotionTable>,
    pub humanizer: Humanizer,
    pub sink: Arc<dyn AudioSink>,
    pub processing: ProcessingConfig,
    /// Optional observer channel.
    pub events: Option<mpsc::UnboundedSender<SpeechEvent>>,
}

impl SessionDeps {
    pub fn new(
        selector: Arc<EngineSelector>,
        emotions: Arc<EmotionTable>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            selector,
            emotions,
            humanizer: Humanizer::new(),
            sink,
            processing: ProcessingConfig::default(),
            events: None,
        }
    }

    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SpeechEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

#[derive(Default)]
struct Slot {
    next_id: u64,
    pending: Option<SpeechRequest>,
    active: Option<(u64, CancellationToken)>,
}

enum Attempt {
    Ready(Box<dyn AudioResource>),
    Failed(SynthesisError),
    Cancelled,
}

/// Disposes the wrapped resource when dropped.
struct ResourceGuard(Box<dyn AudioResource>);

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

struct Shared {
    deps: SessionDeps,
    slot: Mutex<Slot>,
    wake: Notify,
    state_tx: watch::Sender<SessionSnapshot>,
    shutdown: CancellationToken,
}

/// Handle to the speech session worker.
pub struct SpeechController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechController {
    /// Start the session worker on the current tokio runtime.
    pub fn spawn(deps: SessionDeps) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot {
            state: SessionState::Idle,
            request_id: None,
            pending: false,
        });
        let shared = Arc::new(Shared {
            deps,
            slot: Mutex::new(Slot::default()),
            wake: Notify::new(),
            state_tx,
            shutdown: CancellationToken::new(),
        });
        let worker = tokio::spawn(Arc::clone(&shared).run());
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `text` for speech with the named emotion and return its id.
    ///
    /// Unknown emotion names fall back to `neutro`. Any active request is
    /// cancelled and any waiting request is discarded.
    pub fn speak(&self, text: &str, emotion: &str) -> u64 {
        let profile = self.shared.deps.emotions.resolve(emotion);
        self.enqueue(text, profile)
    }

    /// Queue `text` with the configured default emotion.
    pub fn speak_default(&self, text: &str) -> u64 {
        let profile = self.shared.deps.emotions.default_profile();
        self.enqueue(text, profile)
    }

    fn enqueue(&self, text: &str, emotion: Arc<EmotionProfile>) -> u64 {
        let (id, superseded) = {
            let mut slot = self.shared.lock_slot();
            slot.next_id += 1;
            let id = slot.next_id;
            if let Some((active, token)) = &slot.active {
                debug!(request_id = *active, superseded_by = id, "cancelling active speech request");
                token.cancel();
            }
            let superseded = slot.pending.replace(SpeechRequest {
                id,
                text: text.to_owned(),
                emotion,
                cancel: CancellationToken::new(),
            });
            self.shared.state_tx.send_modify(|s| s.pending = true);
            (id, superseded)
        };
        if let Some(old) = superseded {
            debug!(request_id = old.id, superseded_by = id, "dropping waiting speech request");
            self.shared.emit(SpeechEvent::Discarded { request_id: old.id });
        }
        self.shared.wake.notify_one();
        id
    }

    /// Cancel the active request and drop any waiting one.
    pub fn cancel(&self) {
        let dropped = {
            let mut slot = self.shared.lock_slot();
            if let Some((_, token)) = &slot.active {
                token.cancel();
            }
            let dropped = slot.pending.take();
            self.shared.state_tx.send_modify(|s| s.pending = false);
            dropped
        };
        if let Some(old) = dropped {
            self.shared.emit(SpeechEvent::Discarded { request_id: old.id });
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state_tx.borrow().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.state_tx.subscribe()
    }

    /// Resolve once the session is idle with nothing waiting.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(SessionSnapshot::is_settled).await;
    }

    /// [`wait_idle`](Self::wait_idle) bounded by `limit`. Returns `false` on timeout.
    pub async fn wait_idle_for(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_idle()).await.is_ok()
    }

    pub fn selector(&self) -> &Arc<EngineSelector> {
        &self.shared.deps.selector
    }

    pub fn emotions(&self) -> &Arc<EmotionTable> {
        &self.shared.deps.emotions
    }

    /// Stop the worker after cancelling outstanding work.
    pub async fn shutdown(&self) {
        self.shared.stop();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for SpeechController {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SpeechEvent) {
        if let Some(tx) = &self.deps.events {
            let _ = tx.send(event);
        }
    }

    fn stop(&self) {
        self.shutdown.cancel();
        let mut slot = self.lock_slot();
        slot.pending = None;
        if let Some((_, token)) = &slot.active {
            token.cancel();
        }
    }

    async fn run(self: Arc<Self>) {
        info!("speech session worker started");
        while let Some(request) = self.next_request().await {
            let id = request.id;
            self.realize(request).await;
            self.finish(id);
        }
        debug!("speech session worker stopped");
    }

    async fn next_request(&self) -> Option<SpeechRequest> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }
            if let Some(request) = self.take_pending() {
                self.emit(SpeechEvent::StateChanged {
                    request_id: Some(request.id),
                    state: SessionState::Humanizing,
                });
                return Some(request);
            }
            tokio::select! {
                () = self.wake.notified() => {}
                () = self.shutdown.cancelled() => return None,
            }
        }
    }

    /// Move the waiting request to active and leave `Idle` in one step.
    fn take_pending(&self) -> Option<SpeechRequest> {
        let mut slot = self.lock_slot();
        let request = slot.pending.take()?;
        slot.active = Some((request.id, request.cancel.clone()));
        self.state_tx.send_modify(|s| {
            s.state = SessionState::Humanizing;
            s.request_id = Some(request.id);
            s.pending = false;
        });
        Some(request)
    }

    fn finish(&self, id: u64) {
        {
            let mut slot = self.lock_slot();
            if slot.active.as_ref().is_some_and(|(active, _)| *active == id) {
                slot.active = None;
            }
            let pending = slot.pending.is_some();
            self.state_tx.send_modify(|s| {
                s.state = SessionState::Idle;
                s.request_id = None;
                s.pending = pending;
            });
        }
        self.emit(SpeechEvent::StateChanged {
            request_id: None,
            state: SessionState::Idle,
        });
    }

    fn set_state(&self, id: u64, state: SessionState) {
        self.state_tx.send_modify(|s| {
            s.state = state;
            s.request_id = Some(id);
        });
        debug!(request_id = id, %state, "speech session state");
        self.emit(SpeechEvent::StateChanged {
            request_id: Some(id),
            state,
        });
    }

    fn discard(&self, id: u64) {
        debug!(request_id = id, "speech request cancelled before playback");
        self.emit(SpeechEvent::Discarded { request_id: id });
    }

    async fn realize(&self, request: SpeechRequest) {
        let id = request.id;
        let text = self.deps.humanizer.humanize(&request.text, &request.emotion);
        if text.is_empty() {
            debug!(request_id = id, "nothing to speak");
            return;
        }
        if request.is_cancelled() {
            self.discard(id);
            return;
        }

        self.set_state(id, SessionState::Synthesizing);
        let Some((engine, resource)) = self.synthesize_with_fallback(&request, &text).await else {
            return;
        };
        let mut resource = ResourceGuard(resource);
        if request.is_cancelled() {
            self.discard(id);
            return;
        }

        self.set_state(id, SessionState::Playing);
        let played = resource
            .0
            .play(Arc::clone(&self.deps.sink), &request.cancel)
            .await;
        let outcome = match played {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(request_id = id, %engine, error = %e, "playback failed");
                self.set_state(id, SessionState::Failed);
                drop(resource);
                if engine != EngineKind::TextOnly {
                    self.degrade_to_text(&request, &text).await;
                }
                return;
            }
        };

        self.set_state(id, SessionState::Cleanup);
        drop(resource);
        info!(request_id = id, %engine, ?outcome, "speech played");
        self.emit(SpeechEvent::Played {
            request_id: id,
            engine,
            outcome,
            text: text.clone(),
        });
        if outcome == PlaybackOutcome::Cancelled {
            return;
        }
        if engine == EngineKind::TextOnly {
            self.emit(SpeechEvent::TextEmitted { request_id: id, text });
        }

        let pause = request.emotion.pause();
        if !pause.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = request.cancel.cancelled() => {}
            }
        }
    }

    /// Try engines from the current one downwards until one renders the text.
    async fn synthesize_with_fallback(
        &self,
        request: &SpeechRequest,
        text: &str,
    ) -> Option<(EngineKind, Box<dyn AudioResource>)> {
        let id = request.id;
        let mut engine = self.deps.selector.current().kind;
        loop {
            match self.attempt(engine, request, text).await {
                Attempt::Ready(resource) => {
                    debug!(request_id = id, %engine, kind = resource.describe(), "synthesized");
                    return Some((engine, resource));
                }
                Attempt::Cancelled => {
                    self.discard(id);
                    return None;
                }
                Attempt::Failed(err) => {
                    if err.kind == SynthesisErrorKind::Timeout {
                        warn!(request_id = id, %engine, error = %err, "synthesis timed out");
                    } else {
                        info!(request_id = id, %engine, error = %err, "synthesis failed");
                    }
                    let Some(next) = self.deps.selector.next_fallback(engine) else {
                        error!(request_id = id, %engine, "engine chain exhausted");
                        self.set_state(id, SessionState::Failed);
                        return None;
                    };
                    info!(request_id = id, from = %engine, to = %next.kind, "falling back");
                    self.emit(SpeechEvent::EngineFallback {
                        request_id: id,
                        from: engine,
                        to: next.kind,
                        error: err.kind,
                    });
                    engine = next.kind;
                }
            }
        }
    }

    /// One bounded `synthesize` call, abandoned if the request is cancelled.
    async fn attempt(&self, engine: EngineKind, request: &SpeechRequest, text: &str) -> Attempt {
        let Some(adapter) = self.deps.selector.adapter(engine) else {
            return Attempt::Failed(SynthesisError::unavailable(engine, "engine not configured"));
        };
        let bound = self.deps.processing.timeout_for(engine);
        let text = text.to_owned();
        let profile = Arc::clone(&request.emotion);
        let mut task = tokio::spawn(async move {
            match tokio::time::timeout(bound, adapter.synthesize(&text, &profile)).await {
                Ok(result) => result,
                Err(_) => Err(SynthesisError::timeout(
                    engine,
                    format!("no audio within {} ms", bound.as_millis()),
                )),
            }
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(resource)) => Attempt::Ready(resource),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(e) => Attempt::Failed(SynthesisError::rejected(
                    engine,
                    format!("synthesis task failed: {e}"),
                )),
            },
            () = request.cancel.cancelled() => {
                // The backend call runs to completion; its output is never played.
                let request_id = request.id;
                tokio::spawn(async move {
                    if let Ok(Ok(mut resource)) = task.await {
                        debug!(request_id, "disposing audio of cancelled request");
                        resource.dispose();
                    }
                });
                Attempt::Cancelled
            }
        }
    }

    /// Show the reply as text after an audio engine failed during playback.
    async fn degrade_to_text(&self, request: &SpeechRequest, text: &str) {
        let Some(adapter) = self.deps.selector.adapter(EngineKind::TextOnly) else {
            return;
        };
        match adapter.synthesize(text, &request.emotion).await {
            Ok(resource) => {
                let mut resource = ResourceGuard(resource);
                let shown = resource
                    .0
                    .play(Arc::clone(&self.deps.sink), &request.cancel)
                    .await;
                if shown.is_ok() {
                    self.emit(SpeechEvent::TextEmitted {
                        request_id: request.id,
                        text: text.to_owned(),
                    });
                }
            }
            Err(e) => warn!(request_id = request.id, error = %e, "text fallback failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::FalaError;
    use crate::audio::{ChannelTextSink, NullSink};
    use crate::config::{EmotionsConfig, ProsodyOverride};
    use crate::test_utils::ScriptedEngine;
    use crate::tts::{EngineAdapter, TextOnlyTts};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Profiles with no post-playback pause so tests settle quickly.
    fn quick_emotions() -> Arc<EmotionTable> {
        let mut config = EmotionsConfig::default();
        for name in ["neutro", "feliz", "triste"] {
            config.overrides.insert(
                name.to_owned(),
                ProsodyOverride {
                    pause_seconds: Some(0.0),
                    ..Default::default()
                },
            );
        }
        Arc::new(EmotionTable::from_config(&config))
    }

    async fn controller(
        engines: Vec<Arc<dyn EngineAdapter>>,
        processing: ProcessingConfig,
    ) -> (SpeechController, mpsc::UnboundedReceiver<SpeechEvent>) {
        controller_with(engines, processing, quick_emotions(), Arc::new(NullSink)).await
    }

    async fn controller_with(
        engines: Vec<Arc<dyn EngineAdapter>>,
        processing: ProcessingConfig,
        emotions: Arc<EmotionTable>,
        sink: Arc<dyn AudioSink>,
    ) -> (SpeechController, mpsc::UnboundedReceiver<SpeechEvent>) {
        let selector = Arc::new(EngineSelector::probe(engines).await.unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let deps = SessionDeps::new(selector, emotions, sink)
            .with_processing(processing)
            .with_events(tx);
        (SpeechController::spawn(deps), rx)
    }

    /// Blocks its first playback until stopped; later playbacks return at once.
    #[derive(Default)]
    struct HoldFirstSink {
        calls: AtomicUsize,
    }

    impl AudioSink for HoldFirstSink {
        fn play(&self, _samples: &[f32], _sample_rate: u32, stop: &AtomicBool) -> crate::Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
            Ok(())
        }
    }

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn play(&self, _samples: &[f32], _sample_rate: u32, _stop: &AtomicBool) -> crate::Result<()> {
            Err(FalaError::Audio("device unplugged".into()))
        }
    }

    fn played(events: &[SpeechEvent]) -> Vec<(u64, PlaybackOutcome)> {
        events
            .iter()
            .filter_map(|e| match e {
                SpeechEvent::Played { request_id, outcome, .. } => Some((*request_id, *outcome)),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> Vec<SpeechEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn speak_walks_states_and_returns_to_idle() {
        let (speech, mut rx) = controller(
            vec![Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>],
            ProcessingConfig::default(),
        )
        .await;

        let id = speech.speak("oi", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        let states: Vec<SessionState> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SpeechEvent::StateChanged { request_id, state } if request_id == Some(id) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Humanizing,
                SessionState::Synthesizing,
                SessionState::Playing,
                SessionState::Cleanup,
            ]
        );
        assert_eq!(speech.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn failing_engine_falls_back_once_per_link() {
        let cloud = Arc::new(ScriptedEngine::failing(
            EngineKind::CloudTts,
            SynthesisErrorKind::BackendRejected,
        ));
        let text = Arc::new(ScriptedEngine::working(EngineKind::TextOnly));
        let (speech, mut rx) = controller(
            vec![
                cloud.clone() as Arc<dyn EngineAdapter>,
                text.clone() as Arc<dyn EngineAdapter>,
            ],
            ProcessingConfig::default(),
        )
        .await;

        let id = speech.speak("oi", "feliz");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        assert_eq!(cloud.calls(), 1, "no retry on the failing engine");
        assert_eq!(text.calls(), 1);
        let events = drain(&mut rx);
        assert!(events.contains(&SpeechEvent::EngineFallback {
            request_id: id,
            from: EngineKind::CloudTts,
            to: EngineKind::TextOnly,
            error: SynthesisErrorKind::BackendRejected,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            SpeechEvent::Played { engine: EngineKind::TextOnly, outcome: PlaybackOutcome::Completed, .. }
        )));
    }

    #[tokio::test]
    async fn slow_engine_times_out_into_fallback() {
        let neural = Arc::new(
            ScriptedEngine::working(EngineKind::NeuralMultilingual)
                .with_delay(Duration::from_secs(5)),
        );
        let mut processing = ProcessingConfig::default();
        processing
            .engine_timeouts_ms
            .insert(EngineKind::NeuralMultilingual.as_str().to_owned(), 20);
        let (speech, mut rx) = controller(
            vec![
                neural as Arc<dyn EngineAdapter>,
                Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>,
            ],
            processing,
        )
        .await;

        speech.speak("oi", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            SpeechEvent::EngineFallback { error: SynthesisErrorKind::Timeout, .. }
        )));
    }

    #[tokio::test]
    async fn newer_request_supersedes_one_in_synthesis() {
        let slow = Arc::new(
            ScriptedEngine::working(EngineKind::CloudTts).with_delay(Duration::from_millis(200)),
        );
        let (speech, mut rx) = controller(
            vec![
                slow as Arc<dyn EngineAdapter>,
                Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>,
            ],
            ProcessingConfig::default(),
        )
        .await;

        let mut states = speech.subscribe();
        let first = speech.speak("primeiro", "neutro");
        states
            .wait_for(|s| s.request_id == Some(first) && s.state == SessionState::Synthesizing)
            .await
            .unwrap();
        let second = speech.speak("segundo", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        let played: Vec<u64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SpeechEvent::Played { request_id, .. } => Some(request_id),
                _ => None,
            })
            .collect();
        assert_eq!(played, vec![second]);
    }

    #[tokio::test]
    async fn waiting_request_is_replaced_not_queued() {
        let slow = Arc::new(
            ScriptedEngine::working(EngineKind::CloudTts).with_delay(Duration::from_millis(100)),
        );
        let (speech, mut rx) = controller(
            vec![
                slow as Arc<dyn EngineAdapter>,
                Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>,
            ],
            ProcessingConfig::default(),
        )
        .await;

        let a = speech.speak("a", "neutro");
        let b = speech.speak("b", "neutro");
        let c = speech.speak("c", "neutro");
        assert!(a < b && b < c);
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        let events = drain(&mut rx);
        assert!(events.contains(&SpeechEvent::Discarded { request_id: b }));
        let played: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SpeechEvent::Played { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .collect();
        assert_eq!(played, vec![c]);
    }

    #[tokio::test]
    async fn unknown_emotion_speaks_as_neutral() {
        let (speech, mut rx) = controller(
            vec![Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>],
            ProcessingConfig::default(),
        )
        .await;
        speech.speak("tudo certo.", "sarcástico");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            SpeechEvent::Played { text, .. } if text == "tudo certo."
        )));
    }

    #[tokio::test]
    async fn newer_request_cancels_one_in_playback() {
        let (speech, mut rx) = controller_with(
            vec![
                Arc::new(ScriptedEngine::working(EngineKind::CloudTts)) as Arc<dyn EngineAdapter>,
                Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>,
            ],
            ProcessingConfig::default(),
            quick_emotions(),
            Arc::new(HoldFirstSink::default()),
        )
        .await;

        let mut states = speech.subscribe();
        let first = speech.speak("primeiro", "neutro");
        states
            .wait_for(|s| s.request_id == Some(first) && s.state == SessionState::Playing)
            .await
            .unwrap();
        let second = speech.speak("segundo", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        assert_eq!(
            played(&drain(&mut rx)),
            vec![
                (first, PlaybackOutcome::Cancelled),
                (second, PlaybackOutcome::Completed),
            ]
        );
    }

    #[tokio::test]
    async fn playback_error_fails_then_shows_text() {
        let (text_sink, mut shown) = ChannelTextSink::new();
        let (speech, mut rx) = controller_with(
            vec![
                Arc::new(ScriptedEngine::working(EngineKind::CloudTts)) as Arc<dyn EngineAdapter>,
                Arc::new(TextOnlyTts::new(Arc::new(text_sink), "pt-BR")) as Arc<dyn EngineAdapter>,
            ],
            ProcessingConfig::default(),
            quick_emotions(),
            Arc::new(BrokenSink),
        )
        .await;

        let id = speech.speak("tudo pronto.", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        let events = drain(&mut rx);
        assert!(events.contains(&SpeechEvent::StateChanged {
            request_id: Some(id),
            state: SessionState::Failed,
        }));
        assert!(events.contains(&SpeechEvent::TextEmitted {
            request_id: id,
            text: "tudo pronto.".into(),
        }));
        assert!(played(&events).is_empty(), "broken audio is never reported as played");
        assert_eq!(shown.try_recv().unwrap(), "tudo pronto.");
    }

    #[tokio::test]
    async fn huge_pause_override_keeps_worker_alive() {
        let mut config = EmotionsConfig::default();
        for (name, pause) in [("feliz", 1e20), ("neutro", 0.0)] {
            config.overrides.insert(
                name.to_owned(),
                ProsodyOverride {
                    pause_seconds: Some(pause),
                    ..Default::default()
                },
            );
        }
        let (speech, mut rx) = controller_with(
            vec![Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>],
            ProcessingConfig::default(),
            Arc::new(EmotionTable::from_config(&config)),
            Arc::new(NullSink),
        )
        .await;

        let mut states = speech.subscribe();
        let first = speech.speak("oi", "feliz");
        states
            .wait_for(|s| s.request_id == Some(first) && s.state == SessionState::Cleanup)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = speech.speak("segunda", "neutro");
        assert!(speech.wait_idle_for(Duration::from_secs(2)).await);

        let ids: Vec<u64> = played(&drain(&mut rx)).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn shutdown_stops_worker() {
        let (speech, _rx) = controller(
            vec![Arc::new(ScriptedEngine::working(EngineKind::TextOnly)) as Arc<dyn EngineAdapter>],
            ProcessingConfig::default(),
        )
        .await;
        speech.shutdown().await;
        assert!(speech.worker.lock().unwrap().is_none());
    }
}
