//! Shared test utilities used across multiple test modules.

use crate::emotion::EmotionProfile;
use crate::error::{SynthesisError, SynthesisErrorKind};
use crate::tts::{AudioResource, EngineAdapter, EngineKind, SampleAudio};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Engine whose probe and synthesis outcomes are set by the test.
pub struct ScriptedEngine {
    kind: EngineKind,
    available: AtomicBool,
    failure: Mutex<Option<SynthesisErrorKind>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedEngine {
    pub fn working(kind: EngineKind) -> Self {
        Self {
            kind,
            available: AtomicBool::new(true),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn unavailable(kind: EngineKind) -> Self {
        let engine = Self::working(kind);
        engine.available.store(false, Ordering::SeqCst);
        engine
    }

    /// Probes fine but every `synthesize` fails with `kind`.
    pub fn failing(engine: EngineKind, kind: SynthesisErrorKind) -> Self {
        let scripted = Self::working(engine);
        *scripted.failure.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(kind);
        scripted
    }

    /// Sleep for `delay` inside every `synthesize` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineAdapter for ScriptedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn locales(&self) -> BTreeSet<String> {
        BTreeSet::from(["pt-BR".to_owned()])
    }

    async fn probe(&self) -> Result<(), SynthesisError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SynthesisError::unavailable(self.kind, "scripted unavailable"))
        }
    }

    async fn synthesize(
        &self,
        _text: &str,
        profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = *self
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match failure {
            None => Ok(Box::new(SampleAudio::new(vec![0.0; 8], 16_000, profile.volume))),
            Some(kind) => Err(SynthesisError {
                kind,
                engine: self.kind,
                message: "scripted failure".into(),
            }),
        }
    }
}
