//! Text-to-speech engine adapters and engine selection.
//!
//! Every backend sits behind [`EngineAdapter`]: a lightweight availability
//! probe plus `synthesize(text, profile) -> AudioResource`. Backend-specific
//! failures are mapped onto the three [`SynthesisErrorKind`]s so the session
//! controller's fallback logic never needs to know which engine it is
//! talking to.
//!
//! [`SynthesisErrorKind`]: crate::error::SynthesisErrorKind

mod cloud;
mod neural;
mod offline;
mod resource;
mod selector;
mod text_only;

pub use cloud::CloudTts;
pub use neural::{ModelError, ModelLoader, NeuralTts, SpeechModel};
pub use offline::OfflineTts;
pub use resource::{AudioResource, PlaybackOutcome, SampleAudio, TextAudio, WavFileAudio};
pub use selector::EngineSelector;
pub use text_only::TextOnlyTts;

use crate::audio::TextSink;
use crate::config::FalaConfig;
use crate::emotion::EmotionProfile;
use crate::error::SynthesisError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Kind of synthesis backend, ordered by fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Local neural multilingual model.
    NeuralMultilingual,
    /// Remote HTTP text-to-speech service.
    CloudTts,
    /// Offline system synthesizer driven as an external process.
    OfflineEngine,
    /// Prints the decorated text instead of producing audio. Always available.
    TextOnly,
}

impl EngineKind {
    /// Every kind, highest priority first.
    pub const PRIORITY_ORDER: [EngineKind; 4] = [
        EngineKind::NeuralMultilingual,
        EngineKind::CloudTts,
        EngineKind::OfflineEngine,
        EngineKind::TextOnly,
    ];

    /// Fixed priority; higher is preferred.
    pub fn priority(self) -> u8 {
        match self {
            Self::NeuralMultilingual => 3,
            Self::CloudTts => 2,
            Self::OfflineEngine => 1,
            Self::TextOnly => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeuralMultilingual => "neural_multilingual",
            Self::CloudTts => "cloud_tts",
            Self::OfflineEngine => "offline_engine",
            Self::TextOnly => "text_only",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probed state of one configured engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDescriptor {
    pub kind: EngineKind,
    pub priority: u8,
    pub available: bool,
    /// BCP-47 locale tags the engine can speak.
    pub locale_support: BTreeSet<String>,
}

/// Uniform contract over one synthesis backend.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Locales this backend can speak.
    fn locales(&self) -> BTreeSet<String>;

    /// Lightweight self-check run by the selector at startup.
    ///
    /// # Errors
    ///
    /// Returns a [`SynthesisError`] describing why the backend is unusable.
    async fn probe(&self) -> Result<(), SynthesisError>;

    /// Render `text` with the profile's prosody into a playable resource.
    ///
    /// # Errors
    ///
    /// Returns a [`SynthesisError`] classified as unavailable, timeout or
    /// backend-rejected.
    async fn synthesize(
        &self,
        text: &str,
        profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError>;
}

/// Build one adapter per engine named in `config.engines.chain`.
///
/// `neural_loader` supplies the opaque neural model backend; without it the
/// neural engine is configured but probes as unavailable.
pub fn build_adapters(
    config: &FalaConfig,
    text_sink: Arc<dyn TextSink>,
    neural_loader: Option<Arc<dyn ModelLoader>>,
) -> Vec<Arc<dyn EngineAdapter>> {
    let mut seen = BTreeSet::new();
    let mut adapters: Vec<Arc<dyn EngineAdapter>> = Vec::new();
    for &kind in &config.engines.chain {
        if !seen.insert(kind) {
            continue;
        }
        let adapter: Arc<dyn EngineAdapter> = match kind {
            EngineKind::NeuralMultilingual => Arc::new(NeuralTts::new(
                config.engines.neural_model_path.clone(),
                config.tts.device,
                config.tts.sample_rate(),
                &config.locale,
                neural_loader.clone(),
            )),
            EngineKind::CloudTts => Arc::new(CloudTts::new(
                config.engines.cloud_endpoint.clone(),
                &config.engines.cloud_api_key,
                &config.engines.cloud_voice,
                &config.locale,
                config.tts.sample_rate(),
            )),
            EngineKind::OfflineEngine => Arc::new(OfflineTts::new(
                &config.engines.offline_driver,
                &config.engines.offline_voice,
                &config.locale,
            )),
            EngineKind::TextOnly => Arc::new(TextOnlyTts::new(Arc::clone(&text_sink), &config.locale)),
        };
        adapters.push(adapter);
    }
    adapters
}
