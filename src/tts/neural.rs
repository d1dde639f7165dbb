//! Neural multilingual backend.
//!
//! The model itself is opaque: a [`ModelLoader`] turns weights on disk into a
//! [`SpeechModel`] that maps text to samples. Loading and inference are
//! CPU/GPU-bound, so both run on tokio's blocking pool.

use super::{AudioResource, EngineAdapter, EngineKind, SampleAudio};
use crate::config::DevicePreference;
use crate::emotion::EmotionProfile;
use crate::error::SynthesisError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

const MULTILINGUAL_LOCALES: &[&str] = &["pt-BR", "pt-PT", "en-US", "es-ES", "fr-FR", "de-DE", "it-IT"];

/// Failure reported by a neural model backend.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model load failed: {0}")]
    Load(String),
    #[error("requested device unavailable: {0}")]
    Device(String),
    #[error("model rejected input: {0}")]
    Rejected(String),
}

/// A loaded text-to-samples model.
pub trait SpeechModel: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// # Errors
    ///
    /// Returns [`ModelError::Rejected`] when the model cannot render this input.
    fn infer(&self, text: &str, locale: &str, speed: f32) -> Result<Vec<f32>, ModelError>;
}

/// Loads model weights from disk onto the preferred device.
pub trait ModelLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`ModelError`] if the weights cannot be loaded.
    fn load(
        &self,
        path: &Path,
        device: DevicePreference,
        sample_rate: u32,
    ) -> Result<Arc<dyn SpeechModel>, ModelError>;
}

/// Neural multilingual engine adapter.
pub struct NeuralTts {
    model_path: Option<PathBuf>,
    device: DevicePreference,
    sample_rate: u32,
    locale: String,
    loader: Option<Arc<dyn ModelLoader>>,
    /// Set on the first successful load; failed loads are retried on re-probe.
    model: OnceCell<Arc<dyn SpeechModel>>,
}

impl NeuralTts {
    pub fn new(
        model_path: Option<PathBuf>,
        device: DevicePreference,
        sample_rate: u32,
        locale: &str,
        loader: Option<Arc<dyn ModelLoader>>,
    ) -> Self {
        Self {
            model_path,
            device,
            sample_rate,
            locale: locale.to_owned(),
            loader,
            model: OnceCell::new(),
        }
    }

    async fn load_model(&self) -> Result<Arc<dyn SpeechModel>, SynthesisError> {
        let kind = EngineKind::NeuralMultilingual;
        let path = self
            .model_path
            .clone()
            .ok_or_else(|| SynthesisError::unavailable(kind, "no neural model configured"))?;
        let loader = self
            .loader
            .clone()
            .ok_or_else(|| SynthesisError::unavailable(kind, "no neural model backend installed"))?;
        if !path.exists() {
            return Err(SynthesisError::unavailable(
                kind,
                format!("model weights not found: {}", path.display()),
            ));
        }

        info!(path = %path.display(), device = ?self.device, "loading neural TTS model");
        let device = self.device;
        let sample_rate = self.sample_rate;
        tokio::task::spawn_blocking(move || loader.load(&path, device, sample_rate))
            .await
            .map_err(|e| SynthesisError::unavailable(kind, format!("model load task failed: {e}")))?
            .map_err(|e| SynthesisError::unavailable(kind, e.to_string()))
    }
}

#[async_trait]
impl EngineAdapter for NeuralTts {
    fn kind(&self) -> EngineKind {
        EngineKind::NeuralMultilingual
    }

    fn locales(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = MULTILINGUAL_LOCALES.iter().map(|s| (*s).to_owned()).collect();
        set.insert(self.locale.clone());
        set
    }

    async fn probe(&self) -> Result<(), SynthesisError> {
        self.model
            .get_or_try_init(|| self.load_model())
            .await
            .map(|_| ())
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError> {
        let kind = EngineKind::NeuralMultilingual;
        let model = self
            .model
            .get()
            .cloned()
            .ok_or_else(|| SynthesisError::unavailable(kind, "model not loaded"))?;

        let text = text.to_owned();
        let locale = self.locale.clone();
        let speed = profile.speed_factor;
        let infer_model = Arc::clone(&model);
        let samples = tokio::task::spawn_blocking(move || infer_model.infer(&text, &locale, speed))
            .await
            .map_err(|e| SynthesisError::rejected(kind, format!("inference task failed: {e}")))?
            .map_err(|e| match e {
                ModelError::Rejected(msg) => SynthesisError::rejected(kind, msg),
                other => SynthesisError::unavailable(kind, other.to_string()),
            })?;

        Ok(Box::new(SampleAudio::new(
            samples,
            model.sample_rate(),
            profile.volume,
        )))
    }
}
