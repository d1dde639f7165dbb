//! Offline synthesizer driven as an external process (espeak-ng compatible).
//!
//! The driver renders into a temp WAV file that lives exactly as long as the
//! returned [`WavFileAudio`].

use super::{AudioResource, EngineAdapter, EngineKind, WavFileAudio};
use crate::emotion::EmotionProfile;
use crate::error::SynthesisError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Driver speaking rate at speed factor 1.0, in words per minute.
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Driver amplitude at volume 1.0 (espeak-ng range is 0–200).
const MAX_AMPLITUDE: f32 = 200.0;

/// Offline engine adapter.
pub struct OfflineTts {
    driver: String,
    voice: String,
    locale: String,
    resolved: Mutex<Option<PathBuf>>,
}

impl OfflineTts {
    pub fn new(driver: &str, voice: &str, locale: &str) -> Self {
        Self {
            driver: driver.to_owned(),
            voice: voice.to_owned(),
            locale: locale.to_owned(),
            resolved: Mutex::new(None),
        }
    }

    fn resolve_driver(&self) -> Result<PathBuf, SynthesisError> {
        let mut guard = self
            .resolved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(path) = guard.as_ref() {
            return Ok(path.clone());
        }
        let path = which::which(&self.driver).map_err(|e| {
            SynthesisError::unavailable(
                EngineKind::OfflineEngine,
                format!("driver '{}' not found: {e}", self.driver),
            )
        })?;
        info!(driver = %path.display(), "offline TTS driver found");
        *guard = Some(path.clone());
        Ok(path)
    }

    fn driver_args(&self, text: &str, profile: &EmotionProfile, out: &std::path::Path) -> Vec<String> {
        let wpm = (BASE_WORDS_PER_MINUTE * profile.speed_factor).round() as u32;
        let amplitude = (MAX_AMPLITUDE * profile.volume).round() as u32;
        vec![
            "-v".to_owned(),
            self.voice.clone(),
            "-s".to_owned(),
            wpm.to_string(),
            "-a".to_owned(),
            amplitude.to_string(),
            "-w".to_owned(),
            out.display().to_string(),
            "--".to_owned(),
            text.to_owned(),
        ]
    }
}

#[async_trait]
impl EngineAdapter for OfflineTts {
    fn kind(&self) -> EngineKind {
        EngineKind::OfflineEngine
    }

    fn locales(&self) -> BTreeSet<String> {
        BTreeSet::from([self.locale.clone()])
    }

    async fn probe(&self) -> Result<(), SynthesisError> {
        self.resolve_driver().map(|_| ())
    }

    async fn synthesize(
        &self,
        text: &str,
        profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError> {
        let kind = EngineKind::OfflineEngine;
        let driver = self.resolve_driver()?;

        let temp = tempfile::Builder::new()
            .prefix("fala-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| SynthesisError::unavailable(kind, format!("cannot create temp file: {e}")))?
            .into_temp_path();

        let args = self.driver_args(text, profile, &temp);
        debug!(driver = %driver.display(), ?args, "running offline synthesizer");
        let output = tokio::process::Command::new(&driver)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SynthesisError::unavailable(kind, format!("failed to run driver: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::rejected(
                kind,
                format!("driver exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        // Prosody is applied by the driver flags; play back unscaled.
        Ok(Box::new(WavFileAudio::new(temp, 1.0)))
    }
}
