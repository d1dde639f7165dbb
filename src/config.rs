//! Configuration types for the assistant front-end.
//!
//! A configuration value is built once (defaults, optionally merged with a
//! TOML file) and handed to each component at construction time.

use crate::emotion::PunctuationRule;
use crate::error::ConfigLoadError;
use crate::tts::EngineKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FalaConfig {
    /// Default locale for recognized phrasings and synthesized speech.
    pub locale: String,
    /// Speech model identity and output quality.
    pub tts: TtsConfig,
    /// Engine chain and per-backend settings.
    pub engines: EnginesConfig,
    /// Default emotion and per-emotion prosody overrides.
    pub emotions: EmotionsConfig,
    /// Queue, timeout and cache sizing for the processing layer.
    pub processing: ProcessingConfig,
    /// Paths used by the internal commands.
    pub commands: CommandsConfig,
}

impl Default for FalaConfig {
    fn default() -> Self {
        Self {
            locale: "pt-BR".to_owned(),
            tts: TtsConfig::default(),
            engines: EnginesConfig::default(),
            emotions: EmotionsConfig::default(),
            processing: ProcessingConfig::default(),
            commands: CommandsConfig::default(),
        }
    }
}

/// Inference device preference for the neural backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Use an accelerator when one is present, else CPU.
    #[default]
    Auto,
    /// Require an accelerator.
    Accelerated,
    /// Force CPU inference.
    Cpu,
}

/// Output quality tier.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    UltraHigh,
    #[default]
    High,
    Medium,
}

impl QualityTier {
    /// Fixed sample-rate table for each tier.
    pub fn sample_rate(self) -> u32 {
        match self {
            Self::UltraHigh => 48_000,
            Self::High => 24_000,
            Self::Medium => 22_050,
        }
    }
}

/// Speech model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Model identity for the neural backend.
    pub model_id: String,
    /// Device the neural backend should run on.
    pub device: DevicePreference,
    /// Quality tier, mapped to an output sample rate.
    pub quality: QualityTier,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model_id: "xtts_v2-multilingual".to_owned(),
            device: DevicePreference::default(),
            quality: QualityTier::default(),
        }
    }
}

impl TtsConfig {
    pub fn sample_rate(&self) -> u32 {
        self.quality.sample_rate()
    }
}

/// Engine chain and backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Engines to configure. Ranking always follows the fixed engine priority,
    /// not the order written here.
    pub chain: Vec<EngineKind>,
    /// Path to the neural model weights (None = neural backend unavailable).
    pub neural_model_path: Option<PathBuf>,
    /// Cloud TTS endpoint URL (None = cloud backend unavailable).
    pub cloud_endpoint: Option<String>,
    /// Bearer token for the cloud endpoint (empty = no auth header).
    pub cloud_api_key: String,
    /// Voice name requested from the cloud endpoint.
    pub cloud_voice: String,
    /// Executable name or path of the offline synthesis driver.
    pub offline_driver: String,
    /// Voice passed to the offline driver.
    pub offline_voice: String,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            chain: EngineKind::PRIORITY_ORDER.to_vec(),
            neural_model_path: None,
            cloud_endpoint: None,
            cloud_api_key: String::new(),
            cloud_voice: "pt-BR-Standard-A".to_owned(),
            offline_driver: "espeak-ng".to_owned(),
            offline_voice: "pt-br".to_owned(),
        }
    }
}

/// Partial override of one emotion's prosody.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProsodyOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_seconds: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punctuation_rule: Option<PunctuationRule>,
}

/// Emotion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionsConfig {
    /// Emotion used when the caller names none.
    pub default_emotion: String,
    /// Per-emotion prosody overrides, keyed by emotion name.
    pub overrides: BTreeMap<String, ProsodyOverride>,
}

impl Default for EmotionsConfig {
    fn default() -> Self {
        Self {
            default_emotion: "neutro".to_owned(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Processing-layer sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Capacity of the input line channel feeding the assistant.
    pub queue_size: usize,
    /// Default bound on one `synthesize` call, in milliseconds.
    pub synthesis_timeout_ms: u64,
    /// Per-engine bounds, keyed by engine name (e.g. `cloud_tts = 8000`).
    pub engine_timeouts_ms: BTreeMap<String, u64>,
    /// Bound on how long a voice test waits for each phrase, in milliseconds.
    pub playback_wait_ms: u64,
    /// Maximum number of cached analysis results kept by commands.
    pub cache_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let mut engine_timeouts_ms = BTreeMap::new();
        engine_timeouts_ms.insert(EngineKind::NeuralMultilingual.as_str().to_owned(), 30_000);
        engine_timeouts_ms.insert(EngineKind::CloudTts.as_str().to_owned(), 10_000);
        Self {
            queue_size: 32,
            synthesis_timeout_ms: 15_000,
            engine_timeouts_ms,
            playback_wait_ms: 60_000,
            cache_size: 8,
        }
    }
}

impl ProcessingConfig {
    /// Timeout applied to a `synthesize` call against `engine`.
    pub fn timeout_for(&self, engine: EngineKind) -> Duration {
        let ms = self
            .engine_timeouts_ms
            .get(engine.as_str())
            .copied()
            .unwrap_or(self.synthesis_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Internal command paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Root of the program's own source tree (analysis, backup, improvement).
    pub source_root: PathBuf,
    /// Directory receiving backup archives.
    pub backup_dir: PathBuf,
    /// Number of backup archives kept after rotation.
    pub backup_keep: usize,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src"),
            backup_dir: default_data_dir().join("backups"),
            backup_keep: 5,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("fala"))
        .unwrap_or_else(|| PathBuf::from("/tmp/fala-data"))
}

impl FalaConfig {
    /// Load configuration from a TOML file, merged over built-in defaults.
    ///
    /// Nested tables merge key-by-key; unrecognized keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigLoadError`] if the file is missing, unreadable or malformed.
    pub fn from_file(path: &Path) -> std::result::Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigLoadError::NotFound(path.to_path_buf())
            } else {
                ConfigLoadError::Unreadable {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Self::from_toml_str(&content).map_err(|message| ConfigLoadError::Malformed {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse TOML text and merge it over the defaults.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, String> {
        let loaded: toml::Value = toml::from_str(content).map_err(|e| e.to_string())?;
        let mut merged = toml::Value::try_from(Self::default()).map_err(|e| e.to_string())?;
        merge_values(&mut merged, loaded);
        merged.try_into().map_err(|e: toml::de::Error| e.to_string())
    }

    /// Load configuration, falling back entirely to defaults on any load error.
    ///
    /// A malformed file is left untouched and reported as a warning.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded config");
                config
            }
            Err(ConfigLoadError::NotFound(_)) => {
                info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("{e}; using built-in defaults");
                Self::default()
            }
        }
    }

    /// Save configuration atomically (temp file, fsync, rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::FalaError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("toml.tmp");
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/fala/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("fala").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("/tmp/fala-config/config.toml"))
    }
}

/// Recursively merge `overlay` into `base`: tables merge key-by-key, any
/// other value replaces the base value.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FalaConfig::default();
        assert_eq!(config.locale, "pt-BR");
        assert_eq!(config.emotions.default_emotion, "neutro");
        assert_eq!(config.engines.chain.last(), Some(&EngineKind::TextOnly));
        assert_eq!(config.tts.sample_rate(), 24_000);
    }

    #[test]
    fn quality_tier_maps_to_fixed_sample_rates() {
        assert_eq!(QualityTier::UltraHigh.sample_rate(), 48_000);
        assert_eq!(QualityTier::High.sample_rate(), 24_000);
        assert_eq!(QualityTier::Medium.sample_rate(), 22_050);
    }

    #[test]
    fn nested_sections_merge_key_by_key() {
        let config = FalaConfig::from_toml_str(
            r#"
            [tts]
            quality = "ultra_high"

            [processing.engine_timeouts_ms]
            offline_engine = 2500
            "#,
        )
        .unwrap();

        // Overridden keys take effect...
        assert_eq!(config.tts.quality, QualityTier::UltraHigh);
        assert_eq!(
            config.processing.timeout_for(EngineKind::OfflineEngine),
            Duration::from_millis(2500)
        );
        // ...while sibling keys keep their defaults.
        assert_eq!(config.tts.model_id, TtsConfig::default().model_id);
        assert_eq!(
            config.processing.timeout_for(EngineKind::CloudTts),
            Duration::from_millis(10_000)
        );
        assert_eq!(config.processing.queue_size, 32);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = FalaConfig::from_toml_str(
            r#"
            shiny_new_option = true
            [tts]
            vocoder = "hifigan"
            device = "cpu"
            "#,
        )
        .unwrap();
        assert_eq!(config.tts.device, DevicePreference::Cpu);
    }

    #[test]
    fn emotion_overrides_deserialize() {
        let config = FalaConfig::from_toml_str(
            r#"
            [emotions]
            default_emotion = "feliz"

            [emotions.overrides.triste]
            pause_seconds = 1.5
            punctuation_rule = "ellipsis"
            "#,
        )
        .unwrap();
        assert_eq!(config.emotions.default_emotion, "feliz");
        let triste = &config.emotions.overrides["triste"];
        assert_eq!(triste.pause_seconds, Some(1.5));
        assert_eq!(triste.punctuation_rule, Some(PunctuationRule::Ellipsis));
        assert_eq!(triste.speed_factor, None);
    }

    #[test]
    fn unlisted_engine_uses_default_timeout() {
        let processing = ProcessingConfig::default();
        assert_eq!(
            processing.timeout_for(EngineKind::TextOnly),
            Duration::from_millis(processing.synthesis_timeout_ms)
        );
    }

    #[test]
    fn from_file_nonexistent_returns_not_found() {
        let result = FalaConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigLoadError::NotFound(_))));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_and_is_not_touched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        assert!(matches!(
            FalaConfig::from_file(&path),
            Err(ConfigLoadError::Malformed { .. })
        ));
        let config = FalaConfig::load_or_default(&path);
        assert_eq!(config.locale, "pt-BR");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "this is not valid toml {{{"
        );
    }

    #[test]
    fn wrong_value_type_is_malformed() {
        let err = FalaConfig::from_toml_str("[tts]\nquality = 5\n");
        assert!(err.is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = FalaConfig::default();
        config.engines.cloud_endpoint = Some("http://localhost:5002/api/tts".into());
        config.emotions.overrides.insert(
            "feliz".into(),
            ProsodyOverride {
                volume: Some(0.7),
                ..ProsodyOverride::default()
            },
        );
        config.save_to_file(&path).unwrap();

        let loaded = FalaConfig::from_file(&path).unwrap();
        assert_eq!(
            loaded.engines.cloud_endpoint.as_deref(),
            Some("http://localhost:5002/api/tts")
        );
        assert_eq!(loaded.emotions.overrides["feliz"].volume, Some(0.7));
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = FalaConfig::default_config_path();
        assert!(path.ends_with("fala/config.toml"));
    }
}
