//! Emotion profile table.
//!
//! Maps emotion names to prosody parameters (speed, volume, post-utterance
//! pause, punctuation rule). Lookups never fail: unknown names resolve to the
//! `neutro` profile.

mod humanizer;
mod infer;

pub use humanizer::Humanizer;
pub use infer::infer_emotion;

use crate::config::{EmotionsConfig, ProsodyOverride};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Name of the profile every unknown lookup resolves to.
pub const NEUTRAL: &str = "neutro";

/// Upper bound on a profile's post-playback pause.
pub const MAX_PAUSE_SECONDS: f32 = 10.0;

/// How the humanizer rewrites sentence-final punctuation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunctuationRule {
    /// Leave punctuation as written.
    #[default]
    Keep,
    /// End statements with `!`.
    Exclaim,
    /// Like `Exclaim`, and open with an interjection.
    Emphatic,
    /// Trail statements off with `...`.
    Ellipsis,
    /// Replace every `!` with `.`.
    Soften,
}

/// Prosody parameters for one emotion.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionProfile {
    pub name: String,
    /// Speech rate multiplier, always `> 0`.
    pub speed_factor: f32,
    /// Output volume in `[0, 1]`.
    pub volume: f32,
    /// Delay after playback before the session returns to idle.
    pub pause_seconds: f32,
    pub punctuation_rule: PunctuationRule,
}

impl EmotionProfile {
    fn new(
        name: &str,
        speed_factor: f32,
        volume: f32,
        pause_seconds: f32,
        punctuation_rule: PunctuationRule,
    ) -> Self {
        Self {
            name: name.to_owned(),
            speed_factor,
            volume,
            pause_seconds,
            punctuation_rule,
        }
    }

    /// Post-playback pause, clamped to `[0, MAX_PAUSE_SECONDS]`.
    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f32(self.pause_seconds.clamp(0.0, MAX_PAUSE_SECONDS))
            .unwrap_or_default()
    }

    /// Apply a partial override, discarding out-of-range values.
    fn apply(&mut self, o: &ProsodyOverride) {
        if let Some(speed) = o.speed_factor {
            if speed > 0.0 && speed.is_finite() {
                self.speed_factor = speed;
            } else {
                warn!(emotion = %self.name, speed, "ignoring non-positive speed_factor override");
            }
        }
        if let Some(volume) = o.volume {
            self.volume = volume.clamp(0.0, 1.0);
        }
        if let Some(pause) = o.pause_seconds {
            if pause > MAX_PAUSE_SECONDS {
                warn!(emotion = %self.name, pause, max = MAX_PAUSE_SECONDS, "clamping pause_seconds override");
                self.pause_seconds = MAX_PAUSE_SECONDS;
            } else if pause >= 0.0 {
                self.pause_seconds = pause;
            } else {
                warn!(emotion = %self.name, pause, "ignoring negative pause_seconds override");
            }
        }
        if let Some(rule) = o.punctuation_rule {
            self.punctuation_rule = rule;
        }
    }
}

/// (name, speed, volume, pause, rule)
const BUILTIN_PROFILES: &[(&str, f32, f32, f32, PunctuationRule)] = &[
    (NEUTRAL, 1.0, 0.8, 0.3, PunctuationRule::Keep),
    ("feliz", 1.1, 0.9, 0.2, PunctuationRule::Exclaim),
    ("animado", 1.2, 1.0, 0.1, PunctuationRule::Emphatic),
    ("triste", 0.85, 0.6, 0.6, PunctuationRule::Ellipsis),
    ("calmo", 0.9, 0.7, 0.5, PunctuationRule::Soften),
    ("preocupado", 0.95, 0.75, 0.4, PunctuationRule::Ellipsis),
];

/// Immutable emotion-name → profile mapping.
#[derive(Debug, Clone)]
pub struct EmotionTable {
    profiles: BTreeMap<String, Arc<EmotionProfile>>,
    neutral: Arc<EmotionProfile>,
    default_name: String,
}

impl EmotionTable {
    /// The built-in profiles with no overrides.
    pub fn builtin() -> Self {
        Self::from_config(&EmotionsConfig::default())
    }

    /// Built-in profiles with the configured overrides applied.
    ///
    /// An override naming an unknown emotion defines a new profile derived
    /// from `neutro`.
    pub fn from_config(config: &EmotionsConfig) -> Self {
        let mut profiles: BTreeMap<String, EmotionProfile> = BUILTIN_PROFILES
            .iter()
            .map(|&(name, speed, volume, pause, rule)| {
                (
                    name.to_owned(),
                    EmotionProfile::new(name, speed, volume, pause, rule),
                )
            })
            .collect();

        for (name, o) in &config.overrides {
            let key = normalize(name);
            let entry = profiles.entry(key.clone()).or_insert_with(|| {
                let mut base = EmotionProfile::new(NEUTRAL, 1.0, 0.8, 0.3, PunctuationRule::Keep);
                base.name = key;
                base
            });
            entry.apply(o);
        }

        let profiles: BTreeMap<String, Arc<EmotionProfile>> = profiles
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        let neutral = profiles.get(NEUTRAL).cloned().unwrap_or_else(|| {
            Arc::new(EmotionProfile::new(
                NEUTRAL,
                1.0,
                0.8,
                0.3,
                PunctuationRule::Keep,
            ))
        });

        let default_name = normalize(&config.default_emotion);
        if !profiles.contains_key(&default_name) {
            warn!(emotion = %default_name, "default emotion unknown, using neutro");
        }

        Self {
            profiles,
            neutral,
            default_name,
        }
    }

    /// Look up a profile by name; unknown names resolve to `neutro`.
    pub fn get_emotion_config(&self, name: &str) -> &EmotionProfile {
        self.profiles
            .get(&normalize(name))
            .map(Arc::as_ref)
            .unwrap_or(&self.neutral)
    }

    /// Shared handle to a profile; unknown names resolve to `neutro`.
    pub fn resolve(&self, name: &str) -> Arc<EmotionProfile> {
        self.profiles
            .get(&normalize(name))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.neutral))
    }

    /// The configured default emotion profile.
    pub fn default_profile(&self) -> Arc<EmotionProfile> {
        self.resolve(&self.default_name)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
