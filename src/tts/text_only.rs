//! Text-only terminal fallback: shows the decorated text instead of speaking.

use super::{AudioResource, EngineAdapter, EngineKind, TextAudio};
use crate::audio::TextSink;
use crate::emotion::EmotionProfile;
use crate::error::SynthesisError;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Always-available engine with no external dependency.
pub struct TextOnlyTts {
    sink: Arc<dyn TextSink>,
    locale: String,
}

impl TextOnlyTts {
    pub fn new(sink: Arc<dyn TextSink>, locale: &str) -> Self {
        Self {
            sink,
            locale: locale.to_owned(),
        }
    }
}

#[async_trait]
impl EngineAdapter for TextOnlyTts {
    fn kind(&self) -> EngineKind {
        EngineKind::TextOnly
    }

    fn locales(&self) -> BTreeSet<String> {
        BTreeSet::from([self.locale.clone()])
    }

    async fn probe(&self) -> Result<(), SynthesisError> {
        Ok(())
    }

    async fn synthesize(
        &self,
        text: &str,
        _profile: &EmotionProfile,
    ) -> Result<Box<dyn AudioResource>, SynthesisError> {
        Ok(Box::new(TextAudio::new(text, Arc::clone(&self.sink))))
    }
}
