//! Assistant front-end: utterance → intent → command or conversation →
//! spoken reply.

use crate::commands::CommandRouter;
use crate::conversation::ConversationBackend;
use crate::emotion::infer_emotion;
use crate::intent::{CommandId, INTERNAL_COMMAND_THRESHOLD, IntentDetector};
use crate::session::SpeechController;
use std::sync::Arc;
use tracing::{info, warn};

/// What the assistant answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantReply {
    /// The utterance matched an internal command.
    Command { command: CommandId, text: String },
    /// The utterance went to the conversational backend.
    Conversation { text: String },
}

impl AssistantReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Command { text, .. } | Self::Conversation { text } => text,
        }
    }
}

pub struct Assistant {
    detector: IntentDetector,
    router: CommandRouter,
    conversation: Arc<dyn ConversationBackend>,
    speech: Arc<SpeechController>,
}

impl Assistant {
    pub fn new(
        detector: IntentDetector,
        router: CommandRouter,
        conversation: Arc<dyn ConversationBackend>,
        speech: Arc<SpeechController>,
    ) -> Self {
        Self {
            detector,
            router,
            conversation,
            speech,
        }
    }

    pub fn speech(&self) -> &Arc<SpeechController> {
        &self.speech
    }

    /// Answer `utterance` and queue the reply for speech.
    ///
    /// Never fails: backend and handler errors become reply text.
    pub async fn handle(&self, utterance: &str) -> AssistantReply {
        let detection = self.detector.detect(utterance);
        let reply = match detection.command_id {
            Some(command) if detection.confidence > INTERNAL_COMMAND_THRESHOLD => {
                info!(%command, reason = %detection.reason, "internal command");
                let text = self.router.dispatch(command, utterance).await;
                AssistantReply::Command { command, text }
            }
            _ => {
                let text = match self.conversation.reply(utterance).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "conversation backend failed");
                        format!("❌ Erro: {e}")
                    }
                };
                AssistantReply::Conversation { text }
            }
        };

        let emotion = infer_emotion(reply.text(), self.speech.emotions().default_name());
        self.speech.speak(reply.text(), emotion);
        reply
    }
}
