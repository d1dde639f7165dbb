//! Conversational path for utterances that are not internal commands.
//!
//! The language model producing replies is an external collaborator; the
//! assistant only sees [`ConversationBackend`].

use crate::error::Result;
use async_trait::async_trait;

/// Produces a conversational reply for one utterance.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// # Errors
    ///
    /// Returns [`FalaError::Conversation`](crate::error::FalaError::Conversation)
    /// when the backend cannot answer.
    async fn reply(&self, utterance: &str) -> Result<String>;
}

/// Offline stand-in that acknowledges the utterance.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoConversation;

#[async_trait]
impl ConversationBackend for EchoConversation {
    async fn reply(&self, utterance: &str) -> Result<String> {
        Ok(format!("Você disse: {}", utterance.trim()))
    }
}
