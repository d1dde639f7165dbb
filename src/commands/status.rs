//! Status report: engines, emotion defaults, session state and uptime.

use super::CommandHandler;
use crate::error::CommandExecutionError;
use crate::intent::CommandId;
use crate::session::SpeechController;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handler for `status_report`.
pub struct StatusHandler {
    speech: Arc<SpeechController>,
    started: Instant,
}

impl StatusHandler {
    pub fn new(speech: Arc<SpeechController>, started: Instant) -> Self {
        Self { speech, started }
    }

    pub fn report(&self) -> String {
        let selector = self.speech.selector();
        let chain: Vec<String> = selector
            .fallback_chain()
            .iter()
            .map(|d| d.kind.to_string())
            .collect();
        format!(
            "📊 Estou bem! Motor atual: {}. Cadeia disponível: {}. Emoção padrão: {}. Sessão: {}. Ativa há {}.",
            selector.current().kind,
            chain.join(" → "),
            self.speech.emotions().default_name(),
            self.speech.state(),
            format_uptime(self.started.elapsed()),
        )
    }
}

fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}min {s:02}s")
    } else if m > 0 {
        format!("{m}min {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[async_trait]
impl CommandHandler for StatusHandler {
    fn command(&self) -> CommandId {
        CommandId::StatusReport
    }

    async fn execute(&self, _utterance: &str) -> Result<String, CommandExecutionError> {
        Ok(self.report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_by_magnitude() {
        assert_eq!(format_uptime(Duration::from_secs(7)), "7s");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2min 05s");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1h 02min 05s");
    }
}
