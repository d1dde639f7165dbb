//! Internal command detection.
//!
//! Classifies an utterance against a fixed catalog of command phrasings
//! before it reaches the conversational path. Matching is first-wins in
//! declared order: the catalog order fixes which command an ambiguous
//! utterance resolves to, and within one intent its patterns are tried in
//! listed order.
//!
//! # Supported Commands
//!
//! | Phrase Pattern | Command |
//! |----------------|---------|
//! | "analise seu código" | `AnalyzeCode` |
//! | "teste sua voz" | `TestVoice` |
//! | "faça um backup" | `CreateBackup` |
//! | "se melhore" | `SelfImprove` |
//! | "como você está" | `StatusReport` |

use crate::error::{FalaError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Confidence attached to every positive detection.
///
/// Confidence is categorical: a match is a match regardless of how much of
/// the utterance it covers.
pub const MATCH_CONFIDENCE: f32 = 0.95;

/// Minimum confidence for an utterance to count as an internal command.
pub const INTERNAL_COMMAND_THRESHOLD: f32 = 0.8;

/// Internal command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    AnalyzeCode,
    TestVoice,
    CreateBackup,
    SelfImprove,
    StatusReport,
}

impl CommandId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzeCode => "analyze_code",
            Self::TestVoice => "test_voice",
            Self::CreateBackup => "create_backup",
            Self::SelfImprove => "self_improve",
            Self::StatusReport => "status_report",
        }
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog in priority order. Patterns run against the lower-cased utterance.
const CATALOG: &[(CommandId, &[&str])] = &[
    (
        CommandId::AnalyzeCode,
        &[
            r"anali[sz]\w*\s+(?:\S+\s+){0,2}c[óo]digo",
            r"(?:revise|revisa|examine|examina|verifique|verifica)\s+(?:\S+\s+){0,2}c[óo]digo",
            r"an[áa]lise\s+d[eo]\s+c[óo]digo",
        ],
    ),
    (
        CommandId::TestVoice,
        &[
            r"test\w*\s+(?:\S+\s+){0,2}voz",
            r"como\s+(?:est[áa]|anda|fica)\s+(?:a\s+)?sua\s+voz",
        ],
    ),
    (
        CommandId::CreateBackup,
        &[
            r"(?:fa[çc]a|faz|fazer|crie|cria|criar|gere|gera)\s+(?:\S+\s+){0,2}backup",
            r"\bbackup\s+(?:do|de|dos)\b",
            r"(?:salve|salva)\s+(?:uma\s+)?c[óo]pia",
        ],
    ),
    (
        CommandId::SelfImprove,
        &[
            r"se\s+melhor[ae]",
            r"melhor[ae]\s+(?:a\s+)?(?:si|voc[êe])\s+mesm[oa]",
            r"auto[-\s]?(?:melhor|aperfei[çc]o)\w*",
            r"se\s+aperfei[çc]o[ae]",
        ],
    ),
    (
        CommandId::StatusReport,
        &[
            r"como\s+voc[êe]\s+(?:est[áa]|vai|anda)\b",
            r"como\s+(?:est[áa]|vai|anda)\s+voc[êe]\b",
            r"^\s*(?:e\s+a[íi],?\s+|oi,?\s+|ol[áa],?\s+)?como\s+(?:est[áa]|vai)\s*[?!.]*\s*$",
            r"\bstatus\b",
            r"relat[óo]rio\s+de\s+(?:estado|status)",
        ],
    ),
];

/// A catalog entry mapping a family of phrasings to one command.
#[derive(Debug, Clone)]
pub struct Intent {
    pub command_id: CommandId,
    pub patterns: Vec<Regex>,
}

/// Outcome of one detection call.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub command_id: Option<CommandId>,
    /// Human-readable justification.
    pub reason: String,
    pub confidence: f32,
}

impl DetectionResult {
    fn no_match() -> Self {
        Self {
            command_id: None,
            reason: "no internal command pattern matched".to_owned(),
            confidence: 0.0,
        }
    }
}

/// Stateless utterance classifier.
#[derive(Debug, Clone)]
pub struct IntentDetector {
    intents: Vec<Intent>,
}

impl IntentDetector {
    /// Build the detector over the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns [`FalaError::Intent`] if a catalog pattern fails to compile.
    pub fn new() -> Result<Self> {
        let intents = CATALOG
            .iter()
            .map(|&(command_id, patterns)| {
                let patterns = patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p)
                            .map_err(|e| FalaError::Intent(format!("bad pattern for {command_id}: {e}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Intent {
                    command_id,
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { intents })
    }

    /// Build a detector over a custom catalog, checked in the given order.
    pub fn with_intents(intents: Vec<Intent>) -> Self {
        Self { intents }
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Classify `utterance`.
    pub fn detect(&self, utterance: &str) -> DetectionResult {
        let lower = utterance.to_lowercase();
        for intent in &self.intents {
            for pattern in &intent.patterns {
                if let Some(m) = pattern.find(&lower) {
                    debug!(command = %intent.command_id, matched = m.as_str(), "intent detected");
                    return DetectionResult {
                        command_id: Some(intent.command_id),
                        reason: format!(
                            "'{}' matched {} pattern `{}`",
                            m.as_str(),
                            intent.command_id,
                            pattern.as_str()
                        ),
                        confidence: MATCH_CONFIDENCE,
                    };
                }
            }
        }
        DetectionResult::no_match()
    }

    /// Whether `text` should be routed to an internal command.
    pub fn is_internal_command(&self, text: &str) -> bool {
        let result = self.detect(text);
        result.command_id.is_some() && result.confidence > INTERNAL_COMMAND_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn detector() -> IntentDetector {
        IntentDetector::new().expect("built-in catalog compiles")
    }

    fn assert_detects(utterance: &str, expected: CommandId) {
        let result = detector().detect(utterance);
        assert_eq!(result.command_id, Some(expected), "utterance: {utterance:?}");
        assert!((result.confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn analyze_code_phrasings() {
        assert_detects("analisa seu código", CommandId::AnalyzeCode);
        assert_detects("analise seu código", CommandId::AnalyzeCode);
        assert_detects("Analise o seu codigo, por favor", CommandId::AnalyzeCode);
        assert_detects("revise o código", CommandId::AnalyzeCode);
    }

    #[test]
    fn test_voice_phrasings() {
        assert_detects("teste sua voz", CommandId::TestVoice);
        assert_detects("testa a voz", CommandId::TestVoice);
        assert_detects("como está sua voz?", CommandId::TestVoice);
    }

    #[test]
    fn backup_phrasings() {
        assert_detects("faça um backup", CommandId::CreateBackup);
        assert_detects("FAZ O BACKUP AGORA", CommandId::CreateBackup);
        assert_detects("crie um novo backup", CommandId::CreateBackup);
    }

    #[test]
    fn self_improve_phrasings() {
        assert_detects("se melhore", CommandId::SelfImprove);
        assert_detects("tente se aperfeiçoar", CommandId::SelfImprove);
        assert_detects("rode uma auto-melhoria", CommandId::SelfImprove);
    }

    #[test]
    fn status_phrasings() {
        assert_detects("como você está", CommandId::StatusReport);
        assert_detects("Como vai?", CommandId::StatusReport);
        assert_detects("oi, como está?", CommandId::StatusReport);
        assert_detects("como vai você?", CommandId::StatusReport);
        assert_detects("me dá o status", CommandId::StatusReport);
    }

    #[test]
    fn unrelated_utterance_has_no_command() {
        let result = detector().detect("qual a previsão do tempo");
        assert_eq!(result.command_id, None);
        assert_eq!(result.confidence, 0.0);
        assert!(!detector().is_internal_command("qual a previsão do tempo"));
    }

    #[test]
    fn third_person_como_questions_stay_conversational() {
        for utterance in [
            "como está o tempo hoje?",
            "como vai ficar o trânsito?",
            "como vai a economia",
            "e como está a sua mãe?",
        ] {
            let result = detector().detect(utterance);
            assert_eq!(result.command_id, None, "utterance: {utterance:?}");
            assert!(!detector().is_internal_command(utterance));
        }
    }

    #[test]
    fn overlapping_phrasing_resolves_by_catalog_order() {
        // Matches both TestVoice ("como está sua voz") and StatusReport ("como está").
        assert_detects("como está sua voz hoje", CommandId::TestVoice);
        // Matches both AnalyzeCode and CreateBackup.
        assert_detects("analise o código e faça um backup", CommandId::AnalyzeCode);
    }

    #[test]
    fn reason_names_matched_command() {
        let result = detector().detect("faça um backup");
        assert!(result.reason.contains("create_backup"));
        assert!(result.reason.contains("faça um backup"));
    }

    #[test]
    fn every_detection_counts_as_internal_command() {
        for utterance in ["teste sua voz", "se melhore", "como você está"] {
            assert!(detector().is_internal_command(utterance));
        }
    }

    #[test]
    fn custom_catalog_is_checked_in_given_order() {
        let custom = IntentDetector::with_intents(vec![
            Intent {
                command_id: CommandId::StatusReport,
                patterns: vec![Regex::new("backup").unwrap()],
            },
            Intent {
                command_id: CommandId::CreateBackup,
                patterns: vec![Regex::new("backup").unwrap()],
            },
        ]);
        assert_eq!(
            custom.detect("faça um backup").command_id,
            Some(CommandId::StatusReport)
        );
    }
}
