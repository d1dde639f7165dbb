//! Rewrites reply text for a target emotion before synthesis.
//!
//! Three passes, in order: whitespace normalization, chat-abbreviation
//! expansion, and the profile's sentence-final punctuation rule.

use super::{EmotionProfile, PunctuationRule};
use std::collections::HashMap;

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("vc", "você"),
    ("vcs", "vocês"),
    ("pq", "porque"),
    ("tb", "também"),
    ("tbm", "também"),
    ("q", "que"),
    ("hj", "hoje"),
    ("td", "tudo"),
    ("blz", "beleza"),
    ("obg", "obrigado"),
    ("msg", "mensagem"),
    ("qdo", "quando"),
    ("cmg", "comigo"),
    ("ngm", "ninguém"),
    ("sr", "senhor"),
    ("sra", "senhora"),
    ("dr", "doutor"),
    ("etc", "etcétera"),
];

const INTERJECTIONS: &[&str] = &["nossa", "uau", "oba", "eba", "opa", "caramba"];

/// Emphatic opener added when the text does not already start with one.
const EMPHATIC_OPENER: &str = "Nossa!";

/// Emotion-aware text rewriter.
#[derive(Debug, Clone)]
pub struct Humanizer {
    abbreviations: HashMap<&'static str, &'static str>,
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Humanizer {
    pub fn new() -> Self {
        Self {
            abbreviations: ABBREVIATIONS.iter().copied().collect(),
        }
    }

    /// Rewrite `text` for `profile`. Empty or blank input yields an empty string.
    pub fn humanize(&self, text: &str, profile: &EmotionProfile) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return normalized;
        }
        let expanded = self.expand_abbreviations(&normalized);
        apply_rule(&expanded, profile.punctuation_rule)
    }

    fn expand_abbreviations(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 16);
        let mut word = String::new();
        for ch in text.chars() {
            if ch.is_alphanumeric() {
                word.push(ch);
            } else {
                self.flush_word(&mut word, &mut out);
                out.push(ch);
            }
        }
        self.flush_word(&mut word, &mut out);
        out
    }

    fn flush_word(&self, word: &mut String, out: &mut String) {
        if word.is_empty() {
            return;
        }
        let lower = word.to_lowercase();
        match self.abbreviations.get(lower.as_str()) {
            Some(expansion) if starts_uppercase(word) => out.push_str(&capitalize(expansion)),
            Some(expansion) => out.push_str(expansion),
            None => out.push_str(word),
        }
        word.clear();
    }
}

fn starts_uppercase(s: &str) -> bool {
    s.chars().next().is_some_and(char::is_uppercase)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

/// Split into (body, trailing run of terminal punctuation).
fn split_terminal(text: &str) -> (&str, &str) {
    let body = text.trim_end_matches(is_terminal);
    (body, &text[body.len()..])
}

fn apply_rule(text: &str, rule: PunctuationRule) -> String {
    match rule {
        PunctuationRule::Keep => text.to_owned(),
        PunctuationRule::Exclaim => exclaim(text),
        PunctuationRule::Emphatic => {
            let exclaimed = exclaim(text);
            if starts_with_interjection(&exclaimed) {
                exclaimed
            } else {
                format!("{EMPHATIC_OPENER} {exclaimed}")
            }
        }
        PunctuationRule::Ellipsis => {
            let (body, tail) = split_terminal(text);
            if tail.contains('?') || tail.contains('…') || tail == "..." {
                text.to_owned()
            } else {
                format!("{body}...")
            }
        }
        PunctuationRule::Soften => soften(text),
    }
}

fn exclaim(text: &str) -> String {
    let (body, tail) = split_terminal(text);
    match tail {
        "" | "." => format!("{body}!"),
        _ => text.to_owned(),
    }
}

fn soften(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    for ch in text.chars() {
        if ch == '!' {
            if !out.ends_with(is_terminal) {
                out.push('.');
            }
        } else {
            out.push(ch);
        }
    }
    if !out.ends_with(is_terminal) {
        out.push('.');
    }
    out
}

fn starts_with_interjection(text: &str) -> bool {
    let first: String = text
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    INTERJECTIONS.contains(&first.as_str())
}
