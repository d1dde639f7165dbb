//! Keyword heuristic choosing a reply emotion.
//!
//! Fast pattern scan over the reply text, same shape as a sentiment
//! classifier: every emotion has a keyword list, the one with the most hits
//! wins, ties go to the earlier table entry.

/// (emotion, keywords)
const EMOTION_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "preocupado",
        &[
            "❌", "erro", "falha", "falhou", "cuidado", "atenção", "problema", "risco",
            "infelizmente",
        ],
    ),
    (
        "triste",
        &["triste", "lamento", "sinto muito", "perdi", "saudade", "pena"],
    ),
    (
        "animado",
        &["incrível", "uau", "fantástico", "sensacional", "demais", "🎉"],
    ),
    (
        "feliz",
        &[
            "✅", "concluído", "concluída", "sucesso", "pronto", "ótimo", "olá", "obrigado",
            "feliz", "parabéns", "💾", "🎤",
        ],
    ),
    (
        "calmo",
        &["calma", "tranquilo", "respire", "sem pressa", "devagar"],
    ),
];

/// Pick the emotion for `text`, or `default` when no keyword matches.
pub fn infer_emotion<'a>(text: &str, default: &'a str) -> &'a str {
    let lower = text.to_lowercase();
    let mut best = default;
    let mut best_score = 0usize;
    for &(emotion, keywords) in EMOTION_KEYWORDS {
        let score = keywords.iter().filter(|kw| lower.contains(*kw)).count();
        if score > best_score {
            best_score = score;
            best = emotion;
        }
    }
    best
}
