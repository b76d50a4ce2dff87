//! Heuristic sentiment labeling of partner messages. Pluggable in principle
//! (the arena only depends on the `sentiment` field reaching
//! [`AIParticipant`](super::ai_participant::AIParticipant) memory), but this
//! keyword-pattern classifier is the shipped default.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Engaged,
    Disengaged,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Engaged => "engaged",
            SentimentLabel::Disengaged => "disengaged",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentimentResult {
    pub sentiment: SentimentLabel,
    pub confidence: f32,
    pub indicators: Vec<String>,
}

struct PatternSet {
    label: SentimentLabel,
    words: &'static [&'static str],
}

fn pattern_sets() -> &'static [PatternSet] {
    static SETS: OnceLock<Vec<PatternSet>> = OnceLock::new();
    SETS.get_or_init(|| {
        vec![
            PatternSet {
                label: SentimentLabel::Positive,
                words: &[
                    "great", "love", "awesome", "happy", "thanks", "wonderful", "excited",
                    "fantastic", "nice", "good",
                ],
            },
            PatternSet {
                label: SentimentLabel::Negative,
                words: &[
                    "hate", "annoyed", "frustrated", "terrible", "sad", "angry", "awful",
                    "upset", "bad", "worried",
                ],
            },
            PatternSet {
                label: SentimentLabel::Engaged,
                words: &[
                    "tell me more", "interesting", "why", "how come", "what about", "curious",
                    "fascinating", "go on",
                ],
            },
            PatternSet {
                label: SentimentLabel::Disengaged,
                words: &["ok", "fine", "sure", "whatever", "k", "meh", "idk"],
            },
        ]
    })
}

/// Scores a message's text against each category's keyword list and returns
/// the highest-scoring label (ties favor [`SentimentLabel::Neutral`]).
pub fn classify(text: &str) -> SentimentResult {
    let lowered = text.to_lowercase();
    let mut best: Option<(SentimentLabel, usize, Vec<String>)> = None;

    for set in pattern_sets() {
        let matched: Vec<String> = set
            .words
            .iter()
            .filter(|w| lowered.contains(*w))
            .map(|w| w.to_string())
            .collect();
        if matched.is_empty() {
            continue;
        }
        let score = matched.len();
        if best.as_ref().map(|(_, s, _)| score > *s).unwrap_or(true) {
            best = Some((set.label, score, matched));
        }
    }

    match best {
        Some((label, score, indicators)) => {
            let word_count = lowered.split_whitespace().count().max(1);
            let confidence = (score as f32 / word_count as f32).min(1.0).max(0.2);
            SentimentResult {
                sentiment: label,
                confidence,
                indicators,
            }
        }
        None => SentimentResult {
            sentiment: SentimentLabel::Neutral,
            confidence: 0.5,
            indicators: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_words_are_detected() {
        let result = classify("this is great, I love it");
        assert_eq!(result.sentiment.as_str(), "positive");
        assert!(!result.indicators.is_empty());
    }

    #[test]
    fn negative_words_are_detected() {
        let result = classify("I'm so frustrated and annoyed right now");
        assert_eq!(result.sentiment.as_str(), "negative");
    }

    #[test]
    fn neutral_when_nothing_matches() {
        let result = classify("the package arrived on tuesday");
        assert_eq!(result.sentiment.as_str(), "neutral");
        assert!(result.indicators.is_empty());
    }

    #[test]
    fn disengaged_short_replies() {
        let result = classify("meh, whatever");
        assert_eq!(result.sentiment.as_str(), "disengaged");
    }
}
