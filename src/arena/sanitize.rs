//! Strips LLM artifacts out of generated speech before it reaches a human
//! partner: tags, bracketed stage directions, and parenthetical action
//! descriptions. Idempotent by construction — running it twice must yield
//! the same result as running it once.

use std::sync::OnceLock;

use regex::Regex;

struct SanitizePatterns {
    tags: Regex,
    brackets: Regex,
    capitalized_stage_direction: Regex,
    action_verbs: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static SanitizePatterns {
    static PATTERNS: OnceLock<SanitizePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SanitizePatterns {
        tags: Regex::new(r"<[^>]+>").expect("static pattern"),
        brackets: Regex::new(r"\[[^\]]*\]").expect("static pattern"),
        capitalized_stage_direction: Regex::new(
            r"(?x)
            \(\s*
            [A-Z][a-z]*(?:ing|s|ed)?
            (?:\s+\w+)*
            \s*\)
            ",
        )
        .expect("static pattern"),
        action_verbs: Regex::new(
            r"(?ix)
            \(\s*
            (?:
                sighs?|laughs?|laughing|chuckles?|chuckling|smiles?|smiling|
                grins?|grinning|nods?|nodding|shrugs?|shrugging|pauses?|pausing|
                thinks?|thinking|frowns?|frowning|winks?|winking|gestures?|gesturing|
                leans?\s+\w+|clears?\s+throat|rolls?\s+eyes?|raises?\s+eyebrow
            )
            (?:\s+\w+)*
            \s*\)
            ",
        )
        .expect("static pattern"),
        whitespace: Regex::new(r"\s+").expect("static pattern"),
    })
}

/// Removes LLM artifacts from speech text while preserving the message.
pub fn sanitize_speech(text: &str) -> String {
    if text.is_empty() {
        return text.to_string();
    }
    let p = patterns();
    let mut cleaned = p.tags.replace_all(text, "").into_owned();
    cleaned = p.brackets.replace_all(&cleaned, "").into_owned();
    cleaned = p
        .capitalized_stage_direction
        .replace_all(&cleaned, "")
        .into_owned();
    cleaned = p.action_verbs.replace_all(&cleaned, "").into_owned();
    cleaned = p.whitespace.replace_all(&cleaned, " ").into_owned();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_xml_like_tags() {
        assert_eq!(sanitize_speech("<speech>hello</speech>"), "hello");
    }

    #[test]
    fn strips_bracketed_stage_directions() {
        assert_eq!(
            sanitize_speech("[Steepling hands] Let's begin."),
            "Let's begin."
        );
    }

    #[test]
    fn strips_capitalized_parenthetical_stage_direction() {
        assert_eq!(sanitize_speech("(Sighs) I suppose so."), "I suppose so.");
    }

    #[test]
    fn strips_lowercase_action_verb_parenthetical() {
        assert_eq!(
            sanitize_speech("That's great (laughs nervously) really."),
            "That's great really."
        );
        assert_eq!(sanitize_speech("Sure (nods) okay."), "Sure okay.");
    }

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(sanitize_speech("  hi   there  "), "hi there");
    }

    #[test]
    fn empty_input_returns_empty() {
        assert_eq!(sanitize_speech(""), "");
    }

    #[test]
    fn is_idempotent() {
        let input = "<think>x</think> [gestures] (sighs) Hello   there (laughs)";
        let once = sanitize_speech(input);
        let twice = sanitize_speech(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normal_parenthetical_text_is_preserved() {
        // Lowercase, non-action-verb content in parens should survive.
        assert_eq!(
            sanitize_speech("I think (more or less) that's right."),
            "I think (more or less) that's right."
        );
    }
}
