//! Cleanup of Shikimori descriptions for the anime card.

use regex::Regex;
use std::sync::LazyLock;

pub const SUMMARY_MAX_CHARS: usize = 800;
pub const MISSING_DESCRIPTION: &str = "Описание отсутствует";

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<.*?>").expect("valid regex"));
static BB_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[/?[a-zA-Z0-9_= "'-]+\]"#).expect("valid regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]+\]").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Strips markup ([character=1], [spoiler], html) and normalizes whitespace.
pub fn clean(text: &str) -> String {
    if text.trim().is_empty() {
        return MISSING_DESCRIPTION.to_string();
    }

    let text = HTML_TAG.replace_all(text, "");
    let text = BB_CODE.replace_all(&text, "");
    let text = BRACKETED.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = SPACES.replace_all(&text, " ");

    let trimmed = text.trim();
    if trimmed.is_empty() {
        MISSING_DESCRIPTION.to_string()
    } else {
        trimmed.to_string()
    }
}

/// First paragraph of the cleaned description, cut at a sentence end.
pub fn summary(text: &str) -> String {
    let cleaned = clean(text);
    let first = cleaned.split("\n\n").next().unwrap_or_default().trim();

    if first.chars().count() <= SUMMARY_MAX_CHARS {
        return first.to_string();
    }

    let cut: String = first.chars().take(SUMMARY_MAX_CHARS).collect();
    match cut.rfind(['.', '!', '?']) {
        Some(idx) => cut[..=idx].to_string(),
        None => format!("{}…", cut.trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_markup() {
        let raw = "A [character=123]hero[/character] <b>fights</b> [spoiler]x[/spoiler]";
        assert_eq!(clean(raw), "A hero fights x");
    }

    #[test]
    fn test_collapses_whitespace() {
        let raw = "first\t\t line\n\n\n\n\nsecond";
        assert_eq!(clean(raw), "first line\n\nsecond");
    }

    #[test]
    fn test_empty_description() {
        assert_eq!(clean(""), MISSING_DESCRIPTION);
        assert_eq!(clean("[spoiler][/spoiler]"), MISSING_DESCRIPTION);
    }

    #[test]
    fn test_summary_takes_first_paragraph() {
        assert_eq!(summary("Intro.\n\nMore details."), "Intro.");
    }

    #[test]
    fn test_summary_cuts_at_last_sentence() {
        let sentence = "Short sentence. ";
        let long = sentence.repeat(100);
        let result = summary(&long);
        assert!(result.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(result.ends_with('.'));
    }

    #[test]
    fn test_summary_ellipsis_without_terminator() {
        let long = "слово ".repeat(200);
        let result = summary(&long);
        assert!(result.ends_with('…'));
        assert!(result.chars().count() <= SUMMARY_MAX_CHARS + 1);
    }
}
