//! Code-fence stripping for model replies.

use regex::Regex;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        // Opening fence with optional language tag on the same line, body, closing fence.
        Regex::new(r"(?s)\A\s*```[\w+.\-]*[ \t]*\r?\n?(.*?)\s*```\s*\z")
            .expect("fence pattern is valid")
    })
}

/// Strip a code fence wrapping the whole reply.
///
/// "```json\n[...]\n```" and "```\n{...}\n```" yield the inner text, trimmed.
/// Anything not fully wrapped in a fence is returned unchanged; a broken
/// fence then fails at the JSON parse instead.
pub fn strip_code_fence(response: &str) -> &str {
    match fence_regex().captures(response).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_strips_fence_with_surrounding_whitespace() {
        assert_eq!(strip_code_fence("  \n```JSON  \n  [ ]  \n```\n\n"), "[ ]");
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(strip_code_fence("```[{\"title\": \"x\"}]```"), "[{\"title\": \"x\"}]");
    }

    #[test]
    fn test_inner_backticks_survive() {
        let reply = "```json\n[{\"description\": \"use `code` here\"}]\n```";
        assert_eq!(
            strip_code_fence(reply),
            "[{\"description\": \"use `code` here\"}]"
        );
    }

    #[test]
    fn test_unfenced_text_is_unchanged() {
        assert_eq!(strip_code_fence("[1, 2]"), "[1, 2]");
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "  {\"a\": 1}\n");
    }

    #[test]
    fn test_unterminated_fence_is_unchanged() {
        let reply = "```json\n[1, 2]";
        assert_eq!(strip_code_fence(reply), reply);
    }

    #[test]
    fn test_prose_around_fence_is_unchanged() {
        let reply = "Here you go:\n```json\n[1]\n```";
        assert_eq!(strip_code_fence(reply), reply);
    }
}
