//! Pull code out of markdown-formatted model replies.

use std::sync::LazyLock;

use regex::Regex;

/// Opening fence with an optional info string, then a lazy body up to the
/// next closing fence.
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("fence pattern is valid"));

/// Interior of the first fenced block, trimmed; the whole reply trimmed when
/// there is no fence.
pub fn extract_code(response: &str) -> &str {
    FENCED_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map_or(response, |m| m.as_str())
        .trim()
}

/// Whether `text` contains a fence marker at all.
pub fn has_fence(text: &str) -> bool {
    text.contains("```")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_interior_of_tagged_block() {
        let reply = "hello\n```python\nprint(1)\n```\nbye";
        assert_eq!(extract_code(reply), "print(1)");
    }

    #[test]
    fn untagged_block() {
        assert_eq!(extract_code("```\nfn main() {}\n```"), "fn main() {}");
    }

    #[test]
    fn only_first_block_is_used() {
        let reply = "```rust\nlet a = 1;\n```\nand\n```rust\nlet b = 2;\n```";
        assert_eq!(extract_code(reply), "let a = 1;");
    }

    #[test]
    fn info_strings_with_symbols() {
        assert_eq!(extract_code("```c++\nint x;\n```"), "int x;");
        assert_eq!(extract_code("``` js title=\"a\"\nf()\n```"), "f()");
    }

    #[test]
    fn multiline_body_keeps_inner_indentation() {
        let reply = "Here:\n```py\ndef f():\n    return 1\n\n```";
        assert_eq!(extract_code(reply), "def f():\n    return 1");
    }

    #[test]
    fn no_fence_returns_trimmed_text() {
        assert_eq!(extract_code("\n  x = 1\n\n"), "x = 1");
        assert!(!has_fence("x = 1"));
    }

    #[test]
    fn unterminated_fence_is_plain_text() {
        assert_eq!(extract_code("```python\nprint(1)"), "```python\nprint(1)");
    }
}
