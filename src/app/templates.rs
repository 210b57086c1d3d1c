//! Request text sent to the model.

/// Working-set characters included as context.
pub const CONTEXT_LIMIT: usize = 2000;
/// Characters kept from a create/modify description.
pub const DESCRIPTION_LIMIT: usize = 1000;
/// Characters of generated code shown before asking to save.
pub const PREVIEW_LIMIT: usize = 500;

/// Name given to unsaved code taken from a chat reply.
pub const DEFAULT_GENERATED_NAME: &str = "generated_code.py";

const CODE_WORDS: &[&str] = &["python", "code", "modify", "fix", "create"];

/// The working set as seen by the model.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub name: &'a str,
    pub content: &'a str,
}

/// First `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Preview text with a trailing ellipsis when shortened.
pub fn preview(s: &str) -> String {
    let head = truncate_chars(s, PREVIEW_LIMIT);
    if head.len() < s.len() { format!("{head}...") } else { head.to_string() }
}

/// Whether a chat request is asking for code.
pub fn is_code_request(input: &str) -> bool {
    let lower = input.to_lowercase();
    CODE_WORDS.iter().any(|w| lower.contains(w))
}

pub fn chat_request(input: &str, ctx: Option<Context<'_>>) -> String {
    let context = match ctx {
        Some(c) => {
            let head = truncate_chars(c.content, CONTEXT_LIMIT);
            let marker = if head.len() < c.content.len() { "\n... (truncated)" } else { "" };
            format!("\n\nCurrent file context ({}):\n{head}{marker}", c.name)
        }
        None => String::new(),
    };

    format!(
        "Expert AI code assistant. Respond to code requests.

INSTRUCTIONS:
1. Clear, concise, accurate responses
2. Complete, production-ready code
3. Proper error handling
4. Explain changes when modifying
5. Be helpful and educational
{context}

User request: {input}

Response:"
    )
}

pub fn create_request(target: &str, description: &str, ctx: Option<Context<'_>>) -> String {
    let context = ctx
        .map(|c| format!("\n\nContext from {}:\n{}", c.name, truncate_chars(c.content, CONTEXT_LIMIT)))
        .unwrap_or_default();

    format!(
        "Expert code generator. Create production-quality code.

CRITICAL: Output ONLY code - no markdown, no fences, no explanations.

Target: {target}
Request: {description}{context}

Generate complete code:"
    )
}

pub fn modify_request(target: &str, current: &str, description: &str) -> String {
    format!(
        "Expert code modifier. Modify code based on request.

CRITICAL: Output ONLY complete modified code - no markdown, no fences, no explanations.

Current code from {target}:
{current}

Modification: {description}

Generate complete modified code:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn preview_adds_ellipsis_only_when_cut() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(PREVIEW_LIMIT + 1);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.len(), PREVIEW_LIMIT + 3);
    }

    #[test]
    fn code_keywords() {
        assert!(is_code_request("Write Python to parse json"));
        assert!(is_code_request("please FIX this"));
        assert!(!is_code_request("what is a monad?"));
    }

    #[test]
    fn chat_context_is_capped() {
        let content = "y".repeat(CONTEXT_LIMIT + 50);
        let req = chat_request("explain", Some(Context { name: "a.py", content: &content }));
        assert!(req.contains("Current file context (a.py)"));
        assert!(req.contains("... (truncated)"));
        assert!(!req.contains(&"y".repeat(CONTEXT_LIMIT + 1)));
        assert!(req.ends_with("User request: explain\n\nResponse:"));

        let bare = chat_request("hi", None);
        assert!(!bare.contains("Current file context"));
    }

    #[test]
    fn create_and_modify_mention_target() {
        let c = create_request("app.py", "hello server", None);
        assert!(c.contains("Target: app.py\nRequest: hello server"));

        let m = modify_request("app.py", "print(1)", "add logging");
        assert!(m.contains("Current code from app.py:\nprint(1)"));
        assert!(m.contains("Modification: add logging"));
    }
}
