//! Synchronous questions to the user.
//!
//! The core asks for a license token, an overwrite confirmation, the admin
//! password and the occasional file name through [`Prompter`]; it never reads
//! stdin itself.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

pub trait Prompter {
    /// Free-text answer, trimmed. `None` when input is closed.
    fn ask(&mut self, label: &str) -> io::Result<Option<String>>;

    /// Like [`ask`](Self::ask) but without echo where the terminal allows.
    fn ask_secret(&mut self, label: &str) -> io::Result<Option<String>>;

    /// Yes/no question; an empty answer picks `default`.
    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool>;
}

/// Reads answers from stdin, writes questions to stdout.
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl Prompter for ConsolePrompter {
    fn ask(&mut self, label: &str) -> io::Result<Option<String>> {
        print!("{label}: ");
        io::stdout().flush()?;
        self.read_line()
    }

    fn ask_secret(&mut self, label: &str) -> io::Result<Option<String>> {
        let term = console::Term::stdout();
        if !term.is_term() {
            return self.ask(label);
        }
        term.write_str(&format!("{label}: "))?;
        term.read_secure_line().map(|s| Some(s.trim().to_string()))
    }

    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        print!("{question} {hint} ");
        io::stdout().flush()?;
        Ok(parse_yes_no(self.read_line()?.as_deref(), default))
    }
}

fn parse_yes_no(answer: Option<&str>, default: bool) -> bool {
    match answer.map(|a| a.trim().to_ascii_lowercase()) {
        Some(a) if a == "y" || a == "yes" => true,
        Some(a) if a == "n" || a == "no" => false,
        Some(a) if a.is_empty() => default,
        // Closed input or gibberish never counts as consent
        _ => false,
    }
}

/// Canned answers, consumed in order. Confirmations pop `"y"`/`"n"` strings
/// from the same queue. Runs dry as closed input.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { answers: answers.into_iter().map(Into::into).collect(), asked: Vec::new() }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, label: &str) -> io::Result<Option<String>> {
        self.asked.push(label.to_string());
        Ok(self.answers.pop_front())
    }

    fn ask_secret(&mut self, label: &str) -> io::Result<Option<String>> {
        self.ask(label)
    }

    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        let answer = self.ask(question)?;
        Ok(parse_yes_no(answer.as_deref(), default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_parsing() {
        assert!(parse_yes_no(Some("Y"), false));
        assert!(parse_yes_no(Some(" yes "), false));
        assert!(!parse_yes_no(Some("n"), true));
        assert!(parse_yes_no(Some(""), true));
        assert!(!parse_yes_no(Some(""), false));
        assert!(!parse_yes_no(Some("maybe"), true));
        assert!(!parse_yes_no(None, true));
    }

    #[test]
    fn scripted_answers_in_order() {
        let mut p = ScriptedPrompter::new(["out.py", "y"]);
        assert_eq!(p.ask("Output file").unwrap().as_deref(), Some("out.py"));
        assert!(p.confirm("Overwrite?", false).unwrap());
        assert_eq!(p.ask("more").unwrap(), None);
        assert_eq!(p.asked, ["Output file", "Overwrite?", "more"]);
    }
}
