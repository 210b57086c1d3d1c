//! Session commands, recognised by their first word.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load(Option<PathBuf>),
    Save(Option<PathBuf>),
    Clear,
    Help,
    Exit,
    ApiKey(Option<String>),
    Create { file: Option<String>, description: String },
    Modify { file: Option<String>, description: String },
    Reset(Option<String>),
    License,
    Redeem(Option<String>),
    Status,
}

impl Command {
    /// `None` means the line is a chat request.
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let head = words.next()?.to_ascii_lowercase();
        let rest: Vec<&str> = words.collect();
        let first = rest.first().map(|s| s.to_string());
        let joined = (!rest.is_empty()).then(|| rest.join(" "));

        let cmd = match head.as_str() {
            "load" => Command::Load(first.map(PathBuf::from)),
            "save" => Command::Save(first.map(PathBuf::from)),
            "clear" => Command::Clear,
            "help" => Command::Help,
            "exit" | "quit" => Command::Exit,
            "apikey" | "addapikeys" => Command::ApiKey(joined),
            "create" => Command::Create {
                file: first,
                description: rest.iter().skip(1).copied().collect::<Vec<_>>().join(" "),
            },
            "modify" => Command::Modify {
                file: first,
                description: rest.iter().skip(1).copied().collect::<Vec<_>>().join(" "),
            },
            "reset" => Command::Reset(joined),
            "license" | "gettoken" => Command::License,
            "redeem" => Command::Redeem(first),
            "status" => Command::Status,
            _ => return None,
        };
        Some(cmd)
    }

    /// File commands are for licensed users only.
    pub fn requires_license(&self) -> bool {
        matches!(
            self,
            Command::Load(_)
                | Command::Save(_)
                | Command::Clear
                | Command::Create { .. }
                | Command::Modify { .. }
        )
    }
}

pub const HELP: &str = "\
Commands:
  help                       Show this help
  exit                       Leave the session
  status                     Show license, file and model status
  apikey [<key>]             Add an API key (saved to .env) and use it
  license                    How to get a license
  redeem [<token>]           Activate a license token
  reset [<password>]         Administrative reset of license and usage

Licensed:
  load <path>                Load a file into the working set
  save [<path>]              Save the working set (code fences are stripped)
  clear                      Forget the working set
  create <file> <desc...>    Generate a new file
  modify <file> <desc...>    Rewrite an existing file

Anything else is sent to the model as a chat request.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_word_is_case_insensitive() {
        assert_eq!(Command::parse("LOAD src/main.py"), Some(Command::Load(Some("src/main.py".into()))));
        assert_eq!(Command::parse("  Help  "), Some(Command::Help));
        assert_eq!(Command::parse("save"), Some(Command::Save(None)));
    }

    #[test]
    fn aliases() {
        assert_eq!(Command::parse("gettoken"), Some(Command::License));
        assert_eq!(
            Command::parse("addapikeys gsk_123"),
            Some(Command::ApiKey(Some("gsk_123".into())))
        );
        assert_eq!(Command::parse("quit"), Some(Command::Exit));
    }

    #[test]
    fn create_splits_file_and_description() {
        assert_eq!(
            Command::parse("create app.py a flask   hello world"),
            Some(Command::Create {
                file: Some("app.py".into()),
                description: "a flask hello world".into(),
            })
        );
        assert_eq!(
            Command::parse("modify"),
            Some(Command::Modify { file: None, description: String::new() })
        );
    }

    #[test]
    fn reset_keeps_whole_password() {
        assert_eq!(Command::parse("reset 98 44"), Some(Command::Reset(Some("98 44".into()))));
        assert_eq!(Command::parse("reset"), Some(Command::Reset(None)));
    }

    #[test]
    fn everything_else_is_chat() {
        assert_eq!(Command::parse("explain this regex"), None);
        assert_eq!(Command::parse("loader design?"), None);
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn license_gate() {
        assert!(Command::parse("load x").unwrap().requires_license());
        assert!(Command::parse("clear").unwrap().requires_license());
        assert!(!Command::parse("redeem t").unwrap().requires_license());
        assert!(!Command::parse("status").unwrap().requires_license());
    }
}
