//! The interactive session: one line in, one command or chat request out.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, instrument};

use crate::app::command::{Command, HELP};
use crate::app::templates::{
    self, Context, DEFAULT_GENERATED_NAME, DESCRIPTION_LIMIT, truncate_chars,
};
use crate::core::backup::BackupOutcome;
use crate::core::entitlement::{Consume, EntitlementState};
use crate::core::fence::{extract_code, has_fence};
use crate::core::store::{FileStore, SaveRequest, StoreError};
use crate::infra::client::ModelClient;
use crate::infra::console::Printer;
use crate::infra::keys::{KeyAdded, KeyRing};
use crate::infra::prompt::Prompter;

const PROMPT: &str = "aicode";

const LICENSE_INFO: &str = "\
A license unlocks unlimited prompts and the file commands
(load, save, clear, create, modify) until its expiry date.
Activate one with `redeem <token>`.";

/// Whether the session keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    entitlement: EntitlementState,
    store: FileStore,
    client: Box<dyn ModelClient>,
    keys: KeyRing,
    prompter: Box<dyn Prompter>,
    printer: Printer,
}

impl Session {
    pub fn new(
        entitlement: EntitlementState,
        store: FileStore,
        client: Box<dyn ModelClient>,
        keys: KeyRing,
        prompter: Box<dyn Prompter>,
        printer: Printer,
    ) -> Self {
        Self { entitlement, store, client, keys, prompter, printer }
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    pub fn entitlement(&self) -> &EntitlementState {
        &self.entitlement
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Read-eval loop until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        self.printer.panel("aicode", "AI code assistant with license-gated file commands");
        self.report_warnings();
        self.ensure_api_key()?;
        self.printer.line(HELP);
        self.print_status();

        loop {
            let Some(line) = self.prompter.ask(PROMPT)? else {
                break;
            };
            if line.is_empty() {
                continue;
            }
            if self.handle_line(&line)? == Flow::Quit {
                break;
            }
            self.print_status();
        }

        self.printer.success("Thanks for using aicode!");
        Ok(())
    }

    /// One line of input.
    pub fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let flow = match Command::parse(line) {
            Some(cmd) => self.dispatch(cmd)?,
            None => self.chat(line)?,
        };
        self.report_warnings();
        Ok(flow)
    }

    #[instrument(skip(self))]
    pub fn dispatch(&mut self, cmd: Command) -> Result<Flow> {
        if cmd.requires_license() && !self.entitlement.is_licensed() {
            self.printer.error("License required for file commands");
            self.printer.info(LICENSE_INFO);
            return Ok(Flow::Continue);
        }

        match cmd {
            Command::Exit => return Ok(Flow::Quit),
            Command::Help => self.printer.line(HELP),
            Command::Status => self.print_status(),
            Command::License => {
                self.printer.panel("License", LICENSE_INFO);
                self.print_status();
            }
            Command::Load(path) => self.load(path)?,
            Command::Save(path) => self.save(path)?,
            Command::Clear => {
                self.store.clear();
                self.printer.info("Context cleared");
            }
            Command::ApiKey(key) => self.set_api_key(key)?,
            Command::Redeem(token) => self.redeem(token)?,
            Command::Reset(password) => self.reset(password)?,
            Command::Create { file, description } => self.create(file, description)?,
            Command::Modify { file, description } => self.modify(file, description)?,
        }
        Ok(Flow::Continue)
    }

    fn ask_unless_given(&mut self, given: Option<String>, label: &str) -> Result<String> {
        match given {
            Some(v) => Ok(v.trim().to_string()),
            None => Ok(self.prompter.ask(label)?.unwrap_or_default()),
        }
    }

    fn ensure_api_key(&mut self) -> Result<()> {
        if self.client.has_key() {
            return Ok(());
        }
        if let Some(key) = self.keys.active() {
            self.client.set_api_key(key.to_string());
            return Ok(());
        }
        match self.prompter.ask_secret("API key")? {
            Some(key) if !key.is_empty() => self.remember_key(&key),
            _ => self.printer.warn("No API key set; use `apikey <key>` before chatting"),
        }
        Ok(())
    }

    fn set_api_key(&mut self, key: Option<String>) -> Result<()> {
        let key = match key {
            Some(k) => k,
            None => self.prompter.ask_secret("API key")?.unwrap_or_default(),
        };
        if key.trim().is_empty() {
            self.printer.error("No key given");
        } else {
            self.remember_key(&key);
        }
        Ok(())
    }

    /// Store the key in `.env` and switch the client over to it.
    fn remember_key(&mut self, key: &str) {
        match self.keys.add(key) {
            Ok(KeyAdded::Added) => self.printer.success("API key added"),
            Ok(KeyAdded::Exists) => self.printer.warn("Key exists"),
            Err(e) => {
                self.printer.error(e);
                return;
            }
        }
        if let Some(active) = self.keys.active() {
            self.client.set_api_key(active.to_string());
        }
    }

    fn load(&mut self, path: Option<PathBuf>) -> Result<()> {
        let given = path.map(|p| p.to_string_lossy().into_owned());
        let path = self.ask_unless_given(given, "File path")?;
        if path.is_empty() {
            self.printer.error("File path required");
            return Ok(());
        }
        self.load_path(Path::new(&path));
        Ok(())
    }

    fn load_path(&mut self, path: &Path) -> bool {
        match self.store.load(path) {
            Ok(loaded) => {
                let shown = self.store.guard().display_path(&loaded.path).into_owned();
                self.printer.success(format!("Loaded {shown} ({} chars)", loaded.chars));
                true
            }
            Err(e) => {
                self.printer.error(e);
                false
            }
        }
    }

    fn save(&mut self, path: Option<PathBuf>) -> Result<()> {
        let req = SaveRequest { content: None, path, force_overwrite: false };
        self.save_with(req);
        Ok(())
    }

    fn save_with(&mut self, req: SaveRequest) -> bool {
        match self.store.save(req, self.prompter.as_mut()) {
            Ok(report) => {
                if let Some(outcome) = &report.backup {
                    self.report_backup(outcome);
                }
                let shown = self.store.guard().display_path(&report.path).into_owned();
                self.printer.success(format!("Saved {} chars to {shown}", report.chars));
                true
            }
            Err(StoreError::OverwriteDeclined(_)) => {
                self.printer.warn("Cancelled");
                false
            }
            Err(e) => {
                self.printer.error(e);
                false
            }
        }
    }

    fn report_backup(&self, outcome: &BackupOutcome) {
        match outcome {
            BackupOutcome::Created(p) => self.printer.info(format!("Backup: {}", p.display())),
            BackupOutcome::Failed(e) => self.printer.warn(format!("Backup failed: {e}")),
            BackupOutcome::Disabled | BackupOutcome::Missing => {}
        }
    }

    fn redeem(&mut self, token: Option<String>) -> Result<()> {
        let token = self.ask_unless_given(token, "License token")?;
        if token.is_empty() {
            self.printer.error("Token required");
            return Ok(());
        }
        match self.entitlement.redeem(&token) {
            Ok(exp) => self.printer.success(format!("License activated until {exp}")),
            Err(e) => self.printer.error(format!("Invalid token: {e}")),
        }
        Ok(())
    }

    fn reset(&mut self, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(p) => p,
            None => self.prompter.ask_secret("Admin password")?.unwrap_or_default(),
        };
        if password.is_empty() {
            self.printer.error("Password required");
        } else if self.entitlement.reset(&password) {
            self.printer.success("License and usage reset");
        } else {
            self.printer.error("Invalid admin password");
        }
        Ok(())
    }

    /// Free-text chat. Exhausted trials must redeem a token first.
    #[instrument(skip(self))]
    pub fn chat(&mut self, input: &str) -> Result<Flow> {
        if self.entitlement.free_remaining() == Some(0) {
            self.printer.error("Free trial exhausted. License required.");
            let answer = self.prompter.ask("License token (or 'exit' to quit)")?;
            let Some(token) = answer else {
                return Ok(Flow::Quit);
            };
            if token.eq_ignore_ascii_case("exit") {
                return Ok(Flow::Quit);
            }
            if token.is_empty() {
                return Ok(Flow::Continue);
            }
            match self.entitlement.redeem(&token) {
                Ok(exp) => self.printer.success(format!("License activated until {exp}")),
                Err(e) => {
                    self.printer.error(format!("Invalid token: {e}"));
                    return Ok(Flow::Continue);
                }
            }
        }

        let request = templates::chat_request(input, self.context());
        let Some(reply) = self.query(&request) else {
            return Ok(Flow::Continue);
        };

        self.printer.panel("AI Response", "");
        self.printer.reply(&reply);

        if templates::is_code_request(input) && !has_fence(&reply) {
            self.store.adopt_generated(&reply, DEFAULT_GENERATED_NAME);
            self.printer.info("Content updated");
        }
        Ok(Flow::Continue)
    }

    fn context(&self) -> Option<Context<'_>> {
        let working = self.store.working();
        let content = working.content.as_deref()?;
        let root = self.store.guard().root();
        let name = working
            .path
            .as_deref()
            .map(|p| p.strip_prefix(root).unwrap_or(p))
            .and_then(Path::to_str)
            .unwrap_or("untitled");
        Some(Context { name, content })
    }

    /// Spend one prompt and ask the model. Errors are reported, not returned.
    fn query(&mut self, request: &str) -> Option<String> {
        if self.entitlement.try_consume() == Consume::RequiresToken {
            self.printer.error("No free prompts left. Redeem a license token to continue.");
            return None;
        }

        let spinner = self.spinner();
        let result = self.client.complete(request);
        spinner.finish_and_clear();

        match result {
            Ok(completion) => {
                if let Some(u) = completion.usage {
                    self.printer.info(format!(
                        "Tokens: prompt={}, completion={}, total={}",
                        u.prompt_tokens, u.completion_tokens, u.total_tokens
                    ));
                }
                Some(completion.text)
            }
            Err(e) => {
                self.printer.error(format!("API error: {e}"));
                None
            }
        }
    }

    fn spinner(&self) -> ProgressBar {
        if self.printer.is_quiet() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Waiting for {}", self.client.model()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    fn create(&mut self, file: Option<String>, description: String) -> Result<()> {
        let file = self.ask_unless_given(file, "Filename")?;
        if file.is_empty() {
            self.printer.error("Filename required");
            return Ok(());
        }
        let target = match self.store.check_target(Path::new(&file)) {
            Ok(t) => t,
            Err(e) => {
                self.printer.error(e);
                return Ok(());
            }
        };

        if target.exists() {
            self.printer.warn(format!("File exists: {file}"));
            if !self.prompter.confirm("Overwrite?", false)? {
                self.printer.warn("Cancelled");
                return Ok(());
            }
            let outcome = self.store.backup(&target);
            self.report_backup(&outcome);
        }

        let Some(description) = self.description(description, "What to create?")? else {
            return Ok(());
        };
        self.printer.panel("Create", format!("{file}\n{description}"));

        let request = templates::create_request(&file, &description, self.context());
        let Some(reply) = self.query(&request) else {
            return Ok(());
        };
        self.printer.panel("Generated", "");
        self.printer.reply(&templates::preview(&reply));

        if !self.prompter.confirm("Save?", true)? {
            self.printer.warn("Cancelled");
            return Ok(());
        }
        self.commit(reply, target, &format!("Created {file}"));
        Ok(())
    }

    fn modify(&mut self, file: Option<String>, description: String) -> Result<()> {
        let file = self.ask_unless_given(file, "Filename to modify")?;
        if file.is_empty() {
            self.printer.error("Filename required");
            return Ok(());
        }
        let target = match self.store.check_target(Path::new(&file)) {
            Ok(t) => t,
            Err(e) => {
                self.printer.error(e);
                return Ok(());
            }
        };

        if !target.exists() {
            self.printer.error(format!("Not found: {file}"));
            if self.prompter.confirm("Create instead?", false)? {
                return self.create(Some(file), description);
            }
            return Ok(());
        }

        if self.store.working().path.as_deref() != Some(target.as_path())
            && !self.load_path(&target)
        {
            return Ok(());
        }
        let Some(current) = self.store.working().content.clone() else {
            self.printer.error("Load failed");
            return Ok(());
        };

        let outcome = self.store.backup(&target);
        self.report_backup(&outcome);

        let Some(description) = self.description(description, "How to modify?")? else {
            return Ok(());
        };
        self.printer.panel("Modify", format!("{file}\n{description}"));

        let (old_lines, old_chars) = (line_count(&current), current.chars().count());
        self.printer.info(format!("Current: {old_lines} lines, {old_chars} chars"));

        let request = templates::modify_request(&file, &current, &description);
        let Some(reply) = self.query(&request) else {
            return Ok(());
        };
        self.printer.panel("Modified", "");
        self.printer.reply(&templates::preview(&reply));

        let updated = extract_code(&reply);
        let (new_lines, new_chars) = (line_count(updated), updated.chars().count());
        self.printer.info(format!("Modified: {new_lines} lines, {new_chars} chars"));
        self.printer.info(format!(
            "Change: {:+} lines, {:+} chars",
            new_lines as i64 - old_lines as i64,
            new_chars as i64 - old_chars as i64
        ));
        let summary = diff_summary(&current, updated);
        self.printer.info(format!("Diff: +{} -{} lines", summary.added, summary.removed));

        if !self.prompter.confirm("Save modifications?", true)? {
            self.printer.warn("Cancelled");
            return Ok(());
        }
        if self.commit(reply, target, &format!("Modified {file}"))
            && self.store.backups().enabled()
        {
            self.printer.info(format!("Backups in {}", self.store.backups().dir().display()));
        }
        Ok(())
    }

    fn description(&mut self, given: String, label: &str) -> Result<Option<String>> {
        let given = (!given.trim().is_empty()).then_some(given);
        let description = self.ask_unless_given(given, label)?;
        if description.is_empty() {
            self.printer.error("Description required");
            return Ok(None);
        }
        Ok(Some(truncate_chars(&description, DESCRIPTION_LIMIT).to_string()))
    }

    /// Forced save of generated content followed by a reload.
    fn commit(&mut self, content: String, target: PathBuf, done: &str) -> bool {
        let req = SaveRequest {
            content: Some(content),
            path: Some(target.clone()),
            force_overwrite: true,
        };
        if !self.save_with(req) {
            return false;
        }
        if self.store.load(&target).is_err() {
            debug!(path = %target.display(), "reload after save failed");
        }
        self.printer.success(done);
        true
    }

    pub fn status_line(&self) -> String {
        let license = match (self.entitlement.expiration(), self.entitlement.days_remaining()) {
            (Some(exp), Some(days)) => format!("Licensed until {exp} ({days} days)"),
            _ => format!("Free prompts: {}", self.entitlement.free_remaining().unwrap_or(0)),
        };
        let current = self
            .store
            .working()
            .path
            .as_deref()
            .map(|p| self.store.guard().display_path(p).into_owned())
            .unwrap_or_else(|| "None".to_string());
        let keys = match self.keys.len() {
            0 => "No keys".to_string(),
            n => format!("API Keys: {n}"),
        };
        format!("Model: {} | {keys} | {license} | Current: {current}", self.client.model())
    }

    fn print_status(&self) {
        self.printer.status(&self.status_line());
    }

    fn report_warnings(&mut self) {
        for w in self.entitlement.take_warnings() {
            self.printer.warn(w);
        }
    }
}

fn line_count(text: &str) -> usize {
    text.matches('\n').count() + 1
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
}

pub fn diff_summary(old: &str, new: &str) -> DiffSummary {
    let diff = TextDiff::from_lines(old, new);
    let mut summary = DiffSummary::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => summary.added += 1,
            ChangeTag::Delete => summary.removed += 1,
            ChangeTag::Equal => {}
        }
    }
    summary
}
