//! The single-file working set and its guarded load/save.
//!
//! Saving is where model output meets the disk, so every save runs the same
//! pipeline: filename check, path check, overwrite confirmation and backup,
//! fence extraction, then one atomic write. Files persisted through the store
//! never contain markdown fences, however the content was produced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::core::backup::{BackupConfig, BackupManager, BackupOutcome};
use crate::core::fence::extract_code;
use crate::core::guard::{
    DEFAULT_MAX_FILE_SIZE, FilenameViolation, PathGuard, PathViolation, SizeViolation,
    check_size, validate_filename,
};
use crate::infra::io::write_atomic;
use crate::infra::prompt::Prompter;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_file_size: u64,
    pub backup: BackupConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE, backup: BackupConfig::default() }
    }
}

/// The file currently being worked on. `path` may be set without a file on
/// disk when content came from the model and has not been saved yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    pub content: Option<String>,
    pub path: Option<PathBuf>,
}

impl WorkingSet {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.path.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathViolation),
    #[error(transparent)]
    Filename(#[from] FilenameViolation),
    #[error(transparent)]
    Size(#[from] SizeViolation),
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("not a text file: {}", .0.display())]
    NotText(PathBuf),
    #[error("no content to save")]
    NoContent,
    #[error("no output file given")]
    NoPath,
    #[error("overwrite of {} cancelled", .0.display())]
    OverwriteDeclined(PathBuf),
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("prompt failed: {0}")]
    Prompt(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded {
    pub path: PathBuf,
    pub chars: usize,
}

/// Arguments to [`FileStore::save`]. Missing fields fall back to the working
/// set.
#[derive(Debug, Default, Clone)]
pub struct SaveRequest {
    pub content: Option<String>,
    pub path: Option<PathBuf>,
    /// Skip the overwrite question (and with it the store's own backup).
    pub force_overwrite: bool,
}

#[derive(Debug)]
pub struct SaveReport {
    pub path: PathBuf,
    pub chars: usize,
    pub bytes: usize,
    /// `None` when no backup was attempted.
    pub backup: Option<BackupOutcome>,
}

#[derive(Debug)]
pub struct FileStore {
    guard: PathGuard,
    max_file_size: u64,
    backups: BackupManager,
    working: WorkingSet,
}

impl FileStore {
    pub fn new(guard: PathGuard, config: StoreConfig) -> Self {
        Self {
            guard,
            max_file_size: config.max_file_size,
            backups: BackupManager::new(config.backup),
            working: WorkingSet::default(),
        }
    }

    pub fn working(&self) -> &WorkingSet {
        &self.working
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Filename and path checks for a prospective write target; returns the
    /// resolved path.
    pub fn check_target(&self, target: &Path) -> Result<PathBuf, StoreError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        validate_filename(&name)?;
        Ok(self.guard.validate_path(target)?)
    }

    /// Back up an already validated target outside of [`save`](Self::save).
    pub fn backup(&self, resolved: &Path) -> BackupOutcome {
        self.backups.backup_if_exists(resolved)
    }

    /// Read a text file into the working set.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load(&mut self, path: &Path) -> Result<Loaded, StoreError> {
        let resolved = self.guard.validate_path(path)?;
        check_size(&resolved, self.max_file_size)?;
        if !resolved.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let content = match fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(StoreError::NotText(path.to_path_buf()));
            }
            Err(source) => return Err(StoreError::Read { path: resolved, source }),
        };

        let chars = content.chars().count();
        debug!(chars, "loaded");
        self.working = WorkingSet { content: Some(content), path: Some(resolved.clone()) };
        Ok(Loaded { path: resolved, chars })
    }

    /// Validate, optionally confirm and back up, strip fences and write.
    #[instrument(skip_all, fields(force = req.force_overwrite))]
    pub fn save(
        &mut self,
        req: SaveRequest,
        prompter: &mut dyn Prompter,
    ) -> Result<SaveReport, StoreError> {
        let content = req
            .content
            .or_else(|| self.working.content.clone())
            .ok_or(StoreError::NoContent)?;

        let target = match req.path.or_else(|| self.working.path.clone()) {
            Some(p) => p,
            None => match prompter.ask("Output file").map_err(StoreError::Prompt)? {
                Some(answer) if !answer.is_empty() => PathBuf::from(answer),
                _ => return Err(StoreError::NoPath),
            },
        };

        let resolved = self.check_target(&target)?;

        let mut backup = None;
        if resolved.exists() && !req.force_overwrite {
            let question = format!("Overwrite {}?", self.guard.display_path(&resolved));
            if !prompter.confirm(&question, false).map_err(StoreError::Prompt)? {
                return Err(StoreError::OverwriteDeclined(resolved));
            }
            backup = Some(self.backups.backup_if_exists(&resolved));
        }

        let code = extract_code(&content).to_string();

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Write { path: parent.to_path_buf(), source })?;
        }
        write_atomic(&resolved, code.as_bytes())
            .map_err(|source| StoreError::Write { path: resolved.clone(), source })?;

        let report = SaveReport {
            path: resolved.clone(),
            chars: code.chars().count(),
            bytes: code.len(),
            backup,
        };
        info!(path = %resolved.display(), chars = report.chars, "saved");

        self.working = WorkingSet { content: Some(code), path: Some(resolved) };
        Ok(report)
    }

    pub fn clear(&mut self) {
        self.working = WorkingSet::default();
    }

    /// Take an unsaved model reply as the working content, naming it
    /// `default_name` if nothing is loaded yet.
    pub fn adopt_generated(&mut self, content: &str, default_name: &str) {
        self.working.content = Some(content.to_string());
        if self.working.path.is_none() {
            self.working.path = Some(PathBuf::from(default_name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::prompt::ScriptedPrompter;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> FileStore {
        let config = StoreConfig {
            max_file_size: 64,
            backup: BackupConfig { enabled: true, dir: tmp.path().join(".aicode_backups") },
        };
        FileStore::new(PathGuard::new(tmp.path()).unwrap(), config)
    }

    fn backups_in(tmp: &TempDir) -> Vec<PathBuf> {
        match fs::read_dir(tmp.path().join(".aicode_backups")) {
            Ok(rd) => rd.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn save_to(path: &str, content: &str) -> SaveRequest {
        SaveRequest {
            content: Some(content.to_string()),
            path: Some(PathBuf::from(path)),
            force_overwrite: false,
        }
    }

    #[test]
    fn save_persists_only_fenced_code() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::default();

        let report = fs_store
            .save(save_to("out.py", "hello\n```python\nprint(1)\n```\nbye"), &mut p)
            .unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("out.py")).unwrap(), "print(1)");
        assert_eq!(report.chars, 8);
        assert_eq!(report.bytes, 8);
        assert!(report.backup.is_none());
        assert!(p.asked.is_empty());
        assert_eq!(fs_store.working().content.as_deref(), Some("print(1)"));
    }

    #[test]
    fn confirmed_overwrite_backs_up_exactly_once() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.py"), "old = 1\n").unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::new(["y"]);

        let report = fs_store.save(save_to("app.py", "new = 2"), &mut p).unwrap();

        let backups = backups_in(&tmp);
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "old = 1\n");
        assert_eq!(report.backup.as_ref().and_then(|b| b.created()), Some(backups[0].as_path()));
        assert_eq!(fs::read_to_string(tmp.path().join("app.py")).unwrap(), "new = 2");
    }

    #[test]
    fn declined_overwrite_leaves_everything() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.py"), "old").unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::new(["n"]);

        let err = fs_store.save(save_to("app.py", "new"), &mut p).unwrap_err();
        assert!(matches!(err, StoreError::OverwriteDeclined(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("app.py")).unwrap(), "old");
        assert!(backups_in(&tmp).is_empty());
        assert!(fs_store.working().is_empty());
    }

    #[test]
    fn forced_overwrite_skips_question_and_backup() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("app.py"), "old").unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::default();

        let mut req = save_to("app.py", "new");
        req.force_overwrite = true;
        let report = fs_store.save(req, &mut p).unwrap();

        assert!(report.backup.is_none());
        assert!(p.asked.is_empty());
        assert_eq!(fs::read_to_string(tmp.path().join("app.py")).unwrap(), "new");
    }

    #[test]
    fn save_defaults_to_working_set() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.md"), "draft").unwrap();
        let mut fs_store = store(&tmp);
        fs_store.load(Path::new("notes.md")).unwrap();

        let mut p = ScriptedPrompter::new(["y"]);
        let report = fs_store.save(SaveRequest::default(), &mut p).unwrap();
        assert_eq!(report.path, fs_store.guard().root().join("notes.md"));
        assert_eq!(fs::read_to_string(tmp.path().join("notes.md")).unwrap(), "draft");
    }

    #[test]
    fn save_asks_for_path_when_none_known() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::new(["nested/dir/gen.rs"]);

        let req = SaveRequest { content: Some("fn x() {}".into()), ..Default::default() };
        fs_store.save(req, &mut p).unwrap();
        assert_eq!(p.asked, ["Output file"]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("nested/dir/gen.rs")).unwrap(),
            "fn x() {}"
        );
    }

    #[test]
    fn save_without_answer_is_no_path() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);
        let req = SaveRequest { content: Some("x".into()), ..Default::default() };
        let err = fs_store.save(req, &mut ScriptedPrompter::default()).unwrap_err();
        assert!(matches!(err, StoreError::NoPath));
    }

    #[test]
    fn save_with_nothing_is_no_content() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);
        let err = fs_store
            .save(SaveRequest::default(), &mut ScriptedPrompter::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NoContent));
    }

    #[test]
    fn unsafe_targets_write_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);
        let mut p = ScriptedPrompter::default();

        let err = fs_store.save(save_to("run.sh", "echo hi"), &mut p).unwrap_err();
        assert!(matches!(err, StoreError::Path(PathViolation::ForbiddenExtension(_))));
        assert!(!tmp.path().join("run.sh").exists());

        let err = fs_store.save(save_to("CON.txt", "x"), &mut p).unwrap_err();
        assert!(matches!(err, StoreError::Filename(FilenameViolation::Reserved(_))));

        let err = fs_store.save(save_to("../escape.txt", "x"), &mut p).unwrap_err();
        assert!(matches!(err, StoreError::Path(PathViolation::Traversal(_))));
    }

    #[test]
    fn load_failures_are_classified() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);

        assert!(matches!(
            fs_store.load(Path::new("missing.txt")),
            Err(StoreError::NotFound(_))
        ));

        fs::write(tmp.path().join("blob.dat"), [0xc3, 0x28, 0xff]).unwrap();
        assert!(matches!(fs_store.load(Path::new("blob.dat")), Err(StoreError::NotText(_))));

        fs::write(tmp.path().join("big.txt"), "x".repeat(65)).unwrap();
        assert!(matches!(
            fs_store.load(Path::new("big.txt")),
            Err(StoreError::Size(SizeViolation::TooLarge { size: 65, max: 64 }))
        ));

        assert!(fs_store.working().is_empty());
    }

    #[test]
    fn load_counts_characters() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("u.txt"), "héllo").unwrap();
        let mut fs_store = store(&tmp);

        let loaded = fs_store.load(Path::new("u.txt")).unwrap();
        assert_eq!(loaded.chars, 5);
        assert_eq!(fs_store.working().content.as_deref(), Some("héllo"));
    }

    #[test]
    fn clear_and_adopt() {
        let tmp = TempDir::new().unwrap();
        let mut fs_store = store(&tmp);

        fs_store.adopt_generated("print(2)", "generated_code.py");
        assert_eq!(fs_store.working().path.as_deref(), Some(Path::new("generated_code.py")));

        fs_store.clear();
        assert!(fs_store.working().is_empty());
    }
}
