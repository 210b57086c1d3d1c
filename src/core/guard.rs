//! Write-safety checks for user and model supplied paths.
//!
//! [`PathGuard`] pins every path under a root directory (the process CWD in
//! the binary) and rejects system locations and executable file types.
//! Filename rules follow the Windows reserved-name list so that files written
//! on one platform can be checked out on another.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// Directories that are never written to, even if the root sits above them.
#[cfg(not(windows))]
const SYSTEM_DIRS: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/bin", "/sbin", "/boot"];
#[cfg(windows)]
const SYSTEM_DIRS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
];

/// Executable and script types, compared case-insensitively without the dot.
const FORBIDDEN_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib", "bat", "cmd", "sh", "ps1"];

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\0'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub const MAX_FILENAME_CHARS: usize = 255;

/// Default ceiling for files the store will read.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum PathViolation {
    #[error("path traversal detected: {} is outside the working directory", .0.display())]
    Traversal(PathBuf),
    #[error("system directory blocked: {}", .0.display())]
    SystemDirectory(PathBuf),
    #[error("file type blocked: .{0}")]
    ForbiddenExtension(String),
    #[error("invalid path {}: {source}", path.display())]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilenameViolation {
    #[error("empty filename")]
    Empty,
    #[error("invalid character in filename: {0:?}")]
    IllegalChar(char),
    #[error("reserved filename: {0}")]
    Reserved(String),
    #[error("filename too long: {0} characters (max 255)")]
    TooLong(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum SizeViolation {
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("size check failed for {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Confines writes to one directory tree.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Guard rooted at `root`, canonicalized once up front.
    pub fn new(root: &Path) -> io::Result<Self> {
        Ok(Self { root: dunce::canonicalize(root)? })
    }

    /// Guard rooted at the current working directory.
    pub fn current_dir() -> io::Result<Self> {
        Self::new(&std::env::current_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the root for display; falls back to the full path.
    pub fn display_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        match path.strip_prefix(&self.root) {
            Ok(rel) => std::borrow::Cow::Owned(rel.to_string_lossy().into_owned()),
            Err(_) => path.to_string_lossy(),
        }
    }

    /// Resolve `path` (relative to the root) and check it against the
    /// traversal, system-directory and extension policies. Returns the
    /// resolved absolute path, which is what callers should open.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, PathViolation> {
        let resolved = self.resolve(path).map_err(|source| PathViolation::Unresolvable {
            path: path.to_path_buf(),
            source,
        })?;

        if !resolved.starts_with(&self.root) {
            debug!(path = %resolved.display(), "outside root");
            return Err(PathViolation::Traversal(resolved));
        }

        if SYSTEM_DIRS.iter().any(|d| resolved.starts_with(d)) {
            return Err(PathViolation::SystemDirectory(resolved));
        }

        if let Some(ext) = resolved.extension() {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            if FORBIDDEN_EXTENSIONS.contains(&ext.as_str()) {
                return Err(PathViolation::ForbiddenExtension(ext));
            }
        }

        Ok(resolved)
    }

    /// Canonicalize the deepest existing ancestor (following symlinks) and
    /// append the not-yet-existing remainder lexically.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let joined = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };

        let mut existing = joined.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                // trailing `..` of a missing path
                (Some(parent), None) => {
                    tail.push("..".into());
                    existing = parent;
                }
                (None, _) => break,
            }
        }

        let mut out = dunce::canonicalize(existing)?;
        for part in tail.iter().rev() {
            match Path::new(part).components().next() {
                Some(Component::ParentDir) => {
                    out.pop();
                }
                Some(Component::CurDir) | None => {}
                Some(_) => out.push(part),
            }
        }
        Ok(out)
    }
}

/// Check a bare file name (no directories) for portability hazards.
pub fn validate_filename(name: &str) -> Result<(), FilenameViolation> {
    if name.trim().is_empty() {
        return Err(FilenameViolation::Empty);
    }

    if let Some(c) = name.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
        return Err(FilenameViolation::IllegalChar(c));
    }

    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_uppercase())
        .unwrap_or_default();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return Err(FilenameViolation::Reserved(stem));
    }

    let len = name.chars().count();
    if len > MAX_FILENAME_CHARS {
        return Err(FilenameViolation::TooLong(len));
    }

    Ok(())
}

/// Reject existing files above `max_bytes`; missing files always pass.
pub fn check_size(path: &Path, max_bytes: u64) -> Result<(), SizeViolation> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > max_bytes => {
            Err(SizeViolation::TooLarge { size: meta.len(), max: max_bytes })
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SizeViolation::Unreadable { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let tmp = TempDir::new().unwrap();
        let g = PathGuard::new(tmp.path()).unwrap();
        (tmp, g)
    }

    #[test]
    fn relative_paths_resolve_under_root() {
        let (_tmp, g) = guard();
        let p = g.validate_path(Path::new("src/new/main.py")).unwrap();
        assert_eq!(p, g.root().join("src/new/main.py"));
    }

    #[test]
    fn parent_escape_is_traversal() {
        let (_tmp, g) = guard();
        assert!(matches!(
            g.validate_path(Path::new("../../etc/passwd")),
            Err(PathViolation::Traversal(_))
        ));
        assert!(matches!(
            g.validate_path(Path::new("a/../../outside.txt")),
            Err(PathViolation::Traversal(_))
        ));
    }

    #[test]
    fn dotdot_inside_root_is_fine() {
        let (_tmp, g) = guard();
        let p = g.validate_path(Path::new("a/b/../c.txt")).unwrap();
        assert_eq!(p, g.root().join("a/c.txt"));
    }

    #[test]
    fn sibling_with_common_prefix_is_traversal() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("proj")).unwrap();
        fs::create_dir(tmp.path().join("project2")).unwrap();
        let g = PathGuard::new(&tmp.path().join("proj")).unwrap();
        let target = tmp.path().join("project2/x.txt");
        assert!(matches!(g.validate_path(&target), Err(PathViolation::Traversal(_))));
    }

    #[test]
    fn script_extensions_are_blocked() {
        let (_tmp, g) = guard();
        assert!(matches!(
            g.validate_path(Path::new("script.sh")),
            Err(PathViolation::ForbiddenExtension(e)) if e == "sh"
        ));
        assert!(matches!(
            g.validate_path(Path::new("Setup.EXE")),
            Err(PathViolation::ForbiddenExtension(e)) if e == "exe"
        ));
        assert!(g.validate_path(Path::new("notes.shtml")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn system_dirs_are_blocked_even_inside_root() {
        let g = PathGuard::new(Path::new("/")).unwrap();
        assert!(matches!(
            g.validate_path(Path::new("/etc/hosts")),
            Err(PathViolation::SystemDirectory(_))
        ));
        assert!(matches!(
            g.validate_path(Path::new("proc/whatever.txt")),
            Err(PathViolation::SystemDirectory(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_traversal() {
        let outside = TempDir::new().unwrap();
        let (tmp, g) = guard();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();
        assert!(matches!(
            g.validate_path(Path::new("link/file.txt")),
            Err(PathViolation::Traversal(_))
        ));
    }

    #[test]
    fn filename_rules() {
        assert_eq!(validate_filename("main.py"), Ok(()));
        assert_eq!(validate_filename("   "), Err(FilenameViolation::Empty));
        assert_eq!(validate_filename("a<b.txt"), Err(FilenameViolation::IllegalChar('<')));
        assert_eq!(validate_filename("what?.md"), Err(FilenameViolation::IllegalChar('?')));
        assert_eq!(validate_filename("nul\0.txt"), Err(FilenameViolation::IllegalChar('\0')));
        assert_eq!(
            validate_filename("CON.txt"),
            Err(FilenameViolation::Reserved("CON".into()))
        );
        assert_eq!(
            validate_filename("lpt7"),
            Err(FilenameViolation::Reserved("LPT7".into()))
        );
        assert_eq!(validate_filename("console.txt"), Ok(()));
        assert_eq!(validate_filename(&"a".repeat(255)), Ok(()));
        assert_eq!(validate_filename(&"a".repeat(256)), Err(FilenameViolation::TooLong(256)));
    }

    #[test]
    fn size_ceiling() {
        let (tmp, _g) = guard();
        let p = tmp.path().join("big.txt");
        assert!(check_size(&p, 10).is_ok());

        fs::write(&p, "0123456789").unwrap();
        assert!(check_size(&p, 10).is_ok());
        assert!(matches!(
            check_size(&p, 9),
            Err(SizeViolation::TooLarge { size: 10, max: 9 })
        ));
    }
}
