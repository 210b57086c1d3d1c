use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Replace `path` with `data` in one step: write a sibling temp file, fsync,
/// then rename over the destination. Readers never observe a partial file.
///
/// The temp file always lives beside `path`; if it cannot be created there
/// the destination is left untouched and the error returned.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Preserve original permissions when replacing an existing file
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = tempfile::NamedTempFile::new_in(dir)?;

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms)?;
    }

    // Same directory, so this is a rename; the temp file is removed on failure
    tmp.persist(path).map_err(|e| e.error)?;

    // fsync parent dir to ensure the rename is durable on Unix
    #[cfg(unix)]
    {
        if let Ok(parent) = fs::File::open(dir) {
            let _ = parent.sync_all();
        }
    }

    Ok(())
}

/// Delete `path`; a file that is already gone counts as success.
/// Returns whether something was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read a file that may legitimately be missing.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
