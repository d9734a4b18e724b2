//! Write-then-rename file replacement with final permissions.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::IdentityError;
use crate::Result;

/// Owner read-only.
pub const KEY_FILE_MODE: u32 = 0o400;
/// World-readable, nobody may write.
pub const CERT_FILE_MODE: u32 = 0o444;

/// Atomically replace `path` with `contents`.
///
/// The data goes to a temp file in the same directory, is synced, gets its
/// final `mode`, and is then renamed over `path`. A crash leaves either the
/// old file or the new one under the final name, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| IdentityError::io(dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| IdentityError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| IdentityError::io(tmp.path(), e))?;

    set_mode(tmp.path(), mode)?;
    clear_readonly_target(path)?;

    tmp.persist(path)
        .map_err(|e| IdentityError::io(path, e.error))?;

    debug!(path = %path.display(), mode = format!("{mode:o}"), "wrote file");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| IdentityError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    let mut perms = std::fs::metadata(path)
        .map_err(|e| IdentityError::io(path, e))?
        .permissions();
    perms.set_readonly(true);
    std::fs::set_permissions(path, perms).map_err(|e| IdentityError::io(path, e))
}

// Rename over a read-only file is fine on Unix; elsewhere the target has to
// be made writable first.
#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
const fn clear_readonly_target(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn clear_readonly_target(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mut perms = meta.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                std::fs::set_permissions(path, perms).map_err(|e| IdentityError::io(path, e))?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IdentityError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pem");

        write_atomic(&path, b"hello", CERT_FILE_MODE).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_write_atomic_replaces_readonly_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.key");

        write_atomic(&path, b"first", KEY_FILE_MODE).unwrap();
        write_atomic(&path, b"second", KEY_FILE_MODE).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No temp files left behind.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.key");
        write_atomic(&path, b"secret", KEY_FILE_MODE).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, KEY_FILE_MODE);
    }

    #[test]
    fn test_write_atomic_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("server.crt");

        let err = write_atomic(&path, b"x", CERT_FILE_MODE).unwrap_err();
        assert!(matches!(err, IdentityError::Io { .. }));
    }
}
