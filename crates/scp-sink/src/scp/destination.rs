// ── Destination resolution – where a received file lands locally ─────────────

use crate::scp::error::{ScpError, ScpResult};
use crate::scp::types::{ScpMultiFileTarget, ScpNamePolicy};
use std::path::{Path, PathBuf};

/// Local target of one retrieval, probed once before the first header.
#[derive(Debug, Clone)]
pub struct ScpDestination {
    local: PathBuf,
    is_dir: bool,
    name_policy: ScpNamePolicy,
    multi_file_target: ScpMultiFileTarget,
    files_resolved: usize,
}

impl ScpDestination {
    pub fn probe(
        local: impl AsRef<Path>,
        name_policy: ScpNamePolicy,
        multi_file_target: ScpMultiFileTarget,
    ) -> Self {
        let local = local.as_ref().to_path_buf();
        let is_dir = local.is_dir();
        Self {
            local,
            is_dir,
            name_policy,
            multi_file_target,
            files_resolved: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn local(&self) -> &Path {
        &self.local
    }

    /// Local path for a file the source calls `name`.
    ///
    /// A directory destination gets `dir/name`; a file destination is used
    /// verbatim whatever the remote name, so the name is only checked when
    /// it becomes part of the path.
    pub fn resolve(&mut self, name: &[u8]) -> ScpResult<PathBuf> {
        let path = if self.is_dir {
            if name.is_empty() {
                return Err(ScpError::protocol(format!(
                    "Empty remote file name for directory destination '{}'",
                    self.local.display()
                )));
            }
            if self.name_policy == ScpNamePolicy::Reject {
                check_name(name)?;
            }
            self.local.join(name_to_path(name))
        } else {
            if self.files_resolved > 0 && self.multi_file_target == ScpMultiFileTarget::Reject {
                return Err(ScpError::protocol(format!(
                    "Source sent more than one file for non-directory destination '{}'",
                    self.local.display()
                )));
            }
            self.local.clone()
        };

        self.files_resolved += 1;
        Ok(path)
    }
}

/// Refuse names that are not a single plain path component.
pub fn check_name(name: &[u8]) -> ScpResult<()> {
    let display = String::from_utf8_lossy(name);
    if name.is_empty() || name == b"." || name == b".." {
        return Err(ScpError::protocol(format!(
            "Refusing remote file name '{}'",
            display
        )));
    }
    if name.iter().any(|&b| is_separator(b) || b == 0) {
        return Err(ScpError::protocol(format!(
            "Refusing remote file name '{}': contains a path separator",
            display
        )));
    }
    Ok(())
}

#[cfg(windows)]
fn is_separator(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

#[cfg(not(windows))]
fn is_separator(b: u8) -> bool {
    b == b'/'
}

#[cfg(unix)]
fn name_to_path(name: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn name_to_path(name: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(name).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::error::ScpErrorKind;

    #[test]
    fn test_directory_destination_joins_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest =
            ScpDestination::probe(dir.path(), ScpNamePolicy::Reject, ScpMultiFileTarget::Overwrite);
        assert!(dest.is_dir());
        let path = dest.resolve(b"report.txt").unwrap();
        assert_eq!(path, dir.path().join("report.txt"));
    }

    #[test]
    fn test_file_destination_ignores_remote_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("single.txt");
        let mut dest =
            ScpDestination::probe(&target, ScpNamePolicy::Reject, ScpMultiFileTarget::Overwrite);
        assert!(!dest.is_dir());
        assert_eq!(dest.resolve(b"a.txt").unwrap(), target);
        assert_eq!(dest.resolve(b"b.txt").unwrap(), target);
    }

    #[test]
    fn test_file_destination_reject_second_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("single.txt");
        let mut dest =
            ScpDestination::probe(&target, ScpNamePolicy::Reject, ScpMultiFileTarget::Reject);
        dest.resolve(b"a.txt").unwrap();
        let err = dest.resolve(b"b.txt").unwrap_err();
        assert_eq!(err.kind(), ScpErrorKind::Protocol);
    }

    #[test]
    fn test_reject_traversal_names() {
        for bad in [&b".."[..], b".", b"", b"../etc/passwd", b"a/b", b"nul\0"] {
            assert!(check_name(bad).is_err(), "{:?} should be refused", bad);
        }
        assert!(check_name(b"..hidden").is_ok());
        assert!(check_name(b"with space.txt").is_ok());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_backslash_is_ordinary_name_byte() {
        assert!(check_name(b"a\\b.txt").is_ok());
        let dir = tempfile::tempdir().unwrap();
        let mut dest =
            ScpDestination::probe(dir.path(), ScpNamePolicy::Reject, ScpMultiFileTarget::Overwrite);
        let path = dest.resolve(b"weird\\name.txt").unwrap();
        assert_eq!(path, dir.path().join("weird\\name.txt"));
    }

    #[cfg(windows)]
    #[test]
    fn test_backslash_is_separator_on_windows() {
        assert!(check_name(b"a\\b.txt").is_err());
    }

    #[test]
    fn test_file_destination_accepts_any_remote_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("single.txt");
        let mut dest =
            ScpDestination::probe(&target, ScpNamePolicy::Reject, ScpMultiFileTarget::Overwrite);
        for name in [&b"a\\b.txt"[..], b"..", b"", b"../escape", b"sub/dir.txt"] {
            assert_eq!(dest.resolve(name).unwrap(), target, "name {:?}", name);
        }
    }

    #[test]
    fn test_directory_destination_rejects_empty_name_under_any_policy() {
        let dir = tempfile::tempdir().unwrap();
        for policy in [ScpNamePolicy::Reject, ScpNamePolicy::Verbatim] {
            let mut dest = ScpDestination::probe(dir.path(), policy, ScpMultiFileTarget::Overwrite);
            assert_eq!(dest.resolve(b"").unwrap_err().kind(), ScpErrorKind::Protocol);
        }
    }

    #[test]
    fn test_verbatim_policy_allows_anything() {
        let dir = tempfile::tempdir().unwrap();
        let mut dest =
            ScpDestination::probe(dir.path(), ScpNamePolicy::Verbatim, ScpMultiFileTarget::Overwrite);
        let path = dest.resolve(b"sub/inner.txt").unwrap();
        assert_eq!(path, dir.path().join("sub/inner.txt"));
    }
}
