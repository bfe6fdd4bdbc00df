use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use keyrotate_core::{keys::KeyPair, profile::ProfileStoreError};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::{
    locator::{io_err, ProfileSection, SectionMatcher},
    ACCESS_KEY_ID, SECRET_ACCESS_KEY,
};

/// Rewrite the key lines of `section` in `content`.
///
/// Only assignment lines inside the section body whose key is
/// `aws_access_key_id` or `aws_secret_access_key` change; every other byte,
/// line endings included, is copied through. `path` is only used in errors.
pub fn rewrite_section(
    content: &str,
    section: &ProfileSection,
    key_pair: &KeyPair,
    path: &str,
) -> Result<String, ProfileStoreError> {
    let matcher = SectionMatcher::new(&section.profile)?;
    let body = section.body();
    let mut wrote_access_key = false;
    let mut wrote_secret_key = false;
    let mut out = String::with_capacity(content.len() + 64);

    for (index, segment) in content.split_inclusive('\n').enumerate() {
        if !body.contains(&index) {
            out.push_str(segment);
            continue;
        }
        let (line, ending) = split_line_ending(segment);
        match matcher.key(line).map(|(key, _)| key) {
            Some(ACCESS_KEY_ID) => {
                out.push_str(&format!("{ACCESS_KEY_ID} = {}", key_pair.access_key_id));
                out.push_str(ending);
                wrote_access_key = true;
            }
            Some(SECRET_ACCESS_KEY) => {
                out.push_str(&format!(
                    "{SECRET_ACCESS_KEY} = {}",
                    key_pair.secret_access_key
                ));
                out.push_str(ending);
                wrote_secret_key = true;
            }
            _ => out.push_str(segment),
        }
    }

    if !wrote_access_key {
        return Err(section.missing(path, ACCESS_KEY_ID));
    }
    if !wrote_secret_key {
        return Err(section.missing(path, SECRET_ACCESS_KEY));
    }
    Ok(out)
}

fn split_line_ending(segment: &str) -> (&str, &str) {
    if let Some(line) = segment.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = segment.strip_suffix('\n') {
        (line, "\n")
    } else {
        (segment, "")
    }
}

/// Persists credentials-file content atomically with owner-only permissions.
#[derive(Debug, Clone)]
pub struct CredentialFileWriter {
    path: PathBuf,
}

impl CredentialFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file with `content` via temp file + rename. On failure the
    /// previous file is left as it was.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn persist(&self, content: &str) -> Result<(), ProfileStoreError> {
        let target = resolve_target(&self.path);
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_err(&target, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| io_err(&target, e))?;
        tmp.flush().map_err(|e| io_err(&target, e))?;
        restrict_permissions(tmp.as_file()).map_err(|e| io_err(&target, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(&target, e))?;
        tmp.persist(&target).map_err(|e| io_err(&target, e.error))?;
        debug!(target = %target.display(), "credentials file replaced");
        Ok(())
    }
}

/// A symlinked credentials file is replaced at its destination, keeping the link.
fn resolve_target(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}
