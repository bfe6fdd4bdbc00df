use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use keyrotate_core::{keys::KeyPair, profile::ProfileStoreError};
use regex::Regex;
use tracing::{debug, instrument};

use crate::{ACCESS_KEY_ID, SECRET_ACCESS_KEY};

/// A key assignment found inside a profile section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLine {
    /// Zero-based line index in the file.
    pub index: usize,
    pub value: String,
}

/// Position of one profile inside a credentials file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSection {
    pub profile: String,
    /// Line index of the `[profile]` header.
    pub header: usize,
    /// First line after the header.
    pub start: usize,
    /// Next header, or the number of lines when the section runs to end of file.
    pub end: usize,
    pub access_key_id: Option<KeyLine>,
    pub secret_access_key: Option<KeyLine>,
}

impl ProfileSection {
    /// Body line indices, header excluded.
    pub fn body(&self) -> Range<usize> {
        self.start..self.end
    }

    /// The key pair currently stored in the section. Empty values count as missing.
    pub fn key_pair(&self, path: &str) -> Result<KeyPair, ProfileStoreError> {
        let access_key_id = self
            .access_key_id
            .as_ref()
            .filter(|line| !line.value.is_empty())
            .ok_or_else(|| self.missing(path, ACCESS_KEY_ID))?;
        let secret_access_key = self
            .secret_access_key
            .as_ref()
            .filter(|line| !line.value.is_empty())
            .ok_or_else(|| self.missing(path, SECRET_ACCESS_KEY))?;
        Ok(KeyPair::new(
            access_key_id.value.clone(),
            secret_access_key.value.clone(),
        ))
    }

    pub(crate) fn missing(&self, path: &str, key: &str) -> ProfileStoreError {
        ProfileStoreError::MissingKey {
            profile: self.profile.clone(),
            path: path.to_string(),
            key: key.to_string(),
        }
    }
}

/// Line matchers for one profile. Header matching is anchored to the whole
/// line so `dev` never matches `[dev-admin]`.
pub(crate) struct SectionMatcher {
    profile_header: Regex,
    any_header: Regex,
    key_assignment: Regex,
}

const BOM: char = '\u{feff}';

const TRAILING_COMMENT: &str = r"(?:\s*[#;].*)?";

impl SectionMatcher {
    pub(crate) fn new(profile: &str) -> Result<Self, ProfileStoreError> {
        let pattern_err = |err: regex::Error| ProfileStoreError::Pattern {
            profile: profile.to_string(),
            reason: err.to_string(),
        };
        let profile_header = Regex::new(&format!(
            r"^\s*\[\s*{}\s*\]{TRAILING_COMMENT}\s*$",
            regex::escape(profile)
        ))
        .map_err(pattern_err)?;
        let any_header =
            Regex::new(&format!(r"^\s*\[[^\]]*\]{TRAILING_COMMENT}\s*$")).map_err(pattern_err)?;
        let key_assignment =
            Regex::new(r"^\s*([A-Za-z0-9_.\-]+)\s*=\s*(.*?)\s*$").map_err(pattern_err)?;
        Ok(Self {
            profile_header,
            any_header,
            key_assignment,
        })
    }

    pub(crate) fn is_profile_header(&self, line: &str) -> bool {
        self.profile_header.is_match(line)
    }

    pub(crate) fn is_header(&self, line: &str) -> bool {
        self.any_header.is_match(line)
    }

    /// The key name of an assignment line; comments and blanks yield `None`.
    pub(crate) fn key<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let captures = self.key_assignment.captures(line)?;
        let key = captures.get(1)?.as_str();
        let value = captures.get(2)?.as_str();
        Some((key, value))
    }
}

/// Find the section of `profile` in `content`. `path` is only used in errors.
pub fn find_section(
    content: &str,
    profile: &str,
    path: &str,
) -> Result<ProfileSection, ProfileStoreError> {
    let matcher = SectionMatcher::new(profile)?;
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let lines: Vec<&str> = content.lines().collect();

    let header = lines
        .iter()
        .position(|line| matcher.is_profile_header(line))
        .ok_or_else(|| ProfileStoreError::ProfileNotFound {
            profile: profile.to_string(),
            path: path.to_string(),
        })?;
    let start = header + 1;
    let end = lines[start..]
        .iter()
        .position(|line| matcher.is_header(line))
        .map_or(lines.len(), |offset| start + offset);

    let mut section = ProfileSection {
        profile: profile.to_string(),
        header,
        start,
        end,
        access_key_id: None,
        secret_access_key: None,
    };
    for (index, line) in lines.iter().enumerate().take(end).skip(start) {
        let Some((key, value)) = matcher.key(line) else {
            continue;
        };
        let slot = match key {
            ACCESS_KEY_ID => &mut section.access_key_id,
            SECRET_ACCESS_KEY => &mut section.secret_access_key,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(KeyLine {
                index,
                value: value.to_string(),
            });
        }
    }
    Ok(section)
}

/// Finds profile sections in a credentials file on disk. Read-only.
#[derive(Debug, Clone)]
pub struct ProfileLocator {
    path: PathBuf,
}

impl ProfileLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn locate(&self, profile: &str) -> Result<ProfileSection, ProfileStoreError> {
        let content = read_content(&self.path)?;
        let section = find_section(&content, profile, &self.path.display().to_string())?;
        debug!(header = section.header, end = section.end, "located profile section");
        Ok(section)
    }
}

pub(crate) fn read_content(path: &Path) -> Result<String, ProfileStoreError> {
    fs::read_to_string(path).map_err(|err| io_err(path, err))
}

pub(crate) fn io_err<E: ToString>(path: &Path, err: E) -> ProfileStoreError {
    ProfileStoreError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
