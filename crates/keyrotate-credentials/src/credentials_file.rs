use std::path::{Path, PathBuf};

use keyrotate_core::{
    keys::KeyPair,
    profile::{ProfileStore, ProfileStoreError},
};
use tracing::{debug, instrument};

use crate::{
    locator::{find_section, read_content, ProfileLocator},
    writer::{rewrite_section, CredentialFileWriter},
};

/// `ProfileStore` over an AWS shared credentials file (`~/.aws/credentials`).
#[derive(Debug, Clone)]
pub struct CredentialsFile {
    locator: ProfileLocator,
    writer: CredentialFileWriter,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            locator: ProfileLocator::new(path.clone()),
            writer: CredentialFileWriter::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.locator.path()
    }

    fn display_path(&self) -> String {
        self.path().display().to_string()
    }
}

impl ProfileStore for CredentialsFile {
    fn location(&self) -> String {
        self.display_path()
    }

    #[instrument(skip(self), fields(path = %self.path().display()))]
    fn read_key_pair(&self, profile: &str) -> Result<KeyPair, ProfileStoreError> {
        let section = self.locator.locate(profile)?;
        section.key_pair(&self.display_path())
    }

    #[instrument(skip(self, key_pair), fields(path = %self.path().display()))]
    fn write_key_pair(&self, profile: &str, key_pair: &KeyPair) -> Result<(), ProfileStoreError> {
        // Located again against the content about to be rewritten.
        let path = self.display_path();
        let content = read_content(self.path())?;
        let section = find_section(&content, profile, &path)?;
        let updated = rewrite_section(&content, &section, key_pair, &path)?;
        debug!(
            header = section.header,
            access_key_id = %key_pair.access_key_id,
            "rewriting profile section"
        );
        self.writer.persist(&updated)
    }
}
