//! Per-suitcase configuration.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::format::Format;
use crate::hash::HashAlgorithm;
use crate::manifest::ManifestEncoding;

/// What the fill engine does when one file cannot be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the fill and surface the error.
    #[default]
    FailFast,
    /// Log the failure, skip the file, keep going.
    Continue,
}

/// Configuration for [`crate::Suitcase::new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// `None` is the unset format and is rejected at construction.
    pub format:            Option<Format>,
    /// Directory the suitcase files are written to.
    pub destination:       PathBuf,
    /// Advisory upper bound on bytes per suitcase.  Never enforced.
    pub max_size:          Option<u64>,
    /// Encrypt each file individually before framing it.
    pub encrypt_inner:     bool,
    /// Encrypt the whole archive stream.  Forced on by `.gpg` formats.
    pub encrypt_outer:     bool,
    /// `age1...` public keys.
    pub encrypt_to:        Vec<String>,
    /// Digest every file as it is added.
    pub hash_inner:        bool,
    /// Digest the finished archive file.
    pub hash_outer:        bool,
    pub hash_algorithm:    HashAlgorithm,
    pub manifest_encoding: ManifestEncoding,
    pub error_policy:      ErrorPolicy,
    /// Executable run after a successful fill.
    pub post_process:      Option<PathBuf>,
    pub post_process_env:  BTreeMap<String, String>,
}

impl ArchiveOptions {
    pub fn new(format: Format) -> Self {
        Self { format: Some(format), ..Default::default() }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("open options {}", path.display()), e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Apply the construction rules, in order:
    ///
    /// 1. an encrypted format forces `encrypt_outer`;
    /// 2. inner and outer encryption are mutually exclusive;
    /// 3. any encryption needs at least one recipient;
    /// 4. the format must be set, and must carry a cipher layer if
    ///    `encrypt_outer` was requested explicitly.
    ///
    /// Outer encryption is only expressed through the `.gpg` formats: a
    /// plain format such as `tar.gz` with `encrypt_outer` set is
    /// [`ConfigError::UnsupportedFormat`].
    pub fn resolve(&mut self) -> std::result::Result<Format, ConfigError> {
        if self.format.is_some_and(Format::is_encrypted) {
            self.encrypt_outer = true;
        }
        if self.encrypt_inner && self.encrypt_outer {
            return Err(ConfigError::ConflictingEncryption);
        }
        if (self.encrypt_inner || self.encrypt_outer) && self.encrypt_to.is_empty() {
            return Err(ConfigError::MissingRecipients);
        }
        let format = self
            .format
            .ok_or_else(|| ConfigError::UnsupportedFormat("format is not set".into()))?;
        if self.encrypt_outer && !format.is_encrypted() {
            return Err(ConfigError::UnsupportedFormat(format!(
                "{format} has no outer cipher layer; use an encrypted format"
            )));
        }
        Ok(format)
    }
}
