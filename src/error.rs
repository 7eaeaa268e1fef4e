//! Error taxonomy for the suitcase engine.
//!
//! | kind | meaning | retried? |
//! |------|---------|----------|
//! | [`ConfigError`] | invalid options, unknown format, recipient problems | never |
//! | [`Error::Io`] | source unreadable before its entry was started | never (transport retries live elsewhere) |
//! | [`Error::Entry`] | entry started but not written as its header claims | never |
//! | [`Error::Encoding`] | malformed digest in the base64 manifest | never |
//! | [`Error::Format`] | unreadable archive; the validator maps it to `false` | n/a |

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;

// ── Configuration errors ─────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown format '{0}'")]
    UnknownFormat(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("inner and outer encryption are mutually exclusive")]
    ConflictingEncryption,
    #[error("encryption is enabled but no recipients are configured")]
    MissingRecipients,
    #[error("cannot encrypt a file for an empty recipient set")]
    EmptyRecipients,
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[error("no inventory to fill from")]
    MissingInventory,
    #[error("unknown hash algorithm '{0}'")]
    UnknownHashAlgorithm(String),
}

// ── Teardown ─────────────────────────────────────────────────────────────────

/// One writer layer that failed to finish during `Suitcase::close`.
#[derive(Debug)]
pub struct LayerError {
    pub layer:  &'static str,
    pub source: io::Error,
}

impl LayerError {
    pub fn new(layer: &'static str, source: io::Error) -> Self {
        Self { layer, source }
    }
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.layer, self.source)
    }
}

fn join_layers(errors: &[LayerError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

// ── Crate error ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source:  io::Error,
    },

    #[error("entry '{destination}' is incomplete: {source}")]
    Entry {
        destination: String,
        #[source]
        source:      io::Error,
    },

    #[error("digest for '{filename}' is not valid hex: {source}")]
    Encoding {
        filename: String,
        #[source]
        source:   hex::FromHexError,
    },

    #[error("archive {path} is unreadable: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to close {} layer(s): {}", .0.len(), join_layers(.0))]
    Teardown(Vec<LayerError>),

    #[error("post-process command {command} failed: {status}")]
    PostProcess { command: PathBuf, status: String },

    #[error("invalid inventory or options document: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with a description of what was being attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io { context: context.into(), source }
    }

    /// The configuration error behind this failure, if any.
    pub fn config(&self) -> Option<&ConfigError> {
        match self {
            Error::Config(c) => Some(c),
            _ => None,
        }
    }

    /// Whether a fill may drop the file and carry on.  Only failures raised
    /// before anything reached the archive qualify.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::Io { .. } | Error::Crypto(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_lists_every_layer() {
        let err = Error::Teardown(vec![
            LayerError::new("tar", io::Error::new(io::ErrorKind::Other, "disk full")),
            LayerError::new("cipher", io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 layer(s)"));
        assert!(msg.contains("tar: disk full"));
        assert!(msg.contains("cipher: gone"));
    }

    #[test]
    fn config_accessor() {
        let err: Error = ConfigError::MissingRecipients.into();
        assert!(matches!(err.config(), Some(ConfigError::MissingRecipients)));
        assert!(Error::io("x", io::Error::new(io::ErrorKind::Other, "y")).config().is_none());
    }

    #[test]
    fn only_failures_before_the_header_are_skippable() {
        assert!(Error::io("open x", io::Error::new(io::ErrorKind::NotFound, "gone")).is_skippable());
        let entry = Error::Entry {
            destination: "x".into(),
            source:      io::Error::new(io::ErrorKind::UnexpectedEof, "short"),
        };
        assert!(!entry.is_skippable());
        assert!(!Error::from(ConfigError::MissingInventory).is_skippable());
        assert!(!Error::Teardown(Vec::new()).is_skippable());
    }
}
