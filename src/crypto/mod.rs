//! Recipient encryption for suitcases.
//!
//! Two uses share one recipient set:
//!
//! - **Outer**: [`CipherWriter`] wraps the sink and encrypts the whole
//!   compressed tar stream as it is produced.
//! - **Inner**: [`encrypt`] seals one file's bytes in memory before it is
//!   framed as a `<name>.gpg` tar entry.
//!
//! Ciphertext is an age stream (X25519 recipients, `age1...` public keys).
//! `.gpg` stays the suffix of every encrypted artefact; it names the
//! layer, not the wire format.  Key generation and storage are out of scope:
//! callers hand in public keys, and identities only when reading back.

use std::fmt;
use std::io::{self, Read, Write};
use std::mem;

use age::x25519;
use thiserror::Error;

use crate::layer::Layer;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid recipient '{key}': {reason}")]
    InvalidRecipient { key: String, reason: String },
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

// ── Recipients ───────────────────────────────────────────────────────────────

/// Public keys every encrypted artefact is sealed for.
#[derive(Clone, Default)]
pub struct Recipients(Vec<x25519::Recipient>);

impl Recipients {
    /// Parse `age1...` public keys.  An empty list is valid here; whether it
    /// is acceptable depends on the archive options.
    pub fn parse<S: AsRef<str>>(keys: &[S]) -> Result<Self, CryptoError> {
        keys.iter()
            .map(|k| {
                let k = k.as_ref().trim();
                k.parse::<x25519::Recipient>().map_err(|reason| CryptoError::InvalidRecipient {
                    key:    k.to_owned(),
                    reason: reason.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Recipients)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn encryptor(&self) -> Result<age::Encryptor, CryptoError> {
        age::Encryptor::with_recipients(self.0.iter().map(|r| r as &dyn age::Recipient))
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }
}

impl From<Vec<x25519::Recipient>> for Recipients {
    fn from(v: Vec<x25519::Recipient>) -> Self {
        Recipients(v)
    }
}

impl fmt::Debug for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter().map(|r| r.to_string())).finish()
    }
}

// ── Identities ───────────────────────────────────────────────────────────────

/// Parse an identity file: one `AGE-SECRET-KEY-1...` per line, `#` comments
/// and blank lines ignored.
pub fn parse_identities(text: &str) -> Result<Vec<x25519::Identity>, CryptoError> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.parse::<x25519::Identity>()
                .map_err(|e| CryptoError::InvalidIdentity(e.to_string()))
        })
        .collect()
}

// ── Whole-buffer encryption (inner) ──────────────────────────────────────────

/// Encrypt `plaintext` for every recipient.  Not streaming: the whole
/// ciphertext is returned so its length can go into a tar header.
pub fn encrypt(recipients: &Recipients, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(plaintext.len() + 256);
    let mut writer = recipients
        .encryptor()?
        .wrap_output(&mut out)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    writer
        .write_all(plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    writer
        .finish()
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt`] or by a [`CipherWriter`].
pub fn decrypt(identities: &[x25519::Identity], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::new();
    decrypting_reader(ciphertext, identities)?
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    Ok(out)
}

/// Wrap `source` so reads yield plaintext.
pub fn decrypting_reader<'a, R: Read + 'a>(
    source:     R,
    identities: &[x25519::Identity],
) -> Result<Box<dyn Read + 'a>, CryptoError> {
    if identities.is_empty() {
        return Err(CryptoError::DecryptionFailed("no identities supplied".into()));
    }
    let decryptor = age::Decryptor::new(source)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let reader = decryptor
        .decrypt(identities.iter().map(|i| i as &dyn age::Identity))
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    Ok(Box::new(reader))
}

// ── Streaming encryption (outer) ─────────────────────────────────────────────

/// Outer cipher layer.  `Plain` is the identity layer used by unencrypted
/// formats, so every suitcase has the same writer chain shape.
pub enum CipherWriter<W: Write> {
    Plain(W),
    Sealing(age::stream::StreamWriter<W>),
    /// Trailer written; the sink is still owned but refuses more data.
    Sealed(W),
    /// Finishing failed and took the sink with it.
    Spent,
}

impl<W: Write> CipherWriter<W> {
    pub fn plain(sink: W) -> Self {
        CipherWriter::Plain(sink)
    }

    pub fn sealing(sink: W, recipients: &Recipients) -> Result<Self, CryptoError> {
        let stream = recipients
            .encryptor()?
            .wrap_output(sink)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(CipherWriter::Sealing(stream))
    }

    pub fn is_encrypting(&self) -> bool {
        matches!(self, CipherWriter::Sealing(_))
    }
}

fn closed_layer() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "cipher layer is already finished")
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CipherWriter::Plain(w)   => w.write(buf),
            CipherWriter::Sealing(w) => w.write(buf),
            CipherWriter::Sealed(_) | CipherWriter::Spent => Err(closed_layer()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CipherWriter::Plain(w) | CipherWriter::Sealed(w) => w.flush(),
            CipherWriter::Sealing(w) => w.flush(),
            CipherWriter::Spent => Ok(()),
        }
    }
}

impl<W: Write> Layer for CipherWriter<W> {
    type Inner = W;

    fn layer_name(&self) -> &'static str {
        "cipher"
    }

    fn try_finish(&mut self) -> io::Result<()> {
        match mem::replace(self, CipherWriter::Spent) {
            CipherWriter::Plain(mut w) | CipherWriter::Sealed(mut w) => {
                let flushed = w.flush();
                *self = CipherWriter::Sealed(w);
                flushed
            }
            CipherWriter::Sealing(stream) => {
                let mut w = stream.finish()?;
                let flushed = w.flush();
                *self = CipherWriter::Sealed(w);
                flushed
            }
            CipherWriter::Spent => Err(closed_layer()),
        }
    }

    fn inner_mut(&mut self) -> Option<&mut W> {
        match self {
            CipherWriter::Plain(w) | CipherWriter::Sealed(w) => Some(w),
            CipherWriter::Sealing(_) | CipherWriter::Spent => None,
        }
    }

    fn into_inner(mut self) -> io::Result<W> {
        self.try_finish()?;
        match self {
            CipherWriter::Sealed(w) => Ok(w),
            _ => Err(closed_layer()),
        }
    }
}
