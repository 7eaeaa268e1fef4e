//! Content hashing.
//!
//! Inner hashes are computed while a file streams into the tar framer,
//! before any compression sees the bytes: [`HashingReader`] sits between the
//! source file and the container and digests exactly what it forwards.
//! Outer hashes cover a finished archive file and are computed by
//! [`hash_file`] after the suitcase is closed.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::ConfigError;

// ── Algorithm ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// Name used on the command line and as the manifest file extension.
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _        => Err(ConfigError::UnknownHashAlgorithm(s.to_owned())),
        }
    }
}

// ── Hasher ───────────────────────────────────────────────────────────────────

pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// One manifest line: a file name paired with its hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub filename: String,
    pub digest:   String,
}

impl HashRecord {
    pub fn new(filename: impl Into<String>, digest: impl Into<String>) -> Self {
        Self { filename: filename.into(), digest: digest.into() }
    }
}

// ── Streaming tee ────────────────────────────────────────────────────────────

/// Forwards reads from `inner` while digesting every byte handed out.
pub struct HashingReader<R> {
    inner:  R,
    hasher: Hasher,
    count:  u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: HashAlgorithm) -> Self {
        Self { inner, hasher: algorithm.hasher(), count: 0 }
    }

    /// Bytes forwarded so far.
    pub fn bytes_read(&self) -> u64 {
        self.count
    }

    pub fn finalize_hex(self) -> String {
        self.hasher.finalize_hex()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

/// Digest an entire file.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut reader = HashingReader::new(File::open(path)?, algorithm);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.finalize_hex())
}
