//! Hash manifest sidecars.
//!
//! A manifest sits next to its archive as `{archive}.{algorithm}` and holds
//! one `filename<TAB>digest` line per record.  The digest is either the hex
//! string as computed, or the raw digest bytes in standard base64.

use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, HashRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestEncoding {
    #[default]
    Hex,
    Base64,
}

/// `{archive}.{algorithm}`, e.g. `suitcase-01-of-02.tar.gz.sha256`.
pub fn manifest_path(archive: &Path, algorithm: HashAlgorithm) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".");
    name.push(algorithm.name());
    PathBuf::from(name)
}

/// One `filename\thex_digest\n` line per record.
pub fn write_text_manifest<W: Write>(mut w: W, records: &[HashRecord]) -> Result<()> {
    for r in records {
        writeln!(w, "{}\t{}", r.filename, r.digest)
            .map_err(|e| Error::io("write manifest", e))?;
    }
    w.flush().map_err(|e| Error::io("flush manifest", e))
}

/// One `filename\tbase64(digest bytes)\n` line per record.
///
/// Every digest is decoded before the first byte is written, so a malformed
/// digest leaves `w` untouched.
pub fn write_binary_manifest<W: Write>(mut w: W, records: &[HashRecord]) -> Result<()> {
    let lines = records
        .iter()
        .map(|r| {
            let raw = hex::decode(&r.digest).map_err(|source| Error::Encoding {
                filename: r.filename.clone(),
                source,
            })?;
            Ok(format!("{}\t{}\n", r.filename, STANDARD.encode(raw)))
        })
        .collect::<Result<Vec<_>>>()?;

    for line in lines {
        w.write_all(line.as_bytes())
            .map_err(|e| Error::io("write manifest", e))?;
    }
    w.flush().map_err(|e| Error::io("flush manifest", e))
}

/// Write `records` to `path` in the requested encoding.
pub fn write_manifest_file(path: &Path, records: &[HashRecord], encoding: ManifestEncoding) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::io(format!("create manifest {}", path.display()), e))?;
    let w = BufWriter::new(file);
    match encoding {
        ManifestEncoding::Hex    => write_text_manifest(w, records),
        ManifestEncoding::Base64 => write_binary_manifest(w, records),
    }
}

/// Parse a manifest written by [`write_text_manifest`].
///
/// The filename is everything before the last tab, so names that themselves
/// contain tabs survive.
pub fn read_text_manifest<R: BufRead>(r: R) -> Result<Vec<HashRecord>> {
    let mut records = Vec::new();
    for line in r.lines() {
        let line = line.map_err(|e| Error::io("read manifest", e))?;
        if line.is_empty() {
            continue;
        }
        let (filename, digest) = line.rsplit_once('\t').ok_or_else(|| {
            Error::io(
                "read manifest",
                std::io::Error::new(std::io::ErrorKind::InvalidData, format!("no tab in line '{line}'")),
            )
        })?;
        records.push(HashRecord::new(filename, digest));
    }
    Ok(records)
}
