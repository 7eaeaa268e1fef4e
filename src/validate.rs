//! Resume check: does an existing suitcase already hold its assignments?
//!
//! Only entry names are compared; entry bodies are never verified.  An
//! archive whose headers survived a truncation can therefore pass.  Any
//! failure to open or walk the archive counts as "rebuild it", never as an
//! error to the caller.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use age::x25519::Identity;
use tracing::debug;

use crate::crypto;
use crate::error::{Error, Result};
use crate::format::{Format, ENCRYPTED_SUFFIX};
use crate::inventory::FileAssignment;

/// `true` when every destination assigned to `index` is present in the
/// archive at `path`.  Outer-encrypted archives always fail this check;
/// use [`validate_with_identities`] for those.
pub fn validate(path: &Path, assignments: &[FileAssignment], index: usize) -> bool {
    validate_with_identities(path, assignments, index, &[])
}

/// [`validate`], decrypting outer-encrypted archives with `identities`.
///
/// A destination also counts as present when only its inner-encrypted form
/// (`name.gpg`) is in the archive.
pub fn validate_with_identities(
    path:        &Path,
    assignments: &[FileAssignment],
    index:       usize,
    identities:  &[Identity],
) -> bool {
    let names: HashSet<String> = match list_entries(path, identities) {
        Ok(names) => names.into_iter().map(|n| normalize(&n).to_owned()).collect(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "archive does not validate");
            return false;
        }
    };

    let missing = assignments
        .iter()
        .filter(|f| f.suitcase_index == index)
        .map(|f| normalize(&f.destination))
        .find(|dest| !names.contains(*dest) && !names.contains(&format!("{dest}{ENCRYPTED_SUFFIX}")));

    match missing {
        Some(dest) => {
            debug!(path = %path.display(), missing = dest, "archive is incomplete");
            false
        }
        None => true,
    }
}

/// Entry names in archive order.  The format is taken from the file name.
pub fn list_entries(path: &Path, identities: &[Identity]) -> Result<Vec<String>> {
    let format = Format::from_path(path).ok_or_else(|| format_error(path, "unrecognised archive extension"))?;
    let file = File::open(path).map_err(|e| format_error(path, e))?;

    if format == Format::Tar {
        // Uncompressed and unencrypted: seek past bodies.
        let mut archive = tar::Archive::new(file);
        let entries = archive.entries_with_seek().map_err(|e| format_error(path, e))?;
        return entries
            .map(|e| {
                let e = e.map_err(|e| format_error(path, e))?;
                entry_name(path, &e)
            })
            .collect();
    }

    let source = BufReader::new(file);
    let plain: Box<dyn Read> = if format.is_encrypted() {
        crypto::decrypting_reader(source, identities).map_err(|e| format_error(path, e))?
    } else {
        Box::new(source)
    };
    let stream = format.codec().reader(plain).map_err(|e| format_error(path, e))?;

    let mut archive = tar::Archive::new(stream);
    let entries = archive.entries().map_err(|e| format_error(path, e))?;
    entries
        .map(|e| {
            let e = e.map_err(|e| format_error(path, e))?;
            entry_name(path, &e)
        })
        .collect()
}

fn entry_name<R: Read>(path: &Path, entry: &tar::Entry<'_, R>) -> Result<String> {
    let name = entry.path().map_err(|e| format_error(path, e))?;
    Ok(name.to_string_lossy().into_owned())
}

fn normalize(name: &str) -> &str {
    name.trim_end_matches('/')
}

fn format_error(path: &Path, reason: impl ToString) -> Error {
    Error::Format { path: path.to_path_buf(), reason: reason.to_string() }
}
