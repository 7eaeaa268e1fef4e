//! Tar framing layer.
//!
//! [`ContainerWriter`] turns file assignments into tar entries on top of
//! whatever writer chain sits below it.  Regular files carry their bytes;
//! directories and symlinks are header-only (symlinks record their target).
//! Source metadata is read with `symlink_metadata`, so links are never
//! followed.
//!
//! # Hashing
//! When a hash algorithm is configured, regular files stream through a
//! [`HashingReader`] on their way into the builder, so the digest covers the
//! plaintext bytes before any compression layer sees them, in one pass.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};

use tar::{Builder, EntryType, Header};
use tracing::debug;

use crate::crypto::{self, Recipients};
use crate::error::{Error, Result};
use crate::format::ENCRYPTED_SUFFIX;
use crate::hash::{HashAlgorithm, HashRecord, HashingReader};
use crate::inventory::FileAssignment;

pub struct ContainerWriter<W: Write> {
    builder:     Builder<W>,
    hash:        Option<HashAlgorithm>,
    entries:     u64,
    bytes_added: u64,
}

impl<W: Write> ContainerWriter<W> {
    pub fn new(sink: W, hash: Option<HashAlgorithm>) -> Self {
        let mut builder = Builder::new(sink);
        builder.follow_symlinks(false);
        Self { builder, hash, entries: 0, bytes_added: 0 }
    }

    /// Entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of entry body sizes written so far (before compression).
    pub fn bytes_added(&self) -> u64 {
        self.bytes_added
    }

    // ── Add ──────────────────────────────────────────────────────────────────

    /// Frame `file` as an entry named `file.destination`.
    ///
    /// Returns the digest of the file's bytes when hashing is enabled and
    /// the entry has a body.
    pub fn add(&mut self, file: &FileAssignment) -> Result<Option<HashRecord>> {
        let meta = stat(file)?;
        let mut header = header_for(file, &meta);
        let file_type = meta.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(&file.path)
                .map_err(|e| Error::io(format!("read link {}", file.path.display()), e))?;
            self.builder
                .append_link(&mut header, &file.destination, &target)
                .map_err(|e| write_failed(file, e))?;
            return Ok(self.entry_written(file, 0, None));
        }

        if file_type.is_dir() {
            self.builder
                .append_data(&mut header, &file.destination, io::empty())
                .map_err(|e| write_failed(file, e))?;
            return Ok(self.entry_written(file, 0, None));
        }

        if !file_type.is_file() {
            return Err(Error::io(
                format!("add {}", file.path.display()),
                io::Error::new(io::ErrorKind::Unsupported, "not a regular file, directory or symlink"),
            ));
        }

        let size = meta.len();
        let source = File::open(&file.path)
            .map_err(|e| Error::io(format!("open {}", file.path.display()), e))?;
        self.append_body(file, &mut header, source, size)
    }

    /// Write a regular-file entry whose header claims `size` bytes.
    ///
    /// The body always matches the header: a source that ends early is
    /// padded with zeros, then reported as [`Error::Entry`] so the caller
    /// stops instead of adding more entries after a corrupt one.
    fn append_body<R: Read>(
        &mut self,
        file:   &FileAssignment,
        header: &mut Header,
        source: R,
        size:   u64,
    ) -> Result<Option<HashRecord>> {
        match self.hash {
            Some(algorithm) => {
                let mut reader = ZeroPadded::new(HashingReader::new(source, algorithm));
                self.builder
                    .append_data(header, &file.destination, (&mut reader).take(size))
                    .map_err(|e| write_failed(file, e))?;
                short_read_check(file, size, reader.bytes_read())?;
                let record = HashRecord::new(file.destination.clone(), reader.into_inner().finalize_hex());
                Ok(self.entry_written(file, size, Some(record)))
            }
            None => {
                let mut reader = ZeroPadded::new(source);
                self.builder
                    .append_data(header, &file.destination, (&mut reader).take(size))
                    .map_err(|e| write_failed(file, e))?;
                short_read_check(file, size, reader.bytes_read())?;
                Ok(self.entry_written(file, size, None))
            }
        }
    }

    // ── AddEncrypt ───────────────────────────────────────────────────────────

    /// Encrypt the whole of `file` for `recipients` and frame the ciphertext
    /// as `file.destination + ".gpg"`.  Directories and symlinks have no
    /// content to seal and are framed as by [`add`](Self::add).
    pub fn add_encrypt(&mut self, file: &FileAssignment, recipients: &Recipients) -> Result<()> {
        let meta = stat(file)?;
        if !meta.file_type().is_file() {
            return self.add(file).map(|_| ());
        }

        let plaintext = fs::read(&file.path)
            .map_err(|e| Error::io(format!("read {}", file.path.display()), e))?;
        let ciphertext = crypto::encrypt(recipients, &plaintext)?;

        let mut header = header_for(file, &meta);
        header.set_entry_type(EntryType::Regular);
        header.set_size(ciphertext.len() as u64);

        let name = format!("{}{}", file.destination, ENCRYPTED_SUFFIX);
        self.builder
            .append_data(&mut header, &name, ciphertext.as_slice())
            .map_err(|e| write_failed(file, e))?;
        self.entry_written(file, ciphertext.len() as u64, None);
        Ok(())
    }

    // ── Teardown ─────────────────────────────────────────────────────────────

    /// Write the two zero blocks that end a tar stream.  The builder keeps
    /// its writer, so lower layers can still be finished if this fails.
    pub fn finish(&mut self) -> io::Result<()> {
        self.builder.finish()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.builder.get_mut()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.builder.into_inner()
    }

    fn entry_written(&mut self, file: &FileAssignment, size: u64, record: Option<HashRecord>) -> Option<HashRecord> {
        self.entries += 1;
        self.bytes_added += size;
        debug!(destination = %file.destination, size, "added entry");
        record
    }
}

fn stat(file: &FileAssignment) -> Result<Metadata> {
    fs::symlink_metadata(&file.path)
        .map_err(|e| Error::io(format!("stat {}", file.path.display()), e))
}

/// Header from source metadata, with the assignment's overrides applied.
/// The entry name is set later by the builder.
fn header_for(file: &FileAssignment, meta: &Metadata) -> Header {
    let mut header = Header::new_gnu();
    header.set_metadata(meta);
    if let Some(mode) = file.mode {
        header.set_mode(mode);
    }
    if let Some(modified) = file.modified {
        header.set_mtime(modified.timestamp().max(0) as u64);
    }
    header
}

fn write_failed(file: &FileAssignment, e: io::Error) -> Error {
    Error::Entry { destination: file.destination.clone(), source: e }
}

/// A file that shrank after it was stat'ed had its entry padded with zeros
/// up to the size in its header.  The framing holds but the body is wrong.
fn short_read_check(file: &FileAssignment, expected: u64, read: u64) -> Result<()> {
    if read < expected {
        return Err(Error::Entry {
            destination: file.destination.clone(),
            source:      io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while archiving: expected {expected} bytes, read {read}"),
            ),
        });
    }
    Ok(())
}

/// Reader that yields zeros forever once `inner` is exhausted.  Counts the
/// bytes that came from `inner`.
struct ZeroPadded<R> {
    inner: R,
    read:  u64,
    eof:   bool,
}

impl<R: Read> ZeroPadded<R> {
    fn new(inner: R) -> Self {
        Self { inner, read: 0, eof: false }
    }

    fn bytes_read(&self) -> u64 {
        self.read
    }

    fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ZeroPadded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.eof {
            let n = self.inner.read(buf)?;
            if n > 0 || buf.is_empty() {
                self.read += n as u64;
                return Ok(n);
            }
            self.eof = true;
        }
        buf.fill(0);
        Ok(buf.len())
    }
}
