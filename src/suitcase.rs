//! The suitcase facade.
//!
//! A [`Suitcase`] owns one output sink and the writer chain built on top of
//! it.  Every format composes the same three layers, sink-adjacent first:
//!
//! ```text
//! sink ← cipher (identity unless outer-encrypted) ← codec (identity for .tar) ← tar
//! ```
//!
//! so the seven formats differ only in which [`CodecId`](crate::codec::CodecId)
//! and whether the cipher is sealing.  [`Suitcase::close`] consumes the
//! suitcase, which makes "add after close" unrepresentable.

use std::io::Write;

use tracing::{info, warn};

use crate::codec::CodecWriter;
use crate::container::ContainerWriter;
use crate::crypto::{CipherWriter, Recipients};
use crate::error::{ConfigError, Error, LayerError, Result};
use crate::format::Format;
use crate::hash::HashRecord;
use crate::inventory::FileAssignment;
use crate::layer::Layer;
use crate::options::ArchiveOptions;

type Chain<W> = ContainerWriter<CodecWriter<CipherWriter<W>>>;

pub struct Suitcase<W: Write> {
    options:    ArchiveOptions,
    format:     Format,
    recipients: Recipients,
    container:  Chain<W>,
}

impl<W: Write> Suitcase<W> {
    /// Validate `options` and build the writer chain over `sink`.
    ///
    /// All configuration errors are reported before anything is written.
    pub fn new(sink: W, mut options: ArchiveOptions) -> Result<Self> {
        let format = options.resolve()?;
        let recipients = Recipients::parse(&options.encrypt_to)?;

        let cipher = if options.encrypt_outer {
            CipherWriter::sealing(sink, &recipients)?
        } else {
            CipherWriter::plain(sink)
        };
        let codec = format
            .codec()
            .writer(cipher)
            .map_err(|e| Error::io(format!("open {} layer", format.codec().name()), e))?;
        let hash = options.hash_inner.then_some(options.hash_algorithm);
        let container = ContainerWriter::new(codec, hash);

        info!(
            %format,
            encrypt_inner = options.encrypt_inner,
            encrypt_outer = options.encrypt_outer,
            recipients = recipients.len(),
            hash = ?hash,
            "opened suitcase"
        );
        Ok(Self { options, format, recipients, container })
    }

    pub fn config(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Uncompressed entry bytes written so far.
    pub fn bytes_added(&self) -> u64 {
        self.container.bytes_added()
    }

    pub fn entries(&self) -> u64 {
        self.container.entries()
    }

    /// Write `file` as an entry named `file.destination`.  Returns its digest
    /// when inner hashing is on and the entry has a body.
    pub fn add(&mut self, file: &FileAssignment) -> Result<Option<HashRecord>> {
        self.container.add(file)
    }

    /// Encrypt `file` for the configured recipients and write it as
    /// `file.destination + ".gpg"`.
    ///
    /// Rejected with [`ConfigError::UnsupportedOperation`] whenever the whole
    /// archive is outer-encrypted.
    pub fn add_encrypt(&mut self, file: &FileAssignment) -> Result<()> {
        if self.options.encrypt_outer {
            return Err(ConfigError::UnsupportedOperation(
                "per-file encryption inside an outer-encrypted archive",
            )
            .into());
        }
        if self.recipients.is_empty() {
            return Err(ConfigError::EmptyRecipients.into());
        }
        self.container.add_encrypt(file, &self.recipients)
    }

    /// Finish every layer, innermost first, and hand back the sink.
    ///
    /// A failing layer does not stop the layers beneath it from being
    /// finished; every failure is reported in one [`Error::Teardown`].
    pub fn close(self) -> Result<W> {
        let Suitcase { format, mut container, .. } = self;
        let mut errors = Vec::new();

        if let Err(e) = container.finish() {
            errors.push(LayerError::new("tar", e));
        }

        let codec = container.get_mut();
        let codec_name = codec.layer_name();
        if let Err(e) = codec.try_finish() {
            errors.push(LayerError::new(codec_name, e));
        }

        if let Some(cipher) = codec.inner_mut() {
            if let Err(e) = cipher.try_finish() {
                errors.push(LayerError::new(cipher.layer_name(), e));
            }
        }

        if !errors.is_empty() {
            for e in &errors {
                warn!(%format, layer = e.layer, error = %e.source, "layer failed to close");
            }
            return Err(Error::Teardown(errors));
        }

        let sink = container
            .into_inner()
            .map_err(|e| LayerError::new("tar", e))
            .and_then(|codec| codec.into_inner().map_err(|e| LayerError::new(codec_name, e)))
            .and_then(|cipher| cipher.into_inner().map_err(|e| LayerError::new("cipher", e)))
            .map_err(|e| Error::Teardown(vec![e]))?;

        info!(%format, "closed suitcase");
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read};

    use crate::error::ConfigError;

    fn keypair() -> (age::x25519::Identity, String) {
        let id = age::x25519::Identity::generate();
        let public = id.to_public().to_string();
        (id, public)
    }

    fn fixture(dir: &std::path::Path, name: &str, body: &[u8]) -> FileAssignment {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        FileAssignment::new(path, name, 1)
    }

    /// Sink that accepts `budget` bytes and then fails every write.
    struct Failing {
        budget: usize,
    }

    impl Write for Failing {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_format_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = fixture(dir.path(), "joe.txt", b"Joe the user\n");
        let (id, public) = keypair();

        for format in Format::ALL {
            let mut opts = ArchiveOptions::new(format);
            opts.encrypt_to = vec![public.clone()];
            let mut s = Suitcase::new(Vec::new(), opts).unwrap();
            s.add(&file).unwrap();
            let bytes = s.close().unwrap();

            let plain: Box<dyn Read + '_> = if format.is_encrypted() {
                crate::crypto::decrypting_reader(bytes.as_slice(), std::slice::from_ref(&id)).unwrap()
            } else {
                Box::new(bytes.as_slice())
            };
            let mut archive = tar::Archive::new(format.codec().reader(plain).unwrap());
            let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            assert_eq!(body, "Joe the user\n", "{format}");
        }
    }

    #[test]
    fn encrypted_format_rejects_add_encrypt() {
        let dir = tempfile::tempdir().unwrap();
        let file = fixture(dir.path(), "x", b"x");
        let (_, public) = keypair();

        for format in Format::ALL.into_iter().filter(|f| f.is_encrypted()) {
            let mut opts = ArchiveOptions::new(format);
            opts.encrypt_to = vec![public.clone()];
            let mut s = Suitcase::new(Vec::new(), opts).unwrap();
            assert!(s.config().encrypt_outer);
            let err = s.add_encrypt(&file).unwrap_err();
            assert!(matches!(err.config(), Some(ConfigError::UnsupportedOperation(_))), "{format}");
        }
    }

    #[test]
    fn add_encrypt_without_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let file = fixture(dir.path(), "x", b"x");
        let mut s = Suitcase::new(Vec::new(), ArchiveOptions::new(Format::TarGz)).unwrap();
        let err = s.add_encrypt(&file).unwrap_err();
        assert!(matches!(err.config(), Some(ConfigError::EmptyRecipients)));
    }

    #[test]
    fn invalid_recipient_is_rejected_at_construction() {
        let mut opts = ArchiveOptions::new(Format::TarGpg);
        opts.encrypt_to = vec!["not-a-key".into()];
        let err = Suitcase::new(Vec::new(), opts).err().unwrap();
        assert!(matches!(err, Error::Crypto(crate::crypto::CryptoError::InvalidRecipient { .. })));
    }

    #[test]
    fn close_reports_every_failing_layer() {
        let dir = tempfile::tempdir().unwrap();
        let file = fixture(dir.path(), "a", b"some content");

        let mut s = Suitcase::new(Failing { budget: 10_000 }, ArchiveOptions::new(Format::TarGz)).unwrap();
        s.add(&file).unwrap();
        // Exhaust the sink before teardown.
        s.container.get_mut().get_mut_sink().budget = 0;

        match s.close() {
            Err(Error::Teardown(layers)) => {
                let names: Vec<_> = layers.iter().map(|l| l.layer).collect();
                assert!(names.contains(&"gzip"), "{names:?}");
            }
            other => panic!("expected teardown error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn bytes_added_tracks_entry_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let a = fixture(dir.path(), "a", &[7u8; 100]);
        let b = fixture(dir.path(), "b", &[9u8; 28]);
        let mut s = Suitcase::new(Vec::new(), ArchiveOptions::new(Format::TarZst)).unwrap();
        s.add(&a).unwrap();
        s.add(&b).unwrap();
        assert_eq!(s.bytes_added(), 128);
        assert_eq!(s.entries(), 2);
    }

    impl<W: Write> CodecWriter<CipherWriter<W>> {
        fn get_mut_sink(&mut self) -> &mut W {
            match self.inner_mut() {
                Some(CipherWriter::Plain(w)) => w,
                _ => unreachable!("plain cipher in tests"),
            }
        }
    }
}
