//! Compression adapters: identity, gzip, zstd and bzip2.
//!
//! Every adapter wraps an output sink and is itself a `Write`, so the tar
//! framer above it never knows whether its bytes are compressed.  Decoders
//! are provided for the validator, which needs to walk an archive's headers.

use std::io::{self, BufReader, Read, Write};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;

use crate::layer::Layer;

/// Default Zstd compression level.
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

// ── CodecId enum ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    None,
    Gzip,
    Zstd,
    Bzip2,
}

impl CodecId {
    /// Human-readable name, used in diagnostics and teardown reports.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None  => "none",
            CodecId::Gzip  => "gzip",
            CodecId::Zstd  => "zstd",
            CodecId::Bzip2 => "bzip2",
        }
    }

    /// Wrap `sink` in this codec's encoder.
    pub fn writer<W: Write>(self, sink: W) -> io::Result<CodecWriter<W>> {
        Ok(match self {
            CodecId::None  => CodecWriter::None(sink),
            CodecId::Gzip  => CodecWriter::Gzip(GzEncoder::new(sink, flate2::Compression::default())),
            CodecId::Zstd  => CodecWriter::Zstd(zstd::stream::write::Encoder::new(sink, DEFAULT_ZSTD_LEVEL)?),
            CodecId::Bzip2 => CodecWriter::Bzip2(BzEncoder::new(sink, bzip2::Compression::default())),
        })
    }

    /// Wrap `source` in this codec's decoder.
    pub fn reader<'a, R: Read + 'a>(self, source: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            CodecId::None  => Box::new(source),
            CodecId::Gzip  => Box::new(flate2::read::GzDecoder::new(source)),
            CodecId::Zstd  => Box::new(zstd::stream::read::Decoder::new(source)?),
            CodecId::Bzip2 => Box::new(bzip2::read::BzDecoder::new(BufReader::new(source))),
        })
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub enum CodecWriter<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Bzip2(BzEncoder<W>),
}

impl<W: Write> CodecWriter<W> {
    pub fn codec_id(&self) -> CodecId {
        match self {
            CodecWriter::None(_)  => CodecId::None,
            CodecWriter::Gzip(_)  => CodecId::Gzip,
            CodecWriter::Zstd(_)  => CodecId::Zstd,
            CodecWriter::Bzip2(_) => CodecId::Bzip2,
        }
    }
}

impl<W: Write> Write for CodecWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CodecWriter::None(w)  => w.write(buf),
            CodecWriter::Gzip(w)  => w.write(buf),
            CodecWriter::Zstd(w)  => w.write(buf),
            CodecWriter::Bzip2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CodecWriter::None(w)  => w.flush(),
            CodecWriter::Gzip(w)  => w.flush(),
            CodecWriter::Zstd(w)  => w.flush(),
            CodecWriter::Bzip2(w) => w.flush(),
        }
    }
}

impl<W: Write> Layer for CodecWriter<W> {
    type Inner = W;

    fn layer_name(&self) -> &'static str {
        self.codec_id().name()
    }

    fn try_finish(&mut self) -> io::Result<()> {
        match self {
            CodecWriter::None(w)  => w.flush(),
            CodecWriter::Gzip(w)  => w.try_finish(),
            CodecWriter::Zstd(w)  => w.do_finish(),
            CodecWriter::Bzip2(w) => w.try_finish(),
        }
    }

    fn inner_mut(&mut self) -> Option<&mut W> {
        Some(match self {
            CodecWriter::None(w)  => w,
            CodecWriter::Gzip(w)  => w.get_mut(),
            CodecWriter::Zstd(w)  => w.get_mut(),
            CodecWriter::Bzip2(w) => w.get_mut(),
        })
    }

    fn into_inner(self) -> io::Result<W> {
        match self {
            CodecWriter::None(w)  => Ok(w),
            CodecWriter::Gzip(w)  => w.finish(),
            CodecWriter::Zstd(w)  => w.finish(),
            CodecWriter::Bzip2(w) => w.finish(),
        }
    }
}
