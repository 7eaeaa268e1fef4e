//! The seam shared by the compression and cipher layers of a suitcase.
//!
//! A layer wraps an inner writer and owns a trailer (gzip footer, zstd
//! epilogue, final cipher chunk).  `try_finish` writes that trailer without
//! giving up the inner writer, so a failed layer never prevents the layers
//! beneath it from being finished too.

use std::io::{self, Write};

pub trait Layer: Write {
    type Inner: Write;

    /// Name used in teardown error reports.
    fn layer_name(&self) -> &'static str;

    /// Write the trailer and flush.  Idempotent once it has succeeded.
    fn try_finish(&mut self) -> io::Result<()>;

    /// The wrapped writer, if this layer still owns one.
    fn inner_mut(&mut self) -> Option<&mut Self::Inner>;

    /// Finish (if not already finished) and hand back the wrapped writer.
    fn into_inner(self) -> io::Result<Self::Inner>;
}
