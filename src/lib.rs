pub mod error;
pub mod layer;
pub mod format;
pub mod codec;
pub mod crypto;
pub mod hash;
pub mod inventory;
pub mod options;
pub mod container;
pub mod suitcase;
pub mod fill;
pub mod manifest;
pub mod validate;
pub mod postprocess;
pub mod pack;

pub use error::{ConfigError, Error, LayerError, Result};
pub use format::Format;
pub use codec::CodecId;
pub use crypto::{CryptoError, Recipients};
pub use hash::{HashAlgorithm, HashRecord};
pub use inventory::{FileAssignment, Inventory};
pub use options::{ArchiveOptions, ErrorPolicy};
pub use suitcase::Suitcase;
pub use fill::{fill, FillProgress, ProgressSink};
pub use manifest::{write_binary_manifest, write_text_manifest, ManifestEncoding};
pub use validate::{validate, validate_with_identities};
pub use pack::{pack_all, pack_suitcase, PackedSuitcase};
