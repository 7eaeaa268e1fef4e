//! Format registry: the closed set of suitcase formats.
//!
//! | format | layers (sink-adjacent first) | inner encryption |
//! |--------|------------------------------|------------------|
//! | `tar`         | tar                  | yes |
//! | `tar.gz`      | gzip → tar           | yes |
//! | `tar.zst`     | zstd → tar           | yes |
//! | `tar.bz2`     | bzip2 → tar          | yes |
//! | `tar.gpg`     | cipher → tar         | no  |
//! | `tar.gz.gpg`  | cipher → gzip → tar  | no  |
//! | `tar.zst.gpg` | cipher → zstd → tar  | no  |
//!
//! Each variant maps to exactly one suffix string and back.  The "unset"
//! format is modelled as `Option<Format>::None`, never as a variant, so
//! string conversion is total.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::codec::CodecId;
use crate::error::ConfigError;

/// Suffix appended to anything encrypted for the configured recipients:
/// the outer archive format names and inner per-file entries alike.
pub const ENCRYPTED_SUFFIX: &str = ".gpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Format {
    #[serde(rename = "tar")]
    #[value(name = "tar")]
    Tar,
    #[serde(rename = "tar.gpg")]
    #[value(name = "tar.gpg")]
    TarGpg,
    #[serde(rename = "tar.gz")]
    #[value(name = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.gz.gpg")]
    #[value(name = "tar.gz.gpg")]
    TarGzGpg,
    #[serde(rename = "tar.zst")]
    #[value(name = "tar.zst")]
    TarZst,
    #[serde(rename = "tar.zst.gpg")]
    #[value(name = "tar.zst.gpg")]
    TarZstGpg,
    #[serde(rename = "tar.bz2")]
    #[value(name = "tar.bz2")]
    TarBz2,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Tar,
        Format::TarGpg,
        Format::TarGz,
        Format::TarGzGpg,
        Format::TarZst,
        Format::TarZstGpg,
        Format::TarBz2,
    ];

    /// The suffix string, e.g. `"tar.zst.gpg"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Tar       => "tar",
            Format::TarGpg    => "tar.gpg",
            Format::TarGz     => "tar.gz",
            Format::TarGzGpg  => "tar.gz.gpg",
            Format::TarZst    => "tar.zst",
            Format::TarZstGpg => "tar.zst.gpg",
            Format::TarBz2    => "tar.bz2",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> String {
        format!(".{}", self.as_str())
    }

    /// Compression layer sitting between the cipher (if any) and the tar framer.
    pub fn codec(self) -> CodecId {
        match self {
            Format::Tar | Format::TarGpg          => CodecId::None,
            Format::TarGz | Format::TarGzGpg      => CodecId::Gzip,
            Format::TarZst | Format::TarZstGpg    => CodecId::Zstd,
            Format::TarBz2                        => CodecId::Bzip2,
        }
    }

    /// Whether the whole byte stream is wrapped by the outer cipher layer.
    pub fn is_encrypted(self) -> bool {
        self.as_str().ends_with(ENCRYPTED_SUFFIX)
    }

    /// Parse a possibly-empty format string; `""` is the unset format.
    pub fn parse_optional(s: &str) -> Result<Option<Format>, ConfigError> {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }

    /// Recognise the format of an archive from its file name.
    ///
    /// The longest matching suffix wins, so `x.tar.gz.gpg` is never taken
    /// for a `tar.gpg`.
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?;
        Format::ALL
            .iter()
            .copied()
            .filter(|f| name.ends_with(&f.extension()))
            .max_by_key(|f| f.as_str().len())
    }

    /// Every known format string, for completion and help text.
    /// The unset format is not listed.
    pub fn known_values() -> Vec<&'static str> {
        Format::ALL.iter().map(|f| f.as_str()).collect()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownFormat(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn every_format_roundtrips_through_its_string() {
        for f in Format::ALL {
            assert_eq!(f.to_string().parse::<Format>().unwrap(), f);
        }
    }

    #[test]
    fn unknown_strings_are_rejected() {
        for s in ["zip", "tar.xz", "TAR", "tar.gpg.gz", " tar"] {
            assert!(matches!(s.parse::<Format>(), Err(ConfigError::UnknownFormat(_))), "{s}");
        }
    }

    #[test]
    fn empty_string_is_unset() {
        assert_eq!(Format::parse_optional("").unwrap(), None);
        assert_eq!(Format::parse_optional("tar.bz2").unwrap(), Some(Format::TarBz2));
        assert!("".parse::<Format>().is_err());
    }

    #[test]
    fn known_values_exclude_unset() {
        let values = Format::known_values();
        assert_eq!(values.len(), 7);
        assert!(!values.contains(&""));
    }

    #[test]
    fn json_uses_the_string_form() {
        assert_eq!(serde_json::to_string(&Format::TarZstGpg).unwrap(), "\"tar.zst.gpg\"");
        let back: Format = serde_json::from_str("\"tar.gz\"").unwrap();
        assert_eq!(back, Format::TarGz);
        assert!(serde_json::from_str::<Format>("2").is_err());
    }

    #[test]
    fn encrypted_formats() {
        let encrypted: Vec<_> = Format::ALL.iter().filter(|f| f.is_encrypted()).collect();
        assert_eq!(encrypted, [&Format::TarGpg, &Format::TarGzGpg, &Format::TarZstGpg]);
    }

    #[test]
    fn detect_from_path_prefers_longest_suffix() {
        let p = PathBuf::from("/out/suitcase-01-of-03.tar.gz.gpg");
        assert_eq!(Format::from_path(&p), Some(Format::TarGzGpg));
        assert_eq!(Format::from_path(Path::new("a.tar")), Some(Format::Tar));
        assert_eq!(Format::from_path(Path::new("a.zip")), None);
    }

    #[test]
    fn value_enum_names_match_suffixes() {
        for f in Format::ALL {
            let pv = f.to_possible_value().unwrap();
            assert_eq!(pv.get_name(), f.as_str());
        }
    }

    proptest! {
        #[test]
        fn parse_never_accepts_foreign_strings(s in "[a-z0-9.]{0,12}") {
            if let Ok(f) = s.parse::<Format>() {
                prop_assert_eq!(f.as_str(), s.as_str());
            }
        }
    }
}
