//! File assignments produced by the (external) inventory builder.
//!
//! The engine never walks a filesystem or decides which suitcase a file
//! belongs in; it only consumes the ordered list below.  Nothing here is
//! mutated once loaded.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One source file and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAssignment {
    /// Source path on the local filesystem.
    pub path:           PathBuf,
    /// Archive-relative entry name.
    pub destination:    String,
    /// Which suitcase this file was assigned to.
    pub suitcase_index: usize,
    /// Permission bits to record instead of the source's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode:           Option<u32>,
    /// Modification time to record instead of the source's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified:       Option<DateTime<Utc>>,
}

impl FileAssignment {
    pub fn new(path: impl Into<PathBuf>, destination: impl Into<String>, suitcase_index: usize) -> Self {
        Self {
            path:           path.into(),
            destination:    destination.into(),
            suitcase_index,
            mode:           None,
            modified:       None,
        }
    }
}

/// The complete assignment list for one packing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Number of suitcases the builder split the files into.  `0` means
    /// "derive from the highest assigned index".
    #[serde(default)]
    pub total_indexes: usize,
    pub files:         Vec<FileAssignment>,
}

impl Inventory {
    pub fn new(files: Vec<FileAssignment>) -> Self {
        Self { total_indexes: 0, files }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::io(format!("open inventory {}", path.display()), e))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Number of suitcases.  Without an explicit `total_indexes`, counts up
    /// to the highest assigned index, plus one when indexes start at 0.
    pub fn total(&self) -> usize {
        if self.total_indexes > 0 {
            return self.total_indexes;
        }
        let highest = self.files.iter().map(|f| f.suitcase_index).max().unwrap_or(0);
        if self.files.iter().any(|f| f.suitcase_index == 0) {
            highest + 1
        } else {
            highest
        }
    }

    /// Distinct suitcase indexes in ascending order, with their file counts.
    pub fn index_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for f in &self.files {
            *counts.entry(f.suitcase_index).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_for(&self, index: usize) -> usize {
        count_for(&self.files, index)
    }

    pub fn files_for(&self, index: usize) -> impl Iterator<Item = &FileAssignment> {
        self.files.iter().filter(move |f| f.suitcase_index == index)
    }
}

pub(crate) fn count_for(files: &[FileAssignment], index: usize) -> usize {
    files.iter().filter(|f| f.suitcase_index == index).count()
}
