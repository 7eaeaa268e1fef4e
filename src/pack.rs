//! Multi-suitcase orchestration.
//!
//! For every suitcase index in an inventory:
//!
//! 1. name the output file `{prefix}-{index:02}-of-{total:02}{extension}`;
//! 2. keep it if a previous run already left a complete archive there, and
//!    its inner hash manifest when one is wanted;
//! 3. otherwise create it, fill it, close it, write the manifest;
//! 4. write the outer hash sidecar if enabled, kept archives included;
//! 5. run the post-process hook, kept archives included.
//!
//! A run interrupted between closing an archive and running its hook
//! therefore finishes the job when repeated, so hooks must tolerate being
//! run again for the same suitcase.
//!
//! Suitcases share nothing but the read-only inventory, so with the
//! `parallel` feature each index is packed on its own rayon worker.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, Error, Result};
use crate::fill::{fill, ProgressSink};
use crate::format::Format;
use crate::hash::{hash_file, HashAlgorithm, HashRecord};
use crate::inventory::Inventory;
use crate::manifest::{manifest_path, write_manifest_file, ManifestEncoding};
use crate::options::ArchiveOptions;
use crate::postprocess::run_post_process;
use crate::suitcase::Suitcase;
use crate::validate::validate;

pub const DEFAULT_PREFIX: &str = "suitcase";

/// Outcome of packing one index.
#[derive(Debug, Clone)]
pub struct PackedSuitcase {
    pub index:      usize,
    pub path:       PathBuf,
    /// A complete archive was already present and was left untouched.
    pub reused:     bool,
    /// Inner digests computed by this run.  Empty when `reused`; the
    /// manifest on disk already holds them.
    pub hashes:     Vec<HashRecord>,
    pub outer_hash: Option<String>,
}

/// `destination/{prefix}-{index:02}-of-{total:02}{extension}`.
pub fn suitcase_path(destination: &Path, prefix: &str, index: usize, total: usize, format: Format) -> PathBuf {
    destination.join(format!("{prefix}-{index:02}-of-{total:02}{}", format.extension()))
}

/// `{archive}.outer.{algorithm}`.
pub fn outer_hash_path(archive: &Path, algorithm: HashAlgorithm) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".outer.");
    name.push(algorithm.name());
    PathBuf::from(name)
}

/// Build the suitcase for `index`.
pub fn pack_suitcase(
    options:   &ArchiveOptions,
    inventory: &Inventory,
    prefix:    &str,
    index:     usize,
    progress:  Option<&dyn ProgressSink>,
) -> Result<PackedSuitcase> {
    let mut options = options.clone();
    let format = options.resolve()?;

    fs::create_dir_all(&options.destination)
        .map_err(|e| Error::io(format!("create {}", options.destination.display()), e))?;
    let path = suitcase_path(&options.destination, prefix, index, inventory.total().max(1), format);

    let manifest = manifest_path(&path, options.hash_algorithm);
    let reusable = path.exists()
        && (!options.hash_inner || manifest.exists())
        && validate(&path, &inventory.files, index);

    let (hashes, reused) = if reusable {
        info!(index, path = %path.display(), "suitcase already complete, keeping it");
        (Vec::new(), true)
    } else {
        let file = File::create(&path)
            .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
        let mut suitcase = Suitcase::new(BufWriter::new(file), options.clone())?;
        let hashes = fill(&mut suitcase, &inventory.files, index, progress)?;
        let entries = suitcase.entries();
        let bytes = suitcase.bytes_added();
        suitcase
            .close()?
            .into_inner()
            .map_err(|e| Error::io(format!("flush {}", path.display()), e.into_error()))?
            .sync_all()
            .map_err(|e| Error::io(format!("sync {}", path.display()), e))?;

        if options.hash_inner {
            write_manifest_file(&manifest, &hashes, options.manifest_encoding)?;
        }
        info!(index, path = %path.display(), entries, bytes, "suitcase complete");
        (hashes, false)
    };

    let outer_hash = if options.hash_outer {
        Some(write_outer_hash(&path, options.hash_algorithm)?)
    } else {
        None
    };

    run_post_process(&options)?;

    Ok(PackedSuitcase { index, path, reused, hashes, outer_hash })
}

/// Digest the finished archive and record it next to it.
fn write_outer_hash(archive: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let digest = hash_file(archive, algorithm)
        .map_err(|e| Error::io(format!("hash {}", archive.display()), e))?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    write_manifest_file(
        &outer_hash_path(archive, algorithm),
        &[HashRecord::new(name, digest.clone())],
        ManifestEncoding::Hex,
    )?;
    Ok(digest)
}

/// Pack every index present in `inventory`, in ascending index order.
pub fn pack_all(
    options:   &ArchiveOptions,
    inventory: &Inventory,
    prefix:    &str,
    progress:  Option<&dyn ProgressSink>,
) -> Result<Vec<PackedSuitcase>> {
    if inventory.files.is_empty() {
        return Err(ConfigError::MissingInventory.into());
    }
    let indexes: Vec<usize> = inventory.index_counts().into_keys().collect();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        indexes
            .par_iter()
            .map(|&index| pack_suitcase(options, inventory, prefix, index, progress))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        indexes
            .iter()
            .map(|&index| pack_suitcase(options, inventory, prefix, index, progress))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::FileAssignment;
    use crate::manifest::read_text_manifest;

    fn inventory(dir: &Path) -> Inventory {
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        let mut files = Vec::new();
        for (name, idx) in [("a", 1), ("b", 2), ("c", 1)] {
            let p = src.join(name);
            fs::write(&p, name.repeat(64)).unwrap();
            files.push(FileAssignment::new(p, name, idx));
        }
        Inventory::new(files)
    }

    #[test]
    fn naming() {
        let p = suitcase_path(Path::new("/out"), "backup", 3, 12, Format::TarZstGpg);
        assert_eq!(p, PathBuf::from("/out/backup-03-of-12.tar.zst.gpg"));
        assert_eq!(
            outer_hash_path(&p, HashAlgorithm::Blake3),
            PathBuf::from("/out/backup-03-of-12.tar.zst.gpg.outer.blake3")
        );
    }

    #[test]
    fn packs_every_index_with_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let mut opts = ArchiveOptions::new(Format::TarGz);
        opts.destination = dir.path().join("out");
        opts.hash_inner = true;
        opts.hash_outer = true;

        let packed = pack_all(&opts, &inv, DEFAULT_PREFIX, None).unwrap();
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].path, opts.destination.join("suitcase-01-of-02.tar.gz"));
        assert_eq!(packed[0].hashes.len(), 2);
        assert_eq!(packed[1].hashes.len(), 1);

        let manifest = manifest_path(&packed[0].path, HashAlgorithm::Sha256);
        let records = read_text_manifest(std::io::BufReader::new(File::open(manifest).unwrap())).unwrap();
        assert_eq!(records, packed[0].hashes);

        let outer = fs::read_to_string(outer_hash_path(&packed[1].path, HashAlgorithm::Sha256)).unwrap();
        let digest = packed[1].outer_hash.clone().unwrap();
        assert_eq!(outer, format!("suitcase-02-of-02.tar.gz\t{digest}\n"));
        assert_eq!(hash_file(&packed[1].path, HashAlgorithm::Sha256).unwrap(), digest);
    }

    #[test]
    fn complete_suitcases_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.destination = dir.path().join("out");

        let first = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(!first.reused);
        let second = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(second.reused);
        assert_eq!(first.path, second.path);
    }

    #[test]
    fn missing_manifest_forces_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let mut opts = ArchiveOptions::new(Format::TarGz);
        opts.destination = dir.path().join("out");
        opts.hash_inner = true;

        let first = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        let manifest = manifest_path(&first.path, HashAlgorithm::Sha256);
        fs::remove_file(&manifest).unwrap();

        let second = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(!second.reused);
        assert_eq!(second.hashes.len(), 2);
        let records = read_text_manifest(std::io::BufReader::new(File::open(&manifest).unwrap())).unwrap();
        assert_eq!(records, second.hashes);

        let third = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(third.reused);
    }

    #[test]
    fn kept_suitcases_get_their_outer_hash() {
        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.destination = dir.path().join("out");

        let first = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(first.outer_hash.is_none());

        opts.hash_outer = true;
        let second = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(second.reused);
        let digest = second.outer_hash.unwrap();
        assert_eq!(hash_file(&second.path, HashAlgorithm::Sha256).unwrap(), digest);
        let sidecar = fs::read_to_string(outer_hash_path(&second.path, HashAlgorithm::Sha256)).unwrap();
        assert_eq!(sidecar, format!("s-01-of-02.tar\t{digest}\n"));
    }

    #[cfg(unix)]
    #[test]
    fn hook_runs_for_kept_suitcases() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let inv = inventory(dir.path());
        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.destination = dir.path().join("out");
        pack_suitcase(&opts, &inv, "s", 1, None).unwrap();

        let hook = dir.path().join("hook.sh");
        fs::write(&hook, "#!/bin/sh\necho run >> \"$SUITCASE_DESTINATION/hook.log\"\n").unwrap();
        fs::set_permissions(&hook, fs::Permissions::from_mode(0o755)).unwrap();
        opts.post_process = Some(hook);

        let kept = pack_suitcase(&opts, &inv, "s", 1, None).unwrap();
        assert!(kept.reused);
        assert_eq!(fs::read_to_string(opts.destination.join("hook.log")).unwrap(), "run\n");
    }

    #[test]
    fn empty_inventory_is_rejected() {
        let opts = ArchiveOptions::new(Format::Tar);
        let err = pack_all(&opts, &Inventory::default(), DEFAULT_PREFIX, None).unwrap_err();
        assert!(matches!(err.config(), Some(ConfigError::MissingInventory)));
    }
}
