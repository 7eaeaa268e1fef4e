//! Fill engine: drive one suitcase through its share of the inventory.
//!
//! Progress is optional.  Without a sink nothing is reported; with one, a
//! [`FillProgress`] goes out after every processed file and once more with
//! `completed: true` at the end.  A bounded channel with a slow consumer
//! blocks the fill on each send.

use std::io::Write;
use std::sync::mpsc::{Sender, SyncSender};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};
use crate::hash::HashRecord;
use crate::inventory::{self, FileAssignment};
use crate::options::ErrorPolicy;
use crate::suitcase::Suitcase;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillProgress {
    pub index:     usize,
    pub current:   usize,
    pub total:     usize,
    pub completed: bool,
    pub percent:   f64,
    /// Files dropped under [`ErrorPolicy::Continue`].  Always zero when
    /// failing fast.
    pub skipped:   usize,
    /// Set once the entry bytes written pass the advisory `max_size`.
    pub oversized: bool,
}

impl FillProgress {
    fn new(index: usize, current: usize, total: usize, skipped: usize, oversized: bool) -> Self {
        let percent = if total == 0 { 100.0 } else { current as f64 / total as f64 * 100.0 };
        Self { index, current, total, completed: false, percent, skipped, oversized }
    }
}

/// Receiver side of the progress handoff.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: FillProgress);
}

impl ProgressSink for Sender<FillProgress> {
    fn report(&self, progress: FillProgress) {
        if self.send(progress).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

impl ProgressSink for SyncSender<FillProgress> {
    fn report(&self, progress: FillProgress) {
        if self.send(progress).is_err() {
            debug!("progress receiver dropped");
        }
    }
}

/// Add every assignment for `index` to `suitcase`, in order.
///
/// Inner-encrypting suitcases route files through `add_encrypt`; all others
/// through `add`, collecting the digests it returns.  An empty assignment
/// list is a [`ConfigError::MissingInventory`].  A failing file aborts the
/// fill unless the suitcase's error policy is [`ErrorPolicy::Continue`] and
/// the failure [is skippable](crate::Error::is_skippable).  A file that fails
/// after its entry was started always aborts.
pub fn fill<W: Write>(
    suitcase:    &mut Suitcase<W>,
    assignments: &[FileAssignment],
    index:       usize,
    progress:    Option<&dyn ProgressSink>,
) -> Result<Vec<HashRecord>> {
    if assignments.is_empty() {
        return Err(ConfigError::MissingInventory.into());
    }

    let total = match inventory::count_for(assignments, index) {
        0 => assignments.len(),
        n => n,
    };
    let encrypt_inner = suitcase.config().encrypt_inner;
    let policy = suitcase.config().error_policy;
    let max_size = suitcase.config().max_size;

    let mut hashes = Vec::new();
    let mut current = 0;
    let mut skipped = 0;
    let mut oversized = false;

    for file in assignments.iter().filter(|f| f.suitcase_index == index) {
        let added = if encrypt_inner {
            suitcase.add_encrypt(file).map(|()| None)
        } else {
            suitcase.add(file)
        };

        match added {
            Ok(Some(record)) => hashes.push(record),
            Ok(None) => {}
            Err(e) if policy == ErrorPolicy::Continue && e.is_skippable() => {
                warn!(index, path = %file.path.display(), error = %e, "skipping file");
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
        current += 1;

        if let Some(limit) = max_size {
            if !oversized && suitcase.bytes_added() > limit {
                warn!(index, limit, added = suitcase.bytes_added(), "suitcase exceeds its advisory size");
                oversized = true;
            }
        }

        if let Some(sink) = progress {
            sink.report(FillProgress::new(index, current, total, skipped, oversized));
        }
    }

    if let Some(sink) = progress {
        let mut done = FillProgress::new(index, current, total, skipped, oversized);
        done.completed = true;
        sink.report(done);
    }
    if skipped > 0 {
        warn!(index, skipped, "fill finished with skipped files");
    }
    info!(index, files = current, hashes = hashes.len(), "fill finished");
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use crate::format::Format;
    use crate::options::ArchiveOptions;

    fn write(dir: &std::path::Path, name: &str, idx: usize) -> FileAssignment {
        let p = dir.join(name);
        std::fs::write(&p, name.as_bytes()).unwrap();
        FileAssignment::new(p, name, idx)
    }

    #[test]
    fn empty_inventory() {
        let mut s = Suitcase::new(Vec::new(), ArchiveOptions::new(Format::Tar)).unwrap();
        let err = fill(&mut s, &[], 1, None).unwrap_err();
        assert!(matches!(err.config(), Some(ConfigError::MissingInventory)));
    }

    #[test]
    fn progress_per_file_then_completion() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "a", 1),
            write(dir.path(), "b", 2),
            write(dir.path(), "c", 1),
        ];
        let mut opts = ArchiveOptions::new(Format::TarGz);
        opts.hash_inner = true;
        let mut s = Suitcase::new(Vec::new(), opts).unwrap();

        let (tx, rx) = mpsc::channel::<FillProgress>();
        let hashes = fill(&mut s, &files, 1, Some(&tx)).unwrap();
        drop(tx);

        assert_eq!(hashes.iter().map(|h| h.filename.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        let events: Vec<FillProgress> = rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!((events[0].current, events[0].total), (1, 2));
        assert_eq!(events[0].percent, 50.0);
        assert!(!events[1].completed);
        assert!(events[2].completed);
        assert_eq!(events[2].current, 2);
        assert!(events.iter().all(|e| e.index == 1));
    }

    #[test]
    fn fail_fast_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = vec![write(dir.path(), "a", 1)];
        files.push(FileAssignment::new(dir.path().join("gone"), "gone", 1));
        files.push(write(dir.path(), "c", 1));

        let mut s = Suitcase::new(Vec::new(), ArchiveOptions::new(Format::Tar)).unwrap();
        assert!(fill(&mut s, &files, 1, None).is_err());
        assert_eq!(s.entries(), 1);
    }

    #[test]
    fn continue_policy_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = vec![write(dir.path(), "a", 1)];
        files.push(FileAssignment::new(dir.path().join("gone"), "gone", 1));
        files.push(write(dir.path(), "c", 1));

        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.error_policy = ErrorPolicy::Continue;
        let mut s = Suitcase::new(Vec::new(), opts).unwrap();
        let (tx, rx) = mpsc::sync_channel::<FillProgress>(8);
        fill(&mut s, &files, 1, Some(&tx)).unwrap();
        drop(tx);

        assert_eq!(s.entries(), 2);
        let last = rx.iter().last().unwrap();
        assert!(last.completed);
        assert_eq!(last.skipped, 1);
        assert_eq!(last.current, 3);
    }

    #[test]
    fn continue_policy_stops_on_a_started_entry() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "a", 1), write(dir.path(), "b", 1)];

        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.error_policy = ErrorPolicy::Continue;
        // A sink that fails mid-entry leaves nothing safe to skip to.
        let mut s = Suitcase::new(Full, opts).unwrap();
        let err = fill(&mut s, &files, 1, None).unwrap_err();
        assert!(matches!(err, crate::Error::Entry { .. }), "{err}");
        assert_eq!(s.entries(), 0);
    }

    #[test]
    fn max_size_is_advisory() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "first", 1), write(dir.path(), "second", 1)];

        let mut opts = ArchiveOptions::new(Format::Tar);
        opts.max_size = Some(6);
        let mut s = Suitcase::new(Vec::new(), opts).unwrap();
        let (tx, rx) = mpsc::channel::<FillProgress>();
        fill(&mut s, &files, 1, Some(&tx)).unwrap();
        drop(tx);

        assert_eq!(s.entries(), 2);
        assert_eq!(s.bytes_added(), 11);
        let flags: Vec<bool> = rx.iter().map(|p| p.oversized).collect();
        assert_eq!(flags, [false, true, true]);
    }

    struct Full;

    impl Write for Full {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unmatched_index_falls_back_to_full_total() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write(dir.path(), "a", 1), write(dir.path(), "b", 1)];
        let mut s = Suitcase::new(Vec::new(), ArchiveOptions::new(Format::Tar)).unwrap();
        let (tx, rx) = mpsc::channel::<FillProgress>();
        fill(&mut s, &files, 7, Some(&tx)).unwrap();
        drop(tx);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(events[0].completed);
        assert_eq!((events[0].current, events[0].total), (0, 2));
    }
}
