use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

/// In-process exclusive locks keyed by canonical directory. Resolutions of
/// different locations never wait on each other.
#[derive(Debug, Default)]
pub struct DirectoryLocks {
    held: Mutex<HashSet<Utf8PathBuf>>,
    released: Condvar,
}

impl DirectoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `directory` is free, then holds it until the guard drops.
    pub fn acquire(&self, directory: &Utf8Path) -> DirectoryGuard<'_> {
        let mut held = self.held();
        while held.contains(directory) {
            debug!(%directory, "waiting for canonical directory lock");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(directory.to_path_buf());
        DirectoryGuard {
            locks: self,
            directory: directory.to_path_buf(),
        }
    }

    pub fn is_held(&self, directory: &Utf8Path) -> bool {
        self.held().contains(directory)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<Utf8PathBuf>> {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[must_use = "the lock is released when the guard drops"]
pub struct DirectoryGuard<'a> {
    locks: &'a DirectoryLocks,
    directory: Utf8PathBuf,
}

impl Drop for DirectoryGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.directory);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn same_directory_is_exclusive() {
        let locks = Arc::new(DirectoryLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _guard = locks.acquire(Utf8Path::new("/cache/a/preprocessed/directed"));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(!locks.is_held(Utf8Path::new("/cache/a/preprocessed/directed")));
    }

    #[test]
    fn different_directories_do_not_block() {
        let locks = DirectoryLocks::new();
        let _first = locks.acquire(Utf8Path::new("/cache/a"));
        let _second = locks.acquire(Utf8Path::new("/cache/b"));
        assert!(locks.is_held(Utf8Path::new("/cache/a")));
        assert!(locks.is_held(Utf8Path::new("/cache/b")));
    }
}
