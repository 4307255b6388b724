//! Per-path write locks for snapshot logs.
//!
//! Runs that finish at the same time may target the same log file. Each
//! run holds a [`LogGuard`] for its path while it appends and trims, so
//! those steps never interleave within one process. An entry lives only as
//! long as someone holds or waits on it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    holders: usize,
}

type Entries = Arc<Mutex<HashMap<PathBuf, Entry>>>;

/// Registry of reference-counted per-path locks.
#[derive(Clone, Default)]
pub struct LogLockRegistry {
    entries: Entries,
}

impl LogLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `path`.
    pub async fn acquire(&self, path: &Path) -> LogGuard {
        let key = registry_key(path);

        let (lock, ticket) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                holders: 0,
            });
            entry.holders += 1;
            (
                entry.lock.clone(),
                Ticket {
                    entries: self.entries.clone(),
                    key,
                },
            )
        };

        let guard = lock.lock_owned().await;
        LogGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Number of holders and waiters for `path`.
    pub fn holders(&self, path: &Path) -> usize {
        self.entries
            .lock()
            .get(&registry_key(path))
            .map_or(0, |entry| entry.holders)
    }

    /// Number of paths currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn registry_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Counts one holder (or waiter) of a path; releases it on drop.
struct Ticket {
    entries: Entries,
    key: PathBuf,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.holders = entry.holders.saturating_sub(1);
            if entry.holders == 0 {
                entries.remove(&self.key);
            }
        }
    }
}

/// Exclusive use of one log path. Released on drop.
pub struct LogGuard {
    // Unlock before the ticket gives up the registry entry.
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}
