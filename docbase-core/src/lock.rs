//! Key-scoped write regions.
//!
//! Writers to the same key queue on one async mutex; writers to different keys never contend.
//! Entries are created on demand and removed once the last slot for the key drops, so the
//! table only holds keys that currently have a writer.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use mea::mutex::{Mutex, MutexGuard};

type Table = HashMap<String, Entry>;

#[derive(Debug)]
struct Entry {
    mutex: Arc<Mutex<()>>,
    /// Live slots for the key, including the one inside the region.
    holders: usize,
}

/// Table of per-key async mutexes.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    table: Arc<StdMutex<Table>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `key`. Call [`KeySlot::enter`] on it to wait for the region.
    pub(crate) fn slot(&self, key: String) -> KeySlot {
        let mut table = lock_table(&self.table);
        let entry = table.entry(key.clone()).or_insert_with(|| Entry {
            mutex: Arc::new(Mutex::new(())),
            holders: 0,
        });
        entry.holders += 1;
        let mutex = Arc::clone(&entry.mutex);
        drop(table);

        KeySlot {
            key,
            mutex,
            table: Arc::clone(&self.table),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// A claim on one key's region. Dropping the last claim on a key removes its table entry.
#[derive(Debug)]
pub(crate) struct KeySlot {
    key: String,
    mutex: Arc<Mutex<()>>,
    table: Arc<StdMutex<Table>>,
}

impl KeySlot {
    /// Waits until this task owns the region. The region is released when the guard drops.
    pub(crate) async fn enter(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for KeySlot {
    fn drop(&mut self) {
        let mut table = lock_table(&self.table);

        if let Some(entry) = table.get_mut(&self.key) {
            entry.holders -= 1;
            if entry.holders == 0 {
                table.remove(&self.key);
            }
        }
    }
}

fn lock_table(table: &StdMutex<Table>) -> std::sync::MutexGuard<'_, Table> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
