//! In-memory store for testing

use ephemera_config::EnvironmentRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{ConfigStore, StoreError, StoreResult};

/// In-memory store with failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<EnvironmentRecord>,
    saves: AtomicUsize,

    /// When set, every `save` fails
    pub fail_saves: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new(record: EnvironmentRecord) -> Self {
        Self {
            record: Mutex::new(record),
            ..Default::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The currently stored record
    pub fn snapshot(&self) -> EnvironmentRecord {
        self.record
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> StoreResult<EnvironmentRecord> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &EnvironmentRecord) -> StoreResult<()> {
        if *self.fail_saves.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Unavailable("save failure injected".into()));
        }
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = record.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_saves_and_injects_failures() {
        let store = MemoryStore::default();
        let mut record = store.load().unwrap();
        record.name = "mem".into();

        store.save(&record).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().name, "mem");

        store.set_fail_saves(true);
        record.name = "lost".into();
        assert!(store.save(&record).is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().name, "mem");
    }
}
