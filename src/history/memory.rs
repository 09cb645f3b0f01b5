use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use super::{HistoryEntry, HistoryStore, NewHistoryEntry, StoreError};

/// In-process store with numeric ids. Can be switched unavailable to
/// exercise the local-cache fallback.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
    next_id: Arc<AtomicU64>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".into()))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<HistoryEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }
}

impl HistoryStore for MemoryStore {
    async fn create(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        self.ensure_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = entry.with_id(id.to_string());
        self.lock()?.push(created.clone());
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.ensure_available()?;
        Ok(self.lock()?.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.lock()?.retain(|entry| entry.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.lock()?.clear();
        Ok(())
    }
}
