use super::{HistoryEntry, HistoryStore, NewHistoryEntry, StoreError};

/// Store used when no remote API is configured.
///
/// Creates and lists report the store as unavailable, so committed entries
/// keep their placeholder ids and reads come from the local cache. Deletes
/// have nothing remote to remove and succeed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStore;

const REASON: &str = "no history API configured";

impl HistoryStore for OfflineStore {
    async fn create(&self, _entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        Err(StoreError::Unavailable(REASON.into()))
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Err(StoreError::Unavailable(REASON.into()))
    }

    async fn delete(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
