/// In-process session store
///
/// Keeps records in a [`DashMap`]. Nothing survives a restart, so this is
/// meant for tests and local development only.

use super::{SessionRecord, SessionStore, SessionStoreError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Session store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    records: Arc<DashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired or not
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let now = Utc::now();
        Ok(self
            .records
            .get(sid)
            .map(|entry| entry.value().clone())
            .filter(|record| !record.is_expired_at(now)))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        self.records.insert(record.sid.clone(), record.clone());
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), SessionStoreError> {
        self.records.remove(sid);
        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64, SessionStoreError> {
        let now = Utc::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired_at(now));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_load_destroy() {
        let store = MemorySessionStore::new();
        let mut record = SessionRecord::new("a".to_string(), Utc::now() + Duration::hours(1));
        record.data.insert("user".to_string(), serde_json::json!("alice"));

        store.save(&record).await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), Some(record));

        store.destroy("a").await.unwrap();
        assert!(store.load("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible_and_pruned() {
        let store = MemorySessionStore::new();
        let expired = SessionRecord::new("old".to_string(), Utc::now() - Duration::seconds(1));
        let live = SessionRecord::new("new".to_string(), Utc::now() + Duration::hours(1));

        store.save(&expired).await.unwrap();
        store.save(&live).await.unwrap();

        assert!(store.load("old").await.unwrap().is_none());
        assert_eq!(store.prune_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }
}
