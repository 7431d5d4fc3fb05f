use crate::error::StoreError;
use crate::record::{BucketDimension, CooldownKey, CooldownRecord, ScopeKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Abstract storage interface for cooldown records.
///
/// Records are addressed by [`CooldownKey`]: one slot per action inside one row per scope.
/// Backends must make [`compare_and_swap`](Self::compare_and_swap) atomic with respect to
/// other writers of the same key; the facade relies on it to never admit past the limit.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Ensure storage exists for `action` under `dimension`.
    ///
    /// Idempotent: an "already exists" failure is swallowed, anything else is an error.
    async fn ensure_slot(&self, dimension: BucketDimension, action: &str) -> Result<(), StoreError>;

    /// Ensure the base row for a scope exists before per-action data is written to it.
    async fn ensure_scope_row(&self, scope: &ScopeKey) -> Result<(), StoreError>;

    /// Fetch the record for a key.
    ///
    /// Returns `Ok(None)` when absent and [`StoreError::Malformed`] when the stored payload
    /// cannot be decoded.
    async fn get(&self, key: &CooldownKey) -> Result<Option<CooldownRecord>, StoreError>;

    /// Upsert the full record in a single write.
    async fn put(&self, key: &CooldownKey, record: &CooldownRecord) -> Result<(), StoreError>;

    /// Set the record for a key to absent; the scope row stays.
    async fn clear(&self, key: &CooldownKey) -> Result<(), StoreError>;

    /// Replace the record with `next` (or clear it when `None`) only if the stored record still
    /// equals `expected`.
    ///
    /// A stored payload that cannot be decoded compares equal to `None`.
    ///
    /// Returns `Ok(true)` if the write happened, `Ok(false)` if another writer got there first.
    async fn compare_and_swap(
        &self,
        key: &CooldownKey,
        expected: Option<&CooldownRecord>,
        next: Option<&CooldownRecord>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T> CooldownStore for Arc<T>
where
    T: CooldownStore + ?Sized,
{
    async fn ensure_slot(
        &self,
        dimension: BucketDimension,
        action: &str,
    ) -> Result<(), StoreError> {
        (**self).ensure_slot(dimension, action).await
    }

    async fn ensure_scope_row(&self, scope: &ScopeKey) -> Result<(), StoreError> {
        (**self).ensure_scope_row(scope).await
    }

    async fn get(&self, key: &CooldownKey) -> Result<Option<CooldownRecord>, StoreError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &CooldownKey, record: &CooldownRecord) -> Result<(), StoreError> {
        (**self).put(key, record).await
    }

    async fn clear(&self, key: &CooldownKey) -> Result<(), StoreError> {
        (**self).clear(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &CooldownKey,
        expected: Option<&CooldownRecord>,
        next: Option<&CooldownRecord>,
    ) -> Result<bool, StoreError> {
        (**self).compare_and_swap(key, expected, next).await
    }
}

/// In-memory cooldown store.
///
/// Holds encoded payload text rather than records, so reads go through the same codec as a
/// persistent backend. Clones share state. Nothing survives the process.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCooldownStore {
    inner: Arc<Mutex<Tables>>,
    operations: Arc<AtomicUsize>,
}

#[derive(Default, Debug)]
struct Tables {
    slots: HashSet<(BucketDimension, String)>,
    rows: HashSet<ScopeKey>,
    // key -> encoded payload
    records: HashMap<CooldownKey, String>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload as-is, bypassing the encoder (for corrupt or legacy data).
    pub fn insert_raw(&self, key: &CooldownKey, raw: impl Into<String>) {
        let mut tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.insert(key.scope);
        tables.records.insert(key.clone(), raw.into());
    }

    /// Raw payload currently stored for `key`.
    pub fn raw(&self, key: &CooldownKey) -> Option<String> {
        let tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        tables.records.get(key).cloned()
    }

    /// Whether a slot was ensured for `action` under `dimension`.
    pub fn has_slot(&self, dimension: BucketDimension, action: &str) -> bool {
        let tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        tables.slots.contains(&(dimension, action.to_string()))
    }

    /// Whether a base row exists for `scope`.
    pub fn has_scope_row(&self, scope: &ScopeKey) -> bool {
        let tables = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        tables.rows.contains(scope)
    }

    /// Number of trait operations served so far.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().map_err(|_| StoreError::backend("in-memory cooldown store lock poisoned"))
    }
}

#[async_trait]
impl CooldownStore for InMemoryCooldownStore {
    async fn ensure_slot(
        &self,
        dimension: BucketDimension,
        action: &str,
    ) -> Result<(), StoreError> {
        self.tables()?.slots.insert((dimension, action.to_string()));
        Ok(())
    }

    async fn ensure_scope_row(&self, scope: &ScopeKey) -> Result<(), StoreError> {
        self.tables()?.rows.insert(*scope);
        Ok(())
    }

    async fn get(&self, key: &CooldownKey) -> Result<Option<CooldownRecord>, StoreError> {
        let tables = self.tables()?;
        match tables.records.get(key) {
            Some(raw) => Ok(Some(CooldownRecord::decode(raw)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CooldownKey, record: &CooldownRecord) -> Result<(), StoreError> {
        let raw = record.encode()?;
        let mut tables = self.tables()?;
        tables.rows.insert(key.scope);
        tables.records.insert(key.clone(), raw);
        Ok(())
    }

    async fn clear(&self, key: &CooldownKey) -> Result<(), StoreError> {
        self.tables()?.records.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &CooldownKey,
        expected: Option<&CooldownRecord>,
        next: Option<&CooldownRecord>,
    ) -> Result<bool, StoreError> {
        let encoded = next.map(CooldownRecord::encode).transpose()?;
        let mut tables = self.tables()?;

        let current = tables.records.get(key).and_then(|raw| CooldownRecord::decode(raw).ok());
        if current.as_ref() != expected {
            return Ok(false); // Race detected
        }

        match encoded {
            Some(raw) => {
                tables.rows.insert(key.scope);
                tables.records.insert(key.clone(), raw);
            }
            None => {
                tables.records.remove(key);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WindowKind;
    use chrono::NaiveDate;

    fn record(count: u32) -> CooldownRecord {
        CooldownRecord {
            limit: 3,
            count,
            expires_at: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 1, 0).unwrap(),
            window: WindowKind::Rolling,
        }
    }

    fn key() -> CooldownKey {
        ScopeKey::user(1).action("ping")
    }

    #[tokio::test]
    async fn put_get_clear() {
        let store = InMemoryCooldownStore::new();
        assert_eq!(store.get(&key()).await.unwrap(), None);
        store.put(&key(), &record(2)).await.unwrap();
        assert_eq!(store.get(&key()).await.unwrap(), Some(record(2)));
        store.clear(&key()).await.unwrap();
        assert_eq!(store.get(&key()).await.unwrap(), None);
        assert!(store.has_scope_row(&key().scope), "clear keeps the scope row");
    }

    #[tokio::test]
    async fn ensure_calls_are_idempotent() {
        let store = InMemoryCooldownStore::new();
        for _ in 0..3 {
            store.ensure_slot(BucketDimension::Guild, "ping").await.unwrap();
            store.ensure_scope_row(&ScopeKey::new(BucketDimension::Guild, 1, 2)).await.unwrap();
        }
        assert!(store.has_slot(BucketDimension::Guild, "ping"));
        assert!(!store.has_slot(BucketDimension::User, "ping"));
    }

    #[tokio::test]
    async fn cas_rejects_stale_expectation() {
        let store = InMemoryCooldownStore::new();
        assert!(store.compare_and_swap(&key(), None, Some(&record(1))).await.unwrap());
        // a second writer that also read "absent" loses
        assert!(!store.compare_and_swap(&key(), None, Some(&record(1))).await.unwrap());
        assert!(store.compare_and_swap(&key(), Some(&record(1)), Some(&record(2))).await.unwrap());
        assert!(!store.compare_and_swap(&key(), Some(&record(1)), None).await.unwrap());
        assert!(store.compare_and_swap(&key(), Some(&record(2)), None).await.unwrap());
        assert_eq!(store.raw(&key()), None);
    }

    #[tokio::test]
    async fn malformed_payload_surfaces_on_get_and_matches_absent_in_cas() {
        let store = InMemoryCooldownStore::new();
        store.insert_raw(&key(), "definitely not a record");
        let err = store.get(&key()).await.unwrap_err();
        assert!(err.is_malformed());
        assert!(store.compare_and_swap(&key(), None, Some(&record(1))).await.unwrap());
        assert_eq!(store.get(&key()).await.unwrap(), Some(record(1)));
    }
}
