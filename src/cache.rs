//! In-memory cache with lazy TTL expiry
//!
//! Three independent namespaces:
//! - icon: memoised search results keyed by query parameters
//! - search: the materialised icon list of each search, keyed by search ID
//! - selection: live selection records, no TTL of their own
//!
//! Expiry is checked on read. Nothing sweeps in the background; `clear`
//! with `expired_only` is the explicit bulk eviction.

use crate::types::{SearchRecord, SearchResult, SelectionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// A cached value with its insertion time
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    key: String,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Per-namespace counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub valid: usize,
    pub expired: usize,
    pub total: usize,
}

/// Snapshot returned by [`CacheManager::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub icon: NamespaceStats,
    pub search: NamespaceStats,
    pub selection_count: usize,
    pub expiry_minutes: u64,
}

/// Counts removed by [`CacheManager::clear`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub icon_cleared: usize,
    pub search_cleared: usize,
}

/// String-keyed map whose entries are logically absent once older than `ttl`
#[derive(Debug)]
pub struct ExpiringMap<V> {
    entries: HashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringMap<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Fetch a live value, evicting it if it has expired
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(self.ttl, now) => {
                debug!("Cache entry expired on read: {}", entry.key);
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.insert_at(key.into(), value, Instant::now());
    }

    fn insert_at(&mut self, key: String, value: V, created_at: Instant) {
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at,
                key,
            },
        );
    }

    /// Count valid and expired entries without evicting anything
    pub fn stats(&self) -> NamespaceStats {
        let now = Instant::now();
        let expired = self
            .entries
            .values()
            .filter(|e| e.is_expired(self.ttl, now))
            .count();

        NamespaceStats {
            valid: self.entries.len() - expired,
            expired,
            total: self.entries.len(),
        }
    }

    /// Evict every expired entry, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(ttl, now));
        before - self.entries.len()
    }

    /// Remove everything, returning the prior size
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache shared by the search path, the cache tools and the web transport
pub struct CacheManager {
    ttl: Duration,
    icons: RwLock<ExpiringMap<SearchResult>>,
    searches: RwLock<ExpiringMap<SearchRecord>>,
    selections: RwLock<HashMap<String, SelectionRecord>>,
}

impl CacheManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            icons: RwLock::new(ExpiringMap::new(ttl)),
            searches: RwLock::new(ExpiringMap::new(ttl)),
            selections: RwLock::new(HashMap::new()),
        }
    }

    /// Configured time-to-live of the timestamped namespaces
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // --- icon namespace ---

    pub async fn get_icon(&self, key: &str) -> Option<SearchResult> {
        self.icons.write().await.get(key)
    }

    pub async fn set_icon(&self, key: impl Into<String>, value: SearchResult) {
        self.icons.write().await.insert(key, value);
    }

    // --- search namespace ---

    pub async fn get_search(&self, search_id: &str) -> Option<SearchRecord> {
        self.searches.write().await.get(search_id)
    }

    pub async fn set_search(&self, search_id: impl Into<String>, record: SearchRecord) {
        self.searches.write().await.insert(search_id, record);
    }

    // --- selection namespace ---

    pub async fn get_selection(&self, search_id: &str) -> Option<SelectionRecord> {
        self.selections.read().await.get(search_id).cloned()
    }

    pub async fn set_selection(&self, search_id: impl Into<String>, record: SelectionRecord) {
        self.selections.write().await.insert(search_id.into(), record);
    }

    pub async fn delete_selection(&self, search_id: &str) -> Option<SelectionRecord> {
        self.selections.write().await.remove(search_id)
    }

    /// Read-modify-write a selection record under a single lock acquisition.
    ///
    /// `f` sees the current record (if any) and returns the replacement, or
    /// `None` to leave the record untouched. Returns what was written.
    pub async fn update_selection<F>(&self, search_id: &str, f: F) -> Option<SelectionRecord>
    where
        F: FnOnce(Option<&SelectionRecord>) -> Option<SelectionRecord>,
    {
        let mut selections = self.selections.write().await;
        let next = f(selections.get(search_id))?;
        selections.insert(search_id.to_string(), next.clone());
        Some(next)
    }

    /// Remove and return the record only if `pred` holds for it
    pub async fn take_selection_if<F>(&self, search_id: &str, pred: F) -> Option<SelectionRecord>
    where
        F: FnOnce(&SelectionRecord) -> bool,
    {
        let mut selections = self.selections.write().await;
        if selections.get(search_id).is_some_and(pred) {
            selections.remove(search_id)
        } else {
            None
        }
    }

    // --- stats & cleanup ---

    pub async fn stats(&self) -> CacheStats {
        let icon = self.icons.read().await.stats();
        let search = self.searches.read().await.stats();
        let selection_count = self.selections.read().await.len();

        CacheStats {
            icon,
            search,
            selection_count,
            expiry_minutes: self.ttl.as_secs() / 60,
        }
    }

    /// Evict expired (or all) icon and search entries. Selections are untouched.
    pub async fn clear(&self, expired_only: bool) -> ClearReport {
        let mut icons = self.icons.write().await;
        let mut searches = self.searches.write().await;

        let report = if expired_only {
            ClearReport {
                icon_cleared: icons.purge_expired(),
                search_cleared: searches.purge_expired(),
            }
        } else {
            ClearReport {
                icon_cleared: icons.clear(),
                search_cleared: searches.clear(),
            }
        };

        debug!(
            "Cache cleared (expired_only={}): {} icon, {} search",
            expired_only, report.icon_cleared, report.search_cleared
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SearchId, SelectionStatus};
    use chrono::Utc;

    fn record(query: &str) -> SearchRecord {
        SearchRecord {
            query: query.to_string(),
            page: 1,
            page_size: 10,
            icons: vec![],
            total_count: 0,
            created_at: Utc::now(),
        }
    }

    fn result(query: &str) -> SearchResult {
        SearchResult {
            search_id: SearchId::generate(),
            query: query.to_string(),
            items: vec![],
            count: 0,
            total_count: 0,
            page: 1,
            page_size: 10,
            web_url: None,
            instructions: vec![],
            waiting_message: None,
        }
    }

    fn long_ago(ttl: Duration) -> Instant {
        Instant::now()
            .checked_sub(ttl * 2)
            .expect("monotonic clock is past twice the test TTL")
    }

    #[test]
    fn test_expiring_map_get_after_set() {
        let mut map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("a", 1);
        assert_eq!(map.get("a"), Some(1));
        assert_eq!(map.get("b"), None);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let ttl = Duration::from_secs(60);
        let mut map = ExpiringMap::new(ttl);
        map.insert_at("old".to_string(), 1, long_ago(ttl));

        assert_eq!(map.stats().expired, 1);
        assert_eq!(map.get("old"), None);
        assert_eq!(map.stats().total, 0);
    }

    #[test]
    fn test_stats_do_not_mutate() {
        let ttl = Duration::from_secs(60);
        let mut map = ExpiringMap::new(ttl);
        map.insert_at("old".to_string(), 1, long_ago(ttl));
        map.insert("fresh", 2);

        let stats = map.stats();
        assert_eq!(
            stats,
            NamespaceStats {
                valid: 1,
                expired: 1,
                total: 2
            }
        );
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_purge_expired_only_removes_old_entries() {
        let ttl = Duration::from_secs(60);
        let mut map = ExpiringMap::new(ttl);
        map.insert_at("old-1".to_string(), 1, long_ago(ttl));
        map.insert_at("old-2".to_string(), 2, long_ago(ttl));
        map.insert("fresh", 3);

        assert_eq!(map.purge_expired(), 2);
        assert_eq!(map.get("fresh"), Some(3));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_ttl_elapses_in_real_time() {
        let cache = CacheManager::new(Duration::from_millis(40));
        cache.set_search("s1", record("home")).await;
        assert!(cache.get_search("s1").await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get_search("s1").await.is_none());
        assert_eq!(cache.stats().await.search.total, 0);
    }

    #[tokio::test]
    async fn test_clear_expired_only_reports_exact_counts() {
        let cache = CacheManager::new(Duration::from_secs(60));
        {
            let mut icons = cache.icons.write().await;
            icons.insert_at("stale".to_string(), result("a"), long_ago(cache.ttl));
            icons.insert("fresh", result("b"));
        }
        {
            let mut searches = cache.searches.write().await;
            searches.insert_at("s-old".to_string(), record("a"), long_ago(cache.ttl));
            searches.insert_at("s-old-2".to_string(), record("b"), long_ago(cache.ttl));
        }

        let report = cache.clear(true).await;
        assert_eq!(
            report,
            ClearReport {
                icon_cleared: 1,
                search_cleared: 2
            }
        );

        let stats = cache.stats().await;
        assert_eq!(stats.icon.total, 1);
        assert_eq!(stats.search.total, 0);
    }

    #[tokio::test]
    async fn test_clear_all_reports_prior_sizes_and_keeps_selections() {
        let cache = CacheManager::new(Duration::from_secs(60));
        cache.set_icon("k1", result("a")).await;
        cache.set_icon("k2", result("b")).await;
        cache.set_search("s1", record("a")).await;
        cache
            .set_selection("s1", SelectionRecord::waiting("s1", 1))
            .await;

        let report = cache.clear(false).await;
        assert_eq!(report.icon_cleared, 2);
        assert_eq!(report.search_cleared, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.icon.total, 0);
        assert_eq!(stats.search.total, 0);
        assert_eq!(stats.selection_count, 1);
    }

    #[tokio::test]
    async fn test_stats_reports_expiry_minutes() {
        let cache = CacheManager::new(Duration::from_millis(1_800_000));
        assert_eq!(cache.stats().await.expiry_minutes, 30);
    }

    #[tokio::test]
    async fn test_update_selection_is_conditional() {
        let cache = CacheManager::new(Duration::from_secs(60));

        let written = cache
            .update_selection("s1", |current| {
                assert!(current.is_none());
                Some(SelectionRecord::waiting("s1", 1))
            })
            .await;
        assert!(written.is_some());

        let skipped = cache.update_selection("s1", |_| None).await;
        assert!(skipped.is_none());
        assert_eq!(
            cache.get_selection("s1").await.unwrap().status,
            SelectionStatus::Waiting
        );
    }

    #[tokio::test]
    async fn test_take_selection_if() {
        let cache = CacheManager::new(Duration::from_secs(60));
        cache
            .set_selection("s1", SelectionRecord::waiting("s1", 1))
            .await;

        assert!(cache
            .take_selection_if("s1", |r| r.status.is_terminal())
            .await
            .is_none());
        assert!(cache.get_selection("s1").await.is_some());

        assert!(cache
            .take_selection_if("s1", |r| r.status == SelectionStatus::Waiting)
            .await
            .is_some());
        assert!(cache.get_selection("s1").await.is_none());
    }
}
