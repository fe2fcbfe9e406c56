//! Selection lifecycle
//!
//! ```text
//! (none) --open_session--> WAITING --submit--> COMPLETED
//!                             |
//!                             +--disconnect + grace, no reconnect--> FAILED
//! ```
//!
//! Terminal records are consumed exactly once by [`SelectionBoard::claim_terminal`].
//! Every write is broadcast so waiters and open sockets can re-read without
//! polling blindly.

use crate::cache::CacheManager;
use crate::types::{SelectionRecord, SelectionStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Notification that the record for `search_id` changed
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub search_id: String,
    pub status: SelectionStatus,
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Record is now COMPLETED with the submitted items
    Recorded,
    /// Record had already FAILED; the submission was dropped
    Ignored,
}

/// Owns all writes to the selection namespace
pub struct SelectionBoard {
    cache: Arc<CacheManager>,
    events: broadcast::Sender<SelectionEvent>,
    next_session: AtomicU64,
    /// Search IDs whose terminal record was already handed to a waiter
    consumed: RwLock<HashMap<String, Instant>>,
}

impl SelectionBoard {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            cache,
            events,
            next_session: AtomicU64::new(1),
            consumed: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to record changes
    pub fn subscribe(&self) -> broadcast::Receiver<SelectionEvent> {
        self.events.subscribe()
    }

    /// Current record, if any
    pub async fn current(&self, search_id: &str) -> Option<SelectionRecord> {
        self.cache.get_selection(search_id).await
    }

    /// A browser connection opened for `search_id`.
    ///
    /// Creates (or refreshes, on reload) a WAITING record and returns the
    /// session token the connection must present on disconnect. Returns
    /// `None` when the record is already terminal or was consumed.
    pub async fn open_session(&self, search_id: &str) -> Option<u64> {
        // Held across the write so a concurrent claim cannot slip in between.
        let consumed = self.consumed.read().await;
        if consumed.contains_key(search_id) {
            debug!("Ignoring session for consumed search {}", search_id);
            return None;
        }

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let written = self
            .cache
            .update_selection(search_id, |current| match current {
                Some(record) if record.status.is_terminal() => None,
                _ => Some(SelectionRecord::waiting(search_id, session)),
            })
            .await?;
        drop(consumed);

        debug!("Session {} opened for {}", session, search_id);
        self.publish(search_id, written.status);
        Some(session)
    }

    /// The human sent their choice.
    ///
    /// Overwrites WAITING or an earlier COMPLETED record; never revives FAILED.
    /// A choice for an already claimed search is acknowledged but not stored.
    pub async fn submit(&self, search_id: &str, items: Vec<Value>) -> SubmitOutcome {
        let count = items.len();
        let consumed = self.consumed.read().await;
        if consumed.contains_key(search_id) {
            drop(consumed);
            debug!("Selection {} already claimed, dropping {} late icons", search_id, count);
            self.publish(search_id, SelectionStatus::Completed);
            return SubmitOutcome::Recorded;
        }

        let written = self
            .cache
            .update_selection(search_id, |current| match current {
                Some(record) if record.status == SelectionStatus::Failed => None,
                Some(record) => Some(SelectionRecord::completed(search_id, items, record.session)),
                None => Some(SelectionRecord::completed(search_id, items, 0)),
            })
            .await;
        drop(consumed);

        match written {
            Some(record) => {
                debug!("Recorded {} icons for {}", count, search_id);
                self.publish(search_id, record.status);
                SubmitOutcome::Recorded
            }
            None => {
                debug!("Dropping submission for failed selection {}", search_id);
                SubmitOutcome::Ignored
            }
        }
    }

    /// Mark the connection identified by `session` as gone.
    ///
    /// Returns `true` when the record is still WAITING on that session, i.e.
    /// a grace period should start.
    pub async fn disconnect(&self, search_id: &str, session: u64) -> bool {
        self.cache
            .update_selection(search_id, |current| match current {
                Some(record)
                    if record.status == SelectionStatus::Waiting && record.session == session =>
                {
                    let mut next = record.clone();
                    next.connected = false;
                    Some(next)
                }
                _ => None,
            })
            .await
            .is_some()
    }

    /// Fail the selection if nothing happened since `session` disconnected.
    ///
    /// A submission (status no longer WAITING) or a reconnect (newer session)
    /// both make this a no-op.
    pub async fn abandon_if_idle(&self, search_id: &str, session: u64) -> bool {
        let written = self
            .cache
            .update_selection(search_id, |current| match current {
                Some(record)
                    if record.status == SelectionStatus::Waiting
                        && record.session == session
                        && !record.connected =>
                {
                    Some(SelectionRecord::failed(search_id, session))
                }
                _ => None,
            })
            .await;

        match written {
            Some(record) => {
                info!("Selection {} failed: browser did not come back", search_id);
                self.publish(search_id, record.status);
                true
            }
            None => false,
        }
    }

    /// Disconnect, wait out `grace`, then fail the selection if still idle
    pub async fn abandon_after_grace(&self, search_id: &str, session: u64, grace: Duration) -> bool {
        if !self.disconnect(search_id, session).await {
            return false;
        }
        debug!(
            "Session {} for {} closed, waiting {:?} before failing",
            session, search_id, grace
        );
        tokio::time::sleep(grace).await;
        self.abandon_if_idle(search_id, session).await
    }

    /// Remove and return a terminal record. At most one caller gets it.
    pub async fn claim_terminal(&self, search_id: &str) -> Option<SelectionRecord> {
        let mut consumed = self.consumed.write().await;
        let record = self
            .cache
            .take_selection_if(search_id, |r| r.status.is_terminal())
            .await?;

        let ttl = self.cache.ttl();
        consumed.retain(|_, at| at.elapsed() <= ttl);
        consumed.insert(search_id.to_string(), Instant::now());

        Some(record)
    }

    /// Whether a terminal record for `search_id` was already claimed
    pub async fn was_consumed(&self, search_id: &str) -> bool {
        self.consumed.read().await.contains_key(search_id)
    }

    fn publish(&self, search_id: &str, status: SelectionStatus) {
        // No subscribers is fine: nobody is waiting yet.
        let _ = self.events.send(SelectionEvent {
            search_id: search_id.to_string(),
            status,
        });
    }
}
