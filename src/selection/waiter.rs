//! Waiting for the human's decision
//!
//! A waiter re-reads the selection record whenever the board broadcasts a
//! change, and at a fixed interval as a floor. No lock is held while
//! suspended. Terminal records are claimed (deleted) on return; a timeout
//! leaves the record in place for a later call.

use super::board::SelectionBoard;
use crate::cache::CacheManager;
use crate::error::{IconMcpError, Result};
use crate::i18n::Translator;
use crate::types::SelectionStatus;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// How often a long wait reports progress in the log
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// What a wait ended with
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    Completed { items: Vec<Value> },
    Failed,
    Timeout { waited: Duration },
}

impl SelectionOutcome {
    pub fn status(&self) -> SelectionStatus {
        match self {
            SelectionOutcome::Completed { .. } => SelectionStatus::Completed,
            SelectionOutcome::Failed => SelectionStatus::Failed,
            SelectionOutcome::Timeout { .. } => SelectionStatus::Timeout,
        }
    }
}

/// Tool-facing form of a [`SelectionOutcome`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub success: bool,
    pub status: SelectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_items: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Blocks a caller until a selection reaches a terminal state or a deadline
pub struct SelectionWaiter {
    cache: Arc<CacheManager>,
    board: Arc<SelectionBoard>,
    translator: Translator,
    poll_interval: Duration,
}

impl SelectionWaiter {
    pub fn new(
        cache: Arc<CacheManager>,
        board: Arc<SelectionBoard>,
        translator: Translator,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cache,
            board,
            translator,
            poll_interval,
        }
    }

    /// Wait up to `max_wait` for the selection of `search_id`.
    ///
    /// Fails immediately with `NotFound` when no search with that ID exists
    /// (or its selection was already claimed). Timing out is a normal
    /// outcome, not an error.
    pub async fn await_selection(&self, search_id: &str, max_wait: Duration) -> Result<SelectionOutcome> {
        if self.board.was_consumed(search_id).await || self.cache.get_search(search_id).await.is_none() {
            return Err(self.not_found(search_id));
        }

        info!(
            "{}",
            self.translator
                .translate("selection.checkingStatus", &[("searchId", &search_id)])
        );

        // Subscribe before the first read so no write can slip in between.
        let mut changes = self.board.subscribe();

        let start = Instant::now();
        let deadline = start + max_wait;
        let mut ticker = interval_at(start + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);

        loop {
            if let Some(outcome) = self.try_claim(search_id).await? {
                return Ok(outcome);
            }

            if Instant::now() >= deadline {
                let waited = start.elapsed();
                debug!("Selection wait for {} timed out after {:?}", search_id, waited);
                return Ok(SelectionOutcome::Timeout { waited });
            }

            tokio::select! {
                _ = ticker.tick() => {}
                change = changes.recv() => match change {
                    Ok(event) => debug!("Selection {} changed to {}", event.search_id, event.status),
                    Err(RecvError::Lagged(skipped)) => debug!("Missed {} selection events", skipped),
                    Err(RecvError::Closed) => debug!("Selection board closed"),
                },
                _ = tokio::time::sleep_until(deadline) => {}
                _ = progress.tick() => {
                    info!(
                        "{} ({}s)",
                        self.translator.t("selection.waitingForSelection"),
                        start.elapsed().as_secs()
                    );
                }
            }
        }
    }

    /// Convert an outcome into the payload handed back to the agent
    pub fn report(&self, outcome: SelectionOutcome) -> SelectionReport {
        let status = outcome.status();
        match outcome {
            SelectionOutcome::Completed { items } => {
                let count = items.len();
                SelectionReport {
                    success: true,
                    status,
                    selected_items: Some(items),
                    count: Some(count),
                    message: Some(
                        self.translator
                            .translate("selection.selectionCompleted", &[("count", &count)]),
                    ),
                }
            }
            SelectionOutcome::Failed => SelectionReport {
                success: false,
                status,
                selected_items: None,
                count: None,
                message: Some(self.translator.t("selection.selectionFailed")),
            },
            SelectionOutcome::Timeout { waited } => SelectionReport {
                success: false,
                status,
                selected_items: None,
                count: None,
                message: Some(self.translator.translate(
                    "selection.selectionTimeout",
                    &[("seconds", &waited.as_secs())],
                )),
            },
        }
    }

    async fn try_claim(&self, search_id: &str) -> Result<Option<SelectionOutcome>> {
        match self.board.claim_terminal(search_id).await {
            Some(record) if record.status == SelectionStatus::Completed => {
                Ok(Some(SelectionOutcome::Completed {
                    items: record.selected_items,
                }))
            }
            Some(_) => Ok(Some(SelectionOutcome::Failed)),
            // Another waiter claimed it first.
            None if self.board.was_consumed(search_id).await => Err(self.not_found(search_id)),
            None => Ok(None),
        }
    }

    fn not_found(&self, search_id: &str) -> IconMcpError {
        IconMcpError::NotFound(
            self.translator
                .translate("selection.noSearchFound", &[("searchId", &search_id)]),
        )
    }
}
