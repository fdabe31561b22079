//! Ledger event reconciliation.
//!
//! Polls the contract's events and mirrors them into `blockchain_logs`. The
//! highest stored block number is the only persisted checkpoint; redelivered
//! events are absorbed by the unique `(transaction_hash, log_index)` key.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::db::flatten_txn_error;
use crate::entities::blockchain_log;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{is_transaction_hash, LedgerClient, LedgerError, LedgerEventKind, RawLedgerEvent};

/// Counts for one successfully reconciled block range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub fetched: u64,
    pub inserted: u64,
    pub duplicates: u64,
}

impl PollSummary {
    fn absorb(&mut self, other: PollSummary) {
        self.to_block = other.to_block;
        self.fetched += other.fetched;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}

/// Result of a reconciliation pass. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Completed(PollSummary),
    /// Nothing past the checkpoint
    UpToDate { latest_block: u64 },
    /// The pass stopped early. Blocks up to `reconciled_through` were committed.
    Failed {
        reason: String,
        reconciled_through: Option<u64>,
    },
}

impl PollOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PollOutcome::Failed { .. })
    }

    /// Last block known to be fully reconciled by this pass.
    pub fn reconciled_through(&self) -> Option<u64> {
        match self {
            PollOutcome::Completed(summary) => Some(summary.to_block),
            PollOutcome::UpToDate { .. } => None,
            PollOutcome::Failed {
                reconciled_through, ..
            } => *reconciled_through,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainStatus {
    pub connected: bool,
    pub contract_configured: bool,
    pub latest_block: Option<u64>,
    pub watermark: u64,
    pub total_events_logged: u64,
}

/// Splits `from..=to` into consecutive windows of at most `span` blocks.
pub fn block_windows(from: u64, to: u64, span: u64) -> Vec<(u64, u64)> {
    let span = span.max(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(span - 1).min(to);
        windows.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    windows
}

fn validate_event(event: &RawLedgerEvent) -> Result<(), LedgerError> {
    if !is_transaction_hash(&event.transaction_hash) {
        return Err(LedgerError::Decode(format!(
            "malformed transaction hash {}",
            event.transaction_hash
        )));
    }
    if i64::try_from(event.block_number).is_err() || i32::try_from(event.log_index).is_err() {
        return Err(LedgerError::Decode(format!(
            "block {} / log index {} out of range",
            event.block_number, event.log_index
        )));
    }
    Ok(())
}

/// Mirrors contract events into the local log.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: Arc<DatabaseConnection>,
    ledger: Arc<dyn LedgerClient>,
    event_sender: Option<EventSender>,
    call_timeout: Duration,
    max_block_span: u64,
}

impl ReconciliationEngine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: Arc<dyn LedgerClient>,
        call_timeout: Duration,
        max_block_span: u64,
    ) -> Self {
        Self {
            db,
            ledger,
            event_sender: None,
            call_timeout,
            max_block_span,
        }
    }

    pub fn with_event_sender(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }

    /// Highest stored block number, or 0 when the log is empty.
    pub async fn watermark(&self) -> Result<u64, ServiceError> {
        let max: Option<Option<i64>> = blockchain_log::Entity::find()
            .select_only()
            .column_as(
                sea_orm::sea_query::Expr::col(blockchain_log::Column::BlockNumber).max(),
                "max_block",
            )
            .into_tuple()
            .one(self.db.as_ref())
            .await?;
        Ok(max.flatten().map(|b| b.max(0) as u64).unwrap_or(0))
    }

    pub async fn latest_block(&self) -> Result<u64, LedgerError> {
        self.bounded(self.ledger.latest_block_number()).await
    }

    /// Fetches every event kind in `from_block..=to_block` and stores the new ones.
    ///
    /// All inserts share one transaction. On any failure nothing from this
    /// range is committed and the outcome says why.
    #[instrument(skip(self))]
    pub async fn poll(&self, from_block: u64, to_block: u64) -> PollOutcome {
        match self.try_poll(from_block, to_block).await {
            Ok(summary) => {
                if summary.inserted > 0 {
                    info!(
                        from_block,
                        to_block,
                        inserted = summary.inserted,
                        duplicates = summary.duplicates,
                        "ledger events reconciled"
                    );
                    if let Some(sender) = &self.event_sender {
                        sender.publish(Event::LedgerEventsReconciled {
                            from_block,
                            to_block,
                            inserted: summary.inserted,
                        });
                    }
                } else {
                    debug!(from_block, to_block, fetched = summary.fetched, "no new ledger events");
                }
                PollOutcome::Completed(summary)
            }
            Err(e) => {
                warn!(from_block, to_block, error = %e, "ledger poll failed; range will be retried");
                PollOutcome::Failed {
                    reason: e.to_string(),
                    reconciled_through: None,
                }
            }
        }
    }

    async fn try_poll(&self, from_block: u64, to_block: u64) -> Result<PollSummary, ServiceError> {
        let mut summary = PollSummary {
            from_block,
            to_block,
            ..PollSummary::default()
        };
        if from_block > to_block {
            return Ok(summary);
        }

        let mut events = Vec::new();
        for kind in LedgerEventKind::iter() {
            let batch = self
                .bounded(self.ledger.fetch_events(kind, from_block, to_block))
                .await?;
            for event in &batch {
                validate_event(event)?;
            }
            events.extend(batch);
        }
        summary.fetched = events.len() as u64;
        if events.is_empty() {
            return Ok(summary);
        }

        let inserted = self
            .db
            .transaction::<_, u64, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut inserted = 0;
                    for event in events {
                        let row = blockchain_log::ActiveModel {
                            id: Set(uuid::Uuid::new_v4()),
                            event_type: Set(event.kind.to_string()),
                            transaction_hash: Set(event.transaction_hash),
                            block_number: Set(event.block_number as i64),
                            log_index: Set(event.log_index as i32),
                            event_data: Set(serde_json::Value::Object(event.args)),
                            created_at: Set(chrono::Utc::now()),
                        };
                        let result = blockchain_log::Entity::insert(row)
                            .on_conflict(
                                OnConflict::columns([
                                    blockchain_log::Column::TransactionHash,
                                    blockchain_log::Column::LogIndex,
                                ])
                                .do_nothing()
                                .to_owned(),
                            )
                            .exec_without_returning(txn)
                            .await;
                        inserted += match result {
                            Ok(rows) => rows,
                            Err(DbErr::RecordNotInserted) => 0,
                            Err(e) => return Err(e.into()),
                        };
                    }
                    Ok(inserted)
                })
            })
            .await
            .map_err(flatten_txn_error)?;

        summary.inserted = inserted;
        summary.duplicates = summary.fetched - inserted;
        Ok(summary)
    }

    /// Polls `from_block..=to_block` window by window, stopping at the first failure.
    pub async fn catch_up(&self, from_block: u64, to_block: u64) -> PollOutcome {
        let mut total: Option<PollSummary> = None;
        for (start, end) in block_windows(from_block, to_block, self.max_block_span) {
            match self.poll(start, end).await {
                PollOutcome::Completed(summary) => match total.as_mut() {
                    Some(total) => total.absorb(summary),
                    None => total = Some(summary),
                },
                PollOutcome::Failed { reason, .. } => {
                    return PollOutcome::Failed {
                        reason,
                        reconciled_through: total.map(|t| t.to_block),
                    };
                }
                PollOutcome::UpToDate { .. } => {}
            }
        }
        match total {
            Some(summary) => PollOutcome::Completed(summary),
            None => PollOutcome::UpToDate {
                latest_block: to_block,
            },
        }
    }

    /// Reconciles from `from_block` (default: watermark + 1) up to the chain head.
    #[instrument(skip(self))]
    pub async fn process_now(&self, from_block: Option<u64>) -> PollOutcome {
        let latest = match self.latest_block().await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "could not read chain height");
                return PollOutcome::Failed {
                    reason: e.to_string(),
                    reconciled_through: None,
                };
            }
        };
        let from_block = match from_block {
            Some(from_block) => from_block,
            None => match self.watermark().await {
                Ok(watermark) => watermark + 1,
                Err(e) => {
                    warn!(error = %e, "could not read reconciliation watermark");
                    return PollOutcome::Failed {
                        reason: e.to_string(),
                        reconciled_through: None,
                    };
                }
            },
        };

        if from_block > latest {
            return PollOutcome::UpToDate {
                latest_block: latest,
            };
        }
        self.catch_up(from_block, latest).await
    }

    /// One pass from the stored watermark.
    pub async fn run_once(&self) -> PollOutcome {
        self.process_now(None).await
    }

    /// Polls every `interval` until `stop` turns true or its sender goes away.
    ///
    /// Keeps an in-memory cursor seeded from the watermark, so empty ranges are
    /// not re-polled within one run.
    pub async fn run_forever(
        &self,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), ServiceError> {
        let mut last_processed = self.watermark().await?;
        info!(
            last_processed,
            interval_secs = interval.as_secs(),
            "ledger listener started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            match self.latest_block().await {
                Ok(latest) if latest > last_processed => {
                    let outcome = self.catch_up(last_processed + 1, latest).await;
                    if let Some(through) = outcome.reconciled_through() {
                        last_processed = through;
                    }
                }
                Ok(latest) => debug!(latest, last_processed, "ledger listener up to date"),
                Err(e) => warn!(error = %e, "could not read chain height; retrying next cycle"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(last_processed, "ledger listener stopped");
        Ok(())
    }

    pub async fn status(&self) -> Result<BlockchainStatus, ServiceError> {
        let connected = tokio::time::timeout(self.call_timeout, self.ledger.is_connected())
            .await
            .unwrap_or(false);
        let latest_block = if connected {
            self.latest_block().await.ok()
        } else {
            None
        };

        Ok(BlockchainStatus {
            connected,
            contract_configured: self.ledger.contract_configured(),
            latest_block,
            watermark: self.watermark().await?,
            total_events_logged: blockchain_log::Entity::find()
                .count(self.db.as_ref())
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_the_range_without_gaps() {
        assert_eq!(block_windows(1, 10, 4), vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(block_windows(1000, 1001, 5000), vec![(1000, 1001)]);
        assert_eq!(block_windows(7, 7, 1), vec![(7, 7)]);
        assert!(block_windows(5, 4, 10).is_empty());
    }

    #[test]
    fn zero_span_is_treated_as_one() {
        assert_eq!(block_windows(1, 3, 0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let event = RawLedgerEvent {
            kind: LedgerEventKind::RequestCreated,
            transaction_hash: "0xdead".into(),
            block_number: 1,
            log_index: 0,
            args: Default::default(),
        };
        assert!(matches!(validate_event(&event), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn failed_outcome_reports_partial_progress() {
        let outcome = PollOutcome::Failed {
            reason: "timeout".into(),
            reconciled_through: Some(42),
        };
        assert!(outcome.is_failure());
        assert_eq!(outcome.reconciled_through(), Some(42));
    }
}
