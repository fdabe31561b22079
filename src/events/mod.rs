use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Publishes without waiting for channel capacity; a full or closed channel is logged.
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Domain events emitted after a state change has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    RequestCreated {
        request_id: Uuid,
        display_id: String,
    },
    RequestUpdated {
        request_id: Uuid,
        display_id: String,
    },
    RequestDeleted(Uuid),
    StageDecided {
        request_id: Uuid,
        stage_id: Uuid,
        stage: String,
        approved: bool,
        approver_id: Uuid,
    },
    RequestStatusChanged {
        request_id: Uuid,
        old_status: String,
        new_status: String,
    },
    StockAdjusted {
        stock_id: Uuid,
        movement_type: String,
        delta: i32,
        new_quantity: i32,
    },
    LowStockDetected {
        stock_id: Uuid,
        current_quantity: i32,
        threshold: i32,
    },
    StockDeleted {
        stock_id: Uuid,
        item_name: String,
    },
    DeliveryReceived {
        delivery_id: Uuid,
        stock_id: Uuid,
        quantity: i32,
    },
    DamageReported {
        report_id: Uuid,
        stock_id: Uuid,
        quantity: i32,
    },
    RelocationCompleted {
        relocation_id: Uuid,
        stock_id: Uuid,
        to_location: String,
    },
    LedgerEventsReconciled {
        from_block: u64,
        to_block: u64,
        inserted: u64,
    },
}

/// Drains the event channel, logging each event. Ends when every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::RequestCreated {
                request_id,
                display_id,
            } => {
                info!(%request_id, %display_id, "request created");
            }
            Event::RequestUpdated {
                request_id,
                display_id,
            } => {
                info!(%request_id, %display_id, "request updated");
            }
            Event::RequestDeleted(request_id) => {
                info!(%request_id, "request deleted");
            }
            Event::StageDecided {
                request_id,
                stage,
                approved,
                approver_id,
                ..
            } => {
                info!(%request_id, %stage, approved, %approver_id, "approval stage decided");
            }
            Event::RequestStatusChanged {
                request_id,
                old_status,
                new_status,
            } => {
                info!(%request_id, %old_status, %new_status, "request status changed");
            }
            Event::StockAdjusted {
                stock_id,
                movement_type,
                delta,
                new_quantity,
            } => {
                info!(%stock_id, %movement_type, delta, new_quantity, "stock adjusted");
            }
            Event::LowStockDetected {
                stock_id,
                current_quantity,
                threshold,
            } => {
                warn!(%stock_id, current_quantity, threshold, "stock at or below threshold");
            }
            Event::StockDeleted {
                stock_id,
                item_name,
            } => {
                info!(%stock_id, %item_name, "stock item deleted");
            }
            Event::DeliveryReceived {
                delivery_id,
                stock_id,
                quantity,
            } => {
                info!(%delivery_id, %stock_id, quantity, "delivery received");
            }
            Event::DamageReported {
                report_id,
                stock_id,
                quantity,
            } => {
                info!(%report_id, %stock_id, quantity, "damage reported");
            }
            Event::RelocationCompleted {
                relocation_id,
                stock_id,
                to_location,
            } => {
                info!(%relocation_id, %stock_id, %to_location, "relocation completed");
            }
            Event::LedgerEventsReconciled {
                from_block,
                to_block,
                inserted,
            } => {
                info!(from_block, to_block, inserted, "ledger events reconciled");
            }
        }
    }

    warn!("Event processing loop has ended");
}
