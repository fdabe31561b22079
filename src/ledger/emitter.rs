use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ContractCall, LedgerClient};

/// Fire-and-forget ledger writer.
///
/// Each emission runs on its own task, bounded by a timeout. Failures end as a
/// single warning and never reach the caller.
#[derive(Clone)]
pub struct LedgerEmitter {
    client: Arc<dyn LedgerClient>,
    timeout: Duration,
}

impl LedgerEmitter {
    pub fn new(client: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn client(&self) -> Arc<dyn LedgerClient> {
        self.client.clone()
    }

    /// Submits `call` from `sender` in the background.
    ///
    /// Returns the task handle, or `None` when nothing was sent.
    pub fn emit(&self, call: ContractCall, sender: Option<&str>) -> Option<JoinHandle<()>> {
        if !self.client.contract_configured() {
            debug!(function = call.function(), "ledger contract not configured; skipping emission");
            return None;
        }
        let Some(sender) = sender.filter(|s| super::is_address(s)) else {
            debug!(function = call.function(), "actor has no ledger address; skipping emission");
            return None;
        };

        let client = self.client.clone();
        let timeout = self.timeout;
        let sender = sender.to_string();

        Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, client.submit_transaction(&call, &sender)).await {
                Ok(Ok(hash)) => {
                    info!(function = call.function(), tx_hash = %hash, "ledger emission sent");
                }
                Ok(Err(e)) => {
                    warn!(function = call.function(), error = %e, "ledger emission failed");
                }
                Err(_) => {
                    warn!(function = call.function(), timeout_secs = timeout.as_secs(), "ledger emission timed out");
                }
            }
        }))
    }
}
