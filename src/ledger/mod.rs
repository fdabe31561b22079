//! External ledger access.
//!
//! The database is authoritative for business state. The ledger is an audit
//! mirror: writes go out fire-and-forget through [`LedgerEmitter`], reads come
//! back through the reconciliation engine.

pub mod contract;
pub mod emitter;
pub mod http;

use alloy::transports::{TransportError, TransportErrorKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

pub use emitter::LedgerEmitter;
pub use http::HttpLedgerClient;

static TX_HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("static regex"));
static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"));

/// `0x` followed by 64 hex characters
pub fn is_transaction_hash(value: &str) -> bool {
    TX_HASH_RE.is_match(value)
}

/// `0x` followed by 40 hex characters
pub fn is_address(value: &str) -> bool {
    ADDRESS_RE.is_match(value)
}

/// Domain events emitted by the deployed contract
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum LedgerEventKind {
    RoleAssigned,
    RequestCreated,
    RequestApproved,
    StockAdjusted,
    DeliveryLogged,
    DamageReported,
    RelocationLogged,
}

/// One event as returned by the node, before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLedgerEvent {
    pub kind: LedgerEventKind,
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u32,
    pub args: Map<String, Value>,
}

impl RawLedgerEvent {
    /// Deduplication key
    pub fn key(&self) -> (&str, u32) {
        (self.transaction_hash.as_str(), self.log_index)
    }
}

/// A contract function invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    CreateRequest {
        item_name: String,
        quantity: u64,
        priority: String,
        reason: String,
    },
    ApproveRequest {
        request_no: u64,
        approved: bool,
        reason: String,
    },
    AdjustStock {
        item_name: String,
        delta: i64,
        reason: String,
    },
}

impl ContractCall {
    pub fn create_request(item_name: &str, quantity: i32, priority: &str, reason: &str) -> Self {
        ContractCall::CreateRequest {
            item_name: item_name.to_string(),
            quantity: quantity.max(0) as u64,
            priority: priority.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn approve_request(request_no: i64, approved: bool, reason: &str) -> Self {
        ContractCall::ApproveRequest {
            request_no: request_no.max(0) as u64,
            approved,
            reason: reason.to_string(),
        }
    }

    pub fn adjust_stock(item_name: &str, delta: i32, reason: &str) -> Self {
        ContractCall::AdjustStock {
            item_name: item_name.to_string(),
            delta: i64::from(delta),
            reason: reason.to_string(),
        }
    }

    /// Contract function name
    pub fn function(&self) -> &'static str {
        match self {
            ContractCall::CreateRequest { .. } => "createRequest",
            ContractCall::ApproveRequest { .. } => "approveRequest",
            ContractCall::AdjustStock { .. } => "adjustStock",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("ledger call timed out")]
    Timeout,

    #[error("abi error: {0}")]
    Abi(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("ledger not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LedgerError::Timeout
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

impl From<TransportError> for LedgerError {
    fn from(err: TransportError) -> Self {
        if let Some(payload) = err.as_error_resp() {
            return LedgerError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            };
        }
        if let Some(TransportErrorKind::Custom(inner)) = err.as_transport_err() {
            if let Some(http) = inner.downcast_ref::<reqwest::Error>() {
                if http.is_timeout() {
                    return LedgerError::Timeout;
                }
            }
        }
        LedgerError::Transport(err.to_string())
    }
}

impl From<alloy::contract::Error> for LedgerError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) => e.into(),
            other => LedgerError::Abi(other.to_string()),
        }
    }
}

/// Client for the chain node hosting the audit contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Current chain height
    async fn latest_block_number(&self) -> Result<u64, LedgerError>;

    /// Events of one kind in `from_block..=to_block`
    async fn fetch_events(
        &self,
        kind: LedgerEventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLedgerEvent>, LedgerError>;

    /// Sends a contract transaction from `sender`, returning its hash
    async fn submit_transaction(
        &self,
        call: &ContractCall,
        sender: &str,
    ) -> Result<String, LedgerError>;

    /// Whether a contract address and ABI are available
    fn contract_configured(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn validates_hex_identifiers() {
        assert!(is_transaction_hash(&format!("0x{}", "ab".repeat(32))));
        assert!(!is_transaction_hash("0x1234"));
        assert!(!is_transaction_hash(&format!("0x{}", "zz".repeat(32))));
        assert!(is_address("0x5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!is_address("5FbDB2315678afecb367f032d93F642f64180aa3"));
    }

    #[test]
    fn event_kinds_use_contract_names() {
        let names: Vec<String> = LedgerEventKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "RoleAssigned",
                "RequestCreated",
                "RequestApproved",
                "StockAdjusted",
                "DeliveryLogged",
                "DamageReported",
                "RelocationLogged",
            ]
        );
    }

    #[test]
    fn approve_call_carries_numeric_request_id() {
        let call = ContractCall::approve_request(7, false, "insufficient budget");
        assert_eq!(call.function(), "approveRequest");
        assert_eq!(
            call,
            ContractCall::ApproveRequest {
                request_no: 7,
                approved: false,
                reason: "insufficient budget".to_string(),
            }
        );
    }

    #[test]
    fn negative_quantities_never_reach_the_contract() {
        let call = ContractCall::create_request("Laptop", -3, "HIGH", "refresh");
        assert_matches::assert_matches!(call, ContractCall::CreateRequest { quantity: 0, .. });
        assert_eq!(
            ContractCall::adjust_stock("Laptop", -2, "damage"),
            ContractCall::AdjustStock {
                item_name: "Laptop".to_string(),
                delta: -2,
                reason: "damage".to_string(),
            }
        );
    }
}
