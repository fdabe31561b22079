//! Bindings for the audit contract, generated from its ABI.

use std::path::Path;

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, I256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;

use super::{LedgerError, LedgerEventKind};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    #[derive(Debug)]
    CentralStoresAudit,
    "contracts/build/abi.json"
}

use CentralStoresAudit::{
    adjustStockCall, approveRequestCall, createRequestCall, DamageReported, DeliveryLogged,
    RelocationLogged, RequestApproved, RequestCreated, RoleAssigned, StockAdjusted,
};

/// Functions the service sends, by signature and selector
const SENT_FUNCTIONS: [(&str, [u8; 4]); 3] = [
    (createRequestCall::SIGNATURE, createRequestCall::SELECTOR),
    (approveRequestCall::SIGNATURE, approveRequestCall::SELECTOR),
    (adjustStockCall::SIGNATURE, adjustStockCall::SELECTOR),
];

/// Topic 0 of the contract event behind `kind`
pub fn event_signature(kind: LedgerEventKind) -> alloy::primitives::B256 {
    match kind {
        LedgerEventKind::RoleAssigned => RoleAssigned::SIGNATURE_HASH,
        LedgerEventKind::RequestCreated => RequestCreated::SIGNATURE_HASH,
        LedgerEventKind::RequestApproved => RequestApproved::SIGNATURE_HASH,
        LedgerEventKind::StockAdjusted => StockAdjusted::SIGNATURE_HASH,
        LedgerEventKind::DeliveryLogged => DeliveryLogged::SIGNATURE_HASH,
        LedgerEventKind::DamageReported => DamageReported::SIGNATURE_HASH,
        LedgerEventKind::RelocationLogged => RelocationLogged::SIGNATURE_HASH,
    }
}

/// Reads the deployed contract's ABI and checks it against the bindings.
pub fn verify_abi_file(path: &Path) -> Result<(), LedgerError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::Abi(format!("cannot read {}: {}", path.display(), e)))?;
    let abi: JsonAbi = serde_json::from_str(&text)
        .map_err(|e| LedgerError::Abi(format!("invalid ABI in {}: {}", path.display(), e)))?;
    verify_abi(&abi)
}

/// Every event we poll for and every function we send must be declared with
/// the same signature.
pub fn verify_abi(abi: &JsonAbi) -> Result<(), LedgerError> {
    for kind in LedgerEventKind::iter() {
        let topic = event_signature(kind);
        if !abi.events().any(|event| !event.anonymous && event.selector() == topic) {
            return Err(LedgerError::Abi(format!("event {} missing or changed", kind)));
        }
    }
    for (signature, selector) in SENT_FUNCTIONS {
        if !abi.functions().any(|function| function.selector().0 == selector) {
            return Err(LedgerError::Abi(format!(
                "function {} missing or changed",
                signature
            )));
        }
    }
    Ok(())
}

/// Decodes the arguments of one log into contract-named JSON fields.
pub fn decode_args(kind: LedgerEventKind, log: &Log) -> Result<Map<String, Value>, LedgerError> {
    let fields = match kind {
        LedgerEventKind::RoleAssigned => {
            let event = decode::<RoleAssigned>(log)?;
            vec![("user", address(event.user)), ("role", event.role.into())]
        }
        LedgerEventKind::RequestCreated => {
            let event = decode::<RequestCreated>(log)?;
            vec![
                ("requestId", uint(event.requestId)),
                ("requester", address(event.requester)),
                ("itemName", event.itemName.into()),
                ("quantity", uint(event.quantity)),
                ("priority", event.priority.into()),
            ]
        }
        LedgerEventKind::RequestApproved => {
            let event = decode::<RequestApproved>(log)?;
            vec![
                ("requestId", uint(event.requestId)),
                ("approver", address(event.approver)),
                ("approved", event.approved.into()),
                ("reason", event.reason.into()),
            ]
        }
        LedgerEventKind::StockAdjusted => {
            let event = decode::<StockAdjusted>(log)?;
            vec![
                ("actor", address(event.actor)),
                ("itemName", event.itemName.into()),
                ("delta", int(event.delta)),
                ("reason", event.reason.into()),
            ]
        }
        LedgerEventKind::DeliveryLogged => {
            let event = decode::<DeliveryLogged>(log)?;
            vec![
                ("deliveryId", uint(event.deliveryId)),
                ("supplier", event.supplier.into()),
                ("quantity", uint(event.quantity)),
            ]
        }
        LedgerEventKind::DamageReported => {
            let event = decode::<DamageReported>(log)?;
            vec![
                ("reportId", uint(event.reportId)),
                ("itemName", event.itemName.into()),
                ("quantity", uint(event.quantity)),
            ]
        }
        LedgerEventKind::RelocationLogged => {
            let event = decode::<RelocationLogged>(log)?;
            vec![
                ("relocationId", uint(event.relocationId)),
                ("fromLocation", event.fromLocation.into()),
                ("toLocation", event.toLocation.into()),
            ]
        }
    };

    Ok(fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect())
}

fn decode<E: SolEvent>(log: &Log) -> Result<E, LedgerError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|e| LedgerError::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

fn address(value: Address) -> Value {
    Value::String(value.to_string().to_lowercase())
}

// Quantities that overflow a JSON number are kept as decimal strings.
fn uint(value: U256) -> Value {
    u64::try_from(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}

fn int(value: I256) -> Value {
    i64::try_from(value)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}
