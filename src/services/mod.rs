// Approval pipeline for department requests
pub mod workflow;

// Inventory movements, deliveries, damage reports and relocations
pub mod stock;

// Ledger event mirroring
pub mod reconciliation;

// Display-number allocation
pub mod sequence;

pub mod users;

use validator::ValidationError;

/// Rejects empty and whitespace-only strings.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}
