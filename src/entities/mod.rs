//! Database entities.
//!
//! Status and kind columns are stored as strings and converted through the
//! enums defined next to each model.

pub mod approval_history;
pub mod approval_stage;
pub mod blockchain_log;
pub mod category;
pub mod damage_report;
pub mod delivery;
pub mod department_request;
pub mod id_sequence;
pub mod notification;
pub mod relocation;
pub mod stock;
pub mod stock_movement;
pub mod user;

/// Renders a sequence number as a display identifier, e.g. `REQ-0001`.
///
/// Numbers past 9999 simply widen.
pub fn display_number(prefix: &str, number: i64) -> String {
    format!("{}-{:04}", prefix, number)
}

/// Parses a display identifier back into its sequence number.
pub fn parse_display_number(prefix: &str, value: &str) -> Option<i64> {
    let (head, tail) = value.split_once('-')?;
    if !head.eq_ignore_ascii_case(prefix) || tail.is_empty() {
        return None;
    }
    if !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}
