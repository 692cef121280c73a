//! Amount input for API boundary
//!
//! Transfer amounts arrive as a JSON string (`"40.00"`) or a JSON number
//! (`40`). Parsing never rejects at the serde layer; anything unusable becomes
//! `None` so the coordinator's validation message is what the client sees.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Raw amount as sent by the client
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(Decimal),
}

impl AmountInput {
    /// Decimal value, if the input is a well-formed number
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AmountInput::Number(d) => Some(*d),
            AmountInput::Text(s) => {
                let s = s.trim();
                if s.is_empty() || s.starts_with('.') || s.ends_with('.') {
                    return None;
                }
                // Scientific notation is not accepted
                if s.contains(['e', 'E']) {
                    return None;
                }
                Decimal::from_str(s).ok()
            }
        }
    }
}
