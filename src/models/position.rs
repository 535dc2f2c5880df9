use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// One outcome-token holding of a monitored user, as last reported by the
/// Data API. Rebuilt from scratch on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub market_slug: String,
    #[serde(default)]
    pub market_question: String,
    /// CLOB token ID. Unique per outcome, used as the diff key.
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub side: Side,
    /// Outcome label as reported, e.g. "Yes" or a team name.
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default)]
    pub current_price: Decimal,
    /// Current value in USD.
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub event_slug: String,
    #[serde(default)]
    pub condition_id: String,
}

impl Position {
    /// Positions without a token id cannot be tracked across snapshots.
    pub fn is_trackable(&self) -> bool {
        !self.token_id.is_empty()
    }

    /// Label shown in notifications. Falls back to the side when the API
    /// gave no outcome text.
    pub fn outcome_label(&self) -> &str {
        if self.outcome.is_empty() {
            self.side.as_str()
        } else {
            &self.outcome
        }
    }
}
