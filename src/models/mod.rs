pub mod position;
pub mod user;

pub use position::Position;
pub use user::MonitoredUser;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Side {
    /// Parse an outcome label. Anything other than yes/no (team names,
    /// "Over"/"Under", ...) maps to `Unknown`.
    pub fn from_api_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "yes" => Side::Yes,
            "no" => Side::No,
            _ => Side::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "Yes",
            Side::No => "No",
            Side::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChangeEvent — detector output, consumed by the notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewPosition,
    PositionIncreased,
    PositionClosed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewPosition => "new_position",
            EventType::PositionIncreased => "position_increased",
            EventType::PositionClosed => "position_closed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_type: EventType,
    pub user: MonitoredUser,
    /// Current position for new/increased, previous position for closed.
    pub position: Position,
    /// Size before the change. `None` for new positions.
    pub previous_size: Option<Decimal>,
    /// When the snapshot that produced this event was captured.
    pub detected_at: DateTime<Utc>,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: user={} token={} side={} size={}",
            self.event_type,
            self.user.username,
            self.position.token_id.chars().take(12).collect::<String>(),
            self.position.side,
            self.position.size,
        )
    }
}
