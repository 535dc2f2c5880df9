use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{ChangeEvent, EventType, MonitoredUser, Position};

/// Minimum share growth reported as an increase. Anything at or below this
/// is treated as rounding noise from the Data API.
pub const INCREASE_THRESHOLD: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Which diff passes to run. New positions are always reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectOptions {
    pub detect_increases: bool,
    pub detect_closures: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            detect_increases: true,
            detect_closures: false,
        }
    }
}

/// Positions keyed by token id, remembering first-seen order.
///
/// Entries without a token id are dropped. A duplicated id keeps its first
/// slot in the order but takes the last value seen.
struct TokenIndex<'a> {
    order: Vec<&'a str>,
    by_token: HashMap<&'a str, &'a Position>,
}

impl<'a> TokenIndex<'a> {
    fn build(positions: &'a [Position]) -> Self {
        let mut order = Vec::with_capacity(positions.len());
        let mut by_token = HashMap::with_capacity(positions.len());

        for p in positions.iter().filter(|p| p.is_trackable()) {
            let token = p.token_id.as_str();
            if by_token.insert(token, p).is_none() {
                order.push(token);
            }
        }

        Self { order, by_token }
    }

    fn get(&self, token: &str) -> Option<&'a Position> {
        self.by_token.get(token).copied()
    }

    fn contains(&self, token: &str) -> bool {
        self.by_token.contains_key(token)
    }

    fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Position)> + '_ {
        self.order.iter().map(move |t| (*t, self.by_token[t]))
    }
}

/// Diff two snapshots of `user`'s positions.
///
/// Events come out grouped: every `new_position` (in `current` order), then
/// every `position_increased`, then every `position_closed` (in `previous`
/// order). Decreases and unchanged sizes are not reported, and neither are
/// increases of [`INCREASE_THRESHOLD`] shares or less.
///
/// Pure: the same inputs always produce the same events.
pub fn detect_changes(
    user: &MonitoredUser,
    current: &[Position],
    previous: &[Position],
    options: DetectOptions,
    detected_at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let curr = TokenIndex::build(current);
    let prev = TokenIndex::build(previous);

    let event = |event_type, position: &Position, previous_size| ChangeEvent {
        event_type,
        user: user.clone(),
        position: position.clone(),
        previous_size,
        detected_at,
    };

    let mut new_positions = Vec::new();
    let mut increases = Vec::new();

    for (token, pos) in curr.iter() {
        match prev.get(token) {
            None => {
                tracing::info!(
                    user = %user.username,
                    market = %pos.market_question,
                    outcome = %pos.outcome_label(),
                    avg_price = %pos.avg_price,
                    size = %pos.size,
                    "New position detected"
                );
                new_positions.push(event(EventType::NewPosition, pos, None));
            }
            Some(before) if options.detect_increases => {
                // A previous size too large to offset cannot be exceeded.
                let grew = before
                    .size
                    .checked_add(INCREASE_THRESHOLD)
                    .is_some_and(|limit| pos.size > limit);
                if grew {
                    tracing::info!(
                        user = %user.username,
                        market = %pos.market_question,
                        outcome = %pos.outcome_label(),
                        previous_size = %before.size,
                        size = %pos.size,
                        "Position increased"
                    );
                    increases.push(event(EventType::PositionIncreased, pos, Some(before.size)));
                }
            }
            Some(_) => {}
        }
    }

    let mut closures = Vec::new();
    if options.detect_closures {
        for (token, before) in prev.iter() {
            if !curr.contains(token) {
                tracing::info!(
                    user = %user.username,
                    market = %before.market_question,
                    outcome = %before.outcome_label(),
                    size = %before.size,
                    "Position closed"
                );
                closures.push(event(EventType::PositionClosed, before, Some(before.size)));
            }
        }
    }

    let mut events = new_positions;
    events.append(&mut increases);
    events.append(&mut closures);
    events
}
