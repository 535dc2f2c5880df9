use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;

use super::http::HttpClient;
use crate::errors::HttpError;
use crate::models::{Position, Side};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const PAGE_SIZE: usize = 500;
const MAX_PAGES: usize = 10;

/// A single position entry that could not be normalized.
#[derive(Debug, Error, PartialEq)]
pub enum PositionParseError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("field '{field}' is not numeric: {raw}")]
    InvalidNumber { field: &'static str, raw: String },
}

/// Source of a wallet's current positions.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Returns an empty list when the wallet holds nothing. Malformed entries
    /// are skipped, never fatal.
    async fn fetch_positions(&self, wallet: &str) -> Result<Vec<Position>, HttpError>;
}

#[derive(Debug, Clone)]
pub struct DataClient {
    http: HttpClient,
    base_url: String,
}

impl DataClient {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DATA_API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(&self, wallet: &str, offset: usize) -> Result<Vec<Value>, HttpError> {
        let url = format!("{}/positions", self.base_url);
        let limit = PAGE_SIZE.to_string();
        let offset = offset.to_string();
        let raw = self
            .http
            .get_json(
                &url,
                &[("user", wallet), ("limit", &limit), ("offset", &offset)],
            )
            .await?;

        Ok(unwrap_entries(raw))
    }
}

#[async_trait]
impl PositionSource for DataClient {
    async fn fetch_positions(&self, wallet: &str) -> Result<Vec<Position>, HttpError> {
        tracing::debug!(wallet = %wallet, "Fetching positions");

        let mut positions = Vec::new();
        let mut complete = false;
        for page in 0..MAX_PAGES {
            let entries = self.fetch_page(wallet, page * PAGE_SIZE).await?;
            let page_len = entries.len();

            for entry in &entries {
                match parse_position(entry) {
                    Ok(p) => positions.push(p),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            entry = %entry,
                            "Skipping malformed position entry"
                        );
                    }
                }
            }

            if page_len < PAGE_SIZE {
                complete = true;
                break;
            }
        }

        if !complete {
            tracing::warn!(
                wallet = %wallet,
                count = positions.len(),
                max_pages = MAX_PAGES,
                "Page limit reached, position list may be truncated"
            );
        }

        metrics::counter!("positions_fetched_total").increment(positions.len() as u64);
        tracing::info!(
            wallet = %wallet,
            count = positions.len(),
            "Fetched positions"
        );
        Ok(positions)
    }
}

/// The endpoint normally returns a bare array; some shapes wrap it in
/// `{"positions": [...]}` or `{"data": [...]}`.
fn unwrap_entries(raw: Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::Object(mut obj) => ["positions", "data"]
            .iter()
            .find_map(|key| match obj.remove(*key) {
                Some(Value::Array(items)) if !items.is_empty() => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Convert one raw API entry into a canonical [`Position`]. Field names vary
/// across API shapes; for each field the first non-empty alias wins.
pub fn parse_position(item: &Value) -> Result<Position, PositionParseError> {
    let obj = item.as_object().ok_or(PositionParseError::NotAnObject)?;

    let (side, outcome) = parse_side(obj);

    Ok(Position {
        market_slug: first_str(obj, &["slug", "marketSlug", "market_slug"]),
        market_question: first_str(obj, &["title", "marketQuestion", "question"]),
        token_id: first_str(obj, &["asset", "tokenId", "token_id"]),
        side,
        outcome,
        size: first_decimal(obj, "size", &["size", "shares"])?,
        avg_price: first_decimal(obj, "avg_price", &["avgPrice", "avg_price", "averagePrice"])?,
        current_price: first_decimal(
            obj,
            "current_price",
            &["curPrice", "currentPrice", "current_price"],
        )?,
        value: first_decimal(obj, "value", &["currentValue", "value"])?,
        event_slug: first_str(obj, &["eventSlug", "event_slug"]),
        condition_id: first_str(obj, &["conditionId", "condition_id"]),
    })
}

fn parse_side(obj: &Map<String, Value>) -> (Side, String) {
    let outcome = first_str(obj, &["outcome", "side"]);
    if !outcome.is_empty() {
        return (Side::from_api_str(&outcome), capitalize(&outcome));
    }

    match obj.get("isYes").and_then(Value::as_bool) {
        Some(true) => (Side::Yes, "Yes".into()),
        Some(false) => (Side::No, "No".into()),
        None => (Side::Unknown, String::new()),
    }
}

/// "yes" → "Yes", "NO" → "No"; multi-word labels only get their first
/// letter touched.
fn capitalize(s: &str) -> String {
    let s = s.trim();
    match Side::from_api_str(s) {
        Side::Yes | Side::No => Side::from_api_str(s).as_str().to_string(),
        Side::Unknown => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !is_blank(v))
        .map(|v| match v {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

fn first_decimal(
    obj: &Map<String, Value>,
    field: &'static str,
    keys: &[&str],
) -> Result<Decimal, PositionParseError> {
    for key in keys {
        let Some(v) = obj.get(*key) else { continue };
        if is_blank(v) {
            continue;
        }
        let parsed = to_decimal(v).ok_or_else(|| PositionParseError::InvalidNumber {
            field,
            raw: v.to_string(),
        })?;
        // Zero falls through to the next alias, matching how the API pads
        // unused fields with 0.
        if !parsed.is_zero() {
            return Ok(parsed);
        }
    }
    Ok(Decimal::ZERO)
}

fn to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        // Go through the shortest textual form so 0.07 stays 0.07 rather
        // than its binary expansion.
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        Value::String(s) => parse_decimal_str(s),
        Value::Bool(true) => Some(Decimal::ONE),
        _ => None,
    }
}

fn parse_decimal_str(s: &str) -> Option<Decimal> {
    let s = s.trim();
    s.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}
