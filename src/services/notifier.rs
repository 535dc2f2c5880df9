use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use crate::config::{MonitoredUserConfig, NotificationSettings};
use crate::models::{ChangeEvent, EventType, Position, Side};
use crate::polymarket::HttpClient;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const POLYMARKET_BASE: &str = "https://polymarket.com";

/// Delivers one change event somewhere. Never fails loudly: a `false`
/// return means the event was not delivered, and the reason has already
/// been logged.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn deliver(&self, event: &ChangeEvent) -> bool;
}

/// Telegram notification service. Failures are logged but never block the main flow.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: HttpClient,
    bot_token: String,
    chat_id: String,
    base_url: String,
}

impl Notifier {
    pub fn new(http: HttpClient, bot_token: String, chat_id: String) -> Self {
        Self {
            http,
            bot_token,
            chat_id,
            base_url: TELEGRAM_API_BASE.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a Markdown message. Returns whether Telegram accepted it.
    pub async fn send(&self, message: &str) -> bool {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        match self.http.post_json(&url, &body).await {
            Ok(resp) if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) => true,
            Ok(resp) => {
                tracing::warn!(response = %resp, "Telegram rejected message");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
                false
            }
        }
    }

    pub async fn send_startup_message(&self, users: &[MonitoredUserConfig], polling_interval: u64) {
        if self.send(&format_startup(users, polling_interval)).await {
            tracing::info!("Startup message sent to Telegram");
        }
    }

    pub async fn send_shutdown_message(&self) {
        if self.send(&format_shutdown()).await {
            tracing::info!("Shutdown message sent to Telegram");
        }
    }
}

#[async_trait]
impl EventNotifier for Notifier {
    async fn deliver(&self, event: &ChangeEvent) -> bool {
        let delivered = self.send(&format_event(event)).await;
        if delivered {
            tracing::info!(
                event_type = %event.event_type,
                user = %event.user.username,
                "Telegram message sent"
            );
        }
        delivered
    }
}

/// Deliver every event whose type is enabled in `toggles`, one at a time.
/// Returns how many were delivered.
pub async fn send_events(
    notifier: &dyn EventNotifier,
    events: &[ChangeEvent],
    toggles: &NotificationSettings,
) -> usize {
    let mut sent = 0;

    for event in events.iter().filter(|e| toggles.is_enabled(e.event_type)) {
        if notifier.deliver(event).await {
            metrics::counter!("notifications_sent_total").increment(1);
            sent += 1;
        } else {
            metrics::counter!("notifications_failed_total").increment(1);
        }
    }

    sent
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

pub fn format_event(event: &ChangeEvent) -> String {
    match event.event_type {
        EventType::NewPosition => format_new_position(event),
        EventType::PositionIncreased => format_position_increased(event),
        EventType::PositionClosed => format_position_closed(event),
    }
}

pub fn format_new_position(event: &ChangeEvent) -> String {
    let p = &event.position;
    format!(
        "🟢 *New Position Detected*\n\n👤 {}\n📊 {}\n\nSide: {}\nShares: {}\nValue: ${}\n\n🔗 {}",
        escape_markdown(&event.user.username),
        escape_markdown(&p.market_question),
        side_line(p, true),
        format_shares(p.size),
        format_usd(p.value),
        market_url(&p.event_slug, &p.market_slug),
    )
}

pub fn format_position_increased(event: &ChangeEvent) -> String {
    let p = &event.position;
    let prev = event.previous_size.unwrap_or(Decimal::ZERO);
    format!(
        "📈 *Position Increased*\n\n👤 {}\n📊 {}\n\nSide: {}\nShares: {} → {} (+{})\nValue: ${}\n\n🔗 {}",
        escape_markdown(&event.user.username),
        escape_markdown(&p.market_question),
        side_line(p, true),
        format_shares(prev),
        format_shares(p.size),
        p.size
            .checked_sub(prev)
            .map(format_shares)
            .unwrap_or_else(|| "?".into()),
        format_usd(p.value),
        market_url(&p.event_slug, &p.market_slug),
    )
}

pub fn format_position_closed(event: &ChangeEvent) -> String {
    let p = &event.position;
    format!(
        "🔴 *Position Closed*\n\n👤 {}\n📊 {}\n\nSide: {}\nShares: {}\n\n🔗 {}",
        escape_markdown(&event.user.username),
        escape_markdown(&p.market_question),
        side_line(p, false),
        format_shares(p.size),
        market_url(&p.event_slug, &p.market_slug),
    )
}

pub fn format_startup(users: &[MonitoredUserConfig], polling_interval: u64) -> String {
    let mut lines = vec![
        "🟢 *Polymarket Monitor is online*\n".to_string(),
        format!(
            "Polling every *{}s* for {} user(s):\n",
            polling_interval,
            users.len()
        ),
    ];
    for u in users {
        let address = if u.wallet_address.is_empty() {
            "(resolving...)"
        } else {
            u.wallet_address.as_str()
        };
        lines.push(format!("👤 [{}]({})", escape_markdown(&u.username), u.profile_url));
        lines.push(format!("   `{}`", address));
    }
    lines.join("\n")
}

pub fn format_shutdown() -> String {
    "🔴 *Polymarket Monitor is offline*".to_string()
}

fn side_line(p: &Position, with_price: bool) -> String {
    let emoji = match p.side {
        Side::Yes => "✅",
        Side::No => "❌",
        Side::Unknown => "🔹",
    };
    let label = escape_markdown(p.outcome_label());
    if with_price {
        format!("{} {} @ {}", emoji, label, format_price(p.avg_price))
    } else {
        format!("{} {}", emoji, label)
    }
}

/// 0.07 → "7¢". Prices too large to express in cents are shown as-is.
pub fn format_price(price: Decimal) -> String {
    match price.checked_mul(Decimal::ONE_HUNDRED) {
        Some(cents) => format!("{}¢", cents.round()),
        None => price.to_string(),
    }
}

/// 8583.2 → "8,583.2".
pub fn format_shares(size: Decimal) -> String {
    with_thousands(size, 1)
}

/// 514.99 → "514.99", 1234.5 → "1,234.50".
pub fn format_usd(value: Decimal) -> String {
    with_thousands(value, 2)
}

fn with_thousands(value: Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp(dp);
    rounded.rescale(dp);
    let text = rounded.abs().to_string();

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(f) = frac_part {
        grouped.push('.');
        grouped.push_str(f);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn market_url(event_slug: &str, market_slug: &str) -> String {
    match (event_slug.is_empty(), market_slug.is_empty()) {
        (false, false) => format!("{POLYMARKET_BASE}/event/{event_slug}/{market_slug}"),
        (_, false) => format!("{POLYMARKET_BASE}/event/{market_slug}"),
        _ => POLYMARKET_BASE.to_string(),
    }
}

/// Telegram legacy Markdown has no escaping inside entities, so free text
/// must not contain stray entity markers.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
