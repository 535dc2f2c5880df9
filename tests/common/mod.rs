use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use polywatch::config::{MonitorSettings, MonitoredUserConfig};
use polywatch::errors::{HttpError, ResolveError};
use polywatch::models::{ChangeEvent, Position, Side};
use polywatch::polymarket::PositionSource;
use polywatch::services::{EventNotifier, WalletResolver};

#[allow(dead_code)]
pub fn make_position(token_id: &str, size: i64) -> Position {
    Position {
        market_slug: format!("market-{token_id}"),
        market_question: format!("Market {token_id}?"),
        token_id: token_id.into(),
        side: Side::Yes,
        outcome: "Yes".into(),
        size: Decimal::from(size),
        avg_price: Decimal::new(50, 2),
        current_price: Decimal::new(55, 2),
        value: Decimal::from(size) * Decimal::new(55, 2),
        event_slug: "event".into(),
        condition_id: "0xcond".into(),
    }
}

#[allow(dead_code)]
pub fn user_config(username: &str, wallet: &str) -> MonitoredUserConfig {
    MonitoredUserConfig {
        username: username.into(),
        profile_url: format!("https://polymarket.com/profile/@{username}"),
        wallet_address: wallet.into(),
    }
}

#[allow(dead_code)]
pub fn settings_for(users: Vec<MonitoredUserConfig>) -> MonitorSettings {
    MonitorSettings {
        monitored_users: users,
        ..MonitorSettings::default()
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Serves whatever positions were last set per wallet. Unknown wallets fail
/// like an exhausted retry budget.
#[derive(Default)]
pub struct FakeSource {
    positions: Mutex<HashMap<String, Vec<Position>>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn set(&self, wallet: &str, positions: Vec<Position>) {
        self.positions.lock().unwrap().insert(wallet.into(), positions);
    }

    pub fn remove(&self, wallet: &str) {
        self.positions.lock().unwrap().remove(wallet);
    }
}

#[async_trait]
impl PositionSource for FakeSource {
    async fn fetch_positions(&self, wallet: &str) -> Result<Vec<Position>, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.positions
            .lock()
            .unwrap()
            .get(wallet)
            .cloned()
            .ok_or_else(|| HttpError::RetriesExhausted {
                method: "GET",
                url: format!("fake://positions/{wallet}"),
                attempts: 3,
                last: None,
            })
    }
}

#[derive(Default)]
pub struct FakeResolver {
    known: Mutex<HashMap<String, String>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeResolver {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        let resolver = Self::default();
        for (name, wallet) in entries {
            resolver
                .known
                .lock()
                .unwrap()
                .insert(name.to_lowercase(), wallet.to_string());
        }
        resolver
    }
}

#[async_trait]
impl WalletResolver for FakeResolver {
    async fn resolve(&self, username: &str) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.known
            .lock()
            .unwrap()
            .get(&username.to_lowercase())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(username.into()))
    }
}

/// Records every delivery attempt. Tokens listed in `fail_tokens` are
/// reported as undelivered.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<ChangeEvent>>,
    pub attempts: AtomicUsize,
    fail_tokens: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn fail_on(&self, token_id: &str) {
        self.fail_tokens.lock().unwrap().insert(token_id.into());
    }

    pub fn delivered(&self) -> Vec<ChangeEvent> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventNotifier for RecordingNotifier {
    async fn deliver(&self, event: &ChangeEvent) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_tokens.lock().unwrap().contains(&event.position.token_id) {
            return false;
        }
        self.delivered.lock().unwrap().push(event.clone());
        true
    }
}

// ---------------------------------------------------------------------------
// HTTP stub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[allow(dead_code)]
impl StubResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Minimal HTTP/1.1 server answering each connection with the next canned
/// response (the last one repeats). Returns the base URL and the request
/// lines received so far.
#[allow(dead_code)]
pub async fn spawn_stub(responses: Vec<StubResponse>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        let mut served = 0usize;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            seen.lock().unwrap().push(request);

            let resp = &responses[served.min(responses.len() - 1)];
            served += 1;

            let mut raw = format!(
                "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
                resp.status,
                resp.body.len()
            );
            for (name, value) in &resp.headers {
                raw.push_str(&format!("{name}: {value}\r\n"));
            }
            raw.push_str("\r\n");
            raw.push_str(&resp.body);

            let _ = socket.write_all(raw.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (base_url, requests)
}

/// Read one request and return its request line plus body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request_line = head.lines().next().unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
    format!("{request_line}\n{body}")
}
