use serde::{Deserialize, Serialize};

/// A tracked Polymarket profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredUser {
    pub username: String,
    pub profile_url: String,
    /// Polygon proxy wallet. Empty until resolved.
    #[serde(default)]
    pub wallet_address: String,
}

impl MonitoredUser {
    pub fn new(username: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            profile_url: profile_url.into(),
            wallet_address: String::new(),
        }
    }

    pub fn with_wallet(mut self, wallet_address: impl Into<String>) -> Self {
        self.wallet_address = wallet_address.into();
        self
    }

    /// Shortened wallet for log lines, e.g. `0x1234...abcd`.
    pub fn wallet_short(&self) -> String {
        let w = &self.wallet_address;
        if w.len() > 10 && w.is_ascii() {
            format!("{}...{}", &w[..6], &w[w.len() - 4..])
        } else {
            w.clone()
        }
    }
}
