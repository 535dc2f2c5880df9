use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::errors::ResolveError;
use crate::polymarket::ProfileSearch;

const CANDIDATE_KEYS: [&str; 3] = ["users", "profiles", "results"];
const NAME_KEYS: [&str; 3] = ["username", "name", "pseudonym"];
const ADDRESS_KEYS: [&str; 4] = ["walletAddress", "address", "proxyWallet", "wallet"];

/// Username → wallet address lookup.
#[async_trait]
pub trait WalletResolver: Send + Sync {
    async fn resolve(&self, username: &str) -> Result<String, ResolveError>;
}

/// Resolves `@username` via profile search and caches hits for the life of
/// the process. Misses are never cached.
pub struct ProfileResolver<S> {
    search: S,
    cache: RwLock<HashMap<String, String>>,
}

impl<S: ProfileSearch> ProfileResolver<S> {
    pub fn new(search: S) -> Self {
        Self {
            search,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached(&self, username: &str) -> Option<String> {
        let key = clean_username(username).to_lowercase();
        self.cache.read().await.get(&key).cloned()
    }
}

#[async_trait]
impl<S: ProfileSearch> WalletResolver for ProfileResolver<S> {
    async fn resolve(&self, username: &str) -> Result<String, ResolveError> {
        let clean = clean_username(username);
        let key = clean.to_lowercase();

        if let Some(address) = self.cache.read().await.get(&key) {
            tracing::debug!(username = %clean, address = %address, "Resolver cache hit");
            return Ok(address.clone());
        }

        tracing::info!(username = %clean, "Resolving username via Gamma API");
        let data = self.search.search_profiles(clean).await?;

        let address = extract_address(&data, clean)
            .ok_or_else(|| ResolveError::NotFound(clean.to_string()))?;

        tracing::info!(username = %clean, address = %address, "Resolved username");
        self.cache
            .write()
            .await
            .entry(key)
            .or_insert_with(|| address.clone());
        Ok(address)
    }
}

fn clean_username(username: &str) -> &str {
    username.trim().trim_start_matches('@').trim()
}

/// Pick the wallet for `username` out of a profile-search response.
///
/// Accepts `{"users"|"profiles"|"results": [...]}` or a bare array. A
/// candidate matches when its name equals or contains the query
/// (case-insensitive). With no match, a lone candidate is taken as-is.
pub fn extract_address(data: &Value, username: &str) -> Option<String> {
    let candidates: &[Value] = match data {
        Value::Object(obj) => CANDIDATE_KEYS
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_array))
            .find(|arr| !arr.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        Value::Array(arr) => arr.as_slice(),
        _ => &[],
    };

    let wanted = username.to_lowercase();

    let matched = candidates
        .iter()
        .filter_map(Value::as_object)
        .filter(|profile| {
            let name = profile_name(profile);
            !name.is_empty() && (name == wanted || name.contains(&wanted))
        })
        .find_map(profile_address);

    if matched.is_some() {
        return matched;
    }

    match candidates {
        [only] => only.as_object().and_then(profile_address),
        _ => None,
    }
}

fn profile_name(profile: &Map<String, Value>) -> String {
    NAME_KEYS
        .iter()
        .filter_map(|k| profile.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_lowercase()
}

fn profile_address(profile: &Map<String, Value>) -> Option<String> {
    let address = ADDRESS_KEYS
        .iter()
        .filter_map(|k| profile.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())?;

    address.starts_with("0x").then(|| address.to_string())
}
