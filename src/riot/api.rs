//! Local Riot Client chat API: session and presence records.

use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::RiotError;
use super::lockfile::{Credential, API_USERNAME};

const SESSION_ENDPOINT: &str = "/chat/v1/session";
const PRESENCES_ENDPOINT: &str = "/chat/v4/presences";

const MAX_PARTY_SIZE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SessionState {
    Available,
    Away,
    Other(String),
}

impl From<String> for SessionState {
    fn from(state: String) -> Self {
        match state.as_str() {
            "available" => SessionState::Available,
            "away" => SessionState::Away,
            _ => SessionState::Other(state),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    pub puuid: String,
    pub state: SessionState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceRecord {
    pub puuid: String,
    pub product: String,
    #[serde(default)]
    pub private: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PresencesResponse {
    presences: Vec<PresenceRecord>,
}

/// Game-specific fields carried in a presence record's `private` blob
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivatePresence {
    pub session_loop_state: String,
    pub party_state: String,
    pub party_size: u32,
    pub match_map: String,
    pub queue_id: Option<String>,
    pub queue_entry_time: String,
}

impl Default for PrivatePresence {
    fn default() -> Self {
        Self {
            session_loop_state: String::new(),
            party_state: String::new(),
            party_size: 1,
            match_map: String::new(),
            queue_id: None,
            queue_entry_time: String::new(),
        }
    }
}

impl PresenceRecord {
    /// Decode the base64 JSON `private` blob
    pub fn decode_private(&self) -> Result<PrivatePresence, RiotError> {
        let blob = self
            .private
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| RiotError::MalformedPresence("missing private data".to_string()))?;

        let bytes = STANDARD
            .decode(blob)
            .map_err(|e| RiotError::MalformedPresence(format!("invalid base64: {}", e)))?;

        let mut private: PrivatePresence = serde_json::from_slice(&bytes)
            .map_err(|e| RiotError::MalformedPresence(format!("invalid JSON: {}", e)))?;

        private.party_size = private.party_size.clamp(1, MAX_PARTY_SIZE);
        if private.queue_id.as_deref() == Some("") {
            private.queue_id = None;
        }

        Ok(private)
    }
}

/// Where session and presence records come from
pub trait PresenceSource: Send + Sync {
    fn session(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<SessionRecord, RiotError>> + Send;

    fn presences(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>, RiotError>> + Send;
}

/// HTTP client for the Riot Client's loopback API.
///
/// The client serves a self-signed certificate on 127.0.0.1, so certificate
/// and hostname validation are disabled. Nothing else is fetched with this
/// client.
pub struct LocalApi {
    http: reqwest::Client,
    scheme: &'static str,
}

impl LocalApi {
    pub fn new(timeout: Duration) -> Result<Self, RiotError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .no_proxy()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            scheme: "https",
        })
    }

    /// Same client over plain HTTP
    #[cfg(test)]
    fn insecure_http(timeout: Duration) -> Result<Self, RiotError> {
        Ok(Self {
            scheme: "http",
            ..Self::new(timeout)?
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        endpoint: &str,
    ) -> Result<T, RiotError> {
        let url = format!("{}://127.0.0.1:{}{}", self.scheme, credential.port, endpoint);
        let response = self
            .http
            .get(&url)
            .basic_auth(API_USERNAME, Some(&credential.key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RiotError::ConnectionUnavailable(format!(
                "{} returned {}",
                endpoint,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

impl PresenceSource for LocalApi {
    async fn session(&self, credential: &Credential) -> Result<SessionRecord, RiotError> {
        self.get(credential, SESSION_ENDPOINT).await
    }

    async fn presences(&self, credential: &Credential) -> Result<Vec<PresenceRecord>, RiotError> {
        let response: PresencesResponse = self.get(credential, PRESENCES_ENDPOINT).await?;
        Ok(response.presences)
    }
}
