//! Riot Client lockfile parsing and caching.
//!
//! The client writes `name:pid:port:password:protocol` to its lockfile on
//! startup and deletes the file on exit. The port and password are all we
//! need to reach its local API.

use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::error::RiotError;

/// Username the local API expects alongside the lockfile password
pub const API_USERNAME: &str = "riot";

const PORT_FIELD: usize = 2;
const KEY_FIELD: usize = 3;

/// Connection details for the local Riot Client API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub port: u16,
    pub key: String,
}

impl Credential {
    pub fn parse(contents: &str) -> Result<Self, RiotError> {
        let fields: Vec<&str> = contents.trim().split(':').collect();
        if fields.len() <= KEY_FIELD {
            return Err(RiotError::MalformedCredential(format!(
                "expected at least {} fields, found {}",
                KEY_FIELD + 1,
                fields.len()
            )));
        }

        let port = fields[PORT_FIELD].parse::<u16>().map_err(|e| {
            RiotError::MalformedCredential(format!("invalid port {:?}: {}", fields[PORT_FIELD], e))
        })?;

        Ok(Self {
            port,
            key: fields[KEY_FIELD].to_string(),
        })
    }

    /// Value for the `Authorization` header
    pub fn basic_auth(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", API_USERNAME, self.key));
        format!("Basic {}", token)
    }

    pub fn socket_url(&self) -> String {
        format!("wss://127.0.0.1:{}/", self.port)
    }
}

#[derive(Debug)]
enum ClientState {
    NotRunning,
    Running { cached: Option<Credential> },
}

/// Reads the lockfile on demand while the Riot Client is known to be running.
///
/// The credential is cached for the whole launched interval and dropped as
/// soon as the client exits, so a restarted client is always read fresh.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    state: ClientState,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: ClientState::NotRunning,
        }
    }

    pub fn is_launched(&self) -> bool {
        matches!(self.state, ClientState::Running { .. })
    }

    /// Returns false if the client was already marked as running.
    pub fn mark_launched(&mut self) -> bool {
        if self.is_launched() {
            return false;
        }
        self.state = ClientState::Running { cached: None };
        true
    }

    /// Returns false if the client was not marked as running.
    pub fn mark_exited(&mut self) -> bool {
        if !self.is_launched() {
            return false;
        }
        self.invalidate();
        self.state = ClientState::NotRunning;
        true
    }

    pub fn invalidate(&mut self) {
        if let ClientState::Running { cached } = &mut self.state {
            *cached = None;
        }
    }

    pub fn read(&mut self) -> Result<Credential, RiotError> {
        let ClientState::Running { cached } = &mut self.state else {
            return Err(RiotError::NotLaunched);
        };

        if let Some(credential) = cached.as_ref() {
            return Ok(credential.clone());
        }

        let contents = fs::read_to_string(&self.path)?;
        let credential = Credential::parse(&contents)?;
        tracing::debug!("Read lockfile, local API on port {}", credential.port);

        *cached = Some(credential.clone());
        Ok(credential)
    }
}
