//! Errors raised while talking to the local Riot Client.

#[derive(Debug, thiserror::Error)]
pub enum RiotError {
    #[error("Riot Client is not running")]
    NotLaunched,

    #[error("Riot Client is unreachable: {0}")]
    ConnectionUnavailable(String),

    #[error("Malformed lockfile: {0}")]
    MalformedCredential(String),

    #[error("Malformed presence record: {0}")]
    MalformedPresence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiotError {
    /// Whether the error means the caller ignored the client lifecycle,
    /// as opposed to something going wrong at runtime.
    pub fn is_logic_error(&self) -> bool {
        matches!(self, RiotError::NotLaunched)
    }
}

impl From<reqwest::Error> for RiotError {
    fn from(e: reqwest::Error) -> Self {
        RiotError::ConnectionUnavailable(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RiotError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RiotError::ConnectionUnavailable(e.to_string())
    }
}
