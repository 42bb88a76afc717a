//! Fetch policy on top of a [`PresenceSource`].

use super::api::{PresenceRecord, PresenceSource, SessionRecord, SessionState};
use super::error::RiotError;
use super::lockfile::CredentialStore;

/// Raw records fetched in one resolve cycle
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The client did not answer; it may have closed or hit a transient error
    Closed,
    /// The chat session is away, presences were not queried
    Away,
    Snapshot {
        session: SessionRecord,
        presences: Vec<PresenceRecord>,
    },
}

pub struct PresenceFetcher<S> {
    source: S,
}

impl<S: PresenceSource> PresenceFetcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Whether the client answers with at least one presence. Never fails.
    pub async fn is_client_reachable(&self, store: &mut CredentialStore) -> bool {
        let credential = match store.read() {
            Ok(credential) => credential,
            Err(e) => {
                tracing::debug!("Client reachability check skipped: {}", e);
                return false;
            }
        };

        match self.source.presences(&credential).await {
            Ok(presences) => !presences.is_empty(),
            Err(e) => {
                tracing::debug!("Client not reachable: {}", e);
                false
            }
        }
    }

    /// Fetch the session and, unless away, every presence record.
    ///
    /// Fails only when the credential cannot be read; network failures are
    /// reported as [`FetchOutcome::Closed`].
    pub async fn fetch_raw(&self, store: &mut CredentialStore) -> Result<FetchOutcome, RiotError> {
        let credential = store.read()?;

        let session = match self.source.session(&credential).await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("Session request failed: {}", e);
                return Ok(FetchOutcome::Closed);
            }
        };

        if session.state == SessionState::Away {
            return Ok(FetchOutcome::Away);
        }

        match self.source.presences(&credential).await {
            Ok(presences) => Ok(FetchOutcome::Snapshot { session, presences }),
            Err(e) => {
                tracing::debug!("Presences request failed: {}", e);
                Ok(FetchOutcome::Closed)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`PresenceSource`] for tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::riot::lockfile::Credential;

    #[derive(Default)]
    pub struct FakeState {
        pub session: Option<SessionRecord>,
        pub presences: Option<Vec<PresenceRecord>>,
    }

    /// Answers with whatever the test configured; `None` means unreachable.
    #[derive(Clone, Default)]
    pub struct FakeSource {
        pub state: Arc<Mutex<FakeState>>,
        pub session_calls: Arc<AtomicUsize>,
        pub presence_calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn set_session(&self, session: Option<SessionRecord>) {
            self.state.lock().unwrap().session = session;
        }

        pub fn set_presences(&self, presences: Option<Vec<PresenceRecord>>) {
            self.state.lock().unwrap().presences = presences;
        }

        pub fn calls(&self) -> usize {
            self.session_calls.load(Ordering::SeqCst) + self.presence_calls.load(Ordering::SeqCst)
        }
    }

    impl PresenceSource for FakeSource {
        async fn session(&self, _credential: &Credential) -> Result<SessionRecord, RiotError> {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            self.state
                .lock()
                .unwrap()
                .session
                .clone()
                .ok_or_else(|| RiotError::ConnectionUnavailable("connection refused".to_string()))
        }

        async fn presences(
            &self,
            _credential: &Credential,
        ) -> Result<Vec<PresenceRecord>, RiotError> {
            self.presence_calls.fetch_add(1, Ordering::SeqCst);
            self.state
                .lock()
                .unwrap()
                .presences
                .clone()
                .ok_or_else(|| RiotError::ConnectionUnavailable("connection refused".to_string()))
        }
    }
}
