//! Everything that talks to the local Riot Client.

pub mod api;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod lockfile;
pub mod watcher;

pub use api::{
    LocalApi, PresenceRecord, PresenceSource, PrivatePresence, SessionRecord, SessionState,
};
pub use error::RiotError;
pub use events::ChangeNotifier;
pub use fetcher::{FetchOutcome, PresenceFetcher};
pub use lockfile::{Credential, CredentialStore};
pub use watcher::GameClientWatcher;
