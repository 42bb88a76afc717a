mod manager;
pub mod resolver;
mod traits;

pub use manager::{start_poll_task, PresenceManager};
pub use resolver::PlayerPresence;
pub use traits::{Activity, PresenceProvider};
