//! Reasons for the presence manager to wake up.

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Poll timer fired
    Tick,
    /// Lockfile appeared
    Launched,
    /// Lockfile disappeared
    Exited,
    /// The client pushed a presence change over its websocket
    ChangeNotification,
    /// A websocket connection ended; carries the connection's generation
    NotifierClosed(u64),
    /// Stop processing and shut down
    Shutdown,
}

pub type TriggerSender = mpsc::UnboundedSender<Trigger>;
pub type TriggerReceiver = mpsc::UnboundedReceiver<Trigger>;

pub fn channel() -> (TriggerSender, TriggerReceiver) {
    mpsc::unbounded_channel()
}
