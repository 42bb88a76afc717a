/// Rich presence to display, already resolved from the client's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub state: String,
    pub details: Option<String>,
    pub large_image_key: String,
    pub large_image_text: String,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    /// Milliseconds since the Unix epoch
    pub start_timestamp: Option<i64>,
    pub instance: bool,
}

/// Trait for presence providers (Discord, etc.)
pub trait PresenceProvider: Send + Sync {
    /// Returns the name of this presence provider (for logging)
    fn name(&self) -> &'static str;

    /// Show the given activity. Publishing the same activity twice is harmless.
    fn publish(&self, activity: &Activity);

    /// Clear all presence data
    fn clear(&self);
}
