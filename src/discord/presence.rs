//! Discord Rich Presence integration using discord-sdk

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use discord_sdk::{
    activity::{ActivityBuilder, Assets},
    wheel::{UserState, Wheel},
    Discord, Subscriptions,
};
use tokio::sync::mpsc;

use crate::presence::{Activity, PresenceProvider};

/// Timeout for waiting for Discord handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum DiscordUpdate {
    Set(Activity),
    Clear,
}

/// Manages the Discord connection and background task
pub struct DiscordState {
    update_tx: mpsc::UnboundedSender<DiscordUpdate>,
}

impl DiscordState {
    /// Spawn a background task that connects to the local Discord client as
    /// `app_id` and applies presence updates in order.
    pub fn init(app_id: i64) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_discord_task(app_id, update_rx));

        Self { update_tx }
    }

    /// Background task that maintains the Discord connection and processes presence updates
    async fn run_discord_task(app_id: i64, mut update_rx: mpsc::UnboundedReceiver<DiscordUpdate>) {
        let (wheel, handler) = Wheel::new(Box::new(|err| {
            tracing::warn!("Discord error: {:?}", err);
        }));

        let mut user_spoke = wheel.user();

        let discord = match Discord::new(app_id, Subscriptions::ACTIVITY, Box::new(handler)) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Discord not available: {:?}", e);
                return;
            }
        };

        tracing::info!("Discord connecting...");

        let user = match tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            if user_spoke.0.changed().await.is_err() {
                Err("Discord connection closed".to_string())
            } else {
                match &*user_spoke.0.borrow() {
                    UserState::Connected(user) => Ok(user.clone()),
                    UserState::Disconnected(err) => Err(format!("Discord disconnected: {:?}", err)),
                }
            }
        })
        .await
        {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                tracing::warn!("{}", e);
                return;
            }
            Err(_) => {
                tracing::warn!("Discord handshake timed out");
                return;
            }
        };

        tracing::info!("Discord Rich Presence connected as {}", user.username);

        while let Some(update) = update_rx.recv().await {
            let result = match update {
                DiscordUpdate::Set(activity) => {
                    discord.update_activity(activity_builder(&activity)).await
                }
                DiscordUpdate::Clear => discord.clear_activity().await,
            };

            if let Err(e) = result {
                tracing::debug!("Failed to update Discord activity: {:?}", e);
            }
        }

        discord.disconnect().await;
        tracing::info!("Discord Rich Presence disconnected");
    }

    fn send_update(&self, update: DiscordUpdate) {
        let _ = self.update_tx.send(update);
    }
}

fn activity_builder(activity: &Activity) -> ActivityBuilder {
    let mut assets = Assets::default().large(
        activity.large_image_key.as_str(),
        Some(activity.large_image_text.as_str()),
    );
    if let Some(key) = &activity.small_image_key {
        assets = assets.small(key.as_str(), activity.small_image_text.as_deref());
    }

    let mut builder = ActivityBuilder::new()
        .state(activity.state.as_str())
        .assets(assets);
    if let Some(details) = &activity.details {
        builder = builder.details(details.as_str());
    }
    if let Some(start) = activity.start_timestamp.and_then(epoch_millis_to_system_time) {
        builder = builder.start_timestamp(start);
    }
    builder
}

fn epoch_millis_to_system_time(millis: i64) -> Option<SystemTime> {
    let millis = u64::try_from(millis).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

/// Discord presence provider implementing the generic PresenceProvider trait
pub struct DiscordPresence {
    state: Arc<DiscordState>,
}

impl DiscordPresence {
    /// Create a new Discord presence provider
    pub fn new(state: Arc<DiscordState>) -> Self {
        Self { state }
    }
}

impl PresenceProvider for DiscordPresence {
    fn name(&self) -> &'static str {
        "Discord"
    }

    fn publish(&self, activity: &Activity) {
        self.state.send_update(DiscordUpdate::Set(activity.clone()));
    }

    fn clear(&self) {
        self.state.send_update(DiscordUpdate::Clear);
    }
}
