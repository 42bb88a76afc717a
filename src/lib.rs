mod discord;
mod logging;
pub mod presence;
pub mod riot;
mod settings;
pub mod trigger;

use std::sync::Arc;

use discord::{DiscordPresence, DiscordState};
use presence::{start_poll_task, PresenceManager};
use riot::{ChangeNotifier, CredentialStore, GameClientWatcher, LocalApi, PresenceFetcher};
use trigger::{Trigger, TriggerSender};

pub use logging::init_logging;

/// Run the presence bridge until a shutdown signal arrives
pub async fn run() -> Result<(), String> {
    let settings = settings::load_settings().unwrap_or_else(|e| {
        tracing::warn!("Using default settings: {}", e);
        settings::AppSettings::default()
    });

    let lockfile = settings.lockfile_path();
    let (tx, rx) = trigger::channel();

    let watcher = GameClientWatcher::start(lockfile.clone(), tx.clone());
    let api = LocalApi::new(settings.request_timeout())
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
    let notifier =
        ChangeNotifier::new(settings.live_updates, settings.request_timeout(), tx.clone());

    let mut manager = PresenceManager::new(
        CredentialStore::new(lockfile),
        PresenceFetcher::new(api),
        notifier,
        settings.product.clone(),
    );

    let discord = Arc::new(DiscordState::init(settings.discord_app_id));
    manager.add_provider(Box::new(DiscordPresence::new(discord)));

    let poll_task = start_poll_task(tx.clone(), settings.poll_interval());
    tokio::spawn(forward_shutdown_signal(tx));

    manager.run(watcher, rx).await;
    poll_task.abort();
    Ok(())
}

async fn forward_shutdown_signal(tx: TriggerSender) {
    wait_for_shutdown_signal().await;
    let _ = tx.send(Trigger::Shutdown);
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
