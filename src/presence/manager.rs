//! Drives resolve cycles and fans the result out to presence providers

use std::time::Duration;

use tokio::task::JoinHandle;

use super::resolver;
use super::traits::{Activity, PresenceProvider};
use crate::riot::{
    ChangeNotifier, CredentialStore, GameClientWatcher, PresenceFetcher, PresenceSource, RiotError,
};
use crate::trigger::{Trigger, TriggerReceiver, TriggerSender};

/// How long shutdown waits for the websocket close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Owns all client-facing state and is the only consumer of [`Trigger`]s,
/// so resolve cycles never overlap.
pub struct PresenceManager<S> {
    store: CredentialStore,
    fetcher: PresenceFetcher<S>,
    notifier: ChangeNotifier,
    providers: Vec<Box<dyn PresenceProvider>>,
    product: String,
    last_published: Option<Activity>,
}

impl<S: PresenceSource> PresenceManager<S> {
    pub fn new(
        store: CredentialStore,
        fetcher: PresenceFetcher<S>,
        notifier: ChangeNotifier,
        product: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            providers: Vec::new(),
            product: product.into(),
            last_published: None,
        }
    }

    /// Add a presence provider
    pub fn add_provider(&mut self, provider: Box<dyn PresenceProvider>) {
        tracing::info!("Adding presence provider: {}", provider.name());
        self.providers.push(provider);
    }

    /// Process triggers until shutdown is requested or every sender is gone
    pub async fn run(mut self, watcher: GameClientWatcher, mut rx: TriggerReceiver) {
        if watcher.is_running() {
            tracing::info!("Riot Client already running");
            self.store.mark_launched();
        }

        let mut deferred = None;
        loop {
            let trigger = match deferred.take() {
                Some(trigger) => trigger,
                None => match rx.recv().await {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            // A missed lockfile event shows up here and is queued as its own trigger
            if trigger == Trigger::Tick && watcher.reconcile().is_some() {
                continue;
            }
            if trigger == Trigger::ChangeNotification {
                deferred = drain_change_notifications(&mut rx);
            }
            if !self.handle(trigger).await {
                break;
            }
        }

        tracing::info!("Presence manager stopped");
    }

    /// Returns false once the manager should stop.
    pub async fn handle(&mut self, trigger: Trigger) -> bool {
        tracing::trace!("Handling {:?}", trigger);
        match trigger {
            Trigger::Tick | Trigger::ChangeNotification => self.resolve_cycle().await,
            Trigger::Launched => {
                if self.store.mark_launched() {
                    self.resolve_cycle().await;
                }
            }
            Trigger::Exited => {
                if self.store.mark_exited() {
                    self.notifier.disconnect();
                    self.clear_all_presence();
                }
            }
            Trigger::NotifierClosed(generation) => self.notifier.handle_closed(generation),
            Trigger::Shutdown => {
                tracing::info!("Shutting down");
                self.notifier.close(CLOSE_GRACE).await;
                return false;
            }
        }
        true
    }

    /// Fetch, resolve and publish once. Failures end the cycle quietly.
    async fn resolve_cycle(&mut self) {
        if !self.store.is_launched() {
            return;
        }

        match self.resolve().await {
            Ok(Some(activity)) => self.update_all_presence(activity),
            Ok(None) => {}
            Err(e) if e.is_logic_error() => {
                tracing::error!("Resolve cycle ran while the client was down: {}", e)
            }
            Err(e @ RiotError::MalformedCredential(_)) => {
                tracing::warn!("Skipping presence update: {}", e)
            }
            Err(e) => tracing::debug!("Skipping presence update: {}", e),
        }
    }

    async fn resolve(&mut self) -> Result<Option<Activity>, RiotError> {
        let credential = self.store.read()?;

        if !self.fetcher.is_client_reachable(&mut self.store).await {
            tracing::debug!("Riot Client has no presences yet");
            return Ok(None);
        }

        if let Err(e) = self.notifier.ensure_connected(&credential).await {
            tracing::debug!("Live presence updates unavailable: {}", e);
        }

        let outcome = self.fetcher.fetch_raw(&mut self.store).await?;
        let presence = resolver::merge(outcome, &self.product);
        Ok(resolver::resolve(&presence))
    }

    /// Update presence on all providers
    fn update_all_presence(&mut self, activity: Activity) {
        if self.last_published.as_ref() == Some(&activity) {
            tracing::trace!("Presence unchanged");
            return;
        }

        tracing::debug!("Updating presence: {:?}", activity);
        for provider in &self.providers {
            provider.publish(&activity);
        }
        self.last_published = Some(activity);
    }

    /// Clear presence on all providers, if anything was shown
    fn clear_all_presence(&mut self) {
        if self.last_published.take().is_none() {
            return;
        }

        tracing::debug!("Clearing presence");
        for provider in &self.providers {
            provider.clear();
        }
    }
}

/// Drop change notifications already queued behind one being handled.
/// Returns the first other trigger found, which must be handled next.
fn drain_change_notifications(rx: &mut TriggerReceiver) -> Option<Trigger> {
    let mut merged = 0;
    while let Ok(trigger) = rx.try_recv() {
        if trigger != Trigger::ChangeNotification {
            tracing::trace!("Merged {} change notifications", merged);
            return Some(trigger);
        }
        merged += 1;
    }
    tracing::trace!("Merged {} change notifications", merged);
    None
}

/// Start the background task that asks for a resolve cycle every `interval`
pub fn start_poll_task(tx: TriggerSender, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if tx.send(Trigger::Tick).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    use super::*;
    use crate::riot::fetcher::testing::FakeSource;
    use crate::riot::{PresenceRecord, SessionRecord, SessionState};
    use crate::trigger;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Publish(Activity),
        Clear,
    }

    #[derive(Clone, Default)]
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl RecordingProvider {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PresenceProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "Recording"
        }

        fn publish(&self, activity: &Activity) {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Publish(activity.clone()));
        }

        fn clear(&self) {
            self.calls.lock().unwrap().push(Call::Clear);
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        lockfile: PathBuf,
        source: FakeSource,
        provider: RecordingProvider,
        manager: PresenceManager<FakeSource>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let lockfile = dir.path().join("lockfile");
        let source = FakeSource::default();
        let provider = RecordingProvider::default();
        let (tx, _rx) = trigger::channel();

        let mut manager = PresenceManager::new(
            CredentialStore::new(&lockfile),
            PresenceFetcher::new(source.clone()),
            ChangeNotifier::new(false, Duration::from_secs(1), tx),
            "valorant",
        );
        manager.add_provider(Box::new(provider.clone()));

        Harness {
            _dir: dir,
            lockfile,
            source,
            provider,
            manager,
        }
    }

    fn launch_client(h: &Harness) {
        fs::write(&h.lockfile, "Riot Client:4242:54321:key:https").unwrap();
    }

    fn set_presence(h: &Harness, private: serde_json::Value) {
        h.source.set_session(Some(SessionRecord {
            puuid: "me".to_string(),
            state: SessionState::Available,
        }));
        h.source.set_presences(Some(vec![PresenceRecord {
            puuid: "me".to_string(),
            product: "valorant".to_string(),
            private: Some(STANDARD.encode(private.to_string())),
        }]));
    }

    fn menus() -> serde_json::Value {
        serde_json::json!({
            "sessionLoopState": "MENUS",
            "partyState": "DEFAULT",
            "partySize": 1
        })
    }

    #[tokio::test]
    async fn test_no_api_calls_while_client_is_down() {
        let mut h = harness();
        set_presence(&h, menus());

        assert!(h.manager.handle(Trigger::Tick).await);
        assert!(h.manager.handle(Trigger::ChangeNotification).await);

        assert_eq!(h.source.calls(), 0);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_launch_publishes_available() {
        let mut h = harness();
        launch_client(&h);
        set_presence(&h, menus());

        h.manager.handle(Trigger::Launched).await;

        let calls = h.provider.calls();
        assert_eq!(calls.len(), 1);
        let Call::Publish(activity) = &calls[0] else {
            panic!("expected publish, got {:?}", calls[0]);
        };
        assert_eq!(activity.state, "In Menus");
        assert_eq!(activity.large_image_text, "VALORANT - Available");
        assert_eq!(activity.details, None);
    }

    #[tokio::test]
    async fn test_duplicate_launch_is_ignored() {
        let mut h = harness();
        launch_client(&h);
        set_presence(&h, menus());

        h.manager.handle(Trigger::Launched).await;
        let calls_after_first = h.source.calls();
        h.manager.handle(Trigger::Launched).await;
        assert_eq!(h.source.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_unchanged_activity_is_published_once() {
        let mut h = harness();
        launch_client(&h);
        set_presence(&h, menus());

        h.manager.handle(Trigger::Launched).await;
        h.manager.handle(Trigger::Tick).await;
        h.manager.handle(Trigger::ChangeNotification).await;
        assert_eq!(h.provider.calls().len(), 1);

        set_presence(
            &h,
            serde_json::json!({
                "sessionLoopState": "MENUS",
                "partyState": "DEFAULT",
                "partySize": 2
            }),
        );
        h.manager.handle(Trigger::ChangeNotification).await;
        assert_eq!(h.provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_client_keeps_activity_until_exit() {
        let mut h = harness();
        launch_client(&h);
        set_presence(
            &h,
            serde_json::json!({
                "sessionLoopState": "INGAME",
                "partyState": "DEFAULT",
                "partySize": 1,
                "matchMap": "/Game/Maps/Triad/Triad",
                "queueId": "unrated",
                "queueEntryTime": "2023.05.01-14.30.00"
            }),
        );

        h.manager.handle(Trigger::Launched).await;
        assert_eq!(h.provider.calls().len(), 1);

        h.source.set_presences(None);
        h.manager.handle(Trigger::Tick).await;
        h.manager.handle(Trigger::ChangeNotification).await;
        assert_eq!(h.provider.calls().len(), 1);

        fs::remove_file(&h.lockfile).unwrap();
        h.manager.handle(Trigger::Exited).await;
        h.manager.handle(Trigger::Exited).await;

        let calls = h.provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], Call::Clear);

        // Nothing reaches the API once the client is gone
        let before = h.source.calls();
        h.manager.handle(Trigger::Tick).await;
        assert_eq!(h.source.calls(), before);
    }

    #[tokio::test]
    async fn test_away_replaces_activity() {
        let mut h = harness();
        launch_client(&h);
        set_presence(&h, menus());
        h.manager.handle(Trigger::Launched).await;

        h.source.set_session(Some(SessionRecord {
            puuid: "me".to_string(),
            state: SessionState::Away,
        }));
        h.manager.handle(Trigger::Tick).await;

        let calls = h.provider.calls();
        let Call::Publish(activity) = calls.last().unwrap() else {
            panic!("expected publish");
        };
        assert_eq!(activity.state, "Away");
    }

    #[tokio::test]
    async fn test_exit_without_activity_does_not_clear() {
        let mut h = harness();
        launch_client(&h);
        h.manager.handle(Trigger::Launched).await;

        fs::remove_file(&h.lockfile).unwrap();
        h.manager.handle(Trigger::Exited).await;
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lockfile_skips_cycle() {
        let mut h = harness();
        fs::write(&h.lockfile, "garbage").unwrap();
        set_presence(&h, menus());

        assert!(h.manager.handle(Trigger::Launched).await);
        assert_eq!(h.source.calls(), 0);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_product_is_ignored() {
        let mut h = harness();
        launch_client(&h);
        h.source.set_session(Some(SessionRecord {
            puuid: "me".to_string(),
            state: SessionState::Available,
        }));
        h.source.set_presences(Some(vec![PresenceRecord {
            puuid: "me".to_string(),
            product: "league_of_legends".to_string(),
            private: None,
        }]));

        h.manager.handle(Trigger::Launched).await;
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_processing() {
        let h = harness();
        launch_client(&h);
        set_presence(&h, menus());

        let (tx, rx) = trigger::channel();
        let watcher = GameClientWatcher::start(h.lockfile.clone(), tx.clone());
        tx.send(Trigger::Shutdown).unwrap();
        tx.send(Trigger::Tick).unwrap();

        tokio::time::timeout(Duration::from_secs(5), h.manager.run(watcher, rx))
            .await
            .unwrap();

        assert_eq!(h.source.calls(), 0);
        assert!(h.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_poll_task_ticks() {
        let (tx, mut rx) = trigger::channel();
        let task = start_poll_task(tx, Duration::from_millis(10));

        for _ in 0..2 {
            let trigger = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap();
            assert_eq!(trigger, Some(Trigger::Tick));
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_change_notification_burst_runs_one_cycle() {
        let h = harness();
        launch_client(&h);
        set_presence(&h, menus());

        let (tx, rx) = trigger::channel();
        let watcher = GameClientWatcher::start(h.lockfile.clone(), tx.clone());
        for _ in 0..4 {
            tx.send(Trigger::ChangeNotification).unwrap();
        }
        tx.send(Trigger::Shutdown).unwrap();
        tx.send(Trigger::ChangeNotification).unwrap();

        tokio::time::timeout(Duration::from_secs(5), h.manager.run(watcher, rx))
            .await
            .unwrap();

        // One reachability check, then session and presences
        assert_eq!(h.source.calls(), 3);
        assert_eq!(h.provider.calls().len(), 1);
    }

    #[test]
    fn test_drain_keeps_other_triggers() {
        let (tx, mut rx) = trigger::channel();
        tx.send(Trigger::ChangeNotification).unwrap();
        tx.send(Trigger::Exited).unwrap();
        tx.send(Trigger::ChangeNotification).unwrap();

        assert_eq!(drain_change_notifications(&mut rx), Some(Trigger::Exited));
        assert_eq!(rx.try_recv().unwrap(), Trigger::ChangeNotification);
        assert_eq!(drain_change_notifications(&mut rx), None);
    }
}
