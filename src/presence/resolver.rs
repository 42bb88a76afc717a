//! Turns raw session and presence records into a single [`Activity`].
//!
//! Everything here is pure: no I/O, no clocks other than the local timezone
//! used to interpret Riot's offset-less timestamps.

use chrono::{Local, NaiveDateTime, TimeZone};

use super::traits::Activity;
use crate::riot::{FetchOutcome, PrivatePresence};

/// Generic VALORANT artwork, also used when a map is not recognised
pub const LOGO_KEY: &str = "valorant_logo";
const LOGO_TEXT: &str = "VALORANT";

/// Shown when an in-game presence carries no queue, i.e. a custom lobby
const CUSTOM_GAME: &str = "Custom Game";

const MAX_PARTY_SIZE: u32 = 5;

/// Internal map codenames (last path segment, lower-cased) to Discord asset keys
const MAP_IMAGE_KEYS: &[(&str, &str)] = &[
    ("bonsai", "split"),
    ("duality", "bind"),
    ("ascent", "ascent"),
    ("triad", "haven"),
    ("port", "icebox"),
    ("foxtrot", "breeze"),
    ("canyon", "fracture"),
    ("pitt", "pearl"),
    ("jam", "lotus"),
    ("juliett", "sunset"),
    ("infinity", "abyss"),
];

/// Session and presence merged for the local player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerPresence {
    /// Client unreachable; keep whatever is currently shown
    Closed,
    Away,
    /// No usable presence for the target product
    NotInGame,
    Playing(PrivatePresence),
}

/// Pick the local player's presence out of a fetch for `product`.
pub fn merge(outcome: FetchOutcome, product: &str) -> PlayerPresence {
    let (session, presences) = match outcome {
        FetchOutcome::Closed => return PlayerPresence::Closed,
        FetchOutcome::Away => return PlayerPresence::Away,
        FetchOutcome::Snapshot { session, presences } => (session, presences),
    };

    let Some(record) = presences.iter().find(|p| p.puuid == session.puuid) else {
        tracing::debug!("No presence found for the local player");
        return PlayerPresence::NotInGame;
    };

    if record.product != product {
        tracing::debug!("Local player is in {}, not {}", record.product, product);
        return PlayerPresence::NotInGame;
    }

    match record.decode_private() {
        Ok(private) => PlayerPresence::Playing(private),
        Err(e) => {
            tracing::warn!("Ignoring unreadable presence: {}", e);
            PlayerPresence::NotInGame
        }
    }
}

/// Resolve a merged presence. `None` means leave the current activity alone.
pub fn resolve(presence: &PlayerPresence) -> Option<Activity> {
    match presence {
        PlayerPresence::Closed | PlayerPresence::NotInGame => None,
        PlayerPresence::Away => Some(branded("Away", None, "Away")),
        PlayerPresence::Playing(private) => Some(resolve_playing(private)),
    }
}

fn resolve_playing(private: &PrivatePresence) -> Activity {
    let party = party_details(private.party_size);
    let mode = title_case(private.queue_id.as_deref().unwrap_or(CUSTOM_GAME));

    if private.session_loop_state.eq_ignore_ascii_case("ingame") {
        let (large_image_key, large_image_text) = match map_image_key(&private.match_map) {
            Some(key) => (key.to_string(), title_case(key)),
            None => {
                tracing::debug!("Unclassified map {:?}, using logo", private.match_map);
                (LOGO_KEY.to_string(), LOGO_TEXT.to_string())
            }
        };

        return Activity {
            state: format!("In Game - {}", mode),
            details: party,
            large_image_key,
            large_image_text,
            small_image_key: None,
            small_image_text: None,
            start_timestamp: parse_riot_timestamp(&private.queue_entry_time),
            instance: false,
        };
    }

    if private.party_state.eq_ignore_ascii_case("matchmaking") {
        // Queue artwork stays generic whatever the party size, but a queued
        // party is labelled as in game
        let label = if party.is_some() { "In Game" } else { "In Queue" };
        let mut activity = branded(&format!("{} - {}", label, mode), party, "In Queue");
        activity.small_image_key = Some(
            private
                .queue_id
                .clone()
                .unwrap_or_else(|| LOGO_KEY.to_string()),
        );
        activity.small_image_text = Some(mode);
        activity.start_timestamp = parse_riot_timestamp(&private.queue_entry_time);
        return activity;
    }

    match party {
        Some(details) => branded("In Menus", Some(details), "In Party"),
        None => branded("In Menus", None, "Available"),
    }
}

/// Activity with the VALORANT logo as large image
fn branded(state: &str, details: Option<String>, status: &str) -> Activity {
    Activity {
        state: state.to_string(),
        details,
        large_image_key: LOGO_KEY.to_string(),
        large_image_text: format!("{} - {}", LOGO_TEXT, status),
        small_image_key: None,
        small_image_text: None,
        start_timestamp: None,
        instance: false,
    }
}

fn party_details(party_size: u32) -> Option<String> {
    (party_size > 1).then(|| format!("In a Party ({} of {})", party_size, MAX_PARTY_SIZE))
}

/// Capitalise the first letter; Spike Rush gets its proper spacing.
pub fn title_case(s: &str) -> String {
    if s.eq_ignore_ascii_case("spikerush") {
        return "Spike Rush".to_string();
    }

    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Asset key for a map id such as `/Game/Maps/Triad/Triad`
pub fn map_image_key(map_id: &str) -> Option<&'static str> {
    let name = map_id.rsplit('/').next().unwrap_or(map_id).to_lowercase();
    MAP_IMAGE_KEYS
        .iter()
        .find(|(codename, _)| *codename == name)
        .map(|(_, key)| *key)
}

/// `2023.05.01-14.30.00` to `2023-05-01T14:30:00`
pub fn riot_timestamp_to_iso(timestamp: &str) -> Option<String> {
    let (date, time) = timestamp.split_once('-')?;
    Some(format!("{}T{}", date.replace('.', "-"), time.replace('.', ":")))
}

/// Parse a Riot timestamp as local time, in milliseconds since the epoch
pub fn parse_riot_timestamp(timestamp: &str) -> Option<i64> {
    let iso = riot_timestamp_to_iso(timestamp)?;
    let naive = NaiveDateTime::parse_from_str(&iso, "%Y-%m-%dT%H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}
