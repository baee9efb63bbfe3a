use std::io::Cursor;

use serde_json::json;

use super::continue_watching::{CONTINUE_WATCHING_LIMIT, build_cards};
use super::media::{HistoryKey, MediaDescriptor, MediaKind, PlaybackOptions};
use super::metadata::testing::CannedMetadata;
use super::progress::{ProgressStore, WatchlistStore};
use super::providers::{ProviderKey, ResolutionFailure, next_compatible_provider};
use super::session::testing::RecordingHost;
use super::session::{FailureReason, PlaybackSession, SessionState, WatchdogSettings};
use super::tui::TuiAction;
use super::{ingest_messages, run_episodes, run_search, run_trending, session_options};
use crate::config::Settings;
use crate::db::Database;
use crate::db::memory::MemoryStore;

fn session() -> PlaybackSession<RecordingHost> {
    PlaybackSession::new(RecordingHost::default(), WatchdogSettings::default())
}

#[test]
fn ended_message_updates_progress_and_refreshes_once() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    let input = concat!(
        r#"{"type":"PLAYER_EVENT","data":{"currentTime":60,"duration":3600,"id":"42","mediaType":"tv","season":2,"episode":5,"event":"timeupdate"}}"#,
        "\n",
        r#"{"type":"PLAYER_EVENT","data":{"currentTime":120,"duration":3600,"id":"42","mediaType":"tv","season":2,"episode":5,"event":"ended"}}"#,
        "\n",
    );

    let mut refreshes = Vec::new();
    let summary = ingest_messages(Cursor::new(input), &mut progress, |store| {
        refreshes.push(store.get_progress(&HistoryKey::tv("42", 2, 5)));
    })
    .expect("ingest from memory");

    assert_eq!(summary.applied, 2);
    assert_eq!(summary.discarded, 0);
    assert_eq!(summary.completed, 1);
    assert_eq!(refreshes, vec![120.0]);

    let entry = progress
        .entry(&HistoryKey::tv("42", 2, 5))
        .expect("entry recorded");
    assert_eq!(entry.progress_seconds, 120.0);
    assert_eq!(entry.duration_seconds, 3600.0);
}

#[test]
fn malformed_messages_leave_history_untouched() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    progress.record_progress_at(HistoryKey::movie("550"), 30.0, 100.0, 7);
    let input = "garbage\n\n{\"type\":\"PLAYER_EVENT\",\"data\":{\"currentTime\":\"x\"}}\n";

    let summary = ingest_messages(Cursor::new(input), &mut progress, |_| {
        panic!("no refresh expected");
    })
    .expect("ingest from memory");

    assert_eq!(summary.applied, 0);
    assert_eq!(summary.discarded, 2);
    assert_eq!(progress.entries().len(), 1);
    assert_eq!(progress.get_progress(&HistoryKey::movie("550")), 30.0);
    assert_eq!(
        progress.entry(&HistoryKey::movie("550")).map(|entry| entry.updated_at),
        Some(7)
    );
}

#[test]
fn ingested_progress_survives_reopen() {
    let kv = MemoryStore::default();
    {
        let mut progress = ProgressStore::open(&kv);
        let input = r#"{"type":"PLAYER_EVENT","data":{"currentTime":45,"duration":90,"id":550,"mediaType":"movie"}}"#;
        ingest_messages(Cursor::new(input), &mut progress, |_| {}).expect("ingest");
    }
    let reopened = ProgressStore::open(&kv);
    assert_eq!(reopened.get_progress(&HistoryKey::movie("550")), 45.0);
}

#[test]
fn continue_watching_orders_by_recency_and_skips_unstarted() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    progress.record_progress_at(HistoryKey::movie("10"), 5.0, 100.0, 10);
    progress.record_progress_at(HistoryKey::movie("30"), 5.0, 100.0, 30);
    progress.record_progress_at(HistoryKey::movie("20"), 5.0, 100.0, 20);
    progress.record_progress_at(HistoryKey::movie("40"), 0.0, 100.0, 40);

    let metadata = CannedMetadata::default().with("movie/30", json!({"title": "Thirty"}));
    let cards = build_cards(&progress, &metadata, CONTINUE_WATCHING_LIMIT);

    let stamps: Vec<i64> = cards.iter().map(|card| card.entry.updated_at).collect();
    assert_eq!(stamps, vec![30, 20, 10]);
    assert_eq!(cards[0].title, "Thirty");
    assert!(cards[0].metadata_loaded);
    assert!(!cards[1].metadata_loaded);
    assert_eq!(cards[1].title, "Movie 20");
}

#[test]
fn recorded_progress_is_clamped_to_duration() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    let key = HistoryKey::movie("603");
    progress.record_progress(key.clone(), 9000.0, 7200.0);
    assert_eq!(progress.get_progress(&key), 7200.0);
    progress.record_progress(key.clone(), -5.0, 7200.0);
    assert_eq!(progress.get_progress(&key), 0.0);
}

#[test]
fn session_falls_back_across_providers_for_tv() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    let mut player = session();

    let state = player
        .start(
            MediaDescriptor::tv("42", 2, 5),
            PlaybackOptions::default(),
            Some(ProviderKey::FluxLine),
            &mut progress,
        )
        .clone();
    assert_eq!(state, SessionState::Playing);
    let url = player.active_url().expect("mounted url").clone();
    assert!(url.path().ends_with("/42/2/5"), "unexpected path {url}");
    assert!(progress.entry(&HistoryKey::tv("42", 2, 5)).is_some());

    let next = next_compatible_provider(MediaKind::Tv, ProviderKey::FluxLine)
        .expect("another tv provider");
    assert_ne!(next, ProviderKey::FluxLine);
    player.switch_provider(next, &mut progress).expect("active session");
    assert_eq!(player.state(), &SessionState::Playing);
    assert_eq!(player.active_provider(), Some(next));
    assert_eq!(player.host().unmounted, 1);
    assert_eq!(player.host().mounted.len(), 2);
}

#[test]
fn session_rejects_provider_without_kind_support() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    let mut player = session();

    let state = player
        .start(
            MediaDescriptor::tv("42", 1, 1),
            PlaybackOptions::default(),
            Some(ProviderKey::PulseView),
            &mut progress,
        )
        .clone();
    assert!(matches!(
        state,
        SessionState::Failed(FailureReason::Resolution(ResolutionFailure::UnsupportedKind { .. }))
    ));
    assert!(player.host().mounted.is_empty());
    assert!(!player.is_mounted());

    player.stop();
    assert_eq!(player.state(), &SessionState::Idle);
}

#[test]
fn watchlist_toggle_round_trips_through_storage() {
    let kv = MemoryStore::default();
    let mut watchlist = WatchlistStore::open(&kv);
    assert!(watchlist.toggle(MediaKind::Movie, "550", "Fight Club", None));
    assert!(WatchlistStore::open(&kv).contains(MediaKind::Movie, "550"));
    assert!(!watchlist.toggle(MediaKind::Movie, "550", "Fight Club", None));
    assert!(!WatchlistStore::open(&kv).contains(MediaKind::Movie, "550"));
}

#[test]
fn tui_action_navigation_saturates_at_edges() {
    assert_eq!(TuiAction::Resume.move_left(), TuiAction::Resume);
    assert_eq!(TuiAction::Resume.move_right(), TuiAction::Restart);
    assert_eq!(TuiAction::Episodes.move_left(), TuiAction::Restart);
    assert_eq!(TuiAction::Provider.move_right(), TuiAction::Provider);
    assert_eq!(TuiAction::ALL.len(), 4);
}

#[test]
fn anime_resume_offset_only_applies_to_the_recorded_episode() {
    let kv = MemoryStore::default();
    let mut progress = ProgressStore::open(&kv);
    progress.record_progress(
        MediaDescriptor::anime("31", None, 7).history_key(),
        1200.0,
        1440.0,
    );
    let settings = Settings::for_tests();
    let none = PlaybackOptions::default();

    let other = session_options(&settings, &MediaDescriptor::anime("31", None, 2), &none, &progress);
    assert_eq!(other.start_at, None);
    let same = session_options(&settings, &MediaDescriptor::anime("31", None, 7), &none, &progress);
    assert_eq!(same.start_at, Some(1200.0));
}

#[test]
fn ingest_keeps_entries_created_by_another_session() {
    let db = Database::open_in_memory().expect("open");
    db.migrate().expect("migrate");
    let mut dashboard = ProgressStore::open(&db);
    let mut ingest = ProgressStore::open(&db);
    let mut player = session();

    player.start(
        MediaDescriptor::movie("1"),
        PlaybackOptions::default(),
        None,
        &mut dashboard,
    );
    let input = r#"{"type":"PLAYER_EVENT","data":{"currentTime":12,"duration":90,"id":"2","mediaType":"movie"}}"#;
    ingest_messages(Cursor::new(input), &mut ingest, |_| {}).expect("ingest");

    let mut ids: Vec<String> = ProgressStore::open(&db)
        .entries()
        .iter()
        .map(|entry| entry.key.id.clone())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn metadata_outages_are_empty_results_not_errors() {
    let db = Database::open_in_memory().expect("open");
    db.migrate().expect("migrate");
    let offline = CannedMetadata::default();

    assert!(run_search(&db, &offline, "the office").is_ok());
    assert!(run_trending(&db, &offline, MediaKind::Tv).is_ok());
    assert!(run_episodes(&db, &offline, "1399", Some(2)).is_ok());
    assert_eq!(
        *offline.requests.borrow(),
        vec!["search/multi", "trending/tv/week", "tv/1399"]
    );
}
