use std::sync::mpsc;
use std::thread;

use ratatui::widgets::TableState;

use crate::config::Settings;
use crate::db::KeyValueStore;

use super::super::continue_watching::{
    CONTINUE_WATCHING_LIMIT, ContinueCard, placeholder_cards,
};
use super::super::episode::{EpisodeNavigator, EpisodeRow, SeasonRequest, episode_target};
use super::super::media::{HistoryKey, MediaKind};
use super::super::metadata::{HttpMetadata, fetch_details, fetch_season};
use super::super::progress::ProgressStore;
use super::super::providers::{ProviderKey, next_compatible_provider};
use super::super::session::{FailureReason, PlaybackSession, PlayerHost, SessionState};
use super::{
    Dashboard, DetailsState, EpisodePanel, FetchResult, PendingNotice, PlayerLine, TuiAction,
};

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

/// Rebuilds the card list, keeping `preferred` selected when it is still listed.
pub(super) fn refresh_cards<K: KeyValueStore>(
    dashboard: &mut Dashboard,
    progress: &ProgressStore<K>,
    preferred: Option<&HistoryKey>,
) {
    dashboard.cards = placeholder_cards(progress.entries(), CONTINUE_WATCHING_LIMIT);
    select_preferred(&mut dashboard.table_state, &dashboard.cards, preferred);
}

fn select_preferred(
    table_state: &mut TableState,
    cards: &[ContinueCard],
    preferred: Option<&HistoryKey>,
) {
    if cards.is_empty() {
        table_state.select(None);
        return;
    }

    if let Some(key) = preferred
        && let Some(idx) = cards.iter().position(|card| card.key() == key)
    {
        table_state.select(Some(idx));
        return;
    }

    match table_state.selected() {
        Some(selected) => table_state.select(Some(selected.min(cards.len() - 1))),
        None => table_state.select(Some(0)),
    }
}

/// Runs metadata lookups on worker threads.
pub(super) struct Fetcher {
    source: HttpMetadata,
    tx: mpsc::Sender<FetchResult>,
}

impl Fetcher {
    pub(super) fn new(source: HttpMetadata, tx: mpsc::Sender<FetchResult>) -> Self {
        Self { source, tx }
    }

    pub(super) fn request_details(&self, kind: MediaKind, id: String) {
        let source = self.source.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let details = match fetch_details(&source, kind, &id) {
                Ok(details) => Some(details),
                Err(failure) => {
                    tracing::warn!(%kind, %id, %failure, "details lookup failed");
                    None
                }
            };
            let _ = tx.send(FetchResult::Details { kind, id, details });
        });
    }

    pub(super) fn request_season(&self, request: SeasonRequest) {
        let source = self.source.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let episodes = match fetch_season(&source, &request.show_id, request.season) {
                Ok(value) => Some(value),
                Err(failure) => {
                    tracing::warn!(
                        show = %request.show_id,
                        season = request.season,
                        %failure,
                        "season lookup failed"
                    );
                    None
                }
            };
            let _ = tx.send(FetchResult::Season { request, episodes });
        });
    }
}

pub(super) fn ensure_card_details(dashboard: &mut Dashboard, fetcher: &Fetcher) {
    for card in &dashboard.cards {
        let cache_key = (card.key().kind, card.key().id.clone());
        if dashboard.details.contains_key(&cache_key) {
            continue;
        }
        dashboard.details.insert(cache_key, DetailsState::Loading);
        fetcher.request_details(card.key().kind, card.key().id.clone());
    }
}

pub(super) fn drain_fetch_results(
    rx: &mpsc::Receiver<FetchResult>,
    dashboard: &mut Dashboard,
    fetcher: &Fetcher,
) {
    while let Ok(result) = rx.try_recv() {
        match result {
            FetchResult::Details { kind, id, details } => {
                if let Some(details) = &details
                    && kind == MediaKind::Tv
                {
                    attach_navigator(dashboard, &id, details, fetcher);
                }
                let state = match details {
                    Some(details) => DetailsState::Ready(details),
                    None => DetailsState::Unavailable,
                };
                dashboard.details.insert((kind, id), state);
            }
            FetchResult::Season { request, episodes } => {
                let Some(panel) = dashboard.episodes.as_mut() else {
                    continue;
                };
                let Some(navigator) = panel.navigator.as_mut() else {
                    continue;
                };
                if navigator.apply_episodes(&request, episodes.as_ref()) {
                    let has_rows = !navigator.episodes().is_empty();
                    panel.table_state.select(has_rows.then_some(0));
                }
            }
        }
    }
}

fn attach_navigator(
    dashboard: &mut Dashboard,
    show_id: &str,
    details: &serde_json::Value,
    fetcher: &Fetcher,
) {
    let Some(panel) = dashboard.episodes.as_mut() else {
        return;
    };
    if panel.show_id != show_id || panel.navigator.is_some() {
        return;
    }
    let mut navigator = EpisodeNavigator::new(show_id, details);
    let season = navigator
        .seasons()
        .iter()
        .find(|season| season.number == panel.initial_season)
        .or_else(|| navigator.seasons().first())
        .map(|season| season.number);
    if let Some(request) = season.and_then(|season| navigator.select_season(season)) {
        fetcher.request_season(request);
    }
    panel.navigator = Some(navigator);
}

pub(super) fn open_episode_panel(
    dashboard: &mut Dashboard,
    card: &ContinueCard,
    fetcher: &Fetcher,
) -> String {
    let key = card.key();
    if key.kind != MediaKind::Tv {
        return status_error(&format!("{} has no episodes.", key.kind.label()));
    }

    let panel = EpisodePanel {
        show_id: key.id.clone(),
        title: dashboard.card_title(card),
        initial_season: key.season.unwrap_or(1),
        navigator: None,
        table_state: TableState::default(),
    };
    let status = status_info(&format!("Episodes for {}", panel.title));

    match dashboard.details.get(&(MediaKind::Tv, key.id.clone())).cloned() {
        Some(DetailsState::Ready(details)) => {
            dashboard.episodes = Some(panel);
            attach_navigator(dashboard, &key.id, &details, fetcher);
        }
        Some(DetailsState::Loading) => dashboard.episodes = Some(panel),
        Some(DetailsState::Unavailable) | None => {
            dashboard.episodes = Some(panel);
            dashboard
                .details
                .insert((MediaKind::Tv, key.id.clone()), DetailsState::Loading);
            fetcher.request_details(MediaKind::Tv, key.id.clone());
        }
    }
    status
}

pub(super) fn run_card_action<H: PlayerHost, K: KeyValueStore>(
    card: &ContinueCard,
    action: TuiAction,
    settings: &Settings,
    player: &mut PlaybackSession<H>,
    progress: &mut ProgressStore<K>,
) -> String {
    let descriptor = card.key().descriptor();
    let mut options = settings.default_options(descriptor.kind);
    if action == TuiAction::Resume {
        options = options.with_start_at(card.entry.progress_seconds);
    }
    let label = descriptor.short_label();
    let state = player
        .start(descriptor, options, Some(settings.default_provider), progress)
        .clone();
    session_status(&label, &state, player.active_provider())
}

pub(super) fn play_selected_episode<H: PlayerHost, K: KeyValueStore>(
    show_id: &str,
    row: &EpisodeRow,
    settings: &Settings,
    player: &mut PlaybackSession<H>,
    progress: &mut ProgressStore<K>,
) -> String {
    let base = settings.default_options(MediaKind::Tv);
    let (descriptor, options) =
        episode_target(show_id, row.season, row.episode.number, &base, progress);
    let label = descriptor.short_label();
    let state = player
        .start(descriptor, options, Some(settings.default_provider), progress)
        .clone();
    session_status(&label, &state, player.active_provider())
}

pub(super) fn switch_to_next_provider<H: PlayerHost, K: KeyValueStore>(
    player: &mut PlaybackSession<H>,
    progress: &mut ProgressStore<K>,
) -> String {
    let Some(kind) = player.descriptor().map(|descriptor| descriptor.kind) else {
        return status_error("Nothing is playing.");
    };
    let Some(current) = player.active_provider() else {
        return status_error("Nothing is playing.");
    };
    let Some(next) = next_compatible_provider(kind, current) else {
        return status_error(&format!("No other provider can play {kind} content."));
    };
    match player.switch_provider(next, progress) {
        Ok(state) => {
            let state = state.clone();
            let label = player
                .descriptor()
                .map(|descriptor| descriptor.short_label())
                .unwrap_or_default();
            session_status(&label, &state, Some(next))
        }
        Err(err) => status_error(&err.to_string()),
    }
}

fn session_status(
    label: &str,
    state: &SessionState,
    provider: Option<ProviderKey>,
) -> String {
    let provider = provider
        .map(|provider| provider.to_string())
        .unwrap_or_else(|| "-".to_string());
    match state {
        SessionState::Failed(reason) => {
            status_error(&format!("{label} on {provider}: {reason}. Press p for another provider."))
        }
        _ => status_info(&format!("Playing {label} via {provider}.")),
    }
}

pub(super) fn unreachable_notice<H: PlayerHost>(player: &PlaybackSession<H>) -> PendingNotice {
    let provider = player
        .active_provider()
        .map(|provider| provider.to_string())
        .unwrap_or_else(|| "The provider".to_string());
    PendingNotice {
        heading: "Player Unreachable",
        message: format!(
            "{provider} navigated away from the video.\n\nPress p to try the next provider.\n\n[any key] Close"
        ),
    }
}

/// Only a player that could not be launched at all gets a popup; resolution
/// failures are explained on the status line.
pub(super) fn mount_failure_notice<H: PlayerHost>(
    player: &PlaybackSession<H>,
) -> Option<PendingNotice> {
    let SessionState::Failed(FailureReason::MountFailed(detail)) = player.state() else {
        return None;
    };
    Some(PendingNotice {
        heading: "Player Failed",
        message: format!(
            "The player could not be started:\n\n{detail}\n\nSet STREAMTRACK_PLAYER to a working command.\n\n[any key] Close"
        ),
    })
}

pub(super) fn now_playing<H: PlayerHost>(player: &PlaybackSession<H>) -> PlayerLine {
    let label = player
        .descriptor()
        .map(|descriptor| descriptor.short_label())
        .unwrap_or_default();
    let provider = player
        .active_provider()
        .map(|provider| provider.to_string())
        .unwrap_or_else(|| "-".to_string());
    let text = match player.state() {
        SessionState::Idle => "Nothing playing.".to_string(),
        SessionState::Loading => format!("Loading {label} on {provider}..."),
        SessionState::Playing => format!("{label} via {provider}"),
        SessionState::Failed(reason) => format!("{label} on {provider}: {reason}"),
    };
    PlayerLine {
        state: player.state().label(),
        text,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::media::MediaDescriptor;
    use crate::app::session::WatchdogSettings;
    use crate::app::session::testing::RecordingHost;
    use crate::db::memory::MemoryStore;

    fn fetcher() -> (Fetcher, mpsc::Receiver<FetchResult>) {
        let (tx, rx) = mpsc::channel();
        (Fetcher::new(HttpMetadata::new("http://127.0.0.1:9"), tx), rx)
    }

    fn show_details() -> serde_json::Value {
        json!({
            "name": "Show B",
            "seasons": [
                {"season_number": 1, "name": "Season 1", "episode_count": 2},
                {"season_number": 2, "name": "Season 2", "episode_count": 2}
            ]
        })
    }

    fn season_listing() -> serde_json::Value {
        json!({"episodes": [
            {"episode_number": 1, "name": "Pilot"},
            {"episode_number": 2, "name": "Second"}
        ]})
    }

    fn panel_for(show_id: &str, navigator: Option<EpisodeNavigator>) -> EpisodePanel {
        EpisodePanel {
            show_id: show_id.to_string(),
            title: format!("Show {show_id}"),
            initial_season: 1,
            navigator,
            table_state: TableState::default(),
        }
    }

    fn session(host: RecordingHost) -> PlaybackSession<RecordingHost> {
        PlaybackSession::new(host, WatchdogSettings::default())
    }

    #[test]
    fn refresh_keeps_preferred_selection() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        progress.record_progress_at(HistoryKey::movie("a"), 5.0, 10.0, 1);
        progress.record_progress_at(HistoryKey::movie("b"), 5.0, 10.0, 2);
        let mut dashboard = Dashboard::new();

        refresh_cards(&mut dashboard, &progress, Some(&HistoryKey::movie("a")));
        assert_eq!(dashboard.table_state.selected(), Some(1));

        progress.remove_entry(&HistoryKey::movie("a"));
        refresh_cards(&mut dashboard, &progress, Some(&HistoryKey::movie("a")));
        assert_eq!(dashboard.table_state.selected(), Some(0));
    }

    #[test]
    fn status_prefixes_drive_styling() {
        assert_eq!(status_info("ok"), "INFO: ok");
        assert_eq!(status_error("bad"), "ERROR: bad");
    }

    #[test]
    fn details_for_a_closed_show_do_not_attach_a_navigator() {
        let (fetcher, _rx) = fetcher();
        let mut dashboard = Dashboard::new();
        dashboard.episodes = Some(panel_for("B", None));

        let (tx, rx) = mpsc::channel();
        tx.send(FetchResult::Details {
            kind: MediaKind::Tv,
            id: "A".to_string(),
            details: Some(show_details()),
        })
        .expect("send");
        drain_fetch_results(&rx, &mut dashboard, &fetcher);

        let panel = dashboard.episodes.as_ref().expect("panel stays open");
        assert_eq!(panel.show_id, "B");
        assert!(panel.navigator.is_none());
        assert!(matches!(
            dashboard.details.get(&(MediaKind::Tv, "A".to_string())),
            Some(DetailsState::Ready(_))
        ));
    }

    #[test]
    fn season_for_a_closed_show_is_dropped() {
        let (fetcher, _rx) = fetcher();
        let mut navigator = EpisodeNavigator::new("B", &show_details());
        let current = navigator.select_season(1).expect("season 1 request");
        let mut dashboard = Dashboard::new();
        dashboard.episodes = Some(panel_for("B", Some(navigator)));

        let (tx, rx) = mpsc::channel();
        tx.send(FetchResult::Season {
            request: SeasonRequest {
                show_id: "A".to_string(),
                ..current.clone()
            },
            episodes: Some(season_listing()),
        })
        .expect("send");
        drain_fetch_results(&rx, &mut dashboard, &fetcher);

        let panel = dashboard.episodes.as_ref().expect("panel");
        let navigator = panel.navigator.as_ref().expect("navigator");
        assert!(navigator.episodes().is_empty());
        assert_eq!(panel.table_state.selected(), None);

        tx.send(FetchResult::Season {
            request: current,
            episodes: Some(season_listing()),
        })
        .expect("send");
        drain_fetch_results(&rx, &mut dashboard, &fetcher);
        let panel = dashboard.episodes.as_ref().expect("panel");
        assert_eq!(panel.navigator.as_ref().map(|nav| nav.episodes().len()), Some(2));
        assert_eq!(panel.table_state.selected(), Some(0));
    }

    #[test]
    fn season_arriving_after_the_panel_closed_is_ignored() {
        let (fetcher, _rx) = fetcher();
        let mut navigator = EpisodeNavigator::new("B", &show_details());
        let request = navigator.select_season(1).expect("request");
        let mut dashboard = Dashboard::new();

        let (tx, rx) = mpsc::channel();
        tx.send(FetchResult::Season {
            request,
            episodes: Some(season_listing()),
        })
        .expect("send");
        drain_fetch_results(&rx, &mut dashboard, &fetcher);
        assert!(dashboard.episodes.is_none());
    }

    #[test]
    fn resume_reopens_the_anime_episode_that_was_playing() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        progress.record_progress(
            MediaDescriptor::anime("31", None, 7).history_key(),
            1200.0,
            1440.0,
        );
        let card = placeholder_cards(progress.entries(), CONTINUE_WATCHING_LIMIT).remove(0);
        let settings = Settings::for_tests();
        let mut player = session(RecordingHost::default());

        let status = run_card_action(&card, TuiAction::Resume, &settings, &mut player, &mut progress);
        assert!(status.starts_with("INFO:"), "{status}");
        assert_eq!(player.descriptor().map(|descriptor| descriptor.episode()), Some(7));
        assert_eq!(player.options().start_seconds(), Some(1200));
        assert!(mount_failure_notice(&player).is_none());
    }

    #[test]
    fn launch_failure_raises_a_notice() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        progress.record_progress(HistoryKey::movie("550"), 30.0, 100.0);
        let card = placeholder_cards(progress.entries(), CONTINUE_WATCHING_LIMIT).remove(0);
        let settings = Settings::for_tests();
        let mut player = session(RecordingHost {
            refuse_mounts: true,
            ..RecordingHost::default()
        });

        let status = run_card_action(&card, TuiAction::Restart, &settings, &mut player, &mut progress);
        assert!(status.starts_with("ERROR:"), "{status}");
        let notice = mount_failure_notice(&player).expect("notice");
        assert_eq!(notice.heading, "Player Failed");
        assert!(notice.message.contains("no display"), "{}", notice.message);
    }
}
