mod actions;
mod render;
mod terminal;

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;
use serde_json::Value;

use crate::config::Settings;
use crate::db::Database;

use super::continue_watching::ContinueCard;
use super::episode::{EpisodeNavigator, EpisodeRow, SeasonRequest, episode_rows, truncate};
use super::media::{HistoryKey, MediaKind};
use super::metadata::{HttpMetadata, display_title};
use super::progress::{ProgressStore, WatchlistStore};
use super::session::{PlaybackSession, ProcessHost, WatchdogVerdict};

use self::actions::{
    Fetcher, drain_fetch_results, ensure_card_details, mount_failure_notice, now_playing,
    open_episode_panel, play_selected_episode, refresh_cards, run_card_action, status_error,
    status_info, switch_to_next_provider, unreachable_notice,
};
use self::render::draw_tui;
use self::terminal::TerminalGuard;

const RELOAD_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TuiAction {
    Resume,
    Restart,
    Episodes,
    Provider,
}

impl TuiAction {
    pub(crate) const ALL: [TuiAction; 4] = [
        TuiAction::Resume,
        TuiAction::Restart,
        TuiAction::Episodes,
        TuiAction::Provider,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Resume => "RESUME",
            Self::Restart => "RESTART",
            Self::Episodes => "EPISODES",
            Self::Provider => "PROVIDER",
        }
    }

    pub(crate) fn move_left(self) -> Self {
        match self {
            Self::Resume | Self::Restart => Self::Resume,
            Self::Episodes => Self::Restart,
            Self::Provider => Self::Episodes,
        }
    }

    pub(crate) fn move_right(self) -> Self {
        match self {
            Self::Resume => Self::Restart,
            Self::Restart => Self::Episodes,
            Self::Episodes | Self::Provider => Self::Provider,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct PendingDelete {
    pub(super) key: HistoryKey,
    pub(super) title: String,
}

#[derive(Debug, Clone)]
pub(super) struct PendingNotice {
    pub(super) heading: &'static str,
    pub(super) message: String,
}

/// Background lookups report back through one channel; each result names
/// what it was requested for.
#[derive(Debug)]
pub(super) enum FetchResult {
    Details {
        kind: MediaKind,
        id: String,
        details: Option<Value>,
    },
    Season {
        request: SeasonRequest,
        episodes: Option<Value>,
    },
}

#[derive(Debug, Clone)]
pub(super) enum DetailsState {
    Loading,
    Ready(Value),
    Unavailable,
}

#[derive(Debug)]
pub(super) struct EpisodePanel {
    pub(super) show_id: String,
    pub(super) title: String,
    pub(super) initial_season: u32,
    pub(super) navigator: Option<EpisodeNavigator>,
    pub(super) table_state: TableState,
}

#[derive(Debug)]
pub(super) struct Dashboard {
    pub(super) cards: Vec<ContinueCard>,
    pub(super) table_state: TableState,
    pub(super) action: TuiAction,
    pub(super) status: String,
    pub(super) pending_delete: Option<PendingDelete>,
    pub(super) pending_notice: Option<PendingNotice>,
    pub(super) details: HashMap<(MediaKind, String), DetailsState>,
    pub(super) episodes: Option<EpisodePanel>,
}

impl Dashboard {
    fn new() -> Self {
        Self {
            cards: Vec::new(),
            table_state: TableState::default(),
            action: TuiAction::Resume,
            status: String::new(),
            pending_delete: None,
            pending_notice: None,
            details: HashMap::new(),
            episodes: None,
        }
    }

    pub(super) fn selected_card(&self) -> Option<&ContinueCard> {
        self.table_state
            .selected()
            .and_then(|idx| self.cards.get(idx))
    }

    /// Metadata title once the lookup finished, the placeholder until then.
    pub(super) fn card_title(&self, card: &ContinueCard) -> String {
        match self.details.get(&(card.key().kind, card.key().id.clone())) {
            Some(DetailsState::Ready(details)) => {
                display_title(details).unwrap_or_else(|| card.title.clone())
            }
            _ => card.title.clone(),
        }
    }

    pub(super) fn details_loading(&self, card: &ContinueCard) -> bool {
        matches!(
            self.details.get(&(card.key().kind, card.key().id.clone())),
            Some(DetailsState::Loading)
        )
    }
}

/// What the player panel shows.
#[derive(Debug, Clone)]
pub(super) struct PlayerLine {
    pub(super) state: &'static str,
    pub(super) text: String,
}

pub(crate) fn run_tui(db: &Database, settings: &Settings, metadata: HttpMetadata) -> Result<()> {
    let host = ProcessHost::from_command_line(&settings.player_command)?;
    let mut player = PlaybackSession::new(host, settings.watchdog);
    let mut progress = ProgressStore::open(db);
    let mut watchlist = WatchlistStore::open(db);
    let (fetch_tx, fetch_rx) = mpsc::channel::<FetchResult>();
    let fetcher = Fetcher::new(metadata, fetch_tx);

    let mut guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut dashboard = Dashboard::new();
    refresh_cards(&mut dashboard, &progress, None);
    dashboard.status = if dashboard.cards.is_empty() {
        status_info("Nothing to continue yet. Start something with `streamtrack play`.")
    } else {
        status_info("Ready.")
    };
    let mut last_reload = Instant::now();

    loop {
        drain_fetch_results(&fetch_rx, &mut dashboard, &fetcher);
        ensure_card_details(&mut dashboard, &fetcher);

        if player.tick_watchdog(Instant::now()) == Some(WatchdogVerdict::Tripped) {
            dashboard.status =
                status_error("Player is unreachable. Press p to try the next provider.");
            dashboard.pending_notice = Some(unreachable_notice(&player));
        }

        if last_reload.elapsed() >= RELOAD_INTERVAL {
            progress.reload();
            let keep = dashboard.selected_card().map(|card| card.key().clone());
            refresh_cards(&mut dashboard, &progress, keep.as_ref());
            last_reload = Instant::now();
        }

        let rows: Vec<EpisodeRow> = dashboard
            .episodes
            .as_ref()
            .and_then(|panel| panel.navigator.as_ref())
            .map(|navigator| episode_rows(navigator, &progress))
            .unwrap_or_default();
        let player_line = now_playing(&player);
        let on_watchlist = dashboard
            .selected_card()
            .is_some_and(|card| watchlist.contains(card.key().kind, &card.key().id));
        terminal.draw(|frame| draw_tui(frame, &mut dashboard, &rows, &player_line, on_watchlist))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if dashboard.pending_notice.is_some() {
            dashboard.pending_notice = None;
            continue;
        }

        if let Some(dialog) = dashboard.pending_delete.clone() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    dashboard.pending_delete = None;
                    if progress.remove_entry(&dialog.key) {
                        dashboard.status = status_info(&format!("Removed {}", dialog.title));
                    } else {
                        dashboard.status = status_error("Remove failed: entry no longer exists.");
                    }
                    refresh_cards(&mut dashboard, &progress, None);
                }
                KeyCode::Esc | KeyCode::Char('n') => {
                    dashboard.pending_delete = None;
                    dashboard.status = status_info("Remove canceled.");
                }
                _ => {}
            }
            continue;
        }

        // Keys shared by both panes.
        match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('x') => {
                player.stop();
                dashboard.status = status_info("Playback stopped.");
                continue;
            }
            KeyCode::Char('p') => {
                dashboard.status = switch_to_next_provider(&mut player, &mut progress);
                dashboard.pending_notice = mount_failure_notice(&player);
                continue;
            }
            _ => {}
        }

        if let Some(panel) = dashboard.episodes.as_mut() {
            let row_count = rows.len();
            match key.code {
                KeyCode::Esc | KeyCode::Backspace => {
                    dashboard.episodes = None;
                    dashboard.status = status_info("Back to continue watching.");
                }
                KeyCode::Up => {
                    if let Some(selected) = panel.table_state.selected() {
                        panel.table_state.select(Some(selected.saturating_sub(1)));
                    }
                }
                KeyCode::Down => {
                    if let Some(selected) = panel.table_state.selected()
                        && row_count > 0
                    {
                        panel
                            .table_state
                            .select(Some((selected + 1).min(row_count - 1)));
                    }
                }
                KeyCode::Left | KeyCode::Right => {
                    let target = panel.navigator.as_ref().and_then(|navigator| {
                        if key.code == KeyCode::Left {
                            navigator.previous_season()
                        } else {
                            navigator.next_season()
                        }
                    });
                    if let Some(season) = target
                        && let Some(navigator) = panel.navigator.as_mut()
                        && let Some(request) = navigator.select_season(season)
                    {
                        panel.table_state.select(None);
                        fetcher.request_season(request);
                    }
                }
                KeyCode::Enter => {
                    let selected = panel.table_state.selected().and_then(|idx| rows.get(idx));
                    dashboard.status = match selected {
                        Some(row) => play_selected_episode(
                            &panel.show_id,
                            row,
                            settings,
                            &mut player,
                            &mut progress,
                        ),
                        None => status_error("No episode selected."),
                    };
                    dashboard.pending_notice = mount_failure_notice(&player);
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Up => {
                if let Some(selected) = dashboard.table_state.selected() {
                    dashboard.table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(selected) = dashboard.table_state.selected()
                    && !dashboard.cards.is_empty()
                {
                    let next = (selected + 1).min(dashboard.cards.len() - 1);
                    dashboard.table_state.select(Some(next));
                }
            }
            KeyCode::Left => dashboard.action = dashboard.action.move_left(),
            KeyCode::Right => dashboard.action = dashboard.action.move_right(),
            KeyCode::Char('r') => {
                progress.reload();
                dashboard
                    .details
                    .retain(|_, state| !matches!(state, DetailsState::Unavailable));
                let keep = dashboard.selected_card().map(|card| card.key().clone());
                refresh_cards(&mut dashboard, &progress, keep.as_ref());
                dashboard.status = status_info("Refreshed.");
            }
            KeyCode::Char('w') => {
                let Some(card) = dashboard.selected_card() else {
                    continue;
                };
                let (kind, id) = (card.key().kind, card.key().id.clone());
                let title = dashboard.card_title(card);
                let artwork = match dashboard.details.get(&(kind, id.clone())) {
                    Some(DetailsState::Ready(details)) => super::metadata::artwork_ref(details),
                    _ => None,
                };
                dashboard.status = if watchlist.toggle(kind, &id, &title, artwork) {
                    status_info(&format!("Added {} to the watchlist.", truncate(&title, 40)))
                } else {
                    status_info(&format!("Removed {} from the watchlist.", truncate(&title, 40)))
                };
            }
            KeyCode::Char('d') => {
                let Some(card) = dashboard.selected_card() else {
                    dashboard.status = status_error("Remove failed: no entry selected.");
                    continue;
                };
                dashboard.pending_delete = Some(PendingDelete {
                    key: card.key().clone(),
                    title: dashboard.card_title(card),
                });
                dashboard.status =
                    status_info("Confirm remove: y/Enter to remove, n/Esc to cancel.");
            }
            KeyCode::Enter => {
                let Some(card) = dashboard.selected_card().cloned() else {
                    continue;
                };
                dashboard.status = match dashboard.action {
                    TuiAction::Episodes => open_episode_panel(&mut dashboard, &card, &fetcher),
                    TuiAction::Provider => switch_to_next_provider(&mut player, &mut progress),
                    action => run_card_action(&card, action, settings, &mut player, &mut progress),
                };
                dashboard.pending_notice = mount_failure_notice(&player);
                let keep = card.key().clone();
                refresh_cards(&mut dashboard, &progress, Some(&keep));
            }
            _ => {}
        }
    }

    player.stop();
    terminal.show_cursor()?;
    guard.restore()?;
    Ok(())
}
