mod continue_watching;
mod episode;
mod media;
mod metadata;
mod progress;
mod providers;
mod session;
mod tui;

#[cfg(test)]
mod tests;

use std::io::{self, BufRead};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};

use crate::cli::{Cli, Command, MediaArgs, OptionArgs, WatchlistAction};
use crate::config::Settings;
use crate::db::{Database, KeyValueStore};

use self::continue_watching::{CONTINUE_WATCHING_LIMIT, ContinueCard, build_cards};
use self::episode::{EpisodeNavigator, episode_rows, format_timestamp, format_updated_at, truncate};
use self::media::HistoryKey;
use self::metadata::{
    HttpMetadata, MetadataSource, SearchHit, artwork_ref, display_title, fetch_details,
    fetch_season, fetch_trending, search_multi,
};
use self::progress::{ProgressStore, WatchlistStore, parse_player_message};
use self::providers::{list_compatible_providers, next_compatible_provider, resolve};
use self::session::{PlaybackSession, ProcessHost, SessionState, WatchdogVerdict};

pub(crate) use self::media::{MediaDescriptor, MediaKind, PlaybackOptions};
pub(crate) use self::providers::ProviderKey;
pub(crate) use self::session::{WatchdogSettings, default_player_command};

const PLAY_POLL: Duration = Duration::from_millis(200);

pub fn run(cli: Cli, settings: &Settings) -> Result<()> {
    let db = open_db(settings)?;
    let metadata = HttpMetadata::new(&settings.metadata_url);

    match cli.command {
        Some(Command::Play {
            media,
            provider,
            options,
        }) => run_play(&db, settings, &media, provider.as_deref(), &options)?,
        Some(Command::Providers { kind }) => run_providers(kind),
        Some(Command::Resolve {
            provider,
            media,
            options,
        }) => run_resolve(settings, &provider, &media, &options)?,
        Some(Command::Ingest) => run_ingest(&db, &metadata)?,
        Some(Command::Continue { limit }) => {
            let progress = ProgressStore::open(&db);
            print_continue_watching(&build_cards(&progress, &metadata, limit));
        }
        Some(Command::Episodes { id, season }) => run_episodes(&db, &metadata, &id, season)?,
        Some(Command::Watchlist { action }) => run_watchlist(&db, &metadata, action)?,
        Some(Command::Search { query }) => run_search(&db, &metadata, &query)?,
        Some(Command::Trending { kind }) => run_trending(&db, &metadata, kind)?,
        Some(Command::Tui) | None => tui::run_tui(&db, settings, metadata)?,
    }

    Ok(())
}

fn open_db(settings: &Settings) -> Result<Database> {
    let db = Database::open(&settings.database_path)?;
    db.migrate()?;
    Ok(db)
}

/// Configured defaults, caller overrides, then the saved position when no
/// explicit start offset was given.
fn session_options<K: KeyValueStore>(
    settings: &Settings,
    descriptor: &MediaDescriptor,
    overrides: &PlaybackOptions,
    progress: &ProgressStore<K>,
) -> PlaybackOptions {
    let options = settings
        .default_options(descriptor.kind)
        .merged_with(overrides);
    if options.start_at.is_some() {
        return options;
    }
    let resume = progress.get_progress(&descriptor.history_key());
    options.with_start_at(resume)
}

fn run_play(
    db: &Database,
    settings: &Settings,
    media: &MediaArgs,
    provider: Option<&str>,
    overrides: &OptionArgs,
) -> Result<()> {
    let preferred = match provider {
        Some(raw) => raw.parse::<ProviderKey>()?,
        None => settings.default_provider,
    };
    let descriptor = media.descriptor();
    let mut progress = ProgressStore::open(db);
    let options = session_options(settings, &descriptor, &overrides.overrides(), &progress);
    let host = ProcessHost::from_command_line(&settings.player_command)?;
    let mut session = PlaybackSession::new(host, settings.watchdog);

    let label = descriptor.short_label();
    let state = session
        .start(descriptor, options, Some(preferred), &mut progress)
        .clone();
    if let SessionState::Failed(reason) = state {
        println!("Playback failed for {label}: {reason}");
        return Ok(());
    }
    print_now_playing(&session);
    println!("Press Enter to stop playback.");

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        let _ = stop_tx.send(());
    });

    let mut player_exit_reported = false;
    loop {
        match stop_rx.recv_timeout(PLAY_POLL) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if session.tick_watchdog(Instant::now()) == Some(WatchdogVerdict::Tripped) {
            let fallback = session
                .descriptor()
                .zip(session.active_provider())
                .and_then(|(descriptor, current)| {
                    next_compatible_provider(descriptor.kind, current)
                });
            match fallback {
                Some(next) => {
                    println!("Player is unreachable, switching to {next}.");
                    session.switch_provider(next, &mut progress)?;
                    print_now_playing(&session);
                }
                None => {
                    println!("Player is unreachable and no other provider is available.");
                    break;
                }
            }
        }

        // Launchers like xdg-open hand the URL off and exit right away.
        if !player_exit_reported && session.is_mounted() && !session.player_active() {
            tracing::info!("player process exited");
            player_exit_reported = true;
        }
    }

    session.stop();
    println!("Playback stopped.");
    Ok(())
}

fn print_now_playing<H: session::PlayerHost>(session: &PlaybackSession<H>) {
    let (Some(descriptor), Some(provider)) = (session.descriptor(), session.active_provider())
    else {
        return;
    };
    println!("Playing {} via {provider}", descriptor.short_label());
    if let Some(url) = session.active_url() {
        println!("  {url}");
    }
    if let Some(start) = session.options().start_seconds() {
        println!("  resuming at {}", format_timestamp(start as f64));
    }
}

fn run_providers(kind: MediaKind) {
    let providers = list_compatible_providers(kind);
    if providers.is_empty() {
        println!("No provider can play {kind} content.");
        return;
    }
    println!("{:<4} {:<12} {:<12}", "#", "KEY", "NAME");
    for (idx, provider) in providers.iter().enumerate() {
        println!("{:<4} {:<12} {:<12}", idx + 1, provider.key, provider.name);
    }
}

fn run_resolve(
    settings: &Settings,
    provider: &str,
    media: &MediaArgs,
    overrides: &OptionArgs,
) -> Result<()> {
    let provider = provider.parse::<ProviderKey>()?;
    let descriptor = media.descriptor();
    let options = settings
        .default_options(descriptor.kind)
        .merged_with(&overrides.overrides());
    let url = resolve(provider, &descriptor, &options)
        .with_context(|| format!("cannot resolve {} on {provider}", descriptor.short_label()))?;
    println!("{url}");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IngestSummary {
    pub(crate) applied: usize,
    pub(crate) discarded: usize,
    pub(crate) completed: usize,
}

/// Applies every well-formed player message from `reader`. `on_refresh` runs
/// once per completion signal so the continue-watching view can be rebuilt.
pub(crate) fn ingest_messages<K: KeyValueStore, R: BufRead>(
    reader: R,
    progress: &mut ProgressStore<K>,
    mut on_refresh: impl FnMut(&ProgressStore<K>),
) -> Result<IngestSummary> {
    let completions = progress.subscribe_completions();
    let mut summary = IngestSummary::default();

    for line in reader.lines() {
        let line = line.context("failed to read player message")?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_player_message(&line) {
            Some(event) => {
                progress.apply_player_event(&event);
                summary.applied += 1;
            }
            None => summary.discarded += 1,
        }
        while completions.try_recv().is_ok() {
            summary.completed += 1;
            on_refresh(&*progress);
        }
    }
    Ok(summary)
}

fn run_ingest(db: &Database, metadata: &dyn MetadataSource) -> Result<()> {
    let mut progress = ProgressStore::open(db);
    let stdin = io::stdin();
    let summary = ingest_messages(stdin.lock(), &mut progress, |store| {
        print_continue_watching(&build_cards(store, metadata, CONTINUE_WATCHING_LIMIT));
    })?;
    println!(
        "Applied {} player message(s), discarded {}, {} completion(s).",
        summary.applied, summary.discarded, summary.completed
    );
    Ok(())
}

fn print_continue_watching(cards: &[ContinueCard]) {
    if cards.is_empty() {
        println!("Nothing to continue yet. Run `streamtrack play` first.");
        return;
    }

    println!(
        "{:<7} {:<12} {:<36} {:<8} {:<18} {:<16}",
        "KIND", "ID", "TITLE", "EP", "PROGRESS", "UPDATED"
    );
    for card in cards {
        let progress = format!(
            "{} ({:.0}%)",
            format_timestamp(card.entry.progress_seconds),
            card.percent
        );
        println!(
            "{:<7} {:<12} {:<36} {:<8} {:<18} {:<16}",
            card.key().kind,
            truncate(&card.key().id, 12),
            truncate(&card.title, 36),
            card.episode_label().unwrap_or_else(|| "-".to_string()),
            progress,
            format_updated_at(card.entry.updated_at)
        );
    }
}

fn run_episodes(
    db: &Database,
    metadata: &dyn MetadataSource,
    show_id: &str,
    season: Option<u32>,
) -> Result<()> {
    let details = match fetch_details(metadata, MediaKind::Tv, show_id) {
        Ok(details) => details,
        Err(failure) => {
            tracing::warn!(show = %show_id, %failure, "show lookup failed");
            println!("Show {show_id}");
            println!("  no seasons listed");
            return Ok(());
        }
    };
    let mut navigator = EpisodeNavigator::new(show_id, &details);
    let title = display_title(&details).unwrap_or_else(|| format!("Show {show_id}"));

    let Some(season) = season else {
        println!("{title}");
        if navigator.seasons().is_empty() {
            println!("  no seasons listed");
        }
        for summary in navigator.seasons() {
            let count = summary
                .episode_count
                .map(|count| format!("{count} episodes"))
                .unwrap_or_else(|| "-".to_string());
            println!("  {:>3}  {:<28} {}", summary.number, truncate(&summary.name, 28), count);
        }
        return Ok(());
    };

    let Some(request) = navigator.select_season(season) else {
        bail!("{title} has no season {season}");
    };
    let result = match fetch_season(metadata, &request.show_id, request.season) {
        Ok(value) => Some(value),
        Err(failure) => {
            tracing::warn!(%failure, season, "season lookup failed");
            None
        }
    };
    navigator.apply_episodes(&request, result.as_ref());

    let progress = ProgressStore::open(db);
    let rows = episode_rows(&navigator, &progress);
    if rows.is_empty() {
        println!("{title} season {season}: no episodes available.");
        return Ok(());
    }
    println!("{title} season {season}");
    for row in rows {
        println!(
            "  {:>3}  {:<40} {}",
            row.episode.number,
            truncate(&row.episode.name, 40),
            row.resume_badge()
                .map(|badge| format!("resume {badge}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn run_watchlist(db: &Database, metadata: &dyn MetadataSource, action: WatchlistAction) -> Result<()> {
    let mut watchlist = WatchlistStore::open(db);
    match action {
        WatchlistAction::List => {
            if watchlist.entries().is_empty() {
                println!("Watchlist is empty.");
                return Ok(());
            }
            println!("{:<7} {:<12} {:<40} {:<16}", "KIND", "ID", "TITLE", "ADDED");
            for entry in watchlist.entries() {
                println!(
                    "{:<7} {:<12} {:<40} {:<16}",
                    entry.kind,
                    truncate(&entry.id, 12),
                    truncate(&entry.title, 40),
                    format_updated_at(entry.added_at)
                );
            }
        }
        WatchlistAction::Add { kind, id, title } => {
            let (title, artwork) = match title {
                Some(title) => (title, None),
                None => match fetch_details(metadata, kind, &id) {
                    Ok(details) => (
                        display_title(&details).unwrap_or_else(|| id.clone()),
                        artwork_ref(&details),
                    ),
                    Err(failure) => {
                        tracing::warn!(%failure, "title lookup failed, storing id as title");
                        (id.clone(), None)
                    }
                },
            };
            if watchlist.add(kind, &id, &title, artwork) {
                println!("Added {title} to the watchlist.");
            } else {
                println!("{title} is already on the watchlist.");
            }
        }
        WatchlistAction::Remove { kind, id } => {
            if watchlist.remove(kind, &id) {
                println!("Removed {kind} {id} from the watchlist.");
            } else {
                println!("{kind} {id} is not on the watchlist.");
            }
        }
    }
    Ok(())
}

fn run_search(db: &Database, metadata: &dyn MetadataSource, query: &str) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("search query is empty"));
    }
    let hits = search_multi(metadata, query).unwrap_or_else(|failure| {
        tracing::warn!(%query, %failure, "search failed");
        Vec::new()
    });
    print_hits(db, &hits);
    Ok(())
}

fn run_trending(db: &Database, metadata: &dyn MetadataSource, kind: MediaKind) -> Result<()> {
    let hits = fetch_trending(metadata, kind).unwrap_or_else(|failure| {
        tracing::warn!(%kind, %failure, "trending lookup failed");
        Vec::new()
    });
    print_hits(db, &hits);
    Ok(())
}

fn print_hits(db: &Database, hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No results.");
        return;
    }
    let watchlist = WatchlistStore::open(db);
    let progress = ProgressStore::open(db);
    println!("{:<7} {:<10} {:<44} {:<6} {}", "KIND", "ID", "TITLE", "YEAR", "");
    for hit in hits {
        let mut marks = Vec::new();
        if watchlist.contains(hit.kind, &hit.id) {
            marks.push("watchlist".to_string());
        }
        if hit.kind == MediaKind::Movie {
            let resume = progress.get_progress(&HistoryKey::movie(&hit.id));
            if resume > 0.0 {
                marks.push(format!("resume {}", format_timestamp(resume)));
            }
        }
        println!(
            "{:<7} {:<10} {:<44} {:<6} {}",
            hit.kind,
            truncate(&hit.id, 10),
            truncate(&hit.title, 44),
            hit.year.as_deref().unwrap_or("-"),
            marks.join(", ")
        );
    }
}
