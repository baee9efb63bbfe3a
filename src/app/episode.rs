use chrono::{Local, TimeZone};
use serde_json::Value;

use crate::db::KeyValueStore;

use super::media::{HistoryKey, MediaDescriptor, PlaybackOptions};
use super::progress::ProgressStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeasonSummary {
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) episode_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EpisodeSummary {
    pub(crate) number: u32,
    pub(crate) name: String,
    pub(crate) runtime_minutes: Option<u32>,
    pub(crate) air_date: Option<String>,
}

/// Seasons from a show-details document. Specials (season 0) are skipped.
pub(crate) fn parse_seasons(details: &Value) -> Vec<SeasonSummary> {
    let Some(items) = details.get("seasons").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut seasons = items
        .iter()
        .filter_map(|item| {
            let number = positive_u32(item.get("season_number")?)?;
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Season {number}"));
            Some(SeasonSummary {
                number,
                name,
                episode_count: item.get("episode_count").and_then(positive_u32),
            })
        })
        .collect::<Vec<_>>();
    seasons.sort_by_key(|season| season.number);
    seasons.dedup_by_key(|season| season.number);
    seasons
}

pub(crate) fn parse_episodes(season: &Value) -> Vec<EpisodeSummary> {
    let Some(items) = season.get("episodes").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let number = positive_u32(item.get("episode_number")?)?;
            Some(EpisodeSummary {
                number,
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Episode {number}")),
                runtime_minutes: item.get("runtime").and_then(positive_u32),
                air_date: item
                    .get("air_date")
                    .and_then(Value::as_str)
                    .filter(|date| !date.is_empty())
                    .map(str::to_string),
            })
        })
        .collect()
}

fn positive_u32(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .filter(|number| *number > 0)
        .and_then(|number| u32::try_from(number).ok())
}

/// Identifies one outstanding season fetch. Results are applied only while
/// the token is still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeasonRequest {
    pub(crate) show_id: String,
    pub(crate) season: u32,
    pub(crate) generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EpisodeListing {
    NotLoaded,
    Loading,
    Loaded(Vec<EpisodeSummary>),
    Unavailable,
}

#[derive(Debug)]
pub(crate) struct EpisodeNavigator {
    show_id: String,
    seasons: Vec<SeasonSummary>,
    selected_season: Option<u32>,
    listing: EpisodeListing,
    generation: u64,
}

impl EpisodeNavigator {
    pub(crate) fn new(show_id: impl Into<String>, details: &Value) -> Self {
        Self {
            show_id: show_id.into(),
            seasons: parse_seasons(details),
            selected_season: None,
            listing: EpisodeListing::NotLoaded,
            generation: 0,
        }
    }

    pub(crate) fn show_id(&self) -> &str {
        &self.show_id
    }

    pub(crate) fn seasons(&self) -> &[SeasonSummary] {
        &self.seasons
    }

    pub(crate) fn selected_season(&self) -> Option<u32> {
        self.selected_season
    }

    pub(crate) fn listing(&self) -> &EpisodeListing {
        &self.listing
    }

    pub(crate) fn episodes(&self) -> &[EpisodeSummary] {
        match &self.listing {
            EpisodeListing::Loaded(episodes) => episodes,
            _ => &[],
        }
    }

    /// Starts a fetch for `season`. Re-selecting the season that is already
    /// loaded or loading issues nothing. Unknown season numbers are ignored.
    pub(crate) fn select_season(&mut self, season: u32) -> Option<SeasonRequest> {
        if !self.seasons.iter().any(|known| known.number == season) {
            return None;
        }
        if self.selected_season == Some(season)
            && matches!(
                self.listing,
                EpisodeListing::Loading | EpisodeListing::Loaded(_)
            )
        {
            return None;
        }
        self.generation += 1;
        self.selected_season = Some(season);
        self.listing = EpisodeListing::Loading;
        Some(SeasonRequest {
            show_id: self.show_id.clone(),
            season,
            generation: self.generation,
        })
    }

    /// Applies a finished fetch. `None` is a failed fetch. Returns `false` when
    /// the result was stale and dropped.
    pub(crate) fn apply_episodes(&mut self, request: &SeasonRequest, result: Option<&Value>) -> bool {
        if request.generation != self.generation
            || request.show_id != self.show_id
            || Some(request.season) != self.selected_season
        {
            tracing::debug!(
                show = %request.show_id,
                season = request.season,
                "dropping stale season result"
            );
            return false;
        }
        self.listing = match result {
            Some(value) => EpisodeListing::Loaded(parse_episodes(value)),
            None => EpisodeListing::Unavailable,
        };
        true
    }

    pub(crate) fn next_season(&self) -> Option<u32> {
        let current = self.selected_season?;
        self.seasons
            .iter()
            .map(|season| season.number)
            .find(|number| *number > current)
    }

    pub(crate) fn previous_season(&self) -> Option<u32> {
        let current = self.selected_season?;
        self.seasons
            .iter()
            .rev()
            .map(|season| season.number)
            .find(|number| *number < current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EpisodeRow {
    pub(crate) season: u32,
    pub(crate) episode: EpisodeSummary,
    pub(crate) resume_seconds: f64,
}

impl EpisodeRow {
    pub(crate) fn resume_badge(&self) -> Option<String> {
        (self.resume_seconds > 0.0).then(|| format_timestamp(self.resume_seconds))
    }
}

pub(crate) fn episode_rows<K: KeyValueStore>(
    navigator: &EpisodeNavigator,
    progress: &ProgressStore<K>,
) -> Vec<EpisodeRow> {
    let Some(season) = navigator.selected_season() else {
        return Vec::new();
    };
    navigator
        .episodes()
        .iter()
        .map(|episode| EpisodeRow {
            season,
            resume_seconds: progress.get_progress(&HistoryKey::tv(
                navigator.show_id(),
                season,
                episode.number,
            )),
            episode: episode.clone(),
        })
        .collect()
}

/// Descriptor and options for playing an episode from its saved position.
pub(crate) fn episode_target<K: KeyValueStore>(
    show_id: &str,
    season: u32,
    episode: u32,
    base_options: &PlaybackOptions,
    progress: &ProgressStore<K>,
) -> (MediaDescriptor, PlaybackOptions) {
    let descriptor = MediaDescriptor::tv(show_id, season, episode);
    let resume = progress.get_progress(&descriptor.history_key());
    let mut options = base_options.clone();
    options.start_at = None;
    (descriptor, options.with_start_at(resume))
}

/// `H:MM:SS` from one hour up, `M:SS` below.
pub(crate) fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max.saturating_sub(3)).collect::<String>() + "..."
    } else {
        s.to_string()
    }
}

pub(crate) fn format_updated_at(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
