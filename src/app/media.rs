use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum MediaKind {
    Movie,
    Tv,
    Anime,
}

impl MediaKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::Anime => "anime",
        }
    }

    /// The metadata backend only knows movies and shows; anime is served as tv.
    pub(crate) fn metadata_kind(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv | Self::Anime => "tv",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Tv => "TV Show",
            Self::Anime => "Anime",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" => Ok(Self::Tv),
            "anime" => Ok(Self::Anime),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

/// Provider-independent identity of a playable unit.
#[derive(Debug, Clone)]
pub(crate) struct MediaDescriptor {
    pub(crate) kind: MediaKind,
    pub(crate) id: String,
    pub(crate) secondary_id: Option<String>,
    season: Option<u32>,
    episode: Option<u32>,
}

impl MediaDescriptor {
    pub(crate) fn movie(id: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Movie,
            id: id.into(),
            secondary_id: None,
            season: None,
            episode: None,
        }
    }

    pub(crate) fn tv(id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            kind: MediaKind::Tv,
            id: id.into(),
            secondary_id: None,
            season: Some(season),
            episode: Some(episode),
        }
    }

    pub(crate) fn anime(id: impl Into<String>, secondary_id: Option<String>, episode: u32) -> Self {
        Self {
            kind: MediaKind::Anime,
            id: id.into(),
            secondary_id,
            season: None,
            episode: Some(episode),
        }
    }

    pub(crate) fn new(
        kind: MediaKind,
        id: impl Into<String>,
        secondary_id: Option<String>,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Self {
        match kind {
            MediaKind::Movie => Self::movie(id),
            MediaKind::Tv => Self::tv(id, season.unwrap_or(1), episode.unwrap_or(1)),
            MediaKind::Anime => Self::anime(id, secondary_id, episode.unwrap_or(1)),
        }
    }

    pub(crate) fn season(&self) -> u32 {
        self.season.unwrap_or(1).max(1)
    }

    pub(crate) fn episode(&self) -> u32 {
        self.episode.unwrap_or(1).max(1)
    }

    /// Trimmed primary id, `None` when blank.
    pub(crate) fn primary_id(&self) -> Option<&str> {
        non_blank(&self.id)
    }

    /// Anime providers prefer the secondary id and fall back to the primary one.
    pub(crate) fn anime_id(&self) -> Option<&str> {
        self.secondary_id
            .as_deref()
            .and_then(non_blank)
            .or_else(|| self.primary_id())
    }

    pub(crate) fn history_key(&self) -> HistoryKey {
        HistoryKey::new(self.kind, self.id.trim(), self.season, self.episode)
    }

    pub(crate) fn short_label(&self) -> String {
        match self.kind {
            MediaKind::Movie => format!("movie {}", self.id.trim()),
            MediaKind::Tv => format!(
                "tv {} S{}E{}",
                self.id.trim(),
                self.season(),
                self.episode()
            ),
            MediaKind::Anime => format!("anime {} ep {}", self.id.trim(), self.episode()),
        }
    }
}

impl PartialEq for MediaDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.history_key() == other.history_key()
    }
}

impl Eq for MediaDescriptor {}

fn non_blank(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Identity under which progress is stored. Season and episode only take part
/// for tv. Anime keys carry the episode the position belongs to, outside the
/// identity, so one show keeps one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HistoryKey {
    pub(crate) kind: MediaKind,
    pub(crate) id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) season: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) episode: Option<u32>,
}

impl HistoryKey {
    pub(crate) fn new(
        kind: MediaKind,
        id: impl Into<String>,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Self {
        let (season, episode) = match kind {
            MediaKind::Tv => (
                Some(season.unwrap_or(1).max(1)),
                Some(episode.unwrap_or(1).max(1)),
            ),
            MediaKind::Anime => (None, episode.map(|episode| episode.max(1))),
            MediaKind::Movie => (None, None),
        };
        Self {
            kind,
            id: id.into(),
            season,
            episode,
        }
    }

    pub(crate) fn movie(id: &str) -> Self {
        Self::new(MediaKind::Movie, id, None, None)
    }

    pub(crate) fn tv(id: &str, season: u32, episode: u32) -> Self {
        Self::new(MediaKind::Tv, id, Some(season), Some(episode))
    }

    pub(crate) fn descriptor(&self) -> MediaDescriptor {
        MediaDescriptor::new(self.kind, self.id.clone(), None, self.season, self.episode)
    }

    pub(crate) fn episode_label(&self) -> Option<String> {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => Some(format!("S{season}E{episode}")),
            (None, Some(episode)) => Some(format!("Ep {episode}")),
            _ => None,
        }
    }
}

impl PartialEq for HistoryKey {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.id == other.id
            && (self.kind != MediaKind::Tv
                || (self.season == other.season && self.episode == other.episode))
    }
}

impl Eq for HistoryKey {}

/// Sparse player configuration. `None` means "leave the provider default alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PlaybackOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) autoplay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) next_episode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) episode_selector: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) title_overlay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) start_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) dub: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) subtitle_lang: Option<String>,
}

impl PlaybackOptions {
    pub(crate) fn with_start_at(mut self, seconds: f64) -> Self {
        self.start_at = (seconds > 0.0).then_some(seconds);
        self
    }

    /// Fields set on `overrides` win; everything else is kept from `self`.
    pub(crate) fn merged_with(&self, overrides: &PlaybackOptions) -> PlaybackOptions {
        PlaybackOptions {
            color: overrides.color.clone().or_else(|| self.color.clone()),
            autoplay: overrides.autoplay.or(self.autoplay),
            next_episode: overrides.next_episode.or(self.next_episode),
            episode_selector: overrides.episode_selector.or(self.episode_selector),
            title_overlay: overrides.title_overlay.or(self.title_overlay),
            start_at: overrides.start_at.or(self.start_at),
            server: overrides.server.clone().or_else(|| self.server.clone()),
            dub: overrides.dub.or(self.dub),
            subtitle_lang: overrides
                .subtitle_lang
                .clone()
                .or_else(|| self.subtitle_lang.clone()),
        }
    }

    /// Start offset floored to whole seconds. Negative or non-finite offsets are dropped.
    pub(crate) fn start_seconds(&self) -> Option<u64> {
        self.start_at
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value.floor() as u64)
    }

    /// The six hex digits of a `#rrggbb` color, lowercased.
    pub(crate) fn color_hex(&self) -> Option<String> {
        let raw = self.color.as_deref()?.trim();
        let digits = raw.strip_prefix('#').unwrap_or(raw);
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return None;
        }
        Some(digits.to_ascii_lowercase())
    }

    pub(crate) fn server_name(&self) -> Option<&str> {
        self.server.as_deref().and_then(non_blank)
    }

    pub(crate) fn subtitle_language(&self) -> Option<&str> {
        self.subtitle_lang.as_deref().and_then(non_blank)
    }
}

/// Providers distinguish unset from false, so booleans are always spelled out.
pub(crate) fn bool_param(value: bool) -> String {
    value.to_string()
}
