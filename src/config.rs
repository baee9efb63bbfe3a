use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::app::{MediaKind, PlaybackOptions, ProviderKey, WatchdogSettings, default_player_command};
use crate::paths::default_database_path;

pub(crate) const DEFAULT_METADATA_URL: &str = "https://ez-streaming-api.vercel.app/api/tmdb";
pub(crate) const DEFAULT_COLOR: &str = "#66ccff";

/// Runtime settings, read from `STREAMTRACK_*` environment variables.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) database_path: PathBuf,
    pub(crate) metadata_url: String,
    pub(crate) default_provider: ProviderKey,
    pub(crate) player_command: String,
    pub(crate) color: String,
    pub(crate) watchdog: WatchdogSettings,
}

impl Settings {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_path = match read("STREAMTRACK_DB") {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };

        let default_provider = match read("STREAMTRACK_PROVIDER") {
            Some(raw) => raw.parse::<ProviderKey>().unwrap_or_else(|err| {
                tracing::warn!(%raw, error = %err, "ignoring STREAMTRACK_PROVIDER");
                ProviderKey::Vidking
            }),
            None => ProviderKey::Vidking,
        };

        let defaults = WatchdogSettings::default();
        let watchdog = WatchdogSettings {
            interval: read("STREAMTRACK_WATCHDOG_INTERVAL_MS")
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            attempts: read("STREAMTRACK_WATCHDOG_ATTEMPTS")
                .and_then(|raw| raw.parse::<u32>().ok())
                .unwrap_or(defaults.attempts),
        };

        Ok(Self {
            database_path,
            metadata_url: read("STREAMTRACK_METADATA_URL")
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string()),
            default_provider,
            player_command: read("STREAMTRACK_PLAYER")
                .unwrap_or_else(|| default_player_command().to_string()),
            color: read("STREAMTRACK_COLOR").unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            watchdog,
        })
    }

    /// Baseline options for a new session: accent color and autoplay, plus
    /// next-episode and episode-selector controls for shows.
    pub(crate) fn default_options(&self, kind: MediaKind) -> PlaybackOptions {
        let show_controls = (kind == MediaKind::Tv).then_some(true);
        PlaybackOptions {
            color: Some(self.color.clone()),
            autoplay: Some(true),
            next_episode: show_controls,
            episode_selector: show_controls,
            ..PlaybackOptions::default()
        }
    }
}

#[cfg(test)]
impl Settings {
    /// Defaults everywhere, with a database path that needs no data directory.
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup(|name| {
            (name == "STREAMTRACK_DB").then(|| "streamtrack-test.db".to_string())
        })
        .expect("test settings")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|name| vars.get(name).cloned()).expect("settings")
    }

    #[test]
    fn explicit_values_override_defaults() {
        let settings = settings(&[
            ("STREAMTRACK_DB", "/tmp/st.db"),
            ("STREAMTRACK_PROVIDER", "NovaEmbed"),
            ("STREAMTRACK_PLAYER", "firefox --kiosk"),
            ("STREAMTRACK_WATCHDOG_INTERVAL_MS", "250"),
            ("STREAMTRACK_WATCHDOG_ATTEMPTS", "4"),
        ]);
        assert_eq!(settings.database_path, PathBuf::from("/tmp/st.db"));
        assert_eq!(settings.default_provider, ProviderKey::NovaEmbed);
        assert_eq!(settings.player_command, "firefox --kiosk");
        assert_eq!(settings.watchdog.interval, Duration::from_millis(250));
        assert_eq!(settings.watchdog.attempts, 4);
        assert_eq!(settings.metadata_url, DEFAULT_METADATA_URL);
    }

    #[test]
    fn invalid_values_fall_back() {
        let settings = settings(&[
            ("STREAMTRACK_DB", "/tmp/st.db"),
            ("STREAMTRACK_PROVIDER", "nope"),
            ("STREAMTRACK_WATCHDOG_INTERVAL_MS", "0"),
            ("STREAMTRACK_WATCHDOG_ATTEMPTS", "many"),
            ("STREAMTRACK_COLOR", "   "),
        ]);
        assert_eq!(settings.default_provider, ProviderKey::Vidking);
        assert_eq!(settings.watchdog.interval, Duration::from_millis(500));
        assert_eq!(settings.watchdog.attempts, 10);
        assert_eq!(settings.color, DEFAULT_COLOR);
    }

    #[test]
    fn show_options_enable_episode_controls() {
        let settings = settings(&[("STREAMTRACK_DB", "/tmp/st.db")]);
        let tv = settings.default_options(MediaKind::Tv);
        assert_eq!(tv.autoplay, Some(true));
        assert_eq!(tv.next_episode, Some(true));
        assert_eq!(tv.episode_selector, Some(true));

        let movie = settings.default_options(MediaKind::Movie);
        assert_eq!(movie.color.as_deref(), Some(DEFAULT_COLOR));
        assert_eq!(movie.next_episode, None);
    }
}
