mod host;
mod watchdog;

use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::db::KeyValueStore;

use super::media::{MediaDescriptor, PlaybackOptions};
use super::progress::ProgressStore;
use super::providers::{self, ProviderKey, ResolutionFailure};

pub(crate) use host::{PlayerHost, ProcessHost, default_player_command};
pub(crate) use watchdog::{Watchdog, WatchdogVerdict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FailureReason {
    Resolution(ResolutionFailure),
    /// The watchdog or an external signal saw the player leave its page.
    PlayerUnreachable,
    MountFailed(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution(failure) => write!(f, "{failure}"),
            Self::PlayerUnreachable => f.write_str("player is not available on this provider"),
            Self::MountFailed(detail) => write!(f, "player failed to start: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    Loading,
    Playing,
    Failed(FailureReason),
}

impl SessionState {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Playing => "PLAYING",
            Self::Failed(_) => "FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum SessionError {
    #[error("no playback session is active")]
    NotActive,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchdogSettings {
    pub(crate) interval: Duration,
    pub(crate) attempts: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            attempts: 10,
        }
    }
}

/// The single active embedded player. Owned by whoever drives playback and
/// destroyed explicitly through [`PlaybackSession::stop`].
pub(crate) struct PlaybackSession<H: PlayerHost> {
    host: H,
    state: SessionState,
    descriptor: Option<MediaDescriptor>,
    options: PlaybackOptions,
    active_provider: Option<ProviderKey>,
    active_url: Option<Url>,
    mounted: Option<H::Handle>,
    watchdog: Option<Watchdog>,
    next_check: Option<Instant>,
    watchdog_settings: WatchdogSettings,
}

impl<H: PlayerHost> PlaybackSession<H> {
    pub(crate) fn new(host: H, watchdog_settings: WatchdogSettings) -> Self {
        Self {
            host,
            state: SessionState::Idle,
            descriptor: None,
            options: PlaybackOptions::default(),
            active_provider: None,
            active_url: None,
            mounted: None,
            watchdog: None,
            next_check: None,
            watchdog_settings,
        }
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn descriptor(&self) -> Option<&MediaDescriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn options(&self) -> &PlaybackOptions {
        &self.options
    }

    pub(crate) fn active_provider(&self) -> Option<ProviderKey> {
        self.active_provider
    }

    pub(crate) fn active_url(&self) -> Option<&Url> {
        self.active_url.as_ref()
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    #[cfg(test)]
    pub(crate) fn host(&self) -> &H {
        &self.host
    }

    pub(crate) fn start<K: KeyValueStore>(
        &mut self,
        descriptor: MediaDescriptor,
        options: PlaybackOptions,
        default_provider: Option<ProviderKey>,
        progress: &mut ProgressStore<K>,
    ) -> &SessionState {
        self.teardown();
        self.state = SessionState::Loading;
        tracing::info!(media = %descriptor.short_label(), "starting playback");

        let selected = providers::select_provider(descriptor.kind, default_provider);
        self.descriptor = Some(descriptor);
        self.options = options;
        match selected {
            Ok(provider) => self.mount_provider(provider, progress),
            Err(failure) => self.fail(FailureReason::Resolution(failure)),
        }
        &self.state
    }

    pub(crate) fn switch_provider<K: KeyValueStore>(
        &mut self,
        provider: ProviderKey,
        progress: &mut ProgressStore<K>,
    ) -> Result<&SessionState, SessionError> {
        if self.state == SessionState::Idle || self.descriptor.is_none() {
            return Err(SessionError::NotActive);
        }
        tracing::info!(%provider, "switching provider");
        self.release_player();
        self.state = SessionState::Loading;
        self.mount_provider(provider, progress);
        Ok(&self.state)
    }

    /// Watchdog or external failure signal. Keeps the descriptor so another
    /// provider can be tried at the same position.
    pub(crate) fn report_failure(&mut self) -> &SessionState {
        if self.state == SessionState::Idle {
            return &self.state;
        }
        self.fail(FailureReason::PlayerUnreachable);
        &self.state
    }

    /// Unconditional teardown. Calling it with nothing mounted is a no-op.
    pub(crate) fn stop(&mut self) -> &SessionState {
        if self.state != SessionState::Idle {
            tracing::info!("stopping playback");
        }
        self.teardown();
        &self.state
    }

    /// Runs one watchdog check when the interval has elapsed.
    pub(crate) fn tick_watchdog(&mut self, now: Instant) -> Option<WatchdogVerdict> {
        let due = self.next_check?;
        if now < due {
            return None;
        }
        let verdict = self.check_watchdog();
        self.next_check = match verdict {
            WatchdogVerdict::Pending => self.watchdog.as_ref().map(|dog| now + dog.interval()),
            WatchdogVerdict::Tripped | WatchdogVerdict::Disarmed => None,
        };
        Some(verdict)
    }

    /// Single watchdog observation regardless of the interval.
    pub(crate) fn check_watchdog(&mut self) -> WatchdogVerdict {
        let (Some(dog), Some(handle)) = (self.watchdog.as_mut(), self.mounted.as_mut()) else {
            return WatchdogVerdict::Disarmed;
        };
        let location = self.host.location(handle);
        let verdict = dog.observe(location.as_deref());
        match verdict {
            WatchdogVerdict::Tripped => {
                tracing::warn!(provider = ?self.active_provider, "player left the embed page");
                self.watchdog = None;
                self.next_check = None;
                self.report_failure();
            }
            WatchdogVerdict::Disarmed => {
                self.watchdog = None;
                self.next_check = None;
            }
            WatchdogVerdict::Pending => {}
        }
        verdict
    }

    pub(crate) fn player_active(&mut self) -> bool {
        match self.mounted.as_mut() {
            Some(handle) => self.host.is_active(handle),
            None => false,
        }
    }

    fn mount_provider<K: KeyValueStore>(
        &mut self,
        provider: ProviderKey,
        progress: &mut ProgressStore<K>,
    ) {
        let Some(descriptor) = self.descriptor.as_ref() else {
            return;
        };
        self.active_provider = Some(provider);
        let url = match providers::resolve(provider, descriptor, &self.options) {
            Ok(url) => url,
            Err(failure) => {
                tracing::warn!(%provider, %failure, "provider resolution failed");
                self.fail(FailureReason::Resolution(failure));
                return;
            }
        };

        match self.host.mount(&url) {
            Ok(handle) => {
                let key = descriptor.history_key();
                self.mounted = Some(handle);
                self.watchdog = Some(Watchdog::arm(
                    url.path(),
                    self.watchdog_settings.attempts,
                    self.watchdog_settings.interval,
                ));
                self.next_check = Some(Instant::now() + self.watchdog_settings.interval);
                self.active_url = Some(url);
                self.state = SessionState::Playing;
                if progress.ensure_entry(&key) {
                    tracing::debug!(kind = %key.kind, id = %key.id, "created history entry");
                }
            }
            Err(err) => {
                tracing::warn!(%provider, error = %err, "player mount failed");
                self.fail(FailureReason::MountFailed(format!("{err:#}")));
            }
        }
    }

    fn fail(&mut self, reason: FailureReason) {
        self.release_player();
        self.state = SessionState::Failed(reason);
    }

    fn release_player(&mut self) {
        self.watchdog = None;
        self.next_check = None;
        self.active_url = None;
        if let Some(handle) = self.mounted.take() {
            self.host.unmount(handle);
        }
    }

    fn teardown(&mut self) {
        self.release_player();
        self.descriptor = None;
        self.options = PlaybackOptions::default();
        self.active_provider = None;
        self.state = SessionState::Idle;
    }
}

impl<H: PlayerHost> Drop for PlaybackSession<H> {
    fn drop(&mut self) {
        self.release_player();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingHost;
    use super::*;
    use crate::app::media::{HistoryKey, MediaKind};
    use crate::db::memory::MemoryStore;

    fn session() -> PlaybackSession<RecordingHost> {
        PlaybackSession::new(RecordingHost::default(), WatchdogSettings::default())
    }

    #[test]
    fn start_mounts_default_provider_and_creates_history() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();

        let state = session
            .start(
                MediaDescriptor::tv("42", 2, 5),
                PlaybackOptions::default(),
                Some(ProviderKey::FluxLine),
                &mut progress,
            )
            .clone();

        assert_eq!(state, SessionState::Playing);
        assert_eq!(session.active_provider(), Some(ProviderKey::FluxLine));
        let url = session.active_url().expect("mounted url");
        assert!(url.path().ends_with("/2/5"), "{url}");
        assert!(progress.entry(&HistoryKey::tv("42", 2, 5)).is_some());
    }

    #[test]
    fn start_falls_back_when_default_is_incompatible() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(
            MediaDescriptor::anime("31", None, 1),
            PlaybackOptions::default(),
            Some(ProviderKey::Vidking),
            &mut progress,
        );
        assert_eq!(session.active_provider(), Some(ProviderKey::FluxLine));
    }

    #[test]
    fn start_tears_down_previous_player() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress);
        session.start(MediaDescriptor::movie("2"), PlaybackOptions::default(), None, &mut progress);
        assert_eq!(session.host().mounted.len(), 2);
        assert_eq!(session.host().unmounted, 1);
    }

    #[test]
    fn missing_identifier_fails_without_mounting() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        let state = session
            .start(MediaDescriptor::movie(""), PlaybackOptions::default(), None, &mut progress)
            .clone();
        assert_eq!(
            state,
            SessionState::Failed(FailureReason::Resolution(ResolutionFailure::MissingIdentifier))
        );
        assert!(session.host().mounted.is_empty());
        assert!(progress.entries().is_empty());
    }

    #[test]
    fn switch_to_incompatible_provider_fails_but_keeps_descriptor() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(
            MediaDescriptor::tv("42", 2, 5),
            PlaybackOptions::default(),
            Some(ProviderKey::FluxLine),
            &mut progress,
        );

        let state = session
            .switch_provider(ProviderKey::PulseView, &mut progress)
            .expect("session active")
            .clone();
        assert_eq!(
            state,
            SessionState::Failed(FailureReason::Resolution(ResolutionFailure::UnsupportedKind {
                provider: ProviderKey::PulseView,
                kind: MediaKind::Tv,
            }))
        );
        assert!(!session.is_mounted());
        assert_eq!(session.descriptor(), Some(&MediaDescriptor::tv("42", 2, 5)));

        let recovered = session
            .switch_provider(ProviderKey::NovaEmbed, &mut progress)
            .expect("failed sessions can switch")
            .clone();
        assert_eq!(recovered, SessionState::Playing);
    }

    #[test]
    fn switch_provider_requires_active_session() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        assert_eq!(
            session.switch_provider(ProviderKey::Vidking, &mut progress),
            Err(SessionError::NotActive)
        );
    }

    #[test]
    fn switch_provider_keeps_options() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        let options = PlaybackOptions::default().with_start_at(90.0);
        session.start(MediaDescriptor::movie("603"), options.clone(), None, &mut progress);
        session
            .switch_provider(ProviderKey::PulseView, &mut progress)
            .expect("switch");
        assert_eq!(session.options(), &options);
        let url = session.active_url().expect("mounted");
        assert_eq!(url.query(), Some("start=90"));
    }

    #[test]
    fn stop_twice_is_a_no_op() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress);
        assert_eq!(session.stop(), &SessionState::Idle);
        assert_eq!(session.stop(), &SessionState::Idle);
        assert_eq!(session.host().unmounted, 1);
        assert!(session.descriptor().is_none());
        assert!(session.active_provider().is_none());
    }

    #[test]
    fn report_failure_releases_player_and_keeps_descriptor() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress);
        assert_eq!(
            session.report_failure(),
            &SessionState::Failed(FailureReason::PlayerUnreachable)
        );
        assert!(!session.is_mounted());
        assert!(session.descriptor().is_some());
    }

    #[test]
    fn report_failure_while_idle_stays_idle() {
        let mut session = session();
        assert_eq!(session.report_failure(), &SessionState::Idle);
    }

    #[test]
    fn watchdog_trips_once_when_player_navigates_away() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(
            MediaDescriptor::tv("42", 1, 1),
            PlaybackOptions::default(),
            Some(ProviderKey::Vidking),
            &mut progress,
        );
        session.host.location = Some("https://www.vidking.net/not-found".to_string());

        assert_eq!(session.check_watchdog(), WatchdogVerdict::Tripped);
        assert_eq!(
            session.state(),
            &SessionState::Failed(FailureReason::PlayerUnreachable)
        );
        assert_eq!(session.check_watchdog(), WatchdogVerdict::Disarmed);
    }

    #[test]
    fn unobservable_player_is_assumed_healthy() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = PlaybackSession::new(
            RecordingHost::default(),
            WatchdogSettings {
                interval: Duration::from_millis(1),
                attempts: 2,
            },
        );
        session.start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress);
        assert_eq!(session.check_watchdog(), WatchdogVerdict::Pending);
        assert_eq!(session.check_watchdog(), WatchdogVerdict::Disarmed);
        assert_eq!(session.state(), &SessionState::Playing);
    }

    #[test]
    fn tick_waits_for_interval() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress);
        let now = Instant::now();
        assert_eq!(session.tick_watchdog(now), None);
        assert_eq!(
            session.tick_watchdog(now + Duration::from_secs(1)),
            Some(WatchdogVerdict::Pending)
        );
    }

    #[test]
    fn mount_error_is_a_recoverable_failure() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let host = RecordingHost {
            refuse_mounts: true,
            ..RecordingHost::default()
        };
        let mut session = PlaybackSession::new(host, WatchdogSettings::default());
        let state = session
            .start(MediaDescriptor::movie("1"), PlaybackOptions::default(), None, &mut progress)
            .clone();
        assert!(matches!(state, SessionState::Failed(FailureReason::MountFailed(_))));
        assert!(session.descriptor().is_some());
    }

    #[test]
    fn progress_after_stop_is_still_recorded() {
        let kv = MemoryStore::default();
        let mut progress = ProgressStore::open(&kv);
        let mut session = session();
        session.start(MediaDescriptor::movie("550"), PlaybackOptions::default(), None, &mut progress);
        session.stop();
        progress.record_progress(HistoryKey::movie("550"), 300.0, 8000.0);
        assert_eq!(progress.get_progress(&HistoryKey::movie("550")), 300.0);
    }
}
