mod message;
mod watchlist;

use std::sync::mpsc;

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::KeyValueStore;

use super::media::{HistoryKey, MediaKind};

pub(crate) use message::{PlayerEvent, parse_player_message};
pub(crate) use watchlist::WatchlistStore;

pub(crate) const HISTORY_KEY: &str = "history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryEntry {
    #[serde(flatten)]
    pub(crate) key: HistoryKey,
    pub(crate) progress_seconds: f64,
    pub(crate) duration_seconds: f64,
    /// Epoch milliseconds.
    pub(crate) updated_at: i64,
}

impl HistoryEntry {
    pub(crate) fn percent_complete(&self) -> f64 {
        if self.duration_seconds <= 0.0 {
            return 0.0;
        }
        (self.progress_seconds / self.duration_seconds * 100.0).clamp(0.0, 100.0)
    }
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn parse_list<T: DeserializeOwned>(key: &str, raw: Option<&str>) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(key, error = %err, "stored list is corrupt; starting empty");
            Vec::new()
        }
    }
}

/// Reads a JSON list stored under `key`. Missing or corrupt data is an empty list.
pub(crate) fn load_list<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Vec<T> {
    match kv.get(key) {
        Ok(raw) => parse_list(key, raw.as_deref()),
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read stored list; starting empty");
            Vec::new()
        }
    }
}

/// Applies `change` to the freshest stored copy of the list under `key` and
/// writes it back in one step, so writes from another process are merged
/// rather than overwritten. `local` mirrors the stored list afterwards. When
/// the store cannot be written the change lands on `local` alone.
pub(crate) fn update_list<T, R>(
    kv: &dyn KeyValueStore,
    key: &str,
    local: &mut Vec<T>,
    mut change: impl FnMut(&mut Vec<T>) -> R,
) -> R
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = None;
    let result = kv.update(key, &mut |raw| {
        let mut items = parse_list(key, raw.as_deref());
        let outcome = change(&mut items);
        let encoded = serde_json::to_string(&items).context("failed to serialize list")?;
        merged = Some((items, outcome));
        Ok(encoded)
    });
    match (result, merged) {
        (Ok(()), Some((items, outcome))) => {
            *local = items;
            outcome
        }
        (result, _) => {
            if let Err(err) = result {
                tracing::warn!(key, error = %err, "failed to persist list; keeping in-memory copy");
            }
            change(local)
        }
    }
}

fn upsert(entries: &mut Vec<HistoryEntry>, mut entry: HistoryEntry) -> HistoryEntry {
    match entries.iter_mut().find(|existing| existing.key == entry.key) {
        Some(existing) => {
            // An anime report without an episode stays on the recorded one.
            if entry.key.episode.is_none() {
                entry.key.episode = existing.key.episode;
            }
            *existing = entry.clone();
        }
        None => entries.push(entry.clone()),
    }
    entry
}

fn sanitize_seconds(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Owns every `HistoryEntry`. Each write merges into the stored list, so a TUI
/// and an `ingest` process can share one database.
pub(crate) struct ProgressStore<K: KeyValueStore> {
    kv: K,
    entries: Vec<HistoryEntry>,
    completion_listeners: Vec<mpsc::Sender<HistoryKey>>,
}

impl<K: KeyValueStore> ProgressStore<K> {
    pub(crate) fn open(kv: K) -> Self {
        let entries = load_list(&kv, HISTORY_KEY);
        Self {
            kv,
            entries,
            completion_listeners: Vec::new(),
        }
    }

    /// Picks up writes made by another process (e.g. a running `ingest`).
    pub(crate) fn reload(&mut self) {
        self.entries = load_list(&self.kv, HISTORY_KEY);
    }

    pub(crate) fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub(crate) fn entry(&self, key: &HistoryKey) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| &entry.key == key)
    }

    /// Saved position for exactly this key. An anime entry remembers one
    /// episode, so any other episode of the show starts from zero.
    pub(crate) fn get_progress(&self, key: &HistoryKey) -> f64 {
        self.entry(key)
            .filter(|entry| {
                entry.key.kind != MediaKind::Anime
                    || entry.key.episode.unwrap_or(1) == key.episode.unwrap_or(1)
            })
            .map(|entry| entry.progress_seconds)
            .unwrap_or(0.0)
    }

    pub(crate) fn record_progress(
        &mut self,
        key: HistoryKey,
        progress_seconds: f64,
        duration_seconds: f64,
    ) -> HistoryEntry {
        self.record_progress_at(key, progress_seconds, duration_seconds, now_millis())
    }

    pub(crate) fn record_progress_at(
        &mut self,
        key: HistoryKey,
        progress_seconds: f64,
        duration_seconds: f64,
        updated_at: i64,
    ) -> HistoryEntry {
        let duration = sanitize_seconds(duration_seconds);
        let mut progress = sanitize_seconds(progress_seconds);
        if duration > 0.0 {
            progress = progress.min(duration);
        }

        let update = HistoryEntry {
            key,
            progress_seconds: progress,
            duration_seconds: duration,
            updated_at,
        };
        let entry = update_list(&self.kv, HISTORY_KEY, &mut self.entries, |entries| {
            upsert(entries, update.clone())
        });
        tracing::debug!(
            kind = %entry.key.kind,
            id = %entry.key.id,
            progress = entry.progress_seconds,
            duration = entry.duration_seconds,
            "recorded progress"
        );
        entry
    }

    /// Creates a zero-progress entry for an identity that has never been played.
    /// Returns `true` when an entry was created.
    pub(crate) fn ensure_entry(&mut self, key: &HistoryKey) -> bool {
        let fresh = HistoryEntry {
            key: key.clone(),
            progress_seconds: 0.0,
            duration_seconds: 0.0,
            updated_at: now_millis(),
        };
        update_list(&self.kv, HISTORY_KEY, &mut self.entries, |entries| {
            if entries.iter().any(|entry| entry.key == fresh.key) {
                return false;
            }
            entries.push(fresh.clone());
            true
        })
    }

    /// Explicit user removal. Entries are never dropped automatically.
    pub(crate) fn remove_entry(&mut self, key: &HistoryKey) -> bool {
        update_list(&self.kv, HISTORY_KEY, &mut self.entries, |entries| {
            let before = entries.len();
            entries.retain(|entry| &entry.key != key);
            entries.len() != before
        })
    }

    pub(crate) fn subscribe_completions(&mut self) -> mpsc::Receiver<HistoryKey> {
        let (tx, rx) = mpsc::channel();
        self.completion_listeners.push(tx);
        rx
    }

    /// End of content: asks every continue-watching subscriber to refresh.
    pub(crate) fn on_completed(&mut self, key: &HistoryKey) {
        tracing::info!(kind = %key.kind, id = %key.id, "playback completed");
        self.completion_listeners
            .retain(|listener| listener.send(key.clone()).is_ok());
    }

    pub(crate) fn apply_player_event(&mut self, event: &PlayerEvent) -> HistoryEntry {
        let entry = self.record_progress(event.key.clone(), event.current_time, event.duration);
        if event.ended {
            self.on_completed(&event.key);
        }
        entry
    }
}
