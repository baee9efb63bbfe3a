use serde::{Deserialize, Serialize};

use crate::db::KeyValueStore;

use super::super::media::MediaKind;
use super::{load_list, now_millis, update_list};

pub(crate) const WATCHLIST_KEY: &str = "watchlist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchlistEntry {
    pub(crate) kind: MediaKind,
    pub(crate) id: String,
    pub(crate) title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) artwork_ref: Option<String>,
    pub(crate) added_at: i64,
}

/// Set of saved titles keyed by `(kind, id)`, kept in insertion order.
pub(crate) struct WatchlistStore<K: KeyValueStore> {
    kv: K,
    entries: Vec<WatchlistEntry>,
}

impl<K: KeyValueStore> WatchlistStore<K> {
    pub(crate) fn open(kv: K) -> Self {
        let entries = load_list(&kv, WATCHLIST_KEY);
        Self { kv, entries }
    }

    pub(crate) fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    pub(crate) fn contains(&self, kind: MediaKind, id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind == kind && entry.id == id)
    }

    /// Adds the title unless present. Returns `true` when it was added.
    pub(crate) fn add(
        &mut self,
        kind: MediaKind,
        id: &str,
        title: &str,
        artwork_ref: Option<String>,
    ) -> bool {
        let entry = WatchlistEntry {
            kind,
            id: id.to_string(),
            title: title.to_string(),
            artwork_ref,
            added_at: now_millis(),
        };
        update_list(&self.kv, WATCHLIST_KEY, &mut self.entries, |entries| {
            if entries.iter().any(|saved| saved.kind == kind && saved.id == id) {
                return false;
            }
            entries.push(entry.clone());
            true
        })
    }

    pub(crate) fn remove(&mut self, kind: MediaKind, id: &str) -> bool {
        update_list(&self.kv, WATCHLIST_KEY, &mut self.entries, |entries| {
            let before = entries.len();
            entries.retain(|entry| !(entry.kind == kind && entry.id == id));
            before != entries.len()
        })
    }

    /// Returns `true` when the title is on the watchlist afterwards.
    pub(crate) fn toggle(
        &mut self,
        kind: MediaKind,
        id: &str,
        title: &str,
        artwork_ref: Option<String>,
    ) -> bool {
        if self.remove(kind, id) {
            return false;
        }
        self.add(kind, id, title, artwork_ref)
    }
}
