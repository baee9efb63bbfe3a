use serde_json::Value;

use crate::db::KeyValueStore;

use super::media::HistoryKey;
use super::metadata::{MetadataSource, artwork_ref, display_title, fetch_details};
use super::progress::{HistoryEntry, ProgressStore};

pub(crate) const CONTINUE_WATCHING_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ContinueCard {
    pub(crate) entry: HistoryEntry,
    pub(crate) title: String,
    pub(crate) artwork_ref: Option<String>,
    pub(crate) percent: f64,
    /// `false` when the metadata lookup failed and `title` is a placeholder.
    pub(crate) metadata_loaded: bool,
}

impl ContinueCard {
    pub(crate) fn key(&self) -> &HistoryKey {
        &self.entry.key
    }

    pub(crate) fn episode_label(&self) -> Option<String> {
        self.entry.key.episode_label()
    }

    pub(crate) fn with_details(mut self, details: &Value) -> Self {
        if let Some(title) = display_title(details) {
            self.title = title;
        }
        self.artwork_ref = artwork_ref(details);
        self.metadata_loaded = true;
        self
    }
}

/// Started entries, most recently updated first.
pub(crate) fn continue_candidates(entries: &[HistoryEntry], limit: usize) -> Vec<HistoryEntry> {
    let mut started = entries
        .iter()
        .filter(|entry| entry.progress_seconds > 0.0)
        .cloned()
        .collect::<Vec<_>>();
    started.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
    started.truncate(limit);
    started
}

pub(crate) fn fallback_title(key: &HistoryKey) -> String {
    match key.episode_label() {
        Some(episode) => format!("{} {} {episode}", key.kind.label(), key.id),
        None => format!("{} {}", key.kind.label(), key.id),
    }
}

/// Joins every candidate with its metadata. A failed lookup keeps the card
/// so the entry stays resumable.
pub(crate) fn build_cards<K: KeyValueStore>(
    progress: &ProgressStore<K>,
    metadata: &dyn MetadataSource,
    limit: usize,
) -> Vec<ContinueCard> {
    continue_candidates(progress.entries(), limit)
        .into_iter()
        .map(|entry| card_for(entry, metadata))
        .collect()
}

fn card_for(entry: HistoryEntry, metadata: &dyn MetadataSource) -> ContinueCard {
    let card = placeholder_card(entry);
    match fetch_details(metadata, card.entry.key.kind, &card.entry.key.id) {
        Ok(details) => card.with_details(&details),
        Err(failure) => {
            tracing::warn!(
                kind = %card.entry.key.kind,
                id = %card.entry.key.id,
                %failure,
                "metadata lookup failed for continue-watching card"
            );
            card
        }
    }
}

fn placeholder_card(entry: HistoryEntry) -> ContinueCard {
    ContinueCard {
        title: fallback_title(&entry.key),
        artwork_ref: None,
        percent: entry.percent_complete(),
        metadata_loaded: false,
        entry,
    }
}

/// Cards without metadata, for views that render before lookups finish.
pub(crate) fn placeholder_cards(entries: &[HistoryEntry], limit: usize) -> Vec<ContinueCard> {
    continue_candidates(entries, limit)
        .into_iter()
        .map(placeholder_card)
        .collect()
}
