use url::Url;

use super::super::media::{MediaDescriptor, MediaKind, PlaybackOptions, bool_param};
use super::{ProviderKey, ResolutionFailure, embed_url};

const BASE: &str = "https://www.vidking.net/embed";

pub(super) fn supports(kind: MediaKind) -> bool {
    matches!(kind, MediaKind::Movie | MediaKind::Tv)
}

pub(super) fn build_url(
    descriptor: &MediaDescriptor,
    options: &PlaybackOptions,
) -> Result<Url, ResolutionFailure> {
    let id = descriptor
        .primary_id()
        .ok_or(ResolutionFailure::MissingIdentifier)?;
    let season = descriptor.season().to_string();
    let episode = descriptor.episode().to_string();
    let segments = match descriptor.kind {
        MediaKind::Tv => vec!["tv", id, season.as_str(), episode.as_str()],
        _ => vec!["movie", id],
    };

    let mut params = Vec::new();
    if let Some(color) = options.color_hex() {
        params.push(("color", color));
    }
    if let Some(autoplay) = options.autoplay {
        params.push(("autoPlay", bool_param(autoplay)));
    }
    if descriptor.kind == MediaKind::Tv {
        if let Some(next) = options.next_episode {
            params.push(("nextEpisode", bool_param(next)));
        }
        if let Some(selector) = options.episode_selector {
            params.push(("episodeSelector", bool_param(selector)));
        }
    }
    if let Some(start) = options.start_seconds() {
        params.push(("progress", start.to_string()));
    }

    embed_url(ProviderKey::Vidking, BASE, &segments, params)
}
