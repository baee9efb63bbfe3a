use url::Url;

use super::super::media::{MediaDescriptor, MediaKind, PlaybackOptions, bool_param};
use super::{ProviderKey, ResolutionFailure, embed_url};

const BASE: &str = "https://novaembed.to/player";

pub(super) fn supports(kind: MediaKind) -> bool {
    matches!(kind, MediaKind::Tv | MediaKind::Anime)
}

pub(super) fn build_url(
    descriptor: &MediaDescriptor,
    options: &PlaybackOptions,
) -> Result<Url, ResolutionFailure> {
    let season = descriptor.season().to_string();
    let episode = descriptor.episode().to_string();
    let segments = if descriptor.kind == MediaKind::Anime {
        let id = descriptor
            .anime_id()
            .ok_or(ResolutionFailure::MissingIdentifier)?;
        vec!["anime", id, episode.as_str()]
    } else {
        let id = descriptor
            .primary_id()
            .ok_or(ResolutionFailure::MissingIdentifier)?;
        vec!["tv", id, season.as_str(), episode.as_str()]
    };

    let mut params = Vec::new();
    if let Some(color) = options.color_hex() {
        params.push(("primaryColor", color));
    }
    if let Some(autoplay) = options.autoplay {
        params.push(("autoplay", bool_param(autoplay)));
    }
    if let Some(next) = options.next_episode {
        params.push(("nextButton", bool_param(next)));
    }
    if let Some(list) = options.episode_selector {
        params.push(("episodeList", bool_param(list)));
    }
    if let Some(overlay) = options.title_overlay {
        params.push(("overlay", bool_param(overlay)));
    }
    if let Some(server) = options.server_name() {
        params.push(("srv", server.to_string()));
    }
    if let Some(start) = options.start_seconds() {
        params.push(("startAt", start.to_string()));
    }
    if descriptor.kind == MediaKind::Anime
        && let Some(dub) = options.dub
    {
        params.push(("audio", if dub { "dub" } else { "sub" }.to_string()));
    }

    embed_url(ProviderKey::NovaEmbed, BASE, &segments, params)
}
