use url::Url;

use super::super::media::{MediaDescriptor, MediaKind, PlaybackOptions, bool_param};
use super::{ProviderKey, ResolutionFailure, embed_url};

const BASE: &str = "https://pulseview.tv/e";

pub(super) fn supports(kind: MediaKind) -> bool {
    kind == MediaKind::Movie
}

pub(super) fn build_url(
    descriptor: &MediaDescriptor,
    options: &PlaybackOptions,
) -> Result<Url, ResolutionFailure> {
    let id = descriptor
        .primary_id()
        .ok_or(ResolutionFailure::MissingIdentifier)?;

    let mut params = Vec::new();
    // PulseView expects uppercase hex.
    if let Some(color) = options.color_hex() {
        params.push(("accent", color.to_ascii_uppercase()));
    }
    if let Some(autoplay) = options.autoplay {
        params.push(("auto", bool_param(autoplay)));
    }
    if let Some(overlay) = options.title_overlay {
        params.push(("title", bool_param(overlay)));
    }
    if let Some(start) = options.start_seconds() {
        params.push(("start", start.to_string()));
    }
    if let Some(lang) = options.subtitle_language() {
        params.push(("lang", lang.to_string()));
    }

    embed_url(ProviderKey::PulseView, BASE, &["movie", id], params)
}
