use url::Url;

use super::super::media::{MediaDescriptor, MediaKind, PlaybackOptions, bool_param};
use super::{ProviderKey, ResolutionFailure, embed_url};

const BASE: &str = "https://fluxline.stream/embed";

pub(super) fn supports(_kind: MediaKind) -> bool {
    true
}

pub(super) fn build_url(
    descriptor: &MediaDescriptor,
    options: &PlaybackOptions,
) -> Result<Url, ResolutionFailure> {
    let season = descriptor.season().to_string();
    let episode = descriptor.episode().to_string();
    let segments = match descriptor.kind {
        MediaKind::Movie => {
            let id = descriptor
                .primary_id()
                .ok_or(ResolutionFailure::MissingIdentifier)?;
            vec!["movie", id]
        }
        MediaKind::Tv => {
            let id = descriptor
                .primary_id()
                .ok_or(ResolutionFailure::MissingIdentifier)?;
            vec!["tv", id, season.as_str(), episode.as_str()]
        }
        MediaKind::Anime => {
            let id = descriptor
                .anime_id()
                .ok_or(ResolutionFailure::MissingIdentifier)?;
            vec!["anime", id, episode.as_str()]
        }
    };

    let mut params = Vec::new();
    if let Some(color) = options.color_hex() {
        params.push(("theme", color));
    }
    if let Some(autoplay) = options.autoplay {
        params.push(("autoplay", bool_param(autoplay)));
    }
    if descriptor.kind != MediaKind::Movie
        && let Some(next) = options.next_episode
    {
        params.push(("autonext", bool_param(next)));
    }
    if let Some(start) = options.start_seconds() {
        params.push(("t", start.to_string()));
    }
    if let Some(server) = options.server_name() {
        params.push(("server", server.to_string()));
    }
    if descriptor.kind == MediaKind::Anime
        && let Some(dub) = options.dub
    {
        params.push(("dub", bool_param(dub)));
    }
    if let Some(lang) = options.subtitle_language() {
        params.push(("sub", lang.to_string()));
    }

    embed_url(ProviderKey::FluxLine, BASE, &segments, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tv_path_ends_with_season_and_episode() {
        let url = build_url(&MediaDescriptor::tv("42", 2, 5), &PlaybackOptions::default())
            .expect("tv url");
        assert_eq!(url.as_str(), "https://fluxline.stream/embed/tv/42/2/5");
    }

    #[test]
    fn anime_uses_secondary_id_and_translates_options() {
        let options = PlaybackOptions {
            color: Some("#FF0088".to_string()),
            autoplay: Some(false),
            next_episode: Some(true),
            dub: Some(true),
            server: Some("  ".to_string()),
            subtitle_lang: Some("en".to_string()),
            ..PlaybackOptions::default()
        };
        let descriptor = MediaDescriptor::anime("21", Some("one-piece".to_string()), 1071);
        let url = build_url(&descriptor, &options).expect("anime url");
        assert_eq!(
            url.as_str(),
            "https://fluxline.stream/embed/anime/one-piece/1071?theme=ff0088&autoplay=false&autonext=true&dub=true&sub=en"
        );
    }

    #[test]
    fn anime_without_any_identifier_is_missing_identifier() {
        let descriptor = MediaDescriptor::anime(" ", None, 1);
        assert_eq!(
            build_url(&descriptor, &PlaybackOptions::default()),
            Err(ResolutionFailure::MissingIdentifier)
        );
    }

    #[test]
    fn movie_ignores_dub_and_autonext() {
        let options = PlaybackOptions {
            dub: Some(true),
            next_episode: Some(false),
            server: Some("beta".to_string()),
            ..PlaybackOptions::default()
        };
        let url = build_url(&MediaDescriptor::movie("603"), &options).expect("movie url");
        assert_eq!(url.as_str(), "https://fluxline.stream/embed/movie/603?server=beta");
    }
}
