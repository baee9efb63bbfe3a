use serde_json::Value;

use crate::http::{FetchFailure, RetryPolicy, get_json_with_retries};

use super::media::MediaKind;

/// Backend for show/movie details, seasons, search and trending lists.
pub(crate) trait MetadataSource {
    fn fetch(&self, path: &[&str], params: &[(String, String)]) -> Result<Value, FetchFailure>;
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn fetch(&self, path: &[&str], params: &[(String, String)]) -> Result<Value, FetchFailure> {
        (**self).fetch(path, params)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpMetadata {
    base_url: String,
    policy: RetryPolicy,
}

impl HttpMetadata {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        }
    }
}

impl MetadataSource for HttpMetadata {
    fn fetch(&self, path: &[&str], params: &[(String, String)]) -> Result<Value, FetchFailure> {
        let mut url = self.base_url.clone();
        for segment in path {
            url.push('/');
            url.push_str(&encode_segment(segment));
        }
        tracing::debug!(%url, "fetching metadata");
        get_json_with_retries(&url, params, self.policy)
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub(crate) fn fetch_details(
    source: &dyn MetadataSource,
    kind: MediaKind,
    id: &str,
) -> Result<Value, FetchFailure> {
    source.fetch(&[kind.metadata_kind(), id], &[])
}

pub(crate) fn fetch_season(
    source: &dyn MetadataSource,
    show_id: &str,
    season: u32,
) -> Result<Value, FetchFailure> {
    let season = season.to_string();
    source.fetch(&["tv", show_id, "season", &season], &[])
}

pub(crate) fn search_multi(
    source: &dyn MetadataSource,
    query: &str,
) -> Result<Vec<SearchHit>, FetchFailure> {
    let value = source.fetch(&["search", "multi"], &[("query".to_string(), query.to_string())])?;
    Ok(parse_results(&value, None))
}

pub(crate) fn fetch_trending(
    source: &dyn MetadataSource,
    kind: MediaKind,
) -> Result<Vec<SearchHit>, FetchFailure> {
    let value = source.fetch(&["trending", kind.metadata_kind(), "week"], &[])?;
    Ok(parse_results(&value, Some(kind)))
}

/// Movies carry `title`, shows carry `name`.
pub(crate) fn display_title(details: &Value) -> Option<String> {
    ["title", "name"]
        .iter()
        .filter_map(|field| details.get(field).and_then(Value::as_str))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
}

pub(crate) fn artwork_ref(details: &Value) -> Option<String> {
    ["poster_path", "backdrop_path"]
        .iter()
        .filter_map(|field| details.get(field).and_then(Value::as_str))
        .find(|path| !path.trim().is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchHit {
    pub(crate) kind: MediaKind,
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) year: Option<String>,
    pub(crate) artwork_ref: Option<String>,
}

/// Lenient over `results`: a missing array is empty, people and items without
/// an id or title are skipped. `fallback_kind` applies when the backend omits
/// `media_type` (trending lists do).
pub(crate) fn parse_results(value: &Value, fallback_kind: Option<MediaKind>) -> Vec<SearchHit> {
    let Some(items) = value.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let kind = match item.get("media_type").and_then(Value::as_str) {
                Some("movie") => MediaKind::Movie,
                Some("tv") => MediaKind::Tv,
                Some(_) => return None,
                None => fallback_kind?,
            };
            let id = match item.get("id")? {
                Value::Number(number) => number.to_string(),
                Value::String(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => return None,
            };
            let title = display_title(item)?;
            let year = ["release_date", "first_air_date"]
                .iter()
                .filter_map(|field| item.get(field).and_then(Value::as_str))
                .find_map(|date| date.get(..4).map(str::to_string));
            Some(SearchHit {
                kind,
                id,
                title,
                year,
                artwork_ref: artwork_ref(item),
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use serde_json::Value;

    use super::MetadataSource;
    use crate::http::FetchFailure;

    /// Canned responses keyed by the joined path; unknown paths are 404s.
    #[derive(Debug, Default)]
    pub(crate) struct CannedMetadata {
        responses: HashMap<String, Value>,
        pub(crate) requests: RefCell<Vec<String>>,
    }

    impl CannedMetadata {
        pub(crate) fn with(mut self, path: &str, value: Value) -> Self {
            self.responses.insert(path.to_string(), value);
            self
        }
    }

    impl MetadataSource for CannedMetadata {
        fn fetch(
            &self,
            path: &[&str],
            _params: &[(String, String)],
        ) -> Result<Value, FetchFailure> {
            let joined = path.join("/");
            self.requests.borrow_mut().push(joined.clone());
            self.responses
                .get(&joined)
                .cloned()
                .ok_or(FetchFailure::Status {
                    status: 404,
                    body: String::new(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::CannedMetadata;
    use super::*;
    use crate::http::test_server::{Reply, TestServer};

    #[test]
    fn title_prefers_movie_title_then_show_name() {
        assert_eq!(
            display_title(&json!({"title": "Heat", "name": "ignored"})).as_deref(),
            Some("Heat")
        );
        assert_eq!(
            display_title(&json!({"title": " ", "name": "Dark"})).as_deref(),
            Some("Dark")
        );
        assert_eq!(display_title(&json!({})), None);
    }

    #[test]
    fn search_results_skip_people_and_missing_fields() {
        let value = json!({
            "results": [
                {"media_type": "movie", "id": 603, "title": "The Matrix", "release_date": "1999-03-31", "poster_path": "/m.jpg"},
                {"media_type": "person", "id": 6384, "name": "Keanu Reeves"},
                {"media_type": "tv", "id": 1396, "name": "Breaking Bad", "first_air_date": "2008-01-20"},
                {"media_type": "tv", "name": "No id"}
            ]
        });
        let hits = parse_results(&value, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "603");
        assert_eq!(hits[0].year.as_deref(), Some("1999"));
        assert_eq!(hits[0].artwork_ref.as_deref(), Some("/m.jpg"));
        assert_eq!(hits[1].kind, MediaKind::Tv);
    }

    #[test]
    fn missing_results_array_is_empty() {
        assert!(parse_results(&json!({"page": 1}), None).is_empty());
        assert!(parse_results(&json!({"results": null}), Some(MediaKind::Movie)).is_empty());
    }

    #[test]
    fn trending_uses_requested_kind_when_media_type_absent() {
        let source = CannedMetadata::default().with(
            "trending/tv/week",
            json!({"results": [{"id": 94605, "name": "Arcane"}]}),
        );
        let hits = fetch_trending(&source, MediaKind::Anime).expect("trending");
        assert_eq!(source.requests.borrow().as_slice(), ["trending/tv/week"]);
        assert_eq!(hits[0].kind, MediaKind::Anime);
    }

    #[test]
    fn anime_details_go_through_tv_endpoint() {
        let source = CannedMetadata::default().with("tv/37854", json!({"name": "One Piece"}));
        let details = fetch_details(&source, MediaKind::Anime, "37854").expect("details");
        assert_eq!(display_title(&details).as_deref(), Some("One Piece"));
    }

    #[test]
    fn http_source_joins_encoded_segments() {
        let server = TestServer::spawn(vec![Reply::Status(200, "{\"name\":\"x\"}".to_string())]);
        let source = HttpMetadata {
            base_url: format!("{}/api/tmdb/", server.base_url).trim_end_matches('/').to_string(),
            policy: RetryPolicy {
                attempts: 1,
                ..RetryPolicy::default()
            },
        };
        source.fetch(&["tv", "a b", "season", "2"], &[]).expect("fetch");
        assert_eq!(server.targets(), vec!["/api/tmdb/tv/a%20b/season/2".to_string()]);
    }
}
