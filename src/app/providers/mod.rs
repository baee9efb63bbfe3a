mod fluxline;
mod novaembed;
mod pulseview;
mod vidking;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use super::media::{MediaDescriptor, MediaKind, PlaybackOptions};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ResolutionFailure {
    #[error("media descriptor has no usable identifier")]
    MissingIdentifier,
    #[error("{provider} does not support {kind} content")]
    UnsupportedKind { provider: ProviderKey, kind: MediaKind },
    #[error("no provider can play {0} content")]
    NoCompatibleProvider(MediaKind),
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("embed base for {0} cannot carry a path")]
    InvalidEmbedUrl(ProviderKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ProviderKey {
    Vidking,
    FluxLine,
    NovaEmbed,
    PulseView,
}

impl ProviderKey {
    pub(crate) fn descriptor(self) -> &'static ProviderDescriptor {
        match self {
            Self::Vidking => &PROVIDERS[0],
            Self::FluxLine => &PROVIDERS[1],
            Self::NovaEmbed => &PROVIDERS[2],
            Self::PulseView => &PROVIDERS[3],
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().name)
    }
}

impl FromStr for ProviderKey {
    type Err = ResolutionFailure;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        all_providers()
            .iter()
            .find(|provider| {
                provider.key.eq_ignore_ascii_case(wanted) || provider.name.eq_ignore_ascii_case(wanted)
            })
            .map(|provider| provider.provider)
            .ok_or_else(|| ResolutionFailure::UnknownProvider(wanted.to_string()))
    }
}

type UrlBuilder = fn(&MediaDescriptor, &PlaybackOptions) -> Result<Url, ResolutionFailure>;

/// Static catalog row: display name, lookup key, capability and URL builder.
#[derive(Debug)]
pub(crate) struct ProviderDescriptor {
    pub(crate) provider: ProviderKey,
    pub(crate) name: &'static str,
    pub(crate) key: &'static str,
    supports: fn(MediaKind) -> bool,
    build: UrlBuilder,
}

impl ProviderDescriptor {
    pub(crate) fn supports(&self, kind: MediaKind) -> bool {
        (self.supports)(kind)
    }
}

// Declared priority order.
static PROVIDERS: [ProviderDescriptor; 4] = [
    ProviderDescriptor {
        provider: ProviderKey::Vidking,
        name: "Vidking",
        key: "vidking",
        supports: vidking::supports,
        build: vidking::build_url,
    },
    ProviderDescriptor {
        provider: ProviderKey::FluxLine,
        name: "FluxLine",
        key: "fluxline",
        supports: fluxline::supports,
        build: fluxline::build_url,
    },
    ProviderDescriptor {
        provider: ProviderKey::NovaEmbed,
        name: "NovaEmbed",
        key: "novaembed",
        supports: novaembed::supports,
        build: novaembed::build_url,
    },
    ProviderDescriptor {
        provider: ProviderKey::PulseView,
        name: "PulseView",
        key: "pulseview",
        supports: pulseview::supports,
        build: pulseview::build_url,
    },
];

pub(crate) fn all_providers() -> &'static [ProviderDescriptor] {
    &PROVIDERS
}

pub(crate) fn list_compatible_providers(kind: MediaKind) -> Vec<&'static ProviderDescriptor> {
    all_providers()
        .iter()
        .filter(|provider| provider.supports(kind))
        .collect()
}

pub(crate) fn resolve(
    provider: ProviderKey,
    descriptor: &MediaDescriptor,
    options: &PlaybackOptions,
) -> Result<Url, ResolutionFailure> {
    let entry = provider.descriptor();
    if !entry.supports(descriptor.kind) {
        return Err(ResolutionFailure::UnsupportedKind {
            provider,
            kind: descriptor.kind,
        });
    }
    (entry.build)(descriptor, options)
}

/// Picks `preferred` when it can play `kind`, otherwise the first compatible provider.
pub(crate) fn select_provider(
    kind: MediaKind,
    preferred: Option<ProviderKey>,
) -> Result<ProviderKey, ResolutionFailure> {
    let compatible = list_compatible_providers(kind);
    if let Some(preferred) = preferred
        && compatible.iter().any(|entry| entry.provider == preferred)
    {
        return Ok(preferred);
    }
    compatible
        .first()
        .map(|entry| entry.provider)
        .ok_or(ResolutionFailure::NoCompatibleProvider(kind))
}

/// Next compatible provider after `current`, wrapping around.
pub(crate) fn next_compatible_provider(kind: MediaKind, current: ProviderKey) -> Option<ProviderKey> {
    let compatible = list_compatible_providers(kind);
    let idx = compatible.iter().position(|entry| entry.provider == current)?;
    let next = compatible.get((idx + 1) % compatible.len())?;
    (next.provider != current).then_some(next.provider)
}

/// Joins `segments` onto `base` (percent-encoding each one) and appends `params`
/// only when there are any, so a bare URL never carries a dangling `?`.
fn embed_url(
    provider: ProviderKey,
    base: &str,
    segments: &[&str],
    params: Vec<(&'static str, String)>,
) -> Result<Url, ResolutionFailure> {
    let mut url = Url::parse(base).map_err(|_| ResolutionFailure::InvalidEmbedUrl(provider))?;
    url.path_segments_mut()
        .map_err(|()| ResolutionFailure::InvalidEmbedUrl(provider))?
        .pop_if_empty()
        .extend(segments);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}
