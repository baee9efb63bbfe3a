use clap::{Args, Parser, Subcommand};

use crate::app::{MediaDescriptor, MediaKind, PlaybackOptions};

#[derive(Debug, Parser)]
#[command(
    name = "streamtrack",
    version,
    about = "Play movies and shows through embeddable providers and track where you left off"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mount a player for a title and track it until Enter is pressed or the player exits.
    Play {
        #[command(flatten)]
        media: MediaArgs,
        /// Provider to try first (falls back to the first compatible one).
        #[arg(long)]
        provider: Option<String>,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// List providers able to play a kind, in priority order.
    Providers { kind: MediaKind },
    /// Print the embed URL a provider would load.
    Resolve {
        provider: String,
        #[command(flatten)]
        media: MediaArgs,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Read PLAYER_EVENT messages from stdin, one per line.
    Ingest,
    /// Show titles with saved progress, most recent first.
    Continue {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List a show's seasons, or one season's episodes with resume points.
    Episodes {
        id: String,
        #[arg(long)]
        season: Option<u32>,
    },
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },
    Search { query: String },
    Trending {
        #[arg(default_value = "movie")]
        kind: MediaKind,
    },
    Tui,
}

#[derive(Debug, Subcommand)]
pub enum WatchlistAction {
    List,
    Add {
        kind: MediaKind,
        id: String,
        /// Title to store; looked up from metadata when omitted.
        #[arg(long)]
        title: Option<String>,
    },
    Remove { kind: MediaKind, id: String },
}

#[derive(Debug, Clone, Args)]
pub struct MediaArgs {
    pub kind: MediaKind,
    pub id: String,
    #[arg(long)]
    pub season: Option<u32>,
    #[arg(long)]
    pub episode: Option<u32>,
    /// Anime-specific id preferred by anime providers.
    #[arg(long)]
    pub secondary_id: Option<String>,
}

impl MediaArgs {
    pub(crate) fn descriptor(&self) -> MediaDescriptor {
        MediaDescriptor::new(
            self.kind,
            self.id.clone(),
            self.secondary_id.clone(),
            self.season,
            self.episode,
        )
    }
}

/// Player option overrides; anything not given keeps the configured default.
#[derive(Debug, Clone, Default, Args)]
pub struct OptionArgs {
    /// Accent color as #rrggbb.
    #[arg(long)]
    pub color: Option<String>,
    #[arg(long)]
    pub autoplay: Option<bool>,
    #[arg(long)]
    pub next_episode: Option<bool>,
    #[arg(long)]
    pub episode_selector: Option<bool>,
    #[arg(long)]
    pub title_overlay: Option<bool>,
    /// Start offset in seconds; defaults to the saved position.
    #[arg(long)]
    pub start_at: Option<f64>,
    #[arg(long)]
    pub server: Option<String>,
    #[arg(long)]
    pub dub: Option<bool>,
    #[arg(long)]
    pub subtitle_lang: Option<String>,
}

impl OptionArgs {
    pub(crate) fn overrides(&self) -> PlaybackOptions {
        PlaybackOptions {
            color: self.color.clone(),
            autoplay: self.autoplay,
            next_episode: self.next_episode,
            episode_selector: self.episode_selector,
            title_overlay: self.title_overlay,
            start_at: self.start_at,
            server: self.server.clone(),
            dub: self.dub,
            subtitle_lang: self.subtitle_lang.clone(),
        }
    }
}
