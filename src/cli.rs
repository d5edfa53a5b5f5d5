// src/cli.rs
// =============================================================================
// This file defines the command-line interface using clap's derive API.
//
// Subcommands:
// - discover: print the page set reachable from a seed URL
// - crawl:    discover, fetch every page, run monitoring, report
// - sweep:    evict expired cache entries
//
// Flags here override sitewarden.toml / SITEWARDEN__* settings for one run.
// =============================================================================

use clap::{Args, Parser, Subcommand, ValueEnum};
use sitewarden::fetch::Backend;

#[derive(Parser, Debug)]
#[command(
    name = "sitewarden",
    version,
    about = "Discover a website's pages, crawl them, and watch for content drift",
    long_about = "sitewarden enumerates a site's pages from links, metadata, sitemaps, scripts and \
                  language folders, crawls them with bounded concurrency, and reports content \
                  changes and translation gaps between language versions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every page discovered from a seed URL
    ///
    /// Example: sitewarden discover https://example.com --max-depth 2
    Discover {
        /// Seed URL (e.g., https://example.com)
        url: String,

        /// Path depth relative to the seed; 0 = unlimited
        #[arg(long, default_value_t = 0)]
        max_depth: usize,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Discover, crawl and monitor a site
    ///
    /// Example: sitewarden crawl https://example.com --max-pages 50 --json
    Crawl {
        /// Seed URL (e.g., https://example.com)
        url: String,

        /// Path depth relative to the seed; 0 = unlimited
        #[arg(long, default_value_t = 0)]
        max_depth: usize,

        /// Only crawl the first N discovered pages; 0 = all
        #[arg(long, default_value_t = 0)]
        max_pages: usize,

        /// Pages fetched at the same time (overrides settings)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Extract only this part of each page
        #[arg(long)]
        selector: Option<String>,

        /// How to read --selector
        #[arg(long, value_enum, default_value_t = SelectorKind::Custom)]
        selector_kind: SelectorKind,

        /// Keep the matched element itself, not just its contents
        #[arg(long)]
        element: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Delete expired cache entries
    Sweep {
        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Document fetch backend (overrides settings)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Output results in JSON format instead of a report
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Id,
    Class,
    Tag,
    Custom,
}

impl SelectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorKind::Id => "id",
            SelectorKind::Class => "class",
            SelectorKind::Tag => "tag",
            SelectorKind::Custom => "custom",
        }
    }
}
