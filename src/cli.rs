//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for curator using Clap derive macros.
//!
//! ## Commands
//!
//! - `reconcile`: Walk album folders and reconcile each against the catalog
//! - `scan`: List album folders and the tracks found in them
//! - `relocate`: Move one album folder into the canonical layout
//! - `catalog`: Import into or search the offline catalog
//! - `config`: Show or initialise the settings file
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! curator catalog import releases.json
//! curator reconcile ~/incoming --target-root ~/Music
//! curator reconcile ~/incoming --unattended
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::align::AlignStrategy;
use crate::provider::EntityKind;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "curator")]
#[command(about = "curator: reconcile local album folders against a release catalog")]
#[command(version)]
pub struct Args {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Reconcile every album folder under a path
    ///
    /// Each album goes through three stages: resolve the artist, resolve the
    /// release, then align local files with the release's tracks and commit
    /// tags. Type `help` at the prompt for the commands of each stage.
    Reconcile {
        /// An album folder, or a folder containing album folders
        path: PathBuf,

        /// Resolve and align without prompting or writing anything
        #[arg(long)]
        unattended: bool,

        /// Start every album in preview mode (report changes, write nothing)
        #[arg(long)]
        preview: bool,

        /// Initial alignment strategy
        ///
        /// One of: order, duration, tracknumber, name, hybrid, manual.
        #[arg(long)]
        strategy: Option<AlignStrategy>,

        /// Start with the file order reversed
        #[arg(long)]
        reverse: bool,

        /// Library root for relocation, overriding the settings file
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        target_root: Option<PathBuf>,

        /// Catalog database, overriding the settings file
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        catalog: Option<PathBuf>,
    },

    /// List album folders and their tracks
    Scan {
        /// Folder to search for albums
        path: PathBuf,
    },

    /// Move an album folder to `<root>/<artist>/<year> - <album>`
    ///
    /// Placement comes from the flags, then the first track's tags, then the
    /// folder name.
    Relocate {
        /// The album folder to move
        album: PathBuf,

        /// Library root, overriding the settings file
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        target_root: Option<PathBuf>,

        #[arg(long)]
        artist: Option<String>,

        #[arg(long)]
        album_title: Option<String>,

        #[arg(long)]
        year: Option<u32>,
    },

    /// Manage the offline catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,

        /// Catalog database, overriding the settings file
        #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
        catalog: Option<PathBuf>,
    },

    /// Show or create the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    ///
    /// Usage: curator completion bash > ~/.local/share/bash-completion/completions/curator
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List catalog artist names for completion (hidden command)
    #[command(hide = true)]
    CompleteArtists,
}

/// Catalog actions
#[derive(Subcommand, Debug)]
pub enum CatalogAction {
    /// Load artists, releases and tracks from a JSON document
    Import {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Search artists or releases
    Search {
        query: String,

        /// artist or release
        #[arg(long, default_value = "artist")]
        kind: EntityKind,
    },
}

/// Settings file actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the settings file location
    Path,

    /// Print the effective settings as JSON
    Show,

    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_reconcile_flags() {
        let args = Args::try_parse_from([
            "curator",
            "reconcile",
            "/music/incoming",
            "--unattended",
            "--strategy",
            "duration",
            "--reverse",
        ])
        .unwrap();
        match args.command {
            Command::Reconcile {
                path,
                unattended,
                strategy,
                reverse,
                preview,
                ..
            } => {
                assert_eq!(path, PathBuf::from("/music/incoming"));
                assert!(unattended);
                assert!(reverse);
                assert!(!preview);
                assert_eq!(strategy, Some(AlignStrategy::Duration));
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn test_catalog_search_kind() {
        let args = Args::try_parse_from(["curator", "catalog", "search", "tago", "--kind", "release"]).unwrap();
        match args.command {
            Command::Catalog {
                action: CatalogAction::Search { query, kind },
                catalog,
            } => {
                assert_eq!(query, "tago");
                assert_eq!(kind, EntityKind::Release);
                assert_eq!(catalog, None);
            }
            _ => panic!("expected catalog search"),
        }
        assert!(Args::try_parse_from(["curator", "reconcile", ".", "--strategy", "random"]).is_err());
    }
}
