//! # curator
//!
//! Reconciles folders of audio files against an offline release catalog:
//! resolve the artist, resolve the release, align files with tracks, write
//! tags and move the folder into `<root>/<artist>/<year> - <album>`.
//!
//! ## Usage
//!
//! ```bash
//! # Load the catalog
//! curator catalog import releases.json
//!
//! # Reconcile interactively
//! curator reconcile ~/incoming --target-root ~/Music
//!
//! # See what would be matched without writing
//! curator reconcile ~/incoming --unattended
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use path_absolutize::Absolutize;

use curator::catalog::SqliteCatalog;
use curator::cli::{self, CatalogAction, ConfigAction};
use curator::completion;
use curator::config::{self, Settings};
use curator::machine::{Reconciler, RunOptions};
use curator::model::AlbumPlacement;
use curator::operator::TerminalOperator;
use curator::provider::{Provider, ProviderRegistry};
use curator::relocate::{self, StdFileSystem};
use curator::scan;
use curator::tags::{self, LoftyTagStore};

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Cannot resolve path {}", path.display()))?
        .into_owned())
}

fn open_catalog(settings: &Settings) -> Result<SqliteCatalog> {
    let path = settings.catalog_path()?;
    debug!("Opening catalog at {}", path.display());
    SqliteCatalog::open(&path).with_context(|| format!("Failed to open catalog at {}", path.display()))
}

fn reconcile(path: &Path, settings: Settings, options: RunOptions) -> Result<()> {
    let albums = scan::discover_albums(path, &settings);
    if albums.is_empty() {
        println!("No album folders found under {}", path.display());
        return Ok(());
    }
    info!("Found {} album folder(s) under {}", albums.len(), path.display());

    let catalog = open_catalog(&settings)?;
    let registry = ProviderRegistry::new().with(Box::new(catalog));
    let mut reconciler = Reconciler::new(
        registry,
        Box::new(LoftyTagStore),
        Box::new(StdFileSystem),
        settings,
        options,
    );

    let outcomes = reconciler.run(&albums, &mut TerminalOperator)?;

    println!();
    println!("Summary:");
    for (album, outcome) in &outcomes {
        println!("  {outcome:<10} {}", album.display());
    }
    let untouched = albums.len() - outcomes.len();
    if untouched > 0 {
        println!("  {untouched} album(s) not visited");
    }

    let genres = reconciler.finish_run();
    if !genres.is_empty() {
        println!();
        println!("Genres written:");
        for (genre, count) in genres {
            println!("  {count:>4}  {genre}");
        }
    }
    Ok(())
}

fn list_albums(path: &Path, settings: &Settings) -> Result<()> {
    let albums = scan::discover_albums(path, settings);
    for album in &albums {
        let scanned = scan::scan_album(album, &LoftyTagStore, settings);
        println!("{} ({} track(s))", album.display(), scanned.tracks.len());
        for track in &scanned.tracks {
            let number = track.track_number.map(|n| format!("{n:>2}")).unwrap_or_else(|| "--".to_string());
            println!("  {number}  {}  [{}]", track.file_name(), track.display_name());
        }
        for err in &scanned.unreadable {
            eprintln!("  warning: {err}");
        }
    }
    println!("{} album folder(s)", albums.len());
    Ok(())
}

fn relocate_album(
    album: &Path,
    root: &Path,
    settings: &Settings,
    artist: Option<String>,
    title: Option<String>,
    year: Option<u32>,
) -> Result<()> {
    let from_tags = scan::album_files(album, settings)
        .first()
        .and_then(|file| tags::read_file(&LoftyTagStore, file).ok())
        .and_then(|(snapshot, _)| AlbumPlacement::from_tags(&snapshot));
    let guess = from_tags.or_else(|| AlbumPlacement::from_folder(album));

    let placement = match (artist, title, guess) {
        (Some(artist), Some(album_title), guess) => AlbumPlacement {
            artist,
            album: album_title,
            year: year.or(guess.and_then(|g| g.year)),
        },
        (artist, title, Some(guess)) => AlbumPlacement {
            artist: artist.unwrap_or(guess.artist),
            album: title.unwrap_or(guess.album),
            year: year.or(guess.year),
        },
        _ => anyhow::bail!(
            "Cannot tell artist and album for {}; pass --artist and --album-title",
            album.display()
        ),
    };

    let moved = relocate::relocate(&StdFileSystem, album, root, &placement, &settings.relocation.policy())
        .with_context(|| format!("Failed to relocate {}", album.display()))?;
    println!("{} -> {}", album.display(), moved.display());
    Ok(())
}

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug curator reconcile .` - Enable debug logging
/// - `RUST_LOG=curator::relocate=debug curator relocate ...` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Reconcile {
            path,
            unattended,
            preview,
            strategy,
            reverse,
            target_root,
            catalog,
        } => {
            let mut settings = Settings::load()?;
            if let Some(root) = target_root {
                settings.target_root = Some(absolute(&root)?);
            }
            if let Some(catalog) = catalog {
                settings.catalog_path = Some(absolute(&catalog)?);
            }
            if let Some(strategy) = strategy {
                settings.default_strategy = strategy;
            }
            let path = absolute(&path)?;
            info!("Reconciling albums under {}", path.display());
            reconcile(
                &path,
                settings,
                RunOptions {
                    unattended,
                    preview,
                    reverse,
                },
            )?;
        }
        cli::Command::Scan { path } => {
            let settings = Settings::load()?;
            list_albums(&absolute(&path)?, &settings)?;
        }
        cli::Command::Relocate {
            album,
            target_root,
            artist,
            album_title,
            year,
        } => {
            let settings = Settings::load()?;
            let root = match target_root.or_else(|| settings.target_root.clone()) {
                Some(root) => absolute(&root)?,
                None => anyhow::bail!("No library root; pass --target-root or set target_root in the settings file"),
            };
            relocate_album(&absolute(&album)?, &root, &settings, artist, album_title, year)?;
        }
        cli::Command::Catalog { action, catalog } => {
            let mut settings = Settings::load()?;
            if let Some(catalog) = catalog {
                settings.catalog_path = Some(absolute(&catalog)?);
            }
            let mut catalog = open_catalog(&settings)?;
            match action {
                CatalogAction::Import { file } => {
                    let file = absolute(&file)?;
                    let stats = catalog
                        .import_file(&file)
                        .with_context(|| format!("Failed to import {}", file.display()))?;
                    println!(
                        "Imported {} artist(s), {} release(s), {} track(s)",
                        stats.artists, stats.releases, stats.tracks
                    );
                }
                CatalogAction::Search { query, kind } => {
                    let hits = catalog.search(&query, kind, None)?;
                    for (i, hit) in hits.iter().enumerate() {
                        println!("{:>3}. {hit}", i + 1);
                    }
                    if hits.is_empty() {
                        println!("No {kind} matches `{query}`");
                    }
                }
            }
        }
        cli::Command::Config { action } => {
            let path = config::get_config_path()?;
            match action {
                ConfigAction::Path => println!("{}", path.display()),
                ConfigAction::Show => {
                    let settings = Settings::load_from(&path)?;
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                }
                ConfigAction::Init { force } => {
                    if path.exists() && !force {
                        anyhow::bail!("{} already exists; use --force to overwrite", path.display());
                    }
                    Settings::default().save_to(&path)?;
                    println!("Wrote default settings to {}", path.display());
                }
            }
        }
        cli::Command::Completion { shell } => {
            completion::print_completions(&shell, &mut cli::Args::command())?;
        }
        cli::Command::CompleteArtists => {
            if let Ok(settings) = Settings::load() {
                if let Ok(path) = settings.catalog_path() {
                    completion::print_artist_completions(&path)?;
                }
            }
        }
    }

    Ok(())
}
