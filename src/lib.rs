//! Interactive reconciliation of local album folders against a release catalog.
//!
//! Core modules:
//! - [`machine`] - Three-stage state machine (artist, release, tracks)
//! - [`align`] - Pairing local files with release tracks
//! - [`commit`] - Tag diffing and per-file commits
//! - [`relocate`] - Moving album folders into the canonical layout
//! - [`range`] - Selection expressions such as `1..3,5`
//!
//! ### Supporting Modules
//!
//! - [`model`] - Tracks, pairs and tag snapshots
//! - [`tags`] - Tag storage behind a trait, lofty-backed and in-memory
//! - [`scan`] - Album folder discovery and track scanning
//! - [`provider`] - Catalog provider contract and registry
//! - [`catalog`] - SQLite catalog provider
//! - [`session`] - Per-album session state
//! - [`operator`] - Terminal and scripted front-ends
//! - [`genre`] - Genre tally for a run
//! - [`config`] - Settings and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use curator::catalog::SqliteCatalog;
//! use curator::config::Settings;
//! use curator::machine::{Reconciler, RunOptions};
//! use curator::operator::ScriptedOperator;
//! use curator::provider::ProviderRegistry;
//! use curator::relocate::StdFileSystem;
//! use curator::tags::LoftyTagStore;
//! use std::path::PathBuf;
//!
//! let settings = Settings::load()?;
//! let catalog = SqliteCatalog::open(&settings.catalog_path()?)?;
//! let mut reconciler = Reconciler::new(
//!     ProviderRegistry::new().with(Box::new(catalog)),
//!     Box::new(LoftyTagStore),
//!     Box::new(StdFileSystem),
//!     settings,
//!     RunOptions::default(),
//! );
//!
//! // Pick the first artist and release, align by duration, commit, finish.
//! let mut operator = ScriptedOperator::new(["1", "1", "duration", "commit", "done"]);
//! let album = PathBuf::from("/music/incoming/Can - Tago Mago");
//! let outcome = reconciler.reconcile_album(&album, &mut operator)?;
//! println!("{outcome}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Each module has its own error enum (`SelectionError`, `TagError`,
//! `RelocationError`, `ProviderError`, `CatalogError`). Application-level
//! code uses `anyhow::Result`.

pub mod align;
pub mod catalog;
pub mod cli;
pub mod commit;
pub mod completion;
pub mod config;
pub mod genre;
pub mod machine;
pub mod model;
pub mod operator;
pub mod provider;
pub mod range;
pub mod relocate;
pub mod scan;
pub mod session;
pub mod tags;
