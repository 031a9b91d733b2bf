//! # Offline Catalog
//!
//! A SQLite-backed [`Provider`]: artists, their releases, and release track
//! lists, loaded from a JSON export.
//!
//! ## Schema
//!
//! - `artists (id, name)`
//! - `releases (id, artist_id, title, year, position)`
//! - `tracks (id, release_id, position, disc, number, title, duration_ms)`
//!
//! ## Import format
//!
//! ```json
//! {"artists": [{"id": "a1", "name": "Can", "releases": [
//!     {"id": "r1", "title": "Tago Mago", "year": 1971, "tracks": [
//!         {"title": "Paperhouse", "duration_ms": 448000, "disc": 1, "number": 1}
//!     ]}
//! ]}]}
//! ```
//!
//! Re-importing an id replaces it, including its track list.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use thiserror::Error;

use crate::model::RemoteTrack;
use crate::provider::{Candidate, EntityKind, Provider, ProviderError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("catalog import is not valid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ImportDocument {
    #[serde(default)]
    artists: Vec<ImportArtist>,
}

#[derive(Debug, Deserialize)]
struct ImportArtist {
    id: String,
    name: String,
    #[serde(default)]
    releases: Vec<ImportRelease>,
}

#[derive(Debug, Deserialize)]
struct ImportRelease {
    id: String,
    title: String,
    year: Option<u32>,
    #[serde(default)]
    tracks: Vec<ImportTrack>,
}

#[derive(Debug, Deserialize)]
struct ImportTrack {
    id: Option<String>,
    title: String,
    #[serde(default)]
    duration_ms: u64,
    disc: Option<u32>,
    number: Option<u32>,
}

/// Row counts after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub artists: usize,
    pub releases: usize,
    pub tracks: usize,
}

pub struct SqliteCatalog {
    name: String,
    conn: Connection,
}

impl SqliteCatalog {
    /// Open (or create) the catalog at `path`.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        debug!("Opened catalog at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS artists (
                id    TEXT PRIMARY KEY,
                name  TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS releases (
                id        TEXT PRIMARY KEY,
                artist_id TEXT NOT NULL REFERENCES artists(id),
                title     TEXT NOT NULL,
                year      INTEGER,
                position  INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tracks (
                id          TEXT PRIMARY KEY,
                release_id  TEXT NOT NULL REFERENCES releases(id),
                position    INTEGER NOT NULL,
                disc        INTEGER,
                number      INTEGER,
                title       TEXT NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_releases_artist ON releases(artist_id);
            CREATE INDEX IF NOT EXISTS idx_tracks_release ON tracks(release_id);",
        )?;
        Ok(Self {
            name: "catalog".to_string(),
            conn,
        })
    }

    /// Load a JSON document in one transaction.
    pub fn import_json(&mut self, text: &str) -> Result<ImportStats, CatalogError> {
        let document: ImportDocument = serde_json::from_str(text)?;
        let mut stats = ImportStats::default();

        let tx = self.conn.transaction()?;
        {
            let mut artist_stmt = tx.prepare("INSERT OR REPLACE INTO artists (id, name) VALUES (?1, ?2)")?;
            let mut release_stmt = tx.prepare(
                "INSERT OR REPLACE INTO releases (id, artist_id, title, year, position) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            // An imported artist's release list replaces the stored one.
            let mut drop_tracks_stmt = tx.prepare(
                "DELETE FROM tracks WHERE release_id IN (SELECT id FROM releases WHERE artist_id = ?1)",
            )?;
            let mut drop_releases_stmt = tx.prepare("DELETE FROM releases WHERE artist_id = ?1")?;
            let mut clear_stmt = tx.prepare("DELETE FROM tracks WHERE release_id = ?1")?;
            let mut track_stmt = tx.prepare(
                "INSERT OR REPLACE INTO tracks (id, release_id, position, disc, number, title, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for artist in &document.artists {
                artist_stmt.execute(params![artist.id, artist.name])?;
                drop_tracks_stmt.execute([&artist.id])?;
                drop_releases_stmt.execute([&artist.id])?;
                stats.artists += 1;

                for (position, release) in artist.releases.iter().enumerate() {
                    release_stmt.execute(params![
                        release.id,
                        artist.id,
                        release.title,
                        release.year,
                        position as i64
                    ])?;
                    clear_stmt.execute([&release.id])?;
                    stats.releases += 1;

                    for (index, track) in release.tracks.iter().enumerate() {
                        let id = track
                            .id
                            .clone()
                            .unwrap_or_else(|| format!("{}-{}", release.id, index + 1));
                        track_stmt.execute(params![
                            id,
                            release.id,
                            (index + 1) as i64,
                            track.disc,
                            track.number,
                            track.title,
                            i64::try_from(track.duration_ms).unwrap_or(i64::MAX)
                        ])?;
                        stats.tracks += 1;
                    }
                }
            }
        }
        tx.commit()?;

        info!(
            "Imported {} artist(s), {} release(s), {} track(s)",
            stats.artists, stats.releases, stats.tracks
        );
        Ok(stats)
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportStats, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.import_json(&text)
    }

    fn search_artists(&self, needle: &str) -> Result<Vec<Candidate>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM artists ORDER BY name COLLATE NOCASE, id")?;
        let rows = stmt.query_map([], |row| Ok(Candidate::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut hits = Vec::new();
        for row in rows {
            let candidate = row?;
            if matches(&candidate.name, needle) {
                hits.push(candidate);
            }
        }
        Ok(hits)
    }

    fn search_releases(&self, needle: &str, artist_id: Option<&str>) -> Result<Vec<Candidate>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.title, r.year, a.name FROM releases r JOIN artists a ON a.id = r.artist_id
             WHERE (?1 IS NULL OR r.artist_id = ?1)
             ORDER BY a.name COLLATE NOCASE, r.position, r.id",
        )?;
        let rows = stmt.query_map([artist_id], release_row)?;

        let mut hits = Vec::new();
        for row in rows {
            let candidate = row?;
            if matches(&candidate.name, needle) {
                hits.push(candidate);
            }
        }
        Ok(hits)
    }

    fn unavailable(&self, err: rusqlite::Error) -> ProviderError {
        ProviderError::Unavailable {
            provider: self.name.clone(),
            reason: err.to_string(),
        }
    }
}

fn release_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    let mut candidate = Candidate::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?);
    candidate.year = row.get(2)?;
    candidate.detail = row.get(3)?;
    Ok(candidate)
}

fn matches(name: &str, needle: &str) -> bool {
    needle.is_empty() || name.to_lowercase().contains(needle)
}

impl Provider for SqliteCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &str, kind: EntityKind, scope: Option<&str>) -> Result<Vec<Candidate>, ProviderError> {
        let needle = query.trim().to_lowercase();
        let hits = match kind {
            EntityKind::Artist => self.search_artists(&needle),
            EntityKind::Release => self.search_releases(&needle, scope),
        }
        .map_err(|e| self.unavailable(e))?;
        debug!("Catalog {kind} search `{query}`: {} hit(s)", hits.len());
        Ok(hits)
    }

    fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<Candidate>, ProviderError> {
        let found = match kind {
            EntityKind::Artist => self
                .conn
                .query_row("SELECT id, name FROM artists WHERE id = ?1", [id], |row| {
                    Ok(Candidate::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional(),
            EntityKind::Release => self
                .conn
                .query_row(
                    "SELECT r.id, r.title, r.year, a.name FROM releases r JOIN artists a ON a.id = r.artist_id
                     WHERE r.id = ?1",
                    [id],
                    release_row,
                )
                .optional(),
        };
        found.map_err(|e| self.unavailable(e))
    }

    fn tracks(&self, release_id: &str) -> Result<Vec<RemoteTrack>, ProviderError> {
        let fetch = || -> Result<Vec<RemoteTrack>, rusqlite::Error> {
            let mut stmt = self.conn.prepare(
                "SELECT id, disc, number, title, duration_ms FROM tracks WHERE release_id = ?1
                 ORDER BY COALESCE(disc, 1), COALESCE(number, position), position",
            )?;
            let rows = stmt.query_map([release_id], |row| {
                Ok(RemoteTrack {
                    id: row.get(0)?,
                    ordinal: 0,
                    disc_number: row.get(1)?,
                    track_number: row.get(2)?,
                    title: row.get(3)?,
                    duration_ms: u64::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
                })
            })?;

            let mut tracks = Vec::new();
            for (index, row) in rows.enumerate() {
                let mut track = row?;
                track.ordinal = index + 1;
                tracks.push(track);
            }
            Ok(tracks)
        };
        fetch().map_err(|e| self.unavailable(e))
    }
}
