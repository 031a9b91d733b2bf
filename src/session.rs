//! # Reconciliation Session
//!
//! Everything one album's pass through stages A, B and C needs, owned by that
//! pass alone. A session is created when an album folder comes up and thrown
//! away when the operator moves on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::align::{self, AlignStrategy};
use crate::model::{AlbumPlacement, LocalTrack, RemoteTrack, TagSnapshot, TrackPair};
use crate::provider::{Candidate, ReleaseGroup};

/// Macro-state of the reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// A: pick the artist.
    Artist,
    /// B: pick the release.
    Release,
    /// C: align, edit, commit.
    Tracks,
}

impl Stage {
    pub fn letter(self) -> char {
        match self {
            Stage::Artist => 'A',
            Stage::Release => 'B',
            Stage::Tracks => 'C',
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Artist => "artist",
            Stage::Release => "release",
            Stage::Tracks => "tracks",
        };
        write!(f, "{} ({name})", self.letter())
    }
}

/// How an album pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumOutcome {
    /// The operator finished stage C.
    Completed,
    Skipped,
    /// Unattended pass stopped at stage C without touching files.
    Inspected,
    /// Operator input ran out mid-album.
    Abandoned,
}

impl fmt::Display for AlbumOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            AlbumOutcome::Completed => "completed",
            AlbumOutcome::Skipped => "skipped",
            AlbumOutcome::Inspected => "inspected",
            AlbumOutcome::Abandoned => "abandoned",
        })
    }
}

/// The release picked at stage B, possibly a combination of several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub id: String,
    pub title: String,
    pub year: Option<u32>,
    /// Release ids the track list was built from; one for a plain release.
    pub constituents: Vec<String>,
}

impl ResolvedRelease {
    pub fn single(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.clone(),
            title: candidate.name.clone(),
            year: candidate.year,
            constituents: vec![candidate.id.clone()],
        }
    }

    pub fn combined(group: &ReleaseGroup) -> Self {
        let constituents: Vec<String> = group.members.iter().map(|m| m.id.clone()).collect();
        Self {
            id: constituents.join("+"),
            title: group.title.clone(),
            year: group.members.iter().filter_map(|m| m.year).min(),
            constituents,
        }
    }

    pub fn is_combined(&self) -> bool {
        self.constituents.len() > 1
    }
}

/// Remote tracks of one release id.
#[derive(Debug, Default, Clone)]
pub struct TrackCache {
    entry: Option<(String, Vec<RemoteTrack>)>,
}

impl TrackCache {
    pub fn get(&self, release_id: &str) -> Option<&[RemoteTrack]> {
        match &self.entry {
            Some((id, tracks)) if id == release_id => Some(tracks),
            _ => None,
        }
    }

    /// Replace whatever was cached; a new id drops the old tracks.
    pub fn store(&mut self, release_id: &str, tracks: Vec<RemoteTrack>) {
        debug!("Caching {} track(s) for release {release_id}", tracks.len());
        self.entry = Some((release_id.to_string(), tracks));
    }

    pub fn invalidate(&mut self) {
        if let Some((id, _)) = self.entry.take() {
            debug!("Dropped cached tracks of release {id}");
        }
    }

    pub fn cached_id(&self) -> Option<&str> {
        self.entry.as_ref().map(|(id, _)| id.as_str())
    }
}

/// What to repeat when the operator asks for a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    SearchArtists(String),
    SearchReleases(String),
    LoadTracks(ResolvedRelease),
}

/// Mutable state of one album pass.
#[derive(Debug)]
pub struct ReconciliationSession {
    pub album_dir: PathBuf,
    pub stage: Stage,
    /// Suggested search text for stage A.
    pub artist_query: String,
    /// Suggested search text for stage B.
    pub release_query: String,
    pub artist: Option<Candidate>,
    pub release: Option<ResolvedRelease>,
    pub strategy: AlignStrategy,
    pub reverse: bool,
    pub album_artist_override: Option<String>,
    pub preview: bool,
    pub provider: String,
    /// Files as last scanned, in scan order.
    pub local: Vec<LocalTrack>,
    pub pairs: Vec<TrackPair>,
    /// Operator edits keyed by path relative to the album folder.
    pub overrides: BTreeMap<PathBuf, TagSnapshot>,
    /// Files written this session, by path relative to the album folder.
    pub committed: BTreeSet<PathBuf>,
    /// Candidates on screen at stage A or B.
    pub candidates: Vec<Candidate>,
    /// Same-titled release groups offered at stage B.
    pub groups: Vec<ReleaseGroup>,
    pub pending: Option<PendingAction>,
    pub outcome: Option<AlbumOutcome>,
    pub cache: TrackCache,
}

impl ReconciliationSession {
    pub fn new(album_dir: PathBuf, local: Vec<LocalTrack>, strategy: AlignStrategy, provider: &str) -> Self {
        Self {
            album_dir,
            stage: Stage::Artist,
            artist_query: String::new(),
            release_query: String::new(),
            artist: None,
            release: None,
            strategy,
            reverse: false,
            album_artist_override: None,
            preview: false,
            provider: provider.to_string(),
            local,
            pairs: Vec::new(),
            overrides: BTreeMap::new(),
            committed: BTreeSet::new(),
            candidates: Vec::new(),
            groups: Vec::new(),
            pending: None,
            outcome: None,
            cache: TrackCache::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Tracks of the resolved release, if fetched.
    pub fn release_tracks(&self) -> Option<&[RemoteTrack]> {
        self.release.as_ref().and_then(|r| self.cache.get(&r.id))
    }

    /// Recompute the pairing from the scanned files and cached tracks.
    /// Operator overrides belong to the old pairing and are dropped.
    pub fn realign(&mut self) {
        let remote = self.release_tracks().map(<[RemoteTrack]>::to_vec).unwrap_or_default();
        self.pairs = align::align(&self.local, &remote, self.strategy, self.reverse);
        self.overrides.clear();
    }

    /// Move forward one stage.
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            Stage::Artist => Stage::Release,
            Stage::Release | Stage::Tracks => Stage::Tracks,
        };
    }

    /// Step back one stage, discarding what the left stage had resolved.
    /// Returns `false` at stage A.
    pub fn back(&mut self) -> bool {
        match self.stage {
            Stage::Artist => false,
            Stage::Release => {
                self.stage = Stage::Artist;
                self.artist = None;
                self.groups.clear();
                true
            }
            Stage::Tracks => {
                self.stage = Stage::Release;
                self.release = None;
                self.pairs.clear();
                self.overrides.clear();
                true
            }
        }
    }

    /// Forget candidates and cached tracks, e.g. after a provider switch.
    pub fn clear_provider_state(&mut self) {
        self.candidates.clear();
        self.groups.clear();
        self.pending = None;
        self.cache.invalidate();
    }

    pub fn relative_key(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.album_dir).unwrap_or(path).to_path_buf()
    }

    /// Swap in freshly scanned files, keeping the current pairing.
    ///
    /// Pair rows are matched by path relative to the album folder. Rows
    /// whose file disappeared lose their local side.
    pub fn replace_local(&mut self, album_dir: PathBuf, tracks: Vec<LocalTrack>) {
        let old_dir = std::mem::replace(&mut self.album_dir, album_dir);
        let by_key: BTreeMap<PathBuf, LocalTrack> = tracks
            .iter()
            .map(|t| (self.relative_key(&t.path), t.clone()))
            .collect();

        self.pairs = std::mem::take(&mut self.pairs)
            .into_iter()
            .filter_map(|pair| {
                let (local, remote) = pair.into_parts();
                let local = local.and_then(|l| {
                    let key = l.path.strip_prefix(&old_dir).unwrap_or(&l.path).to_path_buf();
                    by_key.get(&key).cloned()
                });
                TrackPair::from_parts(local, remote)
            })
            .collect();
        self.local = tracks;
    }

    /// Distinct performers across the scanned files, first seen first.
    pub fn performers(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for performer in self.local.iter().flat_map(|t| t.performers.iter()) {
            let performer = performer.trim();
            if !performer.is_empty() && !seen.iter().any(|p| p == performer) {
                seen.push(performer.to_string());
            }
        }
        seen
    }

    /// Where the album belongs according to the tags written this session.
    pub fn committed_placement(&self) -> Option<AlbumPlacement> {
        self.local
            .iter()
            .filter(|t| self.committed.contains(&self.relative_key(&t.path)))
            .find_map(|t| AlbumPlacement::from_tags(&t.tags))
    }

    /// Album artist to write: the override, else the resolved artist.
    pub fn album_artist(&self) -> Option<String> {
        self.album_artist_override
            .clone()
            .or_else(|| self.artist.as_ref().map(|a| a.name.clone()))
    }
}
