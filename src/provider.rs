//! # Metadata Providers
//!
//! The contract the reconciler uses to search a catalog and fetch track
//! lists, a registry of named providers with one active at a time, and the
//! grouping logic behind combined pseudo-releases.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use thiserror::Error;

use crate::model::RemoteTrack;

/// What a search looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Artist,
    Release,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Artist => "artist",
            EntityKind::Release => "release",
        })
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(EntityKind::Artist),
            "release" | "album" => Ok(EntityKind::Release),
            other => Err(format!("unknown entity kind `{other}`")),
        }
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub year: Option<u32>,
    /// Free-form extra, e.g. the artist of a release.
    pub detail: Option<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            year: None,
            detail: None,
        }
    }

    pub fn with_year(mut self, year: Option<u32>) -> Self {
        self.year = year;
        self
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(year) = self.year {
            write!(f, " ({year})")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " - {detail}")?;
        }
        write!(f, " [{}]", self.id)
    }
}

/// Failures surfaced by the state machine. All of them are recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider {provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },
    #[error("no {kind} matches `{query}`")]
    NoCandidates { kind: EntityKind, query: String },
    #[error("release {release_id} has no tracks")]
    NoTracks { release_id: String },
}

/// A metadata source.
///
/// Implementations return empty collections rather than errors when nothing
/// matches; transport failures are [`ProviderError::Unavailable`].
pub trait Provider {
    fn name(&self) -> &str;

    /// Case-insensitive search. For releases `scope` is the artist id and an
    /// empty query lists every release of that artist.
    fn search(&self, query: &str, kind: EntityKind, scope: Option<&str>) -> Result<Vec<Candidate>, ProviderError>;

    /// Resolve an explicit id.
    fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<Candidate>, ProviderError>;

    /// Tracks of a release, ordered by ordinal.
    fn tracks(&self, release_id: &str) -> Result<Vec<RemoteTrack>, ProviderError>;
}

/// Named providers with one active at a time.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
    active: usize,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Box<dyn Provider>) {
        debug!("Registered provider {}", provider.name());
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: Box<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn active(&self) -> Option<&dyn Provider> {
        self.providers.get(self.active).map(|p| p.as_ref())
    }

    pub fn active_name(&self) -> &str {
        self.active().map(|p| p.name()).unwrap_or("none")
    }

    /// Make `name` active, or the next provider in registration order when
    /// `name` is `None`. Returns the new active name.
    pub fn switch(&mut self, name: Option<&str>) -> Result<&str, String> {
        if self.providers.is_empty() {
            return Err("no providers are registered".to_string());
        }
        self.active = match name {
            Some(wanted) => self
                .providers
                .iter()
                .position(|p| p.name().eq_ignore_ascii_case(wanted))
                .ok_or_else(|| format!("unknown provider `{wanted}`; known: {}", self.names().join(", ")))?,
            None => (self.active + 1) % self.providers.len(),
        };
        Ok(self.active_name())
    }
}

// =============================================================================
// COMBINED PSEUDO-RELEASES
// =============================================================================

/// Releases sharing a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseGroup {
    pub title: String,
    pub members: Vec<Candidate>,
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Group releases whose titles match case-insensitively, keeping only titles
/// that occur more than once. Groups and members follow listing order.
pub fn group_releases(releases: &[Candidate]) -> Vec<ReleaseGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Candidate>> = HashMap::new();
    for release in releases {
        let key = title_key(&release.name);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(release.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let members = groups.remove(&key)?;
            (members.len() > 1).then(|| ReleaseGroup {
                title: members[0].name.trim().to_string(),
                members,
            })
        })
        .collect()
}

/// Concatenated track list of a grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedTracks {
    pub tracks: Vec<RemoteTrack>,
    pub warnings: Vec<String>,
}

/// Concatenate constituent track lists in the given order.
///
/// Ordinals run 1..N across constituents. Disc numbers are shifted past the
/// highest disc of the constituents before; a constituent without disc
/// numbers counts as one disc. Track numbers fall back to the position
/// inside the constituent.
pub fn combine_tracks(parts: &[(String, Vec<RemoteTrack>)]) -> CombinedTracks {
    let mut combined = CombinedTracks::default();
    let mut disc_offset = 0;
    let mut seen_titles: HashMap<String, &str> = HashMap::new();
    let mut overlapping: HashSet<String> = HashSet::new();

    for (release_id, tracks) in parts {
        let mut sorted: Vec<&RemoteTrack> = tracks.iter().collect();
        sorted.sort_by_key(|t| t.ordinal);

        let mut highest_disc = disc_offset;
        for (position, track) in sorted.into_iter().enumerate() {
            let disc = disc_offset + track.disc_number.unwrap_or(1);
            highest_disc = highest_disc.max(disc);

            let key = title_key(&track.title);
            match seen_titles.get(key.as_str()) {
                Some(first) if *first != release_id.as_str() => {
                    overlapping.insert(track.title.trim().to_string());
                }
                Some(_) => {}
                None => {
                    seen_titles.insert(key, release_id);
                }
            }

            combined.tracks.push(RemoteTrack {
                id: track.id.clone(),
                ordinal: combined.tracks.len() + 1,
                disc_number: Some(disc),
                track_number: Some(
                    track
                        .track_number
                        .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX)),
                ),
                title: track.title.clone(),
                duration_ms: track.duration_ms,
            });
        }
        disc_offset = highest_disc;
    }

    let counts: Vec<usize> = parts.iter().map(|(_, t)| t.len()).collect();
    if counts.windows(2).any(|w| w[0] != w[1]) {
        let listed: Vec<String> = counts.iter().map(usize::to_string).collect();
        combined
            .warnings
            .push(format!("constituents differ in track count ({})", listed.join(", ")));
    }
    if !overlapping.is_empty() {
        let mut titles: Vec<String> = overlapping.into_iter().collect();
        titles.sort();
        combined.warnings.push(format!(
            "track titles repeat across constituents: {}",
            titles.join(", ")
        ));
    }
    for warning in &combined.warnings {
        warn!("Combined release: {warning}");
    }
    combined
}

// =============================================================================
// IN-MEMORY PROVIDER
// =============================================================================

#[derive(Debug, Default)]
struct StaticState {
    artists: Vec<Candidate>,
    releases: Vec<(String, Candidate)>,
    tracks: HashMap<String, Vec<RemoteTrack>>,
    offline: bool,
    searches: usize,
    track_fetches: usize,
}

/// Provider backed by data held in memory.
///
/// Cloning shares state. Useful for dry runs and for driving the reconciler
/// from tests, including simulated outages.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    state: Arc<Mutex<StaticState>>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut StaticState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn add_artist(&self, id: &str, name: &str) -> &Self {
        self.with(|s| s.artists.push(Candidate::new(id, name)));
        self
    }

    pub fn add_release(&self, artist_id: &str, id: &str, title: &str, year: Option<u32>, tracks: Vec<RemoteTrack>) -> &Self {
        self.with(|s| {
            s.releases
                .push((artist_id.to_string(), Candidate::new(id, title).with_year(year)));
            s.tracks.insert(id.to_string(), tracks);
        });
        self
    }

    /// Make every call fail with [`ProviderError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.with(|s| s.offline = offline);
    }

    pub fn searches(&self) -> usize {
        self.with(|s| s.searches)
    }

    pub fn track_fetches(&self) -> usize {
        self.with(|s| s.track_fetches)
    }

    fn check_online(&self, state: &StaticState) -> Result<(), ProviderError> {
        if state.offline {
            return Err(ProviderError::Unavailable {
                provider: self.name.clone(),
                reason: "offline".to_string(),
            });
        }
        Ok(())
    }
}

impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(&self, query: &str, kind: EntityKind, scope: Option<&str>) -> Result<Vec<Candidate>, ProviderError> {
        self.with(|s| {
            self.check_online(s)?;
            s.searches += 1;
            let needle = query.trim().to_lowercase();
            let hit = |c: &Candidate| needle.is_empty() || c.name.to_lowercase().contains(&needle);
            Ok(match kind {
                EntityKind::Artist => s.artists.iter().filter(|&c| hit(c)).cloned().collect(),
                EntityKind::Release => s
                    .releases
                    .iter()
                    .filter(|(artist, c)| scope.map_or(true, |id| id == artist.as_str()) && hit(c))
                    .map(|(_, c)| c.clone())
                    .collect(),
            })
        })
    }

    fn lookup(&self, kind: EntityKind, id: &str) -> Result<Option<Candidate>, ProviderError> {
        self.with(|s| {
            self.check_online(s)?;
            Ok(match kind {
                EntityKind::Artist => s.artists.iter().find(|c| c.id == id).cloned(),
                EntityKind::Release => s.releases.iter().find(|(_, c)| c.id == id).map(|(_, c)| c.clone()),
            })
        })
    }

    fn tracks(&self, release_id: &str) -> Result<Vec<RemoteTrack>, ProviderError> {
        self.with(|s| {
            self.check_online(s)?;
            s.track_fetches += 1;
            Ok(s.tracks.get(release_id).cloned().unwrap_or_default())
        })
    }
}
