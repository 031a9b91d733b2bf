//! # Tag Diff & Commit
//!
//! Computes the field-level delta between what a file holds and what it
//! should hold, then writes exactly that delta through a [`TagStore`].
//!
//! The desired state comes from a pure transform `&TagSnapshot -> TagSnapshot`
//! run once per file. A desired field that is `None` (or an empty list) means
//! "leave it alone" and never shows up in the diff.
//!
//! Lock contention and I/O failures are reported per file and never retried
//! here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::model::{RemoteTrack, TagField, TagSnapshot};
use crate::tags::{OpenTag, TagError, TagStore};

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    pub field: TagField,
    pub old: Option<String>,
    pub new: String,
}

impl fmt::Display for TagChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field,
            self.old.as_deref().unwrap_or("(none)"),
            self.new
        )
    }
}

/// Fields whose desired value is set and differs from the current one.
///
/// Lists compare by their `"; "` join, so order matters.
pub fn diff(current: &TagSnapshot, desired: &TagSnapshot) -> Vec<TagChange> {
    TagField::ALL
        .into_iter()
        .filter_map(|field| {
            let new = desired.render(field)?;
            let old = current.render(field);
            (old.as_deref() != Some(new.as_str())).then_some(TagChange { field, old, new })
        })
        .collect()
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing differed; no write was attempted.
    Unchanged,
    Written(Vec<TagChange>),
    /// Preview mode: the changes that would have been written.
    Previewed(Vec<TagChange>),
}

impl CommitOutcome {
    pub fn changes(&self) -> &[TagChange] {
        match self {
            CommitOutcome::Unchanged => &[],
            CommitOutcome::Written(c) | CommitOutcome::Previewed(c) => c,
        }
    }
}

/// Per-file result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<CommitOutcome, TagError>,
}

impl FileReport {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// Human-readable summary naming the file.
    pub fn reason(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        match &self.result {
            Ok(CommitOutcome::Unchanged) => format!("{name}: unchanged"),
            Ok(CommitOutcome::Written(c)) => format!("{name}: wrote {} field(s)", c.len()),
            Ok(CommitOutcome::Previewed(c)) => format!("{name}: would write {} field(s)", c.len()),
            Err(err) => format!("{name}: {err}"),
        }
    }

    /// True when something was actually written to disk.
    pub fn wrote(&self) -> bool {
        matches!(self.result, Ok(CommitOutcome::Written(_)))
    }
}

/// Diff one file against `transform(current)` and write the difference.
///
/// The tag handle is closed on every path out of this function.
pub fn commit_file<F>(store: &dyn TagStore, path: &Path, transform: F, preview: bool) -> FileReport
where
    F: FnOnce(&TagSnapshot) -> TagSnapshot,
{
    let result = commit_inner(store, path, transform, preview);
    match &result {
        Ok(CommitOutcome::Written(changes)) => {
            info!("Updated {} ({} field(s))", path.display(), changes.len())
        }
        Ok(outcome) => debug!("{}: {:?}", path.display(), outcome),
        Err(err) => log::warn!("{err}"),
    }
    FileReport {
        path: path.to_path_buf(),
        result,
    }
}

fn commit_inner<F>(
    store: &dyn TagStore,
    path: &Path,
    transform: F,
    preview: bool,
) -> Result<CommitOutcome, TagError>
where
    F: FnOnce(&TagSnapshot) -> TagSnapshot,
{
    let mut tag = OpenTag::open(store, path)?;
    let current = tag.read()?;
    let proposed = transform(&current);
    let touched: Vec<TagField> = diff(&current, &proposed).into_iter().map(|c| c.field).collect();
    let desired = proposed
        .validated_for(&touched)
        .map_err(|reason| TagError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;

    let changes = diff(&current, &desired);
    if changes.is_empty() {
        return Ok(CommitOutcome::Unchanged);
    }
    if preview {
        return Ok(CommitOutcome::Previewed(changes));
    }

    let fields: Vec<TagField> = changes.iter().map(|c| c.field).collect();
    tag.write(&fields, &desired)?;
    Ok(CommitOutcome::Written(changes))
}

// =============================================================================
// RELEASE TRANSFORM
// =============================================================================

/// Album-level values applied to every committed track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTags {
    pub album: String,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    /// Track count per disc (disc 1 when the release has no disc numbers).
    tracks_per_disc: BTreeMap<u32, u32>,
    /// Only known when the release numbers its discs.
    disc_total: Option<u32>,
}

impl ReleaseTags {
    pub fn new(
        album: impl Into<String>,
        album_artist: Option<String>,
        year: Option<u32>,
        tracks: &[RemoteTrack],
    ) -> Self {
        let mut tracks_per_disc = BTreeMap::new();
        for track in tracks {
            *tracks_per_disc.entry(track.disc_number.unwrap_or(1)).or_insert(0) += 1;
        }
        let disc_total = tracks
            .iter()
            .any(|t| t.disc_number.is_some())
            .then(|| tracks_per_disc.keys().copied().max())
            .flatten();
        Self {
            album: album.into(),
            album_artist,
            year,
            tracks_per_disc,
            disc_total,
        }
    }

    /// Desired tags for the file paired with `remote`.
    ///
    /// Performers, composers and genres are carried over from `current`;
    /// `overrides` wins over everything.
    pub fn apply(&self, current: &TagSnapshot, remote: &RemoteTrack, overrides: &TagSnapshot) -> TagSnapshot {
        let disc = remote.disc_number.unwrap_or(1);
        let ordinal = u32::try_from(remote.ordinal).unwrap_or(u32::MAX);
        let track_number = remote.track_number.unwrap_or(ordinal);

        let mut desired = current.clone();
        desired.title = Some(remote.title.clone());
        desired.album = Some(self.album.clone());
        if let Some(artist) = &self.album_artist {
            desired.album_artist = Some(artist.clone());
        }
        if self.year.is_some() {
            desired.year = self.year;
        }
        desired.track_number = Some(track_number);
        desired.track_total = self
            .tracks_per_disc
            .get(&disc)
            .copied()
            .filter(|&total| total >= track_number);
        if remote.disc_number.is_some() {
            desired.disc_number = remote.disc_number;
            desired.disc_total = self.disc_total;
        }

        for field in TagField::ALL {
            if overrides.render(field).is_some() {
                desired.copy_field(overrides, field);
            }
        }
        desired
    }
}
