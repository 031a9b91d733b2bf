//! # Tag Container Access
//!
//! The seam between curator and whatever reads and writes tag containers.
//!
//! A [`TagStore`] opens files; the returned [`TagHandle`] reads a
//! [`TagSnapshot`], writes a chosen subset of fields, and must be closed
//! before the file takes part in a relocation. [`OpenTag`] wraps a handle
//! and closes it on drop, so every exit path releases the file.
//!
//! Two stores ship with the crate:
//!
//! - [`LoftyTagStore`]: real files, backed by `lofty`
//! - [`MemoryTagStore`]: in-memory files for dry runs and tests, with
//!   open/close/write counters and injectable failures

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::prelude::{Accessor, TagExt};
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem};
use thiserror::Error;

use crate::model::{TagField, TagSnapshot};
use crate::relocate::is_lock_error;

/// Failures of the tag collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    #[error("cannot read tags of {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },
    #[error("cannot write tags of {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },
    /// Another process holds the file. Not retried here.
    #[error("{path} is locked by another process")]
    Locked { path: PathBuf },
    #[error("invalid tags for {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Opens tag containers.
pub trait TagStore {
    fn open(&self, path: &Path) -> Result<Box<dyn TagHandle + '_>, TagError>;
}

/// An open tag container.
pub trait TagHandle {
    fn path(&self) -> &Path;

    fn read(&mut self) -> Result<TagSnapshot, TagError>;

    /// Audio length in milliseconds, zero when unknown.
    fn duration_ms(&self) -> u64;

    /// Persist exactly `fields`, taking their values from `values`.
    /// Fields not listed keep whatever the container already holds.
    fn write(&mut self, fields: &[TagField], values: &TagSnapshot) -> Result<(), TagError>;

    /// Release the underlying file. Must be safe to call twice.
    fn close(&mut self);
}

/// A handle that is closed when it goes out of scope.
pub struct OpenTag<'a> {
    handle: Box<dyn TagHandle + 'a>,
}

impl<'a> OpenTag<'a> {
    pub fn open(store: &'a dyn TagStore, path: &Path) -> Result<Self, TagError> {
        Ok(Self {
            handle: store.open(path)?,
        })
    }
}

impl<'a> std::ops::Deref for OpenTag<'a> {
    type Target = dyn TagHandle + 'a;

    fn deref(&self) -> &Self::Target {
        self.handle.as_ref()
    }
}

impl std::ops::DerefMut for OpenTag<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handle.as_mut()
    }
}

impl Drop for OpenTag<'_> {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Read snapshot and duration in one open/close cycle.
pub fn read_file(store: &dyn TagStore, path: &Path) -> Result<(TagSnapshot, u64), TagError> {
    let mut tag = OpenTag::open(store, path)?;
    let snapshot = tag.read()?;
    Ok((snapshot, tag.duration_ms()))
}

// =============================================================================
// LOFTY BACKEND
// =============================================================================

/// Tag store for real audio files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagStore;

impl TagStore for LoftyTagStore {
    fn open(&self, path: &Path) -> Result<Box<dyn TagHandle + '_>, TagError> {
        let file = lofty::read_from_path(path).map_err(|e| classify(path, e, false))?;
        trace!("Opened tag container {}", path.display());
        Ok(Box::new(LoftyHandle {
            path: path.to_path_buf(),
            file: Some(file),
        }))
    }
}

struct LoftyHandle {
    path: PathBuf,
    file: Option<TaggedFile>,
}

impl LoftyHandle {
    fn file(&self) -> Result<&TaggedFile, TagError> {
        self.file.as_ref().ok_or_else(|| TagError::ReadFailed {
            path: self.path.clone(),
            reason: "handle already closed".to_string(),
        })
    }
}

impl TagHandle for LoftyHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&mut self) -> Result<TagSnapshot, TagError> {
        let file = self.file()?;
        let Some(tag) = file.primary_tag().or_else(|| file.first_tag()) else {
            return Ok(TagSnapshot::default());
        };
        Ok(snapshot_from_tag(tag))
    }

    fn duration_ms(&self) -> u64 {
        self.file
            .as_ref()
            .map(|f| u64::try_from(f.properties().duration().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn write(&mut self, fields: &[TagField], values: &TagSnapshot) -> Result<(), TagError> {
        let path = self.path.clone();
        let file = self.file.as_mut().ok_or_else(|| TagError::WriteFailed {
            path: path.clone(),
            reason: "handle already closed".to_string(),
        })?;

        let tag_type = file.primary_tag_type();
        if file.tag(tag_type).is_none() {
            file.insert_tag(Tag::new(tag_type));
        }
        let tag = file.tag_mut(tag_type).ok_or_else(|| TagError::WriteFailed {
            path: path.clone(),
            reason: format!("{tag_type:?} tags are not supported"),
        })?;

        for &field in fields {
            apply_field(tag, field, values);
        }

        tag.save_to_path(&path, WriteOptions::default())
            .map_err(|e| classify(&path, e, true))?;
        debug!("Wrote {} field(s) to {}", fields.len(), path.display());
        Ok(())
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            trace!("Closed tag container {}", self.path.display());
        }
    }
}

fn classify(path: &Path, err: lofty::error::LoftyError, writing: bool) -> TagError {
    if let lofty::error::ErrorKind::Io(io_err) = err.kind() {
        if is_lock_error(io_err) {
            return TagError::Locked {
                path: path.to_path_buf(),
            };
        }
    }
    let reason = err.to_string();
    let path = path.to_path_buf();
    if writing {
        TagError::WriteFailed { path, reason }
    } else {
        TagError::ReadFailed { path, reason }
    }
}

fn first_number(tag: &Tag, key: ItemKey) -> Option<u32> {
    // "3/12" style values carry the total after the slash.
    tag.get_string(key)
        .and_then(|v| v.split('/').next())
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n: &u32| n > 0)
}

fn strings(tag: &Tag, key: ItemKey) -> Vec<String> {
    tag.get_strings(key)
        .flat_map(|v| v.split(';'))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn snapshot_from_tag(tag: &Tag) -> TagSnapshot {
    let year = first_number(tag, ItemKey::Year).or_else(|| {
        tag.get_string(ItemKey::RecordingDate)
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    });

    TagSnapshot {
        title: tag.title().map(|t| t.into_owned()),
        album: tag.album().map(|a| a.into_owned()),
        album_artist: tag.get_string(ItemKey::AlbumArtist).map(str::to_string),
        year,
        track_number: tag.track().or_else(|| first_number(tag, ItemKey::TrackNumber)),
        track_total: tag.track_total(),
        disc_number: tag.disk().or_else(|| first_number(tag, ItemKey::DiscNumber)),
        disc_total: tag.disk_total(),
        performers: strings(tag, ItemKey::TrackArtist),
        composers: strings(tag, ItemKey::Composer),
        genres: strings(tag, ItemKey::Genre),
    }
}

fn item_key(field: TagField) -> ItemKey {
    match field {
        TagField::Title => ItemKey::TrackTitle,
        TagField::Album => ItemKey::AlbumTitle,
        TagField::AlbumArtist => ItemKey::AlbumArtist,
        TagField::Year => ItemKey::Year,
        TagField::TrackNumber => ItemKey::TrackNumber,
        TagField::TrackTotal => ItemKey::TrackTotal,
        TagField::DiscNumber => ItemKey::DiscNumber,
        TagField::DiscTotal => ItemKey::DiscTotal,
        TagField::Performers => ItemKey::TrackArtist,
        TagField::Composers => ItemKey::Composer,
        TagField::Genres => ItemKey::Genre,
    }
}

fn apply_field(tag: &mut Tag, field: TagField, values: &TagSnapshot) {
    let list = match field {
        TagField::Performers => Some(&values.performers),
        TagField::Composers => Some(&values.composers),
        TagField::Genres => Some(&values.genres),
        _ => None,
    };

    tag.remove_key(item_key(field));
    match list {
        Some(entries) => {
            for entry in entries {
                tag.push(TagItem::new(item_key(field), ItemValue::Text(entry.clone())));
            }
        }
        None => {
            if let Some(text) = values.render(field) {
                tag.insert_text(item_key(field), text);
            }
        }
    }
}

// =============================================================================
// IN-MEMORY BACKEND
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, (TagSnapshot, u64)>,
    open_handles: usize,
    opens: usize,
    closes: usize,
    writes: Vec<(PathBuf, Vec<TagField>)>,
    fail_read: HashMap<PathBuf, TagError>,
    fail_write: HashMap<PathBuf, TagError>,
}

/// Tag store holding files in memory.
///
/// Cloning shares state, so a test can keep a clone to inspect counters
/// after handing the store to a reconciler.
#[derive(Debug, Default, Clone)]
pub struct MemoryTagStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn insert(&self, path: impl Into<PathBuf>, tags: TagSnapshot, duration_ms: u64) {
        self.with(|s| s.files.insert(path.into(), (tags, duration_ms)));
    }

    pub fn get(&self, path: &Path) -> Option<TagSnapshot> {
        self.with(|s| s.files.get(path).map(|(t, _)| t.clone()))
    }

    /// Move every entry under `from` to the same relative path under `to`.
    pub fn rename_dir(&self, from: &Path, to: &Path) {
        self.with(|s| {
            let moved: Vec<PathBuf> = s
                .files
                .keys()
                .filter(|p| p.starts_with(from))
                .cloned()
                .collect();
            for old in moved {
                if let (Ok(rel), Some(entry)) = (old.strip_prefix(from), s.files.get(&old).cloned()) {
                    s.files.remove(&old);
                    s.files.insert(to.join(rel), entry);
                }
            }
        });
    }

    pub fn fail_read(&self, path: impl Into<PathBuf>, err: TagError) {
        self.with(|s| s.fail_read.insert(path.into(), err));
    }

    pub fn fail_write(&self, path: impl Into<PathBuf>, err: TagError) {
        self.with(|s| s.fail_write.insert(path.into(), err));
    }

    pub fn open_handles(&self) -> usize {
        self.with(|s| s.open_handles)
    }

    pub fn opens(&self) -> usize {
        self.with(|s| s.opens)
    }

    pub fn closes(&self) -> usize {
        self.with(|s| s.closes)
    }

    /// Every write as `(path, fields)`, in order.
    pub fn writes(&self) -> Vec<(PathBuf, Vec<TagField>)> {
        self.with(|s| s.writes.clone())
    }
}

impl TagStore for MemoryTagStore {
    fn open(&self, path: &Path) -> Result<Box<dyn TagHandle + '_>, TagError> {
        self.with(|s| {
            if !s.files.contains_key(path) {
                return Err(TagError::ReadFailed {
                    path: path.to_path_buf(),
                    reason: io::Error::from(io::ErrorKind::NotFound).to_string(),
                });
            }
            s.opens += 1;
            s.open_handles += 1;
            Ok(())
        })?;
        Ok(Box::new(MemoryHandle {
            store: self.clone(),
            path: path.to_path_buf(),
            open: true,
        }))
    }
}

struct MemoryHandle {
    store: MemoryTagStore,
    path: PathBuf,
    open: bool,
}

impl TagHandle for MemoryHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&mut self) -> Result<TagSnapshot, TagError> {
        let path = self.path.clone();
        self.store.with(|s| {
            if let Some(err) = s.fail_read.get(&path) {
                return Err(err.clone());
            }
            s.files
                .get(&path)
                .map(|(t, _)| t.clone())
                .ok_or(TagError::ReadFailed {
                    path,
                    reason: "file vanished".to_string(),
                })
        })
    }

    fn duration_ms(&self) -> u64 {
        self.store
            .with(|s| s.files.get(&self.path).map(|(_, d)| *d).unwrap_or(0))
    }

    fn write(&mut self, fields: &[TagField], values: &TagSnapshot) -> Result<(), TagError> {
        let path = self.path.clone();
        self.store.with(|s| {
            if let Some(err) = s.fail_write.get(&path) {
                return Err(err.clone());
            }
            let Some((current, _)) = s.files.get_mut(&path) else {
                return Err(TagError::WriteFailed {
                    path,
                    reason: "file vanished".to_string(),
                });
            };
            for &field in fields {
                current.copy_field(values, field);
            }
            s.writes.push((path, fields.to_vec()));
            Ok(())
        })
    }

    fn close(&mut self) {
        if std::mem::take(&mut self.open) {
            self.store.with(|s| {
                s.open_handles -= 1;
                s.closes += 1;
            });
        }
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song() -> TagSnapshot {
        TagSnapshot {
            title: Some("Old".to_string()),
            album: Some("Album".to_string()),
            performers: vec!["A".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_open_tag_closes_on_drop() {
        let store = MemoryTagStore::new();
        store.insert("/a.flac", song(), 1000);
        {
            let mut tag = OpenTag::open(&store, Path::new("/a.flac")).unwrap();
            assert_eq!(store.open_handles(), 1);
            assert_eq!(tag.read().unwrap().title.as_deref(), Some("Old"));
        }
        assert_eq!(store.open_handles(), 0);
        assert_eq!(store.closes(), 1);
    }

    #[test]
    fn test_read_file_reports_duration() {
        let store = MemoryTagStore::new();
        store.insert("/a.flac", song(), 4321);
        let (tags, duration) = read_file(&store, Path::new("/a.flac")).unwrap();
        assert_eq!(duration, 4321);
        assert_eq!(tags, song());
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn test_partial_write_keeps_other_fields() {
        let store = MemoryTagStore::new();
        store.insert("/a.flac", song(), 0);
        let desired = TagSnapshot {
            title: Some("New".to_string()),
            album: Some("Other".to_string()),
            ..Default::default()
        };
        {
            let mut tag = OpenTag::open(&store, Path::new("/a.flac")).unwrap();
            tag.write(&[TagField::Title], &desired).unwrap();
        }
        let after = store.get(Path::new("/a.flac")).unwrap();
        assert_eq!(after.title.as_deref(), Some("New"));
        assert_eq!(after.album.as_deref(), Some("Album"));
        assert_eq!(after.performers, vec!["A"]);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let store = MemoryTagStore::new();
        assert!(matches!(
            store.open(Path::new("/nope.flac")),
            Err(TagError::ReadFailed { .. })
        ));
        assert_eq!(store.opens(), 0);
    }

    #[test]
    fn test_rename_dir_moves_entries() {
        let store = MemoryTagStore::new();
        store.insert("/in/x/a.flac", song(), 0);
        store.insert("/in/y/b.flac", song(), 0);
        store.rename_dir(Path::new("/in/x"), Path::new("/lib/A/x"));
        assert!(store.get(Path::new("/lib/A/x/a.flac")).is_some());
        assert!(store.get(Path::new("/in/x/a.flac")).is_none());
        assert!(store.get(Path::new("/in/y/b.flac")).is_some());
    }

    #[test]
    fn test_lofty_store_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(
            LoftyTagStore.open(&path),
            Err(TagError::ReadFailed { .. })
        ));
    }
}
