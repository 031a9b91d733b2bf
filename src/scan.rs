//! Album folder discovery and local track scanning.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::model::{LocalTrack, TagSnapshot};
use crate::tags::{self, TagError, TagStore};

/// Tracks of one album folder plus any files whose tags could not be read.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub tracks: Vec<LocalTrack>,
    pub unreadable: Vec<TagError>,
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

pub(crate) fn is_audio_file(path: &Path, settings: &Settings) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            settings
                .extensions
                .iter()
                .any(|e| e.trim().trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// `CD1`, `cd 2`, `Disc 3`, `Disk04` and the like.
fn is_disc_folder(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.trim().to_ascii_lowercase();
    ["cd", "disc", "disk"].iter().any(|prefix| {
        lower
            .strip_prefix(prefix)
            .map(|rest| {
                let rest = rest.trim_start_matches([' ', '_', '-']);
                !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
            })
            .unwrap_or(false)
    })
}

/// Find every album folder below `root`.
///
/// A folder counts when it directly holds an audio file. Disc subfolders
/// are folded into their parent.
pub fn discover_albums(root: &Path, settings: &Settings) -> Vec<PathBuf> {
    let mut albums = BTreeSet::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .max_depth(settings.scan_depth.max(1))
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_audio_file(path, settings) {
            continue;
        }
        let Some(mut dir) = path.parent() else {
            continue;
        };
        if is_disc_folder(dir) && dir != root {
            if let Some(parent) = dir.parent() {
                dir = parent;
            }
        }
        albums.insert(dir.to_path_buf());
    }

    debug!("Discovered {} album folder(s) under {}", albums.len(), root.display());
    albums.into_iter().collect()
}

/// List the audio files of one album folder, sorted by their path below
/// `dir` (case-insensitive), so disc subfolders stay together.
pub fn album_files(dir: &Path, settings: &Settings) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.depth() == 1 || e.path().parent().is_some_and(is_disc_folder))
        .map(|e| e.into_path())
        .filter(|p| is_audio_file(p, settings))
        .collect();

    files.sort_by(|a, b| natural_key(a, dir).cmp(&natural_key(b, dir)));
    files
}

fn natural_key(path: &Path, dir: &Path) -> (String, PathBuf) {
    let rel = path.strip_prefix(dir).unwrap_or(path);
    (rel.to_string_lossy().to_lowercase(), path.to_path_buf())
}

/// Scan the album folder, reading each file through `store`.
///
/// Every handle is closed before this returns.
pub fn scan_album(dir: &Path, store: &dyn TagStore, settings: &Settings) -> ScanResult {
    scan_files(album_files(dir, settings), store)
}

/// Read the given files, in the given order.
pub fn scan_files(files: Vec<PathBuf>, store: &dyn TagStore) -> ScanResult {
    let mut result = ScanResult::default();
    for path in files {
        let (tags, duration_ms) = match tags::read_file(store, &path) {
            Ok(read) => read,
            Err(err) => {
                warn!("{err}");
                result.unreadable.push(err);
                (TagSnapshot::default(), 0)
            }
        };
        result.tracks.push(LocalTrack::from_snapshot(path, tags, duration_ms));
    }
    result
}
