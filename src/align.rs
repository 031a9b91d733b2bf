//! # Track Alignment Engine
//!
//! Pairs an album folder's files with a release's track list.
//!
//! Every call recomputes the pairing from the untouched inputs, so the same
//! inputs and strategy always give the same rows and switching strategy never
//! inherits assignments from an earlier run.
//!
//! ## Strategies
//!
//! - **Order**: n-th file (by path, disc folders in order) with n-th track
//! - **Duration**: each track, in release order, claims the closest-length file
//! - **TrackNumber**: embedded disc/track numbers, Order for the rest
//! - **Name**: best title similarity above a threshold, the rest left unpaired
//! - **Hybrid**: TrackNumber where numbers resolve, Name for the remainder
//! - **Manual**: positional identity; the operator edits from there
//!
//! Rows come out in release order, followed by files nothing claimed.
//! Under Order, Duration, TrackNumber and Manual the row count is
//! `max(files, tracks)`. Name and Hybrid may leave both a file and a track
//! unpaired, so their row count can be larger.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{LocalTrack, RemoteTrack, TrackPair};

/// Minimum similarity for a Name match.
pub const NAME_MATCH_THRESHOLD: f64 = 0.5;

/// How files are paired with tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignStrategy {
    #[default]
    Order,
    Duration,
    TrackNumber,
    Name,
    Hybrid,
    Manual,
}

impl AlignStrategy {
    pub const ALL: [AlignStrategy; 6] = [
        AlignStrategy::Order,
        AlignStrategy::Duration,
        AlignStrategy::TrackNumber,
        AlignStrategy::Name,
        AlignStrategy::Hybrid,
        AlignStrategy::Manual,
    ];

    /// Whether the reverse flag changes this strategy's file enumeration.
    pub fn honours_reverse(self) -> bool {
        matches!(self, AlignStrategy::Order | AlignStrategy::Name)
    }
}

impl fmt::Display for AlignStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlignStrategy::Order => "order",
            AlignStrategy::Duration => "duration",
            AlignStrategy::TrackNumber => "tracknumber",
            AlignStrategy::Name => "name",
            AlignStrategy::Hybrid => "hybrid",
            AlignStrategy::Manual => "manual",
        };
        f.write_str(name)
    }
}

impl FromStr for AlignStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" | "sequence" => Ok(AlignStrategy::Order),
            "duration" | "length" => Ok(AlignStrategy::Duration),
            "tracknumber" | "number" | "track" => Ok(AlignStrategy::TrackNumber),
            "name" | "title" => Ok(AlignStrategy::Name),
            "hybrid" => Ok(AlignStrategy::Hybrid),
            "manual" => Ok(AlignStrategy::Manual),
            other => Err(format!("unknown alignment strategy `{other}`")),
        }
    }
}

/// Pair `local` files with `remote` tracks.
///
/// `local` may arrive in any order. Files are enumerated by their path,
/// compared case-insensitively, which is the order [`album_files`] lists an
/// album in: files directly in the folder and each disc subfolder (`CD1`,
/// `CD2`, ...) stay together in disc order. The enumeration is reversed when
/// `reverse` is set and the strategy honours it (see
/// [`AlignStrategy::honours_reverse`]). `remote` is enumerated by ordinal.
///
/// The result is a pure function of the inputs; nothing from an earlier
/// alignment leaks into this one.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use curator::align::{align, AlignStrategy};
/// use curator::model::{LocalTrack, RemoteTrack, TagSnapshot};
///
/// let local = vec![
///     LocalTrack::from_snapshot(PathBuf::from("/a/02.flac"), TagSnapshot::default(), 0),
///     LocalTrack::from_snapshot(PathBuf::from("/a/01.flac"), TagSnapshot::default(), 0),
/// ];
/// let remote: Vec<RemoteTrack> = (1..=2)
///     .map(|n| RemoteTrack {
///         id: format!("t{n}"),
///         ordinal: n,
///         disc_number: None,
///         track_number: None,
///         title: format!("Track {n}"),
///         duration_ms: 0,
///     })
///     .collect();
///
/// let pairs = align(&local, &remote, AlignStrategy::Order, false);
/// assert_eq!(pairs[0].local().map(|l| l.file_name()), Some("01.flac".to_string()));
/// assert_eq!(pairs[0].remote().map(|r| r.ordinal), Some(1));
/// ```
///
/// # Design Notes
///
/// - Rows come out in release order, then the files nothing claimed.
/// - Each file and each track appears in at most one row, and no row is
///   empty on both sides.
/// - Duration ties go to the earliest file in enumeration order.
///
/// [`album_files`]: crate::scan::album_files
pub fn align(
    local: &[LocalTrack],
    remote: &[RemoteTrack],
    strategy: AlignStrategy,
    reverse: bool,
) -> Vec<TrackPair> {
    let mut files: Vec<&LocalTrack> = local.iter().collect();
    // Every file sits under the same album folder, so comparing whole paths
    // orders them the same way as comparing paths relative to that folder.
    files.sort_by_cached_key(|t| (t.path.to_string_lossy().to_lowercase(), t.path.clone()));
    if reverse && strategy.honours_reverse() {
        files.reverse();
    }

    let mut tracks: Vec<&RemoteTrack> = remote.iter().collect();
    tracks.sort_by_key(|t| t.ordinal);

    let mut claims = Claims::new(files.len(), tracks.len());
    match strategy {
        AlignStrategy::Order | AlignStrategy::Manual => claims.by_order(),
        AlignStrategy::Duration => claims.by_duration(&files, &tracks),
        AlignStrategy::TrackNumber => {
            claims.by_number(&files, &tracks);
            claims.by_order();
        }
        AlignStrategy::Name => claims.by_name(&files, &tracks),
        AlignStrategy::Hybrid => {
            claims.by_number(&files, &tracks);
            claims.by_name(&files, &tracks);
        }
    }

    claims.into_pairs(&files, &tracks)
}

/// Count of rows missing their file and rows missing their track.
pub fn unmatched(pairs: &[TrackPair]) -> (usize, usize) {
    pairs.iter().fold((0, 0), |(no_local, no_remote), pair| match pair {
        TrackPair::Matched { .. } => (no_local, no_remote),
        TrackPair::LocalOnly(_) => (no_local, no_remote + 1),
        TrackPair::RemoteOnly(_) => (no_local + 1, no_remote),
    })
}

/// Exchange the track sides of rows `a` and `b` (0-based).
///
/// Rows left with neither side are dropped.
pub fn swap_remotes(pairs: &mut Vec<TrackPair>, a: usize, b: usize) -> Result<(), String> {
    let len = pairs.len();
    if a >= len || b >= len {
        return Err(format!("rows must be between 1 and {len}"));
    }
    if a == b {
        return Ok(());
    }

    let rows: Vec<Option<TrackPair>> = std::mem::take(pairs).into_iter().map(Some).collect();
    let mut rows = rows;
    let (local_a, remote_a) = rows[a].take().map(TrackPair::into_parts).unwrap_or((None, None));
    let (local_b, remote_b) = rows[b].take().map(TrackPair::into_parts).unwrap_or((None, None));
    rows[a] = TrackPair::from_parts(local_a, remote_b);
    rows[b] = TrackPair::from_parts(local_b, remote_a);

    *pairs = rows.into_iter().flatten().collect();
    Ok(())
}

/// Title similarity in `0.0..=1.0`: case-insensitive, substring matches
/// score at least 0.8, otherwise normalized Levenshtein.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let edit = strsim::normalized_levenshtein(&a, &b);
    if a.contains(&b) || b.contains(&a) {
        0.8 + 0.2 * edit
    } else {
        edit
    }
}

/// Drop a leading `01 - `, `1.`, `03_` style number from a file stem.
fn strip_track_prefix(stem: &str) -> &str {
    let rest = stem.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == stem.len() {
        return stem;
    }
    let rest = rest.trim_start_matches([' ', '-', '.', '_', ')']);
    if rest.is_empty() {
        stem
    } else {
        rest
    }
}

fn match_key(track: &LocalTrack) -> String {
    match track.title.as_deref() {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => strip_track_prefix(&track.display_name()).to_string(),
    }
}

/// Working state: which track each file went to, and the reverse.
struct Claims {
    file_to_track: Vec<Option<usize>>,
    track_to_file: Vec<Option<usize>>,
}

impl Claims {
    fn new(files: usize, tracks: usize) -> Self {
        Self {
            file_to_track: vec![None; files],
            track_to_file: vec![None; tracks],
        }
    }

    fn claim(&mut self, file: usize, track: usize) {
        self.file_to_track[file] = Some(track);
        self.track_to_file[track] = Some(file);
    }

    fn free_files(&self) -> impl Iterator<Item = usize> + '_ {
        self.file_to_track
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_none())
            .map(|(i, _)| i)
    }

    fn free_tracks(&self) -> Vec<usize> {
        self.track_to_file
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Zip the still-free files and tracks in enumeration order.
    fn by_order(&mut self) {
        let files: Vec<usize> = self.free_files().collect();
        for (file, track) in files.into_iter().zip(self.free_tracks()) {
            self.claim(file, track);
        }
    }

    fn by_duration(&mut self, files: &[&LocalTrack], tracks: &[&RemoteTrack]) {
        for track in self.free_tracks() {
            let wanted = tracks[track].duration_ms;
            // `min_by_key` keeps the first minimum, i.e. the lowest file index.
            let best = self
                .free_files()
                .min_by_key(|&file| files[file].duration_ms.abs_diff(wanted));
            if let Some(file) = best {
                self.claim(file, track);
            }
        }
    }

    fn by_number(&mut self, files: &[&LocalTrack], tracks: &[&RemoteTrack]) {
        let keys: Vec<(u32, u32)> = tracks
            .iter()
            .map(|t| {
                let ordinal = u32::try_from(t.ordinal).unwrap_or(u32::MAX);
                (t.disc_number.unwrap_or(1), t.track_number.unwrap_or(ordinal))
            })
            .collect();

        let free: Vec<usize> = self.free_files().collect();
        for file in free {
            let Some(number) = files[file].track_number.filter(|&n| n > 0) else {
                continue;
            };
            let disc = files[file].disc_number.filter(|&d| d > 0).unwrap_or(1);
            let hit = keys
                .iter()
                .enumerate()
                .find(|&(track, &key)| key == (disc, number) && self.track_to_file[track].is_none())
                .map(|(track, _)| track);
            if let Some(track) = hit {
                self.claim(file, track);
            }
        }
    }

    fn by_name(&mut self, files: &[&LocalTrack], tracks: &[&RemoteTrack]) {
        let keys: Vec<String> = files.iter().map(|f| match_key(f)).collect();
        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for track in self.free_tracks() {
            for file in self.free_files() {
                let score = title_similarity(&keys[file], &tracks[track].title);
                if score >= NAME_MATCH_THRESHOLD {
                    candidates.push((score, track, file));
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
        for (_, track, file) in candidates {
            if self.track_to_file[track].is_none() && self.file_to_track[file].is_none() {
                self.claim(file, track);
            }
        }
    }

    fn into_pairs(self, files: &[&LocalTrack], tracks: &[&RemoteTrack]) -> Vec<TrackPair> {
        let mut pairs: Vec<TrackPair> = self
            .track_to_file
            .iter()
            .enumerate()
            .filter_map(|(track, file)| {
                TrackPair::from_parts(file.map(|f| files[f].clone()), Some(tracks[track].clone()))
            })
            .collect();
        pairs.extend(
            self.file_to_track
                .iter()
                .enumerate()
                .filter(|(_, t)| t.is_none())
                .filter_map(|(file, _)| TrackPair::from_parts(Some(files[file].clone()), None)),
        );
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagSnapshot;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn file(name: &str, duration_ms: u64) -> LocalTrack {
        LocalTrack::from_snapshot(PathBuf::from(format!("/a/{name}")), TagSnapshot::default(), duration_ms)
    }

    fn numbered(name: &str, disc: Option<u32>, track: Option<u32>) -> LocalTrack {
        let tags = TagSnapshot {
            disc_number: disc,
            track_number: track,
            ..Default::default()
        };
        LocalTrack::from_snapshot(PathBuf::from(format!("/a/{name}")), tags, 0)
    }

    fn track(ordinal: usize, title: &str, duration_ms: u64) -> RemoteTrack {
        RemoteTrack {
            id: format!("t{ordinal}"),
            ordinal,
            disc_number: None,
            track_number: None,
            title: title.to_string(),
            duration_ms,
        }
    }

    fn names(pairs: &[TrackPair]) -> Vec<(Option<String>, Option<usize>)> {
        pairs
            .iter()
            .map(|p| (p.local().map(|l| l.file_name()), p.remote().map(|r| r.ordinal)))
            .collect()
    }

    fn assert_each_used_once(pairs: &[TrackPair]) {
        let mut files = HashSet::new();
        let mut tracks = HashSet::new();
        for pair in pairs {
            if let Some(l) = pair.local() {
                assert!(files.insert(l.path.clone()), "file used twice");
            }
            if let Some(r) = pair.remote() {
                assert!(tracks.insert(r.id.clone()), "track used twice");
            }
        }
    }

    #[test]
    fn test_order_pairs_by_position() {
        let local = vec![file("c.flac", 0), file("a.flac", 0), file("B.flac", 0)];
        let remote = vec![track(2, "Two", 0), track(1, "One", 0), track(3, "Three", 0)];

        let pairs = align(&local, &remote, AlignStrategy::Order, false);

        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(TrackPair::is_matched));
        assert_eq!(
            names(&pairs),
            vec![
                (Some("a.flac".to_string()), Some(1)),
                (Some("B.flac".to_string()), Some(2)),
                (Some("c.flac".to_string()), Some(3)),
            ]
        );
    }

    #[test]
    fn test_order_keeps_disc_folders_together() {
        let disc = |path: &str| LocalTrack::from_snapshot(PathBuf::from(path), TagSnapshot::default(), 0);
        let local = vec![
            disc("/a/CD2/01.flac"),
            disc("/a/CD1/02.flac"),
            disc("/a/cd2/02.flac"),
            disc("/a/CD1/01.flac"),
        ];
        let remote: Vec<RemoteTrack> = (1..=4).map(|n| track(n, "T", 0)).collect();

        let pairs = align(&local, &remote, AlignStrategy::Order, false);

        let paths: Vec<_> = pairs.iter().filter_map(|p| p.local().map(|l| l.path.clone())).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/a/CD1/01.flac"),
                PathBuf::from("/a/CD1/02.flac"),
                PathBuf::from("/a/CD2/01.flac"),
                PathBuf::from("/a/cd2/02.flac"),
            ]
        );

        let reversed = align(&local, &remote, AlignStrategy::Order, true);
        assert_eq!(reversed[0].local().map(|l| l.path.clone()), Some(PathBuf::from("/a/cd2/02.flac")));
    }

    #[test]
    fn test_order_reverse_flag() {
        let local = vec![file("a.flac", 0), file("b.flac", 0), file("c.flac", 0)];
        let remote = vec![track(1, "One", 0), track(2, "Two", 0), track(3, "Three", 0)];

        let pairs = align(&local, &remote, AlignStrategy::Order, true);

        assert_eq!(
            names(&pairs),
            vec![
                (Some("c.flac".to_string()), Some(1)),
                (Some("b.flac".to_string()), Some(2)),
                (Some("a.flac".to_string()), Some(3)),
            ]
        );
    }

    #[test]
    fn test_reverse_ignored_by_duration_and_number() {
        let local = vec![file("a.flac", 100), file("b.flac", 200)];
        let remote = vec![track(1, "One", 100), track(2, "Two", 200)];
        for strategy in [AlignStrategy::Duration, AlignStrategy::TrackNumber, AlignStrategy::Manual] {
            assert_eq!(
                align(&local, &remote, strategy, true),
                align(&local, &remote, strategy, false),
                "{strategy}"
            );
        }
    }

    #[test]
    fn test_uneven_counts_leave_nulls() {
        let local = vec![file("a.flac", 0), file("b.flac", 0)];
        let remote = vec![track(1, "One", 0), track(2, "Two", 0), track(3, "Three", 0)];
        let pairs = align(&local, &remote, AlignStrategy::Order, false);
        assert_eq!(pairs.len(), 3);
        assert_eq!(unmatched(&pairs), (1, 0));

        let pairs = align(&local, &remote[..1], AlignStrategy::Order, false);
        assert_eq!(pairs.len(), 2);
        assert_eq!(unmatched(&pairs), (0, 1));
    }

    #[test]
    fn test_duration_picks_closest() {
        let local = vec![file("a.flac", 300_000), file("b.flac", 120_000), file("c.flac", 200_000)];
        let remote = vec![track(1, "One", 121_000), track(2, "Two", 199_000), track(3, "Three", 301_000)];

        let pairs = align(&local, &remote, AlignStrategy::Duration, false);

        assert_eq!(
            names(&pairs),
            vec![
                (Some("b.flac".to_string()), Some(1)),
                (Some("c.flac".to_string()), Some(2)),
                (Some("a.flac".to_string()), Some(3)),
            ]
        );
    }

    #[test]
    fn test_duration_tie_goes_to_lowest_file() {
        let local = vec![file("b.flac", 110), file("a.flac", 90)];
        let remote = vec![track(1, "One", 100)];
        let pairs = align(&local, &remote, AlignStrategy::Duration, false);
        assert_eq!(pairs[0].local().map(|l| l.file_name()), Some("a.flac".to_string()));
    }

    #[test]
    fn test_duration_is_idempotent() {
        let local = vec![file("a.flac", 5), file("b.flac", 5), file("c.flac", 9), file("d.flac", 1)];
        let remote = vec![track(1, "One", 5), track(2, "Two", 5), track(3, "Three", 4)];
        let first = align(&local, &remote, AlignStrategy::Duration, false);
        let second = align(&local, &remote, AlignStrategy::Duration, false);
        assert_eq!(first, second);
        assert_each_used_once(&first);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_track_number_with_order_fallback() {
        let local = vec![
            numbered("x.flac", None, Some(3)),
            numbered("y.flac", None, None),
            numbered("z.flac", None, Some(1)),
        ];
        let remote = vec![track(1, "One", 0), track(2, "Two", 0), track(3, "Three", 0)];

        let pairs = align(&local, &remote, AlignStrategy::TrackNumber, false);

        assert_eq!(
            names(&pairs),
            vec![
                (Some("z.flac".to_string()), Some(1)),
                (Some("y.flac".to_string()), Some(2)),
                (Some("x.flac".to_string()), Some(3)),
            ]
        );
    }

    #[test]
    fn test_track_number_respects_discs() {
        let local = vec![numbered("a.flac", Some(2), Some(1)), numbered("b.flac", Some(1), Some(1))];
        let mut remote = vec![track(1, "One", 0), track(2, "Two", 0)];
        remote[0].disc_number = Some(1);
        remote[0].track_number = Some(1);
        remote[1].disc_number = Some(2);
        remote[1].track_number = Some(1);

        let pairs = align(&local, &remote, AlignStrategy::TrackNumber, false);
        assert_eq!(
            names(&pairs),
            vec![(Some("b.flac".to_string()), Some(1)), (Some("a.flac".to_string()), Some(2))]
        );
    }

    #[test]
    fn test_duplicate_numbers_fall_back() {
        let local = vec![numbered("a.flac", None, Some(1)), numbered("b.flac", None, Some(1))];
        let remote = vec![track(1, "One", 0), track(2, "Two", 0)];
        let pairs = align(&local, &remote, AlignStrategy::TrackNumber, false);
        assert_each_used_once(&pairs);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(TrackPair::is_matched));
    }

    #[test]
    fn test_name_matches_titles_and_leaves_strangers() {
        let local = vec![
            file("01 - So What.flac", 0),
            file("02 - Freddie Freeloader.flac", 0),
            file("99 - Bonus Interview.flac", 0),
        ];
        let remote = vec![
            track(1, "Freddie Freeloader", 0),
            track(2, "So What", 0),
            track(3, "Blue in Green", 0),
        ];

        let pairs = align(&local, &remote, AlignStrategy::Name, false);

        assert_each_used_once(&pairs);
        let got = names(&pairs);
        assert!(got.contains(&(Some("02 - Freddie Freeloader.flac".to_string()), Some(1))));
        assert!(got.contains(&(Some("01 - So What.flac".to_string()), Some(2))));
        assert!(got.contains(&(None, Some(3))));
        assert!(got.contains(&(Some("99 - Bonus Interview.flac".to_string()), None)));
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn test_name_prefers_embedded_title() {
        let mut tagged = file("track1.flac", 0);
        tagged.title = Some("Blue in Green".to_string());
        let remote = vec![track(1, "So What", 0), track(2, "Blue in Green", 0)];
        let pairs = align(&[tagged], &remote, AlignStrategy::Name, false);
        assert!(names(&pairs).contains(&(Some("track1.flac".to_string()), Some(2))));
    }

    #[test]
    fn test_hybrid_numbers_then_names() {
        let mut named = numbered("bonus.flac", None, None);
        named.title = Some("Flamenco Sketches".to_string());
        let local = vec![numbered("a.flac", None, Some(1)), named];
        let remote = vec![track(1, "So What", 0), track(2, "All Blues", 0), track(3, "Flamenco Sketches", 0)];

        let pairs = align(&local, &remote, AlignStrategy::Hybrid, false);

        let got = names(&pairs);
        assert!(got.contains(&(Some("a.flac".to_string()), Some(1))));
        assert!(got.contains(&(Some("bonus.flac".to_string()), Some(3))));
        assert!(got.contains(&(None, Some(2))));
    }

    #[test]
    fn test_switching_strategy_recomputes_from_scratch() {
        let local = vec![file("a.flac", 300), file("b.flac", 100)];
        let remote = vec![track(1, "One", 100), track(2, "Two", 300)];

        let by_duration = align(&local, &remote, AlignStrategy::Duration, false);
        let by_order = align(&local, &remote, AlignStrategy::Order, false);
        let by_duration_again = align(&local, &remote, AlignStrategy::Duration, false);

        assert_ne!(by_duration, by_order);
        assert_eq!(by_order, align(&local, &remote, AlignStrategy::Manual, false));
        assert_eq!(by_duration, by_duration_again);
    }

    #[test]
    fn test_swap_remotes() {
        let local = vec![file("a.flac", 0), file("b.flac", 0)];
        let remote = vec![track(1, "One", 0), track(2, "Two", 0)];
        let mut pairs = align(&local, &remote, AlignStrategy::Order, false);

        swap_remotes(&mut pairs, 0, 1).unwrap();

        assert_eq!(
            names(&pairs),
            vec![(Some("a.flac".to_string()), Some(2)), (Some("b.flac".to_string()), Some(1))]
        );
        assert!(swap_remotes(&mut pairs, 0, 5).is_err());
    }

    #[test]
    fn test_swap_drops_empty_rows() {
        let local = vec![file("a.flac", 0)];
        let remote = vec![track(1, "Zzz", 0)];
        let mut pairs = align(&local, &remote, AlignStrategy::Name, false);
        assert_eq!(pairs.len(), 2);

        swap_remotes(&mut pairs, 0, 1).unwrap();

        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].is_matched());
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("So What", "so what"), 1.0);
        assert!(title_similarity("So What (Remastered)", "So What") >= 0.8);
        assert!(title_similarity("So What", "All Blues") < NAME_MATCH_THRESHOLD);
        assert_eq!(title_similarity("", "x"), 0.0);
    }

    #[test]
    fn test_strip_track_prefix() {
        assert_eq!(strip_track_prefix("01 - So What"), "So What");
        assert_eq!(strip_track_prefix("3. Blue"), "Blue");
        assert_eq!(strip_track_prefix("1999"), "1999");
        assert_eq!(strip_track_prefix("Intro"), "Intro");
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Duration".parse::<AlignStrategy>(), Ok(AlignStrategy::Duration));
        assert_eq!("track".parse::<AlignStrategy>(), Ok(AlignStrategy::TrackNumber));
        assert!("random".parse::<AlignStrategy>().is_err());
        for strategy in AlignStrategy::ALL {
            assert_eq!(strategy.to_string().parse::<AlignStrategy>(), Ok(strategy));
        }
    }
}
