//! # Data Model
//!
//! Plain records shared by every stage of a reconciliation pass:
//!
//! - [`LocalTrack`]: an audio file found on disk, as last scanned
//! - [`RemoteTrack`]: one entry of a catalog release's track list
//! - [`TrackPair`]: one row of an alignment; never empty on both sides
//! - [`TagSnapshot`]: the fixed set of tag fields curator reads and writes
//! - [`AlbumPlacement`]: artist/year/album used to compute a destination folder

use std::fmt;
use std::path::{Path, PathBuf};

/// An audio file inside an album folder.
///
/// Rebuilt from disk on every rescan; never carried across a relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub path: PathBuf,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub title: Option<String>,
    pub composers: Vec<String>,
    pub performers: Vec<String>,
    pub duration_ms: u64,
    /// Full tag snapshot as read during the scan.
    pub tags: TagSnapshot,
}

impl LocalTrack {
    /// Build a track from a freshly read snapshot.
    pub fn from_snapshot(path: PathBuf, tags: TagSnapshot, duration_ms: u64) -> Self {
        Self {
            path,
            disc_number: tags.disc_number,
            track_number: tags.track_number,
            title: tags.title.clone(),
            composers: tags.composers.clone(),
            performers: tags.performers.clone(),
            duration_ms,
            tags,
        }
    }

    /// File name without directories, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Name used for display and title matching: the embedded title when
    /// present, otherwise the file stem.
    pub fn display_name(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// A track of a catalog release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    /// 1-based position within the release, continuous across discs.
    pub ordinal: usize,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub title: String,
    /// Zero when the catalog does not know the length.
    pub duration_ms: u64,
}

/// One row of an alignment.
///
/// The enum shape makes an empty row unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackPair {
    Matched { local: LocalTrack, remote: RemoteTrack },
    LocalOnly(LocalTrack),
    RemoteOnly(RemoteTrack),
}

impl TrackPair {
    /// Assemble a pair from optional sides. Returns `None` when both are missing.
    pub fn from_parts(local: Option<LocalTrack>, remote: Option<RemoteTrack>) -> Option<Self> {
        match (local, remote) {
            (Some(local), Some(remote)) => Some(Self::Matched { local, remote }),
            (Some(local), None) => Some(Self::LocalOnly(local)),
            (None, Some(remote)) => Some(Self::RemoteOnly(remote)),
            (None, None) => None,
        }
    }

    pub fn local(&self) -> Option<&LocalTrack> {
        match self {
            Self::Matched { local, .. } | Self::LocalOnly(local) => Some(local),
            Self::RemoteOnly(_) => None,
        }
    }

    pub fn remote(&self) -> Option<&RemoteTrack> {
        match self {
            Self::Matched { remote, .. } | Self::RemoteOnly(remote) => Some(remote),
            Self::LocalOnly(_) => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }

    /// Split back into optional sides.
    pub fn into_parts(self) -> (Option<LocalTrack>, Option<RemoteTrack>) {
        match self {
            Self::Matched { local, remote } => (Some(local), Some(remote)),
            Self::LocalOnly(local) => (Some(local), None),
            Self::RemoteOnly(remote) => (None, Some(remote)),
        }
    }
}

/// Tag fields curator knows how to compare and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagField {
    Title,
    Album,
    AlbumArtist,
    Year,
    TrackNumber,
    TrackTotal,
    DiscNumber,
    DiscTotal,
    Performers,
    Composers,
    Genres,
}

impl TagField {
    pub const ALL: [TagField; 11] = [
        TagField::Title,
        TagField::Album,
        TagField::AlbumArtist,
        TagField::Year,
        TagField::TrackNumber,
        TagField::TrackTotal,
        TagField::DiscNumber,
        TagField::DiscTotal,
        TagField::Performers,
        TagField::Composers,
        TagField::Genres,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TagField::Title => "title",
            TagField::Album => "album",
            TagField::AlbumArtist => "albumartist",
            TagField::Year => "year",
            TagField::TrackNumber => "track",
            TagField::TrackTotal => "tracktotal",
            TagField::DiscNumber => "disc",
            TagField::DiscTotal => "disctotal",
            TagField::Performers => "performers",
            TagField::Composers => "composers",
            TagField::Genres => "genres",
        }
    }

    pub fn is_list(self) -> bool {
        matches!(self, TagField::Performers | TagField::Composers | TagField::Genres)
    }
}

impl std::str::FromStr for TagField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "");
        match wanted.as_str() {
            "artist" | "performer" => return Ok(TagField::Performers),
            "composer" => return Ok(TagField::Composers),
            "genre" => return Ok(TagField::Genres),
            "tracknumber" => return Ok(TagField::TrackNumber),
            "discnumber" => return Ok(TagField::DiscNumber),
            _ => {}
        }
        TagField::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| format!("unknown tag field `{s}`"))
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The tag state of one file.
///
/// `None` and empty lists mean "not set". When used as a desired state they
/// mean "leave whatever is on disk".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSnapshot {
    pub title: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub performers: Vec<String>,
    pub composers: Vec<String>,
    pub genres: Vec<String>,
}

impl TagSnapshot {
    /// Check numeric ranges and normalize list entries.
    ///
    /// Returns the cleaned snapshot, or a description of the first problem.
    pub fn validated(self) -> Result<Self, String> {
        self.validated_for(&TagField::ALL)
    }

    /// Like [`validated`](Self::validated), but only constraints touching a
    /// field in `changed` are checked. Values already on disk that break a
    /// rule do not block an edit elsewhere.
    pub fn validated_for(mut self, changed: &[TagField]) -> Result<Self, String> {
        let touched = |fields: &[TagField]| fields.iter().any(|f| changed.contains(f));

        for (field, value) in [
            (TagField::Year, self.year),
            (TagField::TrackNumber, self.track_number),
            (TagField::TrackTotal, self.track_total),
            (TagField::DiscNumber, self.disc_number),
            (TagField::DiscTotal, self.disc_total),
        ] {
            if value == Some(0) && touched(&[field]) {
                return Err(format!("{field} must be at least 1"));
            }
        }
        if let Some(year) = self.year.filter(|_| touched(&[TagField::Year])) {
            if year > 9999 {
                return Err(format!("year {year} is out of range"));
            }
        }
        if touched(&[TagField::TrackNumber, TagField::TrackTotal]) {
            if let (Some(n), Some(total)) = (self.track_number, self.track_total) {
                if n > total {
                    return Err(format!("track {n} exceeds track total {total}"));
                }
            }
        }
        if touched(&[TagField::DiscNumber, TagField::DiscTotal]) {
            if let (Some(n), Some(total)) = (self.disc_number, self.disc_total) {
                if n > total {
                    return Err(format!("disc {n} exceeds disc total {total}"));
                }
            }
        }

        for text in [&mut self.title, &mut self.album, &mut self.album_artist] {
            if let Some(value) = text.take() {
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    *text = Some(trimmed.to_string());
                }
            }
        }
        for list in [&mut self.performers, &mut self.composers, &mut self.genres] {
            *list = std::mem::take(list)
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(self)
    }

    /// Render one field for display and comparison. Lists are joined with `"; "`.
    pub fn render(&self, field: TagField) -> Option<String> {
        let number = |n: Option<u32>| n.map(|v| v.to_string());
        let list = |l: &[String]| (!l.is_empty()).then(|| l.join("; "));
        match field {
            TagField::Title => self.title.clone(),
            TagField::Album => self.album.clone(),
            TagField::AlbumArtist => self.album_artist.clone(),
            TagField::Year => number(self.year),
            TagField::TrackNumber => number(self.track_number),
            TagField::TrackTotal => number(self.track_total),
            TagField::DiscNumber => number(self.disc_number),
            TagField::DiscTotal => number(self.disc_total),
            TagField::Performers => list(&self.performers),
            TagField::Composers => list(&self.composers),
            TagField::Genres => list(&self.genres),
        }
    }

    /// Set one field from operator text. Lists are split on `;`.
    pub fn assign(&mut self, field: TagField, value: &str) -> Result<(), String> {
        let value = value.trim();
        let number = || -> Result<Option<u32>, String> {
            if value.is_empty() {
                return Ok(None);
            }
            value
                .parse::<u32>()
                .map(Some)
                .map_err(|_| format!("`{value}` is not a number for {field}"))
        };
        let text = || (!value.is_empty()).then(|| value.to_string());
        let list = || -> Vec<String> {
            value
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        match field {
            TagField::Title => self.title = text(),
            TagField::Album => self.album = text(),
            TagField::AlbumArtist => self.album_artist = text(),
            TagField::Year => self.year = number()?,
            TagField::TrackNumber => self.track_number = number()?,
            TagField::TrackTotal => self.track_total = number()?,
            TagField::DiscNumber => self.disc_number = number()?,
            TagField::DiscTotal => self.disc_total = number()?,
            TagField::Performers => self.performers = list(),
            TagField::Composers => self.composers = list(),
            TagField::Genres => self.genres = list(),
        }
        Ok(())
    }

    /// Copy `field` from `other` into `self`.
    pub fn copy_field(&mut self, other: &TagSnapshot, field: TagField) {
        match field {
            TagField::Title => self.title = other.title.clone(),
            TagField::Album => self.album = other.album.clone(),
            TagField::AlbumArtist => self.album_artist = other.album_artist.clone(),
            TagField::Year => self.year = other.year,
            TagField::TrackNumber => self.track_number = other.track_number,
            TagField::TrackTotal => self.track_total = other.track_total,
            TagField::DiscNumber => self.disc_number = other.disc_number,
            TagField::DiscTotal => self.disc_total = other.disc_total,
            TagField::Performers => self.performers = other.performers.clone(),
            TagField::Composers => self.composers = other.composers.clone(),
            TagField::Genres => self.genres = other.genres.clone(),
        }
    }
}

/// Where an album belongs in the canonical layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumPlacement {
    pub artist: String,
    pub year: Option<u32>,
    pub album: String,
}

impl AlbumPlacement {
    /// Use album artist (or first performer), album and year from tags.
    /// Returns `None` unless both an artist and an album are present.
    pub fn from_tags(tags: &TagSnapshot) -> Option<Self> {
        let artist = tags
            .album_artist
            .clone()
            .or_else(|| tags.performers.first().cloned())?;
        let album = tags.album.clone()?;
        Some(Self {
            artist,
            year: tags.year,
            album,
        })
    }

    /// Guess from the folder layout.
    ///
    /// Understands `Artist/2020 - Album`, `Artist - Album` and `Artist/Album`.
    pub fn from_folder(dir: &Path) -> Option<Self> {
        let name = dir.file_name()?.to_string_lossy().trim().to_string();
        let parent = dir
            .parent()
            .and_then(|p| p.file_name())
            .map(|p| p.to_string_lossy().trim().to_string())
            .filter(|p| !p.is_empty());

        if let Some((head, tail)) = name.split_once(" - ") {
            let head = head.trim();
            let tail = tail.trim();
            if let Some(year) = parse_year(head) {
                return Some(Self {
                    artist: parent.unwrap_or_else(|| "Unknown Artist".to_string()),
                    year: Some(year),
                    album: tail.to_string(),
                });
            }
            if !head.is_empty() && !tail.is_empty() {
                return Some(Self {
                    artist: head.to_string(),
                    year: None,
                    album: tail.to_string(),
                });
            }
        }

        if name.is_empty() {
            return None;
        }
        Some(Self {
            artist: parent.unwrap_or_else(|| "Unknown Artist".to_string()),
            year: None,
            album: name,
        })
    }
}

fn parse_year(text: &str) -> Option<u32> {
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|y| (1000..=2999).contains(y))
}
