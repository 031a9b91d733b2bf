//! # Safe Folder Relocation
//!
//! Moves an album folder to `{root}/{artist}/{year - album}` in two renames:
//! first to a randomly named sibling of the source, then to the final name.
//! Nothing ever appears half-moved under the destination name, and when
//! source and destination share a volume no data is copied.
//!
//! Lock contention ("resource busy", sharing violations) is retried a fixed
//! number of times with growing delays. Any other failure aborts the move and
//! puts the source back where it was.
//!
//! After a successful move every path under the old location is stale; the
//! caller rescans the new folder before touching tags again.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use lazy_static::lazy_static;
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

use crate::model::AlbumPlacement;

/// Relocation failures.
#[derive(Debug, Error)]
pub enum RelocationError {
    /// Still locked after every attempt. The source is untouched.
    #[error("{path} stayed locked after {attempts} attempts")]
    Locked { path: PathBuf, attempts: u32 },
    /// Fatal for this album.
    #[error("cannot move {path}: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RelocationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelocationError::Locked { .. })
    }
}

/// Retry bounds for lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: linear growth from the base delay.
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// The filesystem operations relocation needs.
pub trait FileSystem {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn exists(&self, path: &Path) -> bool {
        // `symlink_metadata` so a dangling link still counts as taken.
        fs::symlink_metadata(path).is_ok()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

/// Whether an I/O error means another process holds the file.
pub fn is_lock_error(err: &io::Error) -> bool {
    match err.raw_os_error() {
        #[cfg(unix)]
        Some(code) => code == libc::EBUSY || code == libc::ETXTBSY,
        // ERROR_ACCESS_DENIED, ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
        #[cfg(windows)]
        Some(code) => matches!(code, 5 | 32 | 33),
        #[cfg(not(any(unix, windows)))]
        Some(_) => false,
        None => false,
    }
}

lazy_static! {
    /// Device names Windows refuses as file names, with or without extension.
    static ref RESERVED_NAMES: HashSet<&'static str> = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ]
    .into_iter()
    .collect();
}

/// Make `name` safe as a single path component on every common filesystem.
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut cleaned = replaced
        .trim()
        .trim_end_matches(['.', ' '])
        .to_string();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.' || c == '_') {
        cleaned = "Unknown".to_string();
    }

    let stem = cleaned.split('.').next().unwrap_or_default().to_ascii_uppercase();
    if RESERVED_NAMES.contains(stem.as_str()) {
        cleaned.push('_');
    }
    cleaned
}

/// `{root}/{artist}/{year - album}`, year omitted when unknown.
pub fn destination_for(root: &Path, placement: &AlbumPlacement) -> PathBuf {
    let album = sanitize_component(&placement.album);
    let folder = match placement.year {
        Some(year) => format!("{year} - {album}"),
        None => album,
    };
    root.join(sanitize_component(&placement.artist)).join(folder)
}

/// Return `dest` if free, otherwise `dest (n)` with the smallest free `n >= 2`.
pub fn resolve_collision(fs: &dyn FileSystem, dest: &Path) -> PathBuf {
    if !fs.exists(dest) {
        return dest.to_path_buf();
    }
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));
    (2u32..)
        .map(|n| parent.join(format!("{name} ({n})")))
        .find(|candidate| !fs.exists(candidate))
        .unwrap_or_else(|| dest.to_path_buf())
}

fn temp_sibling(fs: &dyn FileSystem, source: &Path) -> PathBuf {
    let parent = source.parent().unwrap_or_else(|| Path::new(""));
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    loop {
        let tag: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let candidate = parent.join(format!(".{name}.curator-{tag}"));
        if !fs.exists(&candidate) {
            return candidate;
        }
    }
}

/// Rename with bounded retries on lock errors.
fn rename_with_retry(
    fs: &dyn FileSystem,
    from: &Path,
    to: &Path,
    policy: &RetryPolicy,
) -> Result<(), RelocationError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match fs.rename(from, to) {
            Ok(()) => return Ok(()),
            Err(err) if is_lock_error(&err) => {
                warn!(
                    "{} is locked (attempt {attempt}/{attempts}): {err}",
                    from.display()
                );
                if attempt < attempts {
                    thread::sleep(policy.delay_after(attempt));
                }
            }
            Err(err) => {
                return Err(RelocationError::Failed {
                    path: from.to_path_buf(),
                    source: err,
                })
            }
        }
    }
    Err(RelocationError::Locked {
        path: from.to_path_buf(),
        attempts,
    })
}

/// Whether `source` is `wanted` or a ` (n)` sibling of it, `n >= 2`.
///
/// Such a folder was put there by an earlier relocation that hit a
/// collision; moving it again would only bump the suffix.
fn already_placed(source: &Path, wanted: &Path) -> bool {
    if source == wanted {
        return true;
    }
    if source.parent() != wanted.parent() {
        return false;
    }
    let (Some(name), Some(base)) = (source.file_name(), wanted.file_name()) else {
        return false;
    };
    let name = name.to_string_lossy();
    let base = base.to_string_lossy();
    name.strip_prefix(base.as_ref())
        .and_then(|rest| rest.strip_prefix(" ("))
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|n| n.parse::<u32>().ok())
        .is_some_and(|n| n >= 2)
}

/// Move `source` to its canonical place under `root`.
///
/// The destination is `{root}/{artist}/{year} - {album}` (see
/// [`destination_for`]). When that name is taken by another folder the album
/// lands at `... (2)`, `... (3)` and so on, whichever is free first.
///
/// Returns the final path. Relocating an album that is already in place,
/// including one that earlier received a ` (n)` suffix, renames nothing and
/// returns `source`, so calling this twice has the effect of calling it once.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use curator::model::AlbumPlacement;
/// use curator::relocate::{relocate, RetryPolicy, StdFileSystem};
///
/// let placement = AlbumPlacement {
///     artist: "Can".to_string(),
///     year: Some(1971),
///     album: "Tago Mago".to_string(),
/// };
/// let moved = relocate(
///     &StdFileSystem,
///     Path::new("/incoming/tago mago"),
///     Path::new("/music"),
///     &placement,
///     &RetryPolicy::default(),
/// )?;
/// assert_eq!(moved, Path::new("/music/Can/1971 - Tago Mago"));
/// # Ok::<(), curator::relocate::RelocationError>(())
/// ```
///
/// # Errors
///
/// [`RelocationError::Locked`] when the retry bound runs out, and
/// [`RelocationError::Failed`] for any other I/O failure. In both cases the
/// source folder is left (or put back) under its original name.
///
/// # Design Notes
///
/// The move is two renames through a hidden, randomly named sibling of the
/// source. A crash between them leaves the album under that sibling name and
/// never half-present at the destination.
pub fn relocate(
    fs: &dyn FileSystem,
    source: &Path,
    root: &Path,
    placement: &AlbumPlacement,
    policy: &RetryPolicy,
) -> Result<PathBuf, RelocationError> {
    let wanted = destination_for(root, placement);
    if already_placed(source, &wanted) {
        debug!("{} is already in place", source.display());
        return Ok(source.to_path_buf());
    }
    if !fs.exists(source) {
        return Err(RelocationError::Failed {
            path: source.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "album folder does not exist"),
        });
    }

    let dest = resolve_collision(fs, &wanted);
    if let Some(parent) = dest.parent() {
        fs.create_dir_all(parent).map_err(|source| RelocationError::Failed {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp = temp_sibling(fs, source);
    debug!("Staging {} as {}", source.display(), temp.display());
    rename_with_retry(fs, source, &temp, policy)?;

    if let Err(err) = rename_with_retry(fs, &temp, &dest, policy) {
        warn!("Moving into {} failed, restoring source: {err}", dest.display());
        if let Err(restore) = rename_with_retry(fs, &temp, source, policy) {
            // Surface the restore failure; the album now sits at `temp`.
            return Err(RelocationError::Failed {
                path: temp,
                source: io::Error::new(
                    io::ErrorKind::Other,
                    format!("{err}; restoring the source also failed: {restore}"),
                ),
            });
        }
        return Err(err);
    }

    info!("Moved {} -> {}", source.display(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// Real filesystem whose first `fail` renames report EBUSY-style locks.
    struct Flaky {
        fail: Cell<u32>,
        error: fn() -> io::Error,
    }

    impl Flaky {
        fn locked(fail: u32) -> Self {
            Self {
                fail: Cell::new(fail),
                error: lock_error,
            }
        }
    }

    fn lock_error() -> io::Error {
        #[cfg(unix)]
        return io::Error::from_raw_os_error(libc::EBUSY);
        #[cfg(windows)]
        return io::Error::from_raw_os_error(32);
    }

    impl FileSystem for Flaky {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if self.fail.get() > 0 {
                self.fail.set(self.fail.get() - 1);
                return Err((self.error)());
            }
            fs::rename(from, to)
        }
        fn exists(&self, path: &Path) -> bool {
            StdFileSystem.exists(path)
        }
        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            fs::create_dir_all(path)
        }
    }

    fn album(root: &Path) -> PathBuf {
        let dir = root.join("incoming").join("kind of blue");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("01.flac"), b"x").unwrap();
        dir
    }

    fn placement() -> AlbumPlacement {
        AlbumPlacement {
            artist: "Miles Davis".to_string(),
            year: Some(1959),
            album: "Kind of Blue".to_string(),
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("AC/DC"), "AC_DC");
        assert_eq!(sanitize_component("What?: Live"), "What__ Live");
        assert_eq!(sanitize_component("  Trailing... "), "Trailing");
        assert_eq!(sanitize_component(""), "Unknown");
        assert_eq!(sanitize_component("con"), "con_");
        assert_eq!(sanitize_component("Nul.txt"), "Nul.txt_");
    }

    #[test]
    fn test_destination_layout() {
        let root = Path::new("/lib");
        assert_eq!(
            destination_for(root, &placement()),
            PathBuf::from("/lib/Miles Davis/1959 - Kind of Blue")
        );
        let undated = AlbumPlacement { year: None, ..placement() };
        assert_eq!(
            destination_for(root, &undated),
            PathBuf::from("/lib/Miles Davis/Kind of Blue")
        );
    }

    #[test]
    fn test_relocate_moves_folder() {
        let tmp = TempDir::new().unwrap();
        let source = album(tmp.path());
        let root = tmp.path().join("library");

        let dest = relocate(&StdFileSystem, &source, &root, &placement(), &fast()).unwrap();

        assert_eq!(dest, root.join("Miles Davis").join("1959 - Kind of Blue"));
        assert!(dest.join("01.flac").exists());
        assert!(!source.exists());
        // No staging directory left behind.
        let leftovers: Vec<_> = fs::read_dir(source.parent().unwrap()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_collision_gets_numbered_suffix() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("library");
        let existing = root.join("Miles Davis").join("1959 - Kind of Blue");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("keep.flac"), b"original").unwrap();

        let source = album(tmp.path());
        let dest = relocate(&StdFileSystem, &source, &root, &placement(), &fast()).unwrap();

        assert_eq!(dest, root.join("Miles Davis").join("1959 - Kind of Blue (2)"));
        assert_eq!(fs::read(existing.join("keep.flac")).unwrap(), b"original");
        assert!(dest.join("01.flac").exists());
    }

    #[test]
    fn test_collision_picks_smallest_free_suffix() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("Album");
        fs::create_dir_all(&base).unwrap();
        fs::create_dir_all(tmp.path().join("Album (2)")).unwrap();
        fs::create_dir_all(tmp.path().join("Album (4)")).unwrap();
        assert_eq!(resolve_collision(&StdFileSystem, &base), tmp.path().join("Album (3)"));
    }

    #[test]
    fn test_transient_lock_is_retried() {
        let tmp = TempDir::new().unwrap();
        let source = album(tmp.path());
        let root = tmp.path().join("library");

        let fs = Flaky::locked(2);
        let dest = relocate(&fs, &source, &root, &placement(), &fast()).unwrap();
        assert!(dest.join("01.flac").exists());
    }

    #[test]
    fn test_persistent_lock_leaves_source_untouched() {
        let tmp = TempDir::new().unwrap();
        let source = album(tmp.path());
        let root = tmp.path().join("library");

        let fs = Flaky::locked(u32::MAX);
        let err = relocate(&fs, &source, &root, &placement(), &fast()).unwrap_err();

        assert!(matches!(err, RelocationError::Locked { attempts: 3, .. }));
        assert!(err.is_retryable());
        assert!(source.join("01.flac").exists());
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let tmp = TempDir::new().unwrap();
        let source = album(tmp.path());
        let fs = Flaky {
            fail: Cell::new(1),
            error: || io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let err = relocate(&fs, &source, tmp.path(), &placement(), &fast()).unwrap_err();
        assert!(matches!(err, RelocationError::Failed { .. }));
        assert!(source.exists());
    }

    #[test]
    fn test_already_in_place_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Miles Davis").join("1959 - Kind of Blue");
        fs::create_dir_all(&dest).unwrap();
        let moved = relocate(&StdFileSystem, &dest, tmp.path(), &placement(), &fast()).unwrap();
        assert_eq!(moved, dest);
        assert!(!tmp.path().join("Miles Davis").join("1959 - Kind of Blue (2)").exists());
    }

    #[test]
    fn test_relocating_a_suffixed_album_again_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("library");
        fs::create_dir_all(root.join("Miles Davis").join("1959 - Kind of Blue")).unwrap();
        let source = album(tmp.path());

        let first = relocate(&StdFileSystem, &source, &root, &placement(), &fast()).unwrap();
        let second = relocate(&StdFileSystem, &first, &root, &placement(), &fast()).unwrap();

        assert_eq!(first, root.join("Miles Davis").join("1959 - Kind of Blue (2)"));
        assert_eq!(second, first);
        assert!(second.join("01.flac").exists());
        assert!(!root.join("Miles Davis").join("1959 - Kind of Blue (3)").exists());
    }

    #[test]
    fn test_already_placed() {
        let wanted = Path::new("/lib/A/2020 - B");
        assert!(already_placed(wanted, wanted));
        assert!(already_placed(Path::new("/lib/A/2020 - B (2)"), wanted));
        assert!(already_placed(Path::new("/lib/A/2020 - B (17)"), wanted));
        assert!(!already_placed(Path::new("/lib/A/2020 - B (1)"), wanted));
        assert!(!already_placed(Path::new("/lib/A/2020 - B (x)"), wanted));
        assert!(!already_placed(Path::new("/lib/A/2020 - B (2) live"), wanted));
        assert!(!already_placed(Path::new("/in/2020 - B (2)"), wanted));
    }

    #[test]
    fn test_lock_error_detection() {
        assert!(is_lock_error(&lock_error()));
        assert!(!is_lock_error(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
