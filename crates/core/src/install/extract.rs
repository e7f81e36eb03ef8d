//! Zip expansion for downloaded packages.

use std::fs;
use std::io;
use std::path::Path;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::InstallError;
use super::state::DownloadState;

/// How an extraction ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Every entry was processed.
    Completed { entries: usize },
    /// The job was canceled between entries.
    Canceled,
}

/// Expands `archive` into `target_dir`, preserving relative paths, empty
/// directories and unix permission bits.
///
/// Blocking; run it on a blocking thread. The job state is locked around each
/// entry, so nothing is written once it reads [`DownloadState::Canceled`].
/// `on_entry(processed, total)` runs after each entry.
pub fn extract_zip(
    archive: &Path,
    target_dir: &Path,
    state: &Mutex<DownloadState>,
    mut on_entry: impl FnMut(usize, usize),
) -> Result<Extraction, InstallError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let total = zip.len();
    debug!("Extracting {} entries into {}", total, target_dir.display());

    fs::create_dir_all(target_dir)?;

    for index in 0..total {
        let guard = state.blocking_lock();
        if *guard == DownloadState::Canceled {
            debug!("Extraction canceled after {} of {} entries", index, total);
            return Ok(Extraction::Canceled);
        }

        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            drop(guard);
            on_entry(index + 1, total);
            continue;
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))?;
        }

        drop(guard);
        on_entry(index + 1, total);
    }

    Ok(Extraction::Completed { entries: total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default;

        zip.add_directory("share/empty/", options()).unwrap();
        zip.start_file("bin/ffmpeg", options().unix_permissions(0o755))
            .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.start_file("README.txt", options()).unwrap();
        zip.write_all(b"hello").unwrap();
        zip.start_file("../escape.txt", options()).unwrap();
        zip.write_all(b"nope").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_tree() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        build_zip(&archive);
        let target = dir.path().join("out");

        let state = Mutex::new(DownloadState::Extracting);
        let mut progress = Vec::new();
        let outcome = extract_zip(&archive, &target, &state, |done, total| {
            progress.push((done, total))
        })
        .unwrap();

        assert_eq!(outcome, Extraction::Completed { entries: 4 });
        assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
        assert!(target.join("share/empty").is_dir());
        assert_eq!(fs::read(target.join("README.txt")).unwrap(), b"hello");
        assert!(!dir.path().join("escape.txt").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(target.join("bin/ffmpeg"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_canceled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        build_zip(&archive);
        let target = dir.path().join("out");

        let state = Mutex::new(DownloadState::Canceled);
        let outcome = extract_zip(&archive, &target, &state, |_, _| {}).unwrap();

        assert_eq!(outcome, Extraction::Canceled);
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_cancel_mid_way() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        build_zip(&archive);
        let target = dir.path().join("out");

        let state = Mutex::new(DownloadState::Extracting);
        let outcome = extract_zip(&archive, &target, &state, |done, _| {
            if done == 2 {
                *state.blocking_lock() = DownloadState::Canceled;
            }
        })
        .unwrap();

        assert_eq!(outcome, Extraction::Canceled);
        assert!(!target.join("README.txt").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let state = Mutex::new(DownloadState::Extracting);
        let err = extract_zip(&archive, dir.path(), &state, |_, _| {}).unwrap_err();
        assert!(matches!(err, InstallError::Extraction { .. }));
    }
}
