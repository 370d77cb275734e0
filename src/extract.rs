//! What to do with a decoded archive: keep it, unpack it, or list it

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Name and uncompressed size of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Move a decoded archive to `destination`, consuming the scratch file.
///
/// Falls back to copy-and-delete when a rename crosses filesystems.
pub fn save_archive(archive: &Path, destination: &Path) -> Result<PathBuf> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
    }

    if fs::rename(archive, destination).is_err() {
        debug!(from = %archive.display(), to = %destination.display(), "rename failed, copying");
        fs::copy(archive, destination).map_err(|e| Error::write(destination, e))?;
        if let Err(e) = fs::remove_file(archive) {
            warn!(path = %archive.display(), error = %e, "could not remove scratch archive");
        }
    }

    info!(path = %destination.display(), "archive saved");
    Ok(destination.to_path_buf())
}

/// Unpack every entry of `archive` below `dest`.
///
/// Entries whose names would escape `dest` are skipped. Returns the files
/// written.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest).map_err(|e| Error::write(dest, e))?;
    let mut zip = open(archive)?;
    let mut extracted = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| Error::zip(archive, e))?;
        let target = match entry.enclosed_name() {
            Some(name) => dest.join(name),
            None => {
                warn!(entry = %entry.name(), "skipping entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::write(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
        }

        let mut out = File::create(&target).map_err(|e| Error::write(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| Error::write(&target, e))?;
        debug!(entry = %entry.name(), path = %target.display(), "extracted");
        extracted.push(target);
    }

    info!(archive = %archive.display(), files = extracted.len(), "archive extracted");
    Ok(extracted)
}

/// Entries of `archive`, in central-directory order
pub fn list_entries(archive: &Path) -> Result<Vec<EntryInfo>> {
    let mut zip = open(archive)?;
    (0..zip.len())
        .map(|index| {
            let entry = zip.by_index(index).map_err(|e| Error::zip(archive, e))?;
            Ok(EntryInfo {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            })
        })
        .collect()
}

fn open(archive: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| Error::read(archive, e))?;
    ZipArchive::new(file).map_err(|e| Error::NotAnArchive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn build_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_preserves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("in.zip");
        build_zip(&zip_path, &[("top/a.txt", &b"A"[..]), ("top/sub/b.txt", &b"BB"[..])]);

        let out = tmp.path().join("out");
        let files = extract_archive(&zip_path, &out).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read(out.join("top/a.txt")).unwrap(), b"A");
        assert_eq!(fs::read(out.join("top/sub/b.txt")).unwrap(), b"BB");
    }

    #[test]
    fn test_extract_skips_escaping_entries() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("evil.zip");
        build_zip(&zip_path, &[("../escape.txt", &b"x"[..]), ("safe.txt", &b"y"[..])]);

        let out = tmp.path().join("out");
        let files = extract_archive(&zip_path, &out).unwrap();
        assert_eq!(files, vec![out.join("safe.txt")]);
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_list_entries() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("in.zip");
        build_zip(&zip_path, &[("one.txt", &b"1"[..]), ("two.bin", &[0u8; 10][..])]);

        let entries = list_entries(&zip_path).unwrap();
        let summary: Vec<(&str, u64)> = entries.iter().map(|e| (e.name.as_str(), e.size)).collect();
        assert_eq!(summary, vec![("one.txt", 1), ("two.bin", 10)]);
    }

    #[test]
    fn test_save_moves_archive() {
        let tmp = TempDir::new().unwrap();
        let zip_path = tmp.path().join("scratch.zip");
        build_zip(&zip_path, &[("x", &b"x"[..])]);

        let saved = save_archive(&zip_path, &tmp.path().join("kept/final.zip")).unwrap();
        assert!(saved.exists());
        assert!(!zip_path.exists());
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.zip");
        fs::write(&path, b"nope").unwrap();
        assert!(matches!(list_entries(&path), Err(Error::NotAnArchive { .. })));
    }
}
