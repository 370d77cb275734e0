//! Work items and the enumerator that builds them

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Separator used inside archive entry names
pub const ENTRY_SEPARATOR: char = '/';

/// One source file and the name it gets inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Absolute path of the source file
    pub source: PathBuf,
    /// Relative, `/`-separated entry name
    pub entry_name: String,
}

impl WorkItem {
    pub fn new(source: impl Into<PathBuf>, entry_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry_name: entry_name.into(),
        }
    }
}

/// A path that could not be sized or listed during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// Ordered work items plus the total source size used to scale progress
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    items: Vec<WorkItem>,
    total_bytes: u64,
    skipped: Vec<Skipped>,
    names: HashSet<String>,
}

impl Worklist {
    /// Create an empty worklist
    pub fn new() -> Self {
        Self::default()
    }

    /// Flat worklist: every file is stored under its base name
    pub fn from_files<P: AsRef<Path>>(files: &[P]) -> Result<Self> {
        let mut list = Self::new();
        for file in files {
            list.add_file(file.as_ref())?;
        }
        Ok(list)
    }

    /// Every regular file under `dir`, named relative to the directory's parent
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut list = Self::new();
        list.add_dir(dir.as_ref())?;
        Ok(list)
    }

    /// Mixed selection: directories are walked, anything else is a flat file
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut list = Self::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                list.add_dir(path)?;
            } else {
                list.add_file(path)?;
            }
        }
        Ok(list)
    }

    /// Add a single file under its base name.
    ///
    /// A missing or unreadable file is still queued; its size is left out of
    /// the total and the archiver reports the failure when it gets there.
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let source = absolute(path)?;
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::read(
                    &source,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?;
        self.push(source, name);
        Ok(())
    }

    /// Add every regular file reachable under `dir`.
    ///
    /// Entry names keep the directory's own name as prefix. Empty directories
    /// produce no entries.
    pub fn add_dir(&mut self, dir: &Path) -> Result<()> {
        let root = dir.canonicalize().map_err(|e| Error::read(dir, e))?;
        let base = root.parent().unwrap_or(&root).to_path_buf();
        debug!(root = %root.display(), "enumerating directory");

        let walker = walkdir::WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    self.skip(path, e.to_string());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = match path.strip_prefix(&base) {
                Ok(relative) => relative,
                Err(_) => {
                    self.skip(path.to_path_buf(), "outside of the selected directory".into());
                    continue;
                }
            };
            let name = entry_name(relative);
            self.push(path.to_path_buf(), name);
        }
        Ok(())
    }

    fn push(&mut self, source: PathBuf, name: String) {
        match std::fs::metadata(&source) {
            Ok(meta) => self.total_bytes += meta.len(),
            Err(e) => self.skip(source.clone(), e.to_string()),
        }

        let name = self.unique_name(name);
        debug!(source = %source.display(), entry = %name, "queued");
        self.names.insert(name.clone());
        self.items.push(WorkItem::new(source, name));
    }

    fn skip(&mut self, path: PathBuf, reason: String) {
        warn!(path = %path.display(), %reason, "skipped while enumerating");
        self.skipped.push(Skipped { path, reason });
    }

    /// Resolve entry-name collisions by inserting ` (n)` before the extension
    fn unique_name(&self, name: String) -> String {
        if !self.names.contains(&name) {
            return name;
        }

        let (dir, file) = match name.rfind(ENTRY_SEPARATOR) {
            Some(pos) => name.split_at(pos + 1),
            None => ("", name.as_str()),
        };
        let (stem, ext) = match file.rfind('.') {
            Some(pos) if pos > 0 => file.split_at(pos),
            _ => (file, ""),
        };

        let mut n = 1;
        loop {
            let candidate = format!("{}{} ({}){}", dir, stem, n, ext);
            if !self.names.contains(&candidate) {
                warn!(original = %name, renamed = %candidate, "duplicate entry name");
                return candidate;
            }
            n += 1;
        }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }

    /// Sum of the sizes that could be read at enumeration time
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Paths that were left out of the size total or the listing
    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Join path components with `/`, whatever the host separator is
pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::read(path, e))
}
