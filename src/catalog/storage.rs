//! Durable per-kind storage for catalog entries.
//!
//! The JSON directory store keeps one file per kind,
//! `<dir>/<kind>_entries.json`, holding the kind tag and its full entry
//! list. Built-in kinds use their lowercased tag as the stem; other tags
//! use `other_` plus the hex of the tag bytes, so no two kinds share a
//! file. Every flush writes a temporary file, syncs it, renames it over
//! the old one and syncs the directory.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dsl::{ComponentKind, DslComponent};
use crate::error::{Error, Result};

const FILE_SUFFIX: &str = "_entries.json";

/// One catalogued component with its retrieval key and vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub text: String,
    pub vector: Vec<f32>,
    pub component: DslComponent,
}

/// Persistence seam for the component catalog.
pub trait CatalogStorage: Send + Sync {
    /// Every persisted kind with its entries in insertion order.
    fn load_all(&self) -> Result<Vec<(ComponentKind, Vec<CatalogEntry>)>>;

    /// Replace the stored entry list for `kind`.
    fn flush(&self, kind: &ComponentKind, entries: &[CatalogEntry]) -> Result<()>;

    fn remove(&self, kind: &ComponentKind) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct KindFile {
    kind: ComponentKind,
    entries: Vec<CatalogEntry>,
}

/// Stores each kind as a JSON file inside one directory.
#[derive(Debug, Clone)]
pub struct JsonDirStorage {
    dir: PathBuf,
}

impl JsonDirStorage {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| Error::Storage {
            kind: ComponentKind::Other("*".to_string()),
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: &ComponentKind) -> PathBuf {
        let stem = match kind {
            ComponentKind::Other(tag) => {
                let hex: String = tag.bytes().map(|b| format!("{:02x}", b)).collect();
                format!("other_{}", hex)
            }
            builtin => builtin.as_str().to_ascii_lowercase(),
        };
        self.dir.join(format!("{}{}", stem, FILE_SUFFIX))
    }

    fn read_file(&self, path: &Path) -> Result<KindFile> {
        let storage_err = |source: io::Error| Error::Storage {
            kind: ComponentKind::Other("*".to_string()),
            path: path.to_path_buf(),
            source,
        };
        let data = fs::read_to_string(path).map_err(storage_err)?;
        serde_json::from_str(&data)
            .map_err(|e| storage_err(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

impl CatalogStorage for JsonDirStorage {
    fn load_all(&self) -> Result<Vec<(ComponentKind, Vec<CatalogEntry>)>> {
        let read_dir = fs::read_dir(&self.dir).map_err(|source| Error::Storage {
            kind: ComponentKind::Other("*".to_string()),
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(FILE_SUFFIX))
            })
            .collect();
        paths.sort();

        let mut seen = HashSet::new();
        let mut kinds = Vec::with_capacity(paths.len());
        for path in paths {
            let file = self.read_file(&path)?;
            if !seen.insert(file.kind.clone()) {
                return Err(Error::DuplicateKind {
                    kind: file.kind,
                    path: Some(path),
                });
            }
            tracing::debug!(
                kind = %file.kind,
                entries = file.entries.len(),
                path = %path.display(),
                "loaded catalog file"
            );
            kinds.push((file.kind, file.entries));
        }
        Ok(kinds)
    }

    fn flush(&self, kind: &ComponentKind, entries: &[CatalogEntry]) -> Result<()> {
        let path = self.path_for(kind);
        let tmp = path.with_extension("json.tmp");
        let storage_err = |source: io::Error| Error::Storage {
            kind: kind.clone(),
            path: path.clone(),
            source,
        };

        let file = KindFile {
            kind: kind.clone(),
            entries: entries.to_vec(),
        };
        let data = serde_json::to_vec(&file)?;
        let mut out = File::create(&tmp).map_err(storage_err)?;
        out.write_all(&data).map_err(storage_err)?;
        out.sync_all().map_err(storage_err)?;
        drop(out);
        fs::rename(&tmp, &path).map_err(storage_err)?;
        sync_dir(&self.dir).map_err(storage_err)?;
        tracing::debug!(kind = %kind, entries = entries.len(), "flushed catalog kind");
        Ok(())
    }

    fn remove(&self, kind: &ComponentKind) -> Result<()> {
        let path = self.path_for(kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Storage {
                kind: kind.clone(),
                path,
                source,
            }),
        }
    }
}

/// Persist the rename itself.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
