use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::Serialize;

use crate::domain::{DatasetNamespace, GraphName, GraphVersion, directedness_label};
use crate::error::RetrievalError;
use crate::metadata::CacheMetadata;
use crate::recipe::RecipeConfig;

/// Environment variable consulted when no explicit cache path is given.
pub const CACHE_DIR_VAR: &str = "GRAPH_CACHE_DIR";

const PREPROCESSED_DIR: &str = "preprocessed";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, RetrievalError> {
        Self::from_cache_path(None)
    }

    pub fn from_cache_path(cache_path: Option<&str>) -> Result<Self, RetrievalError> {
        if let Some(path) = cache_path {
            return Ok(Self::new_with_root(Utf8PathBuf::from(path)));
        }
        if let Ok(path) = std::env::var(CACHE_DIR_VAR) {
            if !path.trim().is_empty() {
                return Ok(Self::new_with_root(Utf8PathBuf::from(path.trim())));
            }
        }

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("graph-retrieval"))
                    .ok()
            })
            .ok_or_else(|| {
                RetrievalError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn graph_dir(&self, namespace: &DatasetNamespace, name: &GraphName) -> Utf8PathBuf {
        self.cache_root.join(namespace.as_str()).join(name.as_str())
    }

    pub fn dataset_dir(
        &self,
        namespace: &DatasetNamespace,
        name: &GraphName,
        version: &GraphVersion,
    ) -> Utf8PathBuf {
        self.graph_dir(namespace, name).join(version.as_str())
    }

    pub fn recipe_dir(&self, recipe: &RecipeConfig) -> Utf8PathBuf {
        self.dataset_dir(&recipe.namespace, &recipe.graph_name, &recipe.version)
    }

    pub fn canonical_paths(&self, recipe: &RecipeConfig) -> CanonicalPaths {
        CanonicalPaths::new(&self.recipe_dir(recipe), recipe.directed)
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), RetrievalError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(format!("create {path}: {err}")))
    }

    /// Returns whether something was removed.
    pub fn remove_dir_if_exists(path: &Utf8Path) -> Result<bool, RetrievalError> {
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(format!("remove {path}: {err}")))?;
        Ok(true)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RetrievalError> {
        Self::write_atomic(path, |writer| {
            writer
                .write_all(content)
                .map_err(|err| RetrievalError::Filesystem(err.to_string()))
        })
    }

    /// Streams into a temporary sibling of `path`, syncs it, and renames it
    /// into place, so readers never observe a partially written file.
    pub fn write_atomic<F>(path: &Utf8Path, write: F) -> Result<(), RetrievalError>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), RetrievalError>,
    {
        let parent = path
            .parent()
            .ok_or_else(|| RetrievalError::Filesystem(format!("invalid destination {path}")))?;
        Self::ensure_dir(parent)?;
        let temp = tempfile::Builder::new()
            .prefix(".graph-retrieval")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            write(&mut writer)?;
            writer
                .flush()
                .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn open(path: &Utf8Path) -> Result<File, RetrievalError> {
        File::open(path.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(format!("open {path}: {err}")))
    }

    /// Every preprocessed dataset in the cache, sorted by location.
    pub fn list_preprocessed(&self) -> Result<Vec<StoredDataset>, RetrievalError> {
        if !self.cache_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(self.cache_root.as_std_path())? {
            if !path.is_file() || path.file_name().is_none_or(|name| name != METADATA_FILE) {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                continue;
            };
            if let Some(entry) = self.stored_dataset(&path)? {
                entries.push(entry);
            }
        }
        entries.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(entries)
    }

    fn stored_dataset(&self, path: &Utf8Path) -> Result<Option<StoredDataset>, RetrievalError> {
        let Ok(relative) = path.strip_prefix(&self.cache_root) else {
            return Ok(None);
        };
        let parts = relative.iter().collect::<Vec<_>>();
        let [namespace, name, version, preprocessed, directedness, _file] = parts.as_slice() else {
            return Ok(None);
        };
        if *preprocessed != PREPROCESSED_DIR {
            return Ok(None);
        }
        let directed = match *directedness {
            "directed" => true,
            "undirected" => false,
            _ => return Ok(None),
        };
        let metadata = CacheMetadata::load(path)?;
        let preprocessed_at = fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok()
            .map(|modified| DateTime::<Utc>::from(modified).to_rfc3339());
        Ok(Some(StoredDataset {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            directed,
            path: path
                .parent()
                .map(Utf8Path::to_path_buf)
                .unwrap_or_else(|| path.to_path_buf()),
            metadata,
            preprocessed_at,
        }))
    }

    pub fn clear(&self) -> Result<bool, RetrievalError> {
        Self::remove_dir_if_exists(&self.cache_root)
    }

    pub fn clear_graph(
        &self,
        namespace: &DatasetNamespace,
        name: &GraphName,
        version: Option<&GraphVersion>,
    ) -> Result<bool, RetrievalError> {
        let path = match version {
            Some(version) => self.dataset_dir(namespace, name, version),
            None => self.graph_dir(namespace, name),
        };
        Self::remove_dir_if_exists(&path)
    }
}

/// File layout of the canonical output for one dataset version and
/// directedness. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPaths {
    pub directory: Utf8PathBuf,
    pub nodes: Utf8PathBuf,
    pub node_types: Utf8PathBuf,
    pub edges: Utf8PathBuf,
    pub edge_types: Utf8PathBuf,
    pub metadata: Utf8PathBuf,
}

impl CanonicalPaths {
    pub fn new(dataset_dir: &Utf8Path, directed: bool) -> Self {
        let directory = dataset_dir
            .join(PREPROCESSED_DIR)
            .join(directedness_label(directed));
        Self {
            nodes: directory.join("nodes.tsv"),
            node_types: directory.join("node_types.tsv"),
            edges: directory.join("edges.tsv"),
            edge_types: directory.join("edge_types.tsv"),
            metadata: directory.join(METADATA_FILE),
            directory,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredDataset {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub directed: bool,
    pub path: Utf8PathBuf,
    #[serde(flatten)]
    pub metadata: CacheMetadata,
    pub preprocessed_at: Option<String>,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, RetrievalError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_layout() {
        let paths = CanonicalPaths::new(Utf8Path::new("/cache/linqs/Cora/latest"), true);
        assert_eq!(
            paths.directory,
            Utf8PathBuf::from("/cache/linqs/Cora/latest/preprocessed/directed")
        );
        assert!(paths.metadata.ends_with("directed/metadata.json"));
        assert!(paths.edge_types.ends_with("edge_types.tsv"));
    }
}
