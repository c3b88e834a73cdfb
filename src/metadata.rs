use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;
use crate::store::Store;

/// Counts produced by a successful canonicalization run. Its presence on disk
/// witnesses that the canonical files next to it are complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub node_types_number: Option<u64>,
    pub nodes_number: u64,
    pub edge_types_number: Option<u64>,
    pub edges_number: u64,
}

impl CacheMetadata {
    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, RetrievalError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| RetrievalError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| {
            RetrievalError::integrity(
                format!("metadata at {path}"),
                "a valid metadata record",
                err.to_string(),
            )
        })
    }

    pub fn store(&self, path: &Utf8Path) -> Result<(), RetrievalError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| RetrievalError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(path, &content)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn persisted_keys_match_layout() {
        let metadata = CacheMetadata {
            node_types_number: None,
            nodes_number: 4,
            edge_types_number: Some(2),
            edges_number: 5,
        };
        let value = serde_json::to_value(metadata).unwrap();
        let mut keys = value
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "edge_types_number",
                "edges_number",
                "node_types_number",
                "nodes_number"
            ]
        );
    }

    #[test]
    fn store_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/metadata.json")).unwrap();
        assert!(!CacheMetadata::exists(&path));
        let metadata = CacheMetadata {
            node_types_number: Some(3),
            nodes_number: 10,
            edge_types_number: None,
            edges_number: 12,
        };
        metadata.store(&path).unwrap();
        assert!(CacheMetadata::exists(&path));
        assert_eq!(CacheMetadata::load(&path).unwrap(), metadata);
    }
}
