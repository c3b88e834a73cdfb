use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::callbacks::CallbackRegistry;
use crate::domain::{DatasetNamespace, DatasetSpecifier, GraphName, GraphVersion};
use crate::error::RetrievalError;
use crate::recipe::{RecipeConfig, RecipeDocument};

/// One registry file: every graph a namespace offers, with its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamespaceDocument {
    pub namespace: String,
    pub graphs: BTreeMap<String, GraphEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphEntry {
    #[serde(default)]
    pub default_version: Option<String>,
    pub versions: BTreeMap<String, RecipeDocument>,
    #[serde(default)]
    pub citation: Option<String>,
}

impl GraphEntry {
    fn default_version(&self) -> Option<&str> {
        self.default_version
            .as_deref()
            .or_else(|| self.versions.keys().next_back().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    namespaces: BTreeMap<DatasetNamespace, BTreeMap<String, GraphEntry>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a `.json` or gzip-compressed `.json.gz` registry file.
    pub fn load_file(&mut self, path: &Utf8Path) -> Result<(), RetrievalError> {
        let file = File::open(path.as_std_path())
            .map_err(|_| RetrievalError::ConfigRead(path.as_std_path().to_path_buf()))?;
        let mut content = String::new();
        let read = if path.as_str().ends_with(".gz") {
            GzDecoder::new(file).read_to_string(&mut content)
        } else {
            let mut file = file;
            file.read_to_string(&mut content)
        };
        read.map_err(|_| RetrievalError::ConfigRead(path.as_std_path().to_path_buf()))?;
        self.load_str(&content)
    }

    pub fn load_str(&mut self, content: &str) -> Result<(), RetrievalError> {
        let document: NamespaceDocument = serde_json::from_str(content)
            .map_err(|err| RetrievalError::ConfigParse(err.to_string()))?;
        self.insert(document)
    }

    pub fn insert(&mut self, document: NamespaceDocument) -> Result<(), RetrievalError> {
        let namespace: DatasetNamespace = document.namespace.parse()?;
        for (name, entry) in &document.graphs {
            name.parse::<GraphName>()?;
            for version in entry.versions.keys() {
                version.parse::<GraphVersion>()?;
            }
            if let Some(default) = &entry.default_version {
                if !entry.versions.contains_key(default) {
                    return Err(unknown_version(name, default, entry));
                }
            }
        }
        self.namespaces
            .entry(namespace)
            .or_default()
            .extend(document.graphs);
        Ok(())
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &DatasetNamespace> {
        self.namespaces.keys()
    }

    pub fn graph(
        &self,
        namespace: &DatasetNamespace,
        name: &GraphName,
    ) -> Result<&GraphEntry, RetrievalError> {
        let graphs = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| RetrievalError::UnknownNamespace(namespace.to_string()))?;
        graphs
            .get(name.as_str())
            .ok_or_else(|| RetrievalError::UnknownGraph {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    /// Checks that `version` (or the graph's default) is registered and
    /// returns the version that will be used.
    pub fn validate_version(
        &self,
        namespace: &DatasetNamespace,
        name: &GraphName,
        version: Option<&GraphVersion>,
    ) -> Result<GraphVersion, RetrievalError> {
        let entry = self.graph(namespace, name)?;
        let selected = match version {
            Some(version) => version.as_str(),
            None => entry
                .default_version()
                .ok_or_else(|| unknown_version(name.as_str(), "<default>", entry))?,
        };
        if !entry.versions.contains_key(selected) {
            return Err(unknown_version(name.as_str(), selected, entry));
        }
        selected.parse()
    }

    pub fn recipe(
        &self,
        specifier: &DatasetSpecifier,
        directed: bool,
        callbacks: &CallbackRegistry,
    ) -> Result<RecipeConfig, RetrievalError> {
        let version = self.validate_version(
            &specifier.namespace,
            &specifier.name,
            specifier.version.as_ref(),
        )?;
        let entry = self.graph(&specifier.namespace, &specifier.name)?;
        let document = entry
            .versions
            .get(version.as_str())
            .ok_or_else(|| unknown_version(specifier.name.as_str(), version.as_str(), entry))?;
        RecipeConfig::from_document(
            specifier.namespace.clone(),
            specifier.name.clone(),
            version,
            directed,
            document,
            callbacks,
        )
    }
}

fn unknown_version(name: &str, version: &str, entry: &GraphEntry) -> RetrievalError {
    RetrievalError::UnknownVersion {
        name: name.to_string(),
        version: version.to_string(),
        known: entry
            .versions
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const REGISTRY: &str = r#"{
        "namespace": "linqs",
        "graphs": {
            "Cora": {
                "default_version": "latest",
                "versions": {
                    "latest": {
                        "urls": ["https://example.org/cora.tgz"],
                        "edge_list": { "path": "cora/edges.tsv", "header": false }
                    }
                }
            }
        }
    }"#;

    #[test]
    fn default_version_is_selected() {
        let mut registry = DatasetRegistry::new();
        registry.load_str(REGISTRY).unwrap();
        let spec: DatasetSpecifier = "linqs:Cora".parse().unwrap();
        let recipe = registry
            .recipe(&spec, false, &CallbackRegistry::new())
            .unwrap();
        assert_eq!(recipe.version.as_str(), "latest");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut registry = DatasetRegistry::new();
        let content = REGISTRY.replace("\"header\": false", "\"heade\": false");
        let err = registry.load_str(&content).unwrap_err();
        assert_matches!(err, RetrievalError::ConfigParse(_));
    }
}
