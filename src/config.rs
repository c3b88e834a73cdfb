use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetSpecifier, PreprocessMode};
use crate::error::RetrievalError;
use crate::request::{ConstructionOverrides, LoadOptions};

pub const CONFIG_FILE: &str = "graph-retrieval.json";

/// Project file listing the graphs a project depends on.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_path: Option<String>,
    #[serde(default)]
    pub registries: Vec<Utf8PathBuf>,
    #[serde(default)]
    pub graphs: Vec<GraphEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GraphEntry {
    Shorthand(String),
    Detailed(GraphEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GraphEntryObject {
    pub graph: String,
    #[serde(default)]
    pub directed: Option<bool>,
    #[serde(default)]
    pub preprocess: Option<PreprocessMode>,
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub load: Option<LoadOptions>,
    #[serde(default)]
    pub overrides: Option<ConstructionOverrides>,
}

#[derive(Debug, Clone)]
pub struct GraphRequest {
    pub specifier: DatasetSpecifier,
    pub directed: bool,
    pub preprocess: PreprocessMode,
    pub use_cache: bool,
    pub load: LoadOptions,
    pub overrides: ConstructionOverrides,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache_path: Option<String>,
    pub registries: Vec<Utf8PathBuf>,
    pub graphs: Vec<GraphRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RetrievalError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(RetrievalError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RetrievalError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| RetrievalError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RetrievalError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(RetrievalError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let graphs = config
            .graphs
            .into_iter()
            .map(|entry| match entry {
                GraphEntry::Shorthand(value) => Ok(GraphRequest {
                    specifier: value.parse()?,
                    directed: false,
                    preprocess: PreprocessMode::default(),
                    use_cache: true,
                    load: LoadOptions::default(),
                    overrides: ConstructionOverrides::default(),
                }),
                GraphEntry::Detailed(obj) => Ok(GraphRequest {
                    specifier: obj.graph.parse()?,
                    directed: obj.directed.unwrap_or(false),
                    preprocess: obj.preprocess.unwrap_or_default(),
                    use_cache: obj.use_cache.unwrap_or(true),
                    load: obj.load.unwrap_or_default(),
                    overrides: obj.overrides.unwrap_or_default(),
                }),
            })
            .collect::<Result<Vec<_>, RetrievalError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            cache_path: config.cache_path,
            registries: config.registries,
            graphs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config = Config {
            schema_version: None,
            cache_path: None,
            registries: vec![Utf8PathBuf::from("registries/linqs.json")],
            graphs: vec![GraphEntry::Shorthand("linqs:Cora".to_string())],
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.graphs.len(), 1);
        assert!(!resolved.graphs[0].directed);
        assert_eq!(resolved.graphs[0].preprocess, PreprocessMode::Auto);
        assert!(resolved.graphs[0].specifier.version.is_none());
    }
}
