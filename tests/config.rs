use std::fs;

use assert_matches::assert_matches;

use graph_retrieval::config::{Config, ConfigLoader, GraphEntry};
use graph_retrieval::domain::PreprocessMode;
use graph_retrieval::error::RetrievalError;

#[test]
fn parse_config_shorthand() {
    let config = Config {
        schema_version: None,
        cache_path: Some("/tmp/graphs".to_string()),
        registries: Vec::new(),
        graphs: vec![GraphEntry::Shorthand("linqs:Cora@latest".to_string())],
    };

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.cache_path.as_deref(), Some("/tmp/graphs"));
    assert_eq!(resolved.graphs.len(), 1);
    assert!(resolved.graphs[0].use_cache);
    assert!(resolved.graphs[0].load.load_nodes);
    assert_eq!(resolved.graphs[0].specifier.to_string(), "linqs:Cora@latest");
}

#[test]
fn parse_config_detailed_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("graph-retrieval.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "registries": ["registries/linqs.json.gz"],
            "graphs": [
                "linqs:Cora",
                {
                    "graph": "string:HomoSapiens@v11",
                    "directed": true,
                    "preprocess": "never",
                    "use_cache": false,
                    "load": { "load_edge_weights": false },
                    "overrides": { "name": "Human" }
                }
            ]
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    assert_eq!(resolved.registries.len(), 1);
    assert_eq!(resolved.graphs.len(), 2);
    let detailed = &resolved.graphs[1];
    assert!(detailed.directed);
    assert_eq!(detailed.preprocess, PreprocessMode::Never);
    assert!(!detailed.use_cache);
    assert!(!detailed.load.load_edge_weights);
    assert!(detailed.load.load_node_types);
    assert_eq!(detailed.overrides.name.as_deref(), Some("Human"));
}

#[test]
fn unsupported_schema_version_is_rejected() {
    let config = Config {
        schema_version: Some(2),
        cache_path: None,
        registries: Vec::new(),
        graphs: Vec::new(),
    };
    let err = ConfigLoader::resolve_config(config).unwrap_err();
    assert_matches!(err, RetrievalError::ConfigParse(_));
}

#[test]
fn explicit_missing_file_is_a_read_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, RetrievalError::ConfigRead(_));
}
