use assert_matches::assert_matches;
use camino::Utf8Path;
use serde_json::json;

use graph_retrieval::callbacks::CallbackRegistry;
use graph_retrieval::domain::ColumnRef;
use graph_retrieval::error::RetrievalError;
use graph_retrieval::metadata::CacheMetadata;
use graph_retrieval::recipe::{RecipeConfig, RecipeDocument};
use graph_retrieval::request::{ConstructionOverrides, ConstructionRequest, LoadOptions};
use graph_retrieval::store::CanonicalPaths;

fn recipe(edge_list: serde_json::Value, with_nodes: bool) -> RecipeConfig {
    let mut document = json!({
        "urls": ["https://example.org/graph.zip"],
        "edge_list": edge_list,
    });
    if with_nodes {
        document["node_list"] = json!({ "path": "nodes.tsv", "node_types_column_number": 1 });
    }
    let document: RecipeDocument = serde_json::from_value(document).unwrap();
    RecipeConfig::from_document(
        "test".parse().unwrap(),
        "Layout".parse().unwrap(),
        "v1".parse().unwrap(),
        false,
        &document,
        &CallbackRegistry::new(),
    )
    .unwrap()
}

fn paths() -> CanonicalPaths {
    CanonicalPaths::new(Utf8Path::new("/cache/test/Layout/v1"), false)
}

fn metadata(node_types: Option<u64>, edge_types: Option<u64>) -> CacheMetadata {
    CacheMetadata {
        node_types_number: node_types,
        nodes_number: 10,
        edge_types_number: edge_types,
        edges_number: 20,
    }
}

#[test]
fn canonical_layout_without_edge_types() {
    let recipe = recipe(
        json!({ "path": "edges.tsv", "weights_column_number": 2 }),
        false,
    );
    let request = ConstructionRequest::from_canonical(
        &recipe,
        &paths(),
        &metadata(None, None),
        1,
        &LoadOptions::default(),
        &ConstructionOverrides::default(),
    );

    let nodes = request.nodes.as_ref().unwrap();
    assert_eq!(nodes.ids_column, Some(ColumnRef::Number(0)));
    assert_eq!(nodes.names_column, ColumnRef::Number(1));
    assert_eq!(nodes.types_column, None);
    assert_eq!(request.edges.ids_column, Some(ColumnRef::Number(0)));
    assert_eq!(request.edges.sources_column, ColumnRef::Number(1));
    assert_eq!(request.edges.destinations_column, ColumnRef::Number(2));
    assert_eq!(request.edges.types_column, None);
    assert_eq!(request.edges.weights_column, Some(ColumnRef::Number(3)));
    assert!(request.edges.is_sorted);
    assert!(request.edges.is_correct);
    assert!(!request.edges.may_contain_duplicates);
    assert!(!request.edges.format.header);
    assert_eq!(request.edges.format.separator, '\t');
    assert!(!request.may_have_singletons);
    assert_eq!(request.verbose, 1);
    assert_eq!(request.name, "Layout");
}

#[test]
fn canonical_layout_with_edge_types() {
    let recipe = recipe(
        json!({
            "path": "edges.tsv",
            "edge_types_column_number": 2,
            "weights_column_number": 3
        }),
        true,
    );
    let request = ConstructionRequest::from_canonical(
        &recipe,
        &paths(),
        &metadata(Some(2), Some(3)),
        0,
        &LoadOptions::default(),
        &ConstructionOverrides::default(),
    );

    assert_eq!(request.edges.types_column, Some(ColumnRef::Number(3)));
    assert_eq!(request.edges.weights_column, Some(ColumnRef::Number(4)));
    assert_eq!(
        request.nodes.as_ref().unwrap().types_column,
        Some(ColumnRef::Number(2))
    );
    assert_eq!(
        request.node_types.as_ref().unwrap().path,
        paths().node_types
    );
    assert_eq!(
        request.edge_types.as_ref().unwrap().path,
        paths().edge_types
    );
    assert!(request.may_have_singletons);
}

#[test]
fn load_options_prune_without_moving_columns() {
    let recipe = recipe(
        json!({
            "path": "edges.tsv",
            "edge_types_column_number": 2,
            "weights_column_number": 3
        }),
        true,
    );
    let load = LoadOptions {
        load_nodes: false,
        load_edge_types: false,
        ..LoadOptions::default()
    };
    let request = ConstructionRequest::from_canonical(
        &recipe,
        &paths(),
        &metadata(Some(2), Some(3)),
        0,
        &load,
        &ConstructionOverrides::default(),
    );

    assert!(request.nodes.is_none());
    assert!(request.node_types.is_none());
    assert!(request.edge_types.is_none());
    assert_eq!(request.edges.types_column, None);
    assert_eq!(request.edges.weights_column, Some(ColumnRef::Number(4)));
}

#[test]
fn raw_layout_passes_recipe_columns_through() {
    let recipe = recipe(
        json!({
            "path": "edges.tsv",
            "sources_column": "from",
            "destinations_column": "to",
            "drop_self_loops": true
        }),
        false,
    );
    let request = ConstructionRequest::from_raw(
        &recipe,
        Utf8Path::new("/cache/test/Layout/v1"),
        0,
        &LoadOptions::default(),
        &ConstructionOverrides::default(),
    );

    assert_eq!(request.edges.path, Utf8Path::new("/cache/test/Layout/v1/edges.tsv"));
    assert_eq!(request.edges.sources_column, ColumnRef::Name("from".to_string()));
    assert_eq!(request.edges.ids_column, None);
    assert!(request.edges.format.header);
    assert!(request.edges.drop_self_loops);
    assert!(!request.edges.is_sorted);
    assert!(!request.edges.is_correct);
    assert!(request.edges.may_contain_duplicates);
    assert!(request.counts.is_none());
}

#[test]
fn overrides_always_win() {
    let recipe = recipe(json!({ "path": "edges.tsv" }), false);
    let overrides: ConstructionOverrides = serde_json::from_value(json!({
        "name": "Custom",
        "directed": true,
        "edge_list_is_correct": false,
        "may_have_singletons": true
    }))
    .unwrap();

    let request = ConstructionRequest::from_canonical(
        &recipe,
        &paths(),
        &metadata(None, None),
        0,
        &LoadOptions::default(),
        &overrides,
    );

    assert_eq!(request.name, "Custom");
    assert!(request.directed);
    assert!(!request.edges.is_correct);
    assert!(request.edges.is_sorted);
    assert!(request.may_have_singletons);
}

#[test]
fn unknown_override_keys_are_rejected() {
    let result = serde_json::from_value::<ConstructionOverrides>(json!({ "nmae": "typo" }));
    assert!(result.is_err());
}

#[test]
fn key_value_overrides_keep_string_fields_verbatim() {
    let overrides = ConstructionOverrides::from_key_values([
        "name=42",
        "directed=true",
        "default_weight=0.5",
        "default_edge_type=true",
    ])
    .unwrap();

    assert_eq!(overrides.name.as_deref(), Some("42"));
    assert_eq!(overrides.directed, Some(true));
    assert_eq!(overrides.default_weight, Some(0.5));
    assert_eq!(overrides.default_edge_type.as_deref(), Some("true"));
}

#[test]
fn malformed_key_value_overrides_are_configuration_errors() {
    assert_matches!(
        ConstructionOverrides::from_key_values(["name"]),
        Err(RetrievalError::ConfigParse(_))
    );
    assert_matches!(
        ConstructionOverrides::from_key_values(["directed=maybe"]),
        Err(RetrievalError::ConfigParse(_))
    );
    assert_matches!(
        ConstructionOverrides::from_key_values(["nmae=typo"]),
        Err(RetrievalError::ConfigParse(_))
    );
}
