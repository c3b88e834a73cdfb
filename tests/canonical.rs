use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;

use graph_retrieval::callbacks::CallbackRegistry;
use graph_retrieval::canonical::{
    CanonicalSummary, CanonicalTargets, CanonicalizeRequest, Canonicalizer, TsvCanonicalizer,
};
use graph_retrieval::error::RetrievalError;
use graph_retrieval::recipe::{RecipeConfig, RecipeDocument};

fn recipe(document: serde_json::Value, directed: bool) -> RecipeConfig {
    let document: RecipeDocument = serde_json::from_value(document).unwrap();
    RecipeConfig::from_document(
        "test".parse().unwrap(),
        "Sample".parse().unwrap(),
        "v1".parse().unwrap(),
        directed,
        &document,
        &CallbackRegistry::new(),
    )
    .unwrap()
}

fn root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

fn targets(dir: &Utf8Path, recipe: &RecipeConfig) -> CanonicalTargets {
    let out = dir.join("out");
    CanonicalTargets {
        nodes: out.join("nodes.tsv"),
        edges: out.join("edges.tsv"),
        node_types: recipe
            .node_list
            .as_ref()
            .is_some_and(|spec| spec.has_node_types())
            .then(|| out.join("node_types.tsv")),
        edge_types: recipe
            .edge_list
            .has_edge_types()
            .then(|| out.join("edge_types.tsv")),
    }
}

fn canonicalize(
    dir: &Utf8Path,
    recipe: &RecipeConfig,
    targets: &CanonicalTargets,
) -> Result<CanonicalSummary, RetrievalError> {
    let node_path = recipe.node_list.as_ref().map(|spec| dir.join(&spec.path));
    let edge_path = dir.join(&recipe.edge_list.path);
    TsvCanonicalizer::new().build_optimal_lists(&CanonicalizeRequest {
        name: "Sample",
        node_list: recipe.node_list.as_ref(),
        node_path: node_path.as_deref(),
        edge_list: &recipe.edge_list,
        edge_path: &edge_path,
        defaults: &recipe.defaults,
        directed: recipe.directed,
        targets,
    })
}

fn read(path: &Utf8Path) -> String {
    fs::read_to_string(path.as_std_path()).unwrap()
}

#[test]
fn round_trip_drops_duplicates_and_self_loops() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(
        dir.join("edges.tsv").as_std_path(),
        "src\tdst\tweight\n\
         b\ta\t1.5\n\
         a\tc\t2.5\n\
         c\tc\t3.5\n\
         b\ta\t4.5\n\
         d\ta\t6.5\n\
         c\td\t5.5\n",
    )
    .unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.tsv"],
            "edge_list": {
                "path": "edges.tsv",
                "sources_column": "src",
                "destinations_column": "dst",
                "weights_column": "weight",
                "drop_self_loops": true
            }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    let summary = canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(
        summary,
        CanonicalSummary {
            node_types_number: None,
            nodes_number: 4,
            edge_types_number: None,
            edges_number: 4,
            dropped_self_loops: 1,
            dropped_duplicates: 1,
        }
    );
    assert_eq!(read(&targets.nodes), "0\tb\n1\ta\n2\tc\n3\td\n");
    assert_eq!(
        read(&targets.edges),
        "0\t0\t1\t1.5\n1\t1\t2\t2.5\n2\t2\t3\t5.5\n3\t3\t1\t6.5\n"
    );
    assert!(!dir.join("out/node_types.tsv").as_std_path().exists());
    assert!(!dir.join("out/edge_types.tsv").as_std_path().exists());
}

#[test]
fn undirected_lists_with_types() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(
        dir.join("nodes.tsv").as_std_path(),
        "id\tcategory\nx\tperson|admin\ny\tperson\nz\t\n",
    )
    .unwrap();
    fs::write(
        dir.join("edges.tsv").as_std_path(),
        "src\tdst\tkind\ny\tx\tfollows\nx\ty\tfollows\nz\tw\tfollows\n",
    )
    .unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/graph.zip"],
            "node_list": {
                "path": "nodes.tsv",
                "nodes_column": "id",
                "node_types_column": "category",
                "node_types_separator": "|"
            },
            "edge_list": {
                "path": "edges.tsv",
                "sources_column": "src",
                "destinations_column": "dst",
                "edge_types_column": "kind"
            },
            "default_node_type": "unknown"
        }),
        false,
    );
    let targets = targets(&dir, &recipe);

    let summary = canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(summary.node_types_number, Some(3));
    assert_eq!(summary.nodes_number, 4);
    assert_eq!(summary.edge_types_number, Some(1));
    assert_eq!(summary.edges_number, 2);
    assert_eq!(summary.dropped_duplicates, 1);
    assert_eq!(
        read(&targets.nodes),
        "0\tx\t0|1\n1\ty\t0\n2\tz\t2\n3\tw\t2\n"
    );
    assert_eq!(
        read(targets.node_types.as_ref().unwrap()),
        "0\tperson\n1\tadmin\n2\tunknown\n"
    );
    assert_eq!(read(&targets.edges), "0\t0\t1\t0\n1\t2\t3\t0\n");
    assert_eq!(read(targets.edge_types.as_ref().unwrap()), "0\tfollows\n");
}

#[test]
fn numeric_ids_are_remapped_in_ascending_order() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("edges.tsv").as_std_path(), "10\t2\n2\t7\n7\t10\n").unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.tsv"],
            "edge_list": { "path": "edges.tsv", "header": false, "numeric_node_ids": true }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(read(&targets.nodes), "0\t2\n1\t7\n2\t10\n");
    assert_eq!(read(&targets.edges), "0\t0\t1\n1\t1\t2\n2\t2\t0\n");
}

#[test]
fn default_weight_fills_missing_values() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("edges.tsv").as_std_path(), "a,b,\nb,c,0.25\n").unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.csv"],
            "edge_list": {
                "path": "edges.tsv",
                "separator": ",",
                "header": false,
                "weights_column_number": 2
            },
            "default_weight": 1.0
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(read(&targets.edges), "0\t0\t1\t1\n1\t1\t2\t0.25\n");
}

#[test]
fn invalid_weight_reports_the_line() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("edges.tsv").as_std_path(), "a\tb\t1\nb\tc\tx\n").unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.tsv"],
            "edge_list": { "path": "edges.tsv", "header": false, "weights_column_number": 2 }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    let err = canonicalize(&dir, &recipe, &targets).unwrap_err();

    assert_matches!(err, RetrievalError::MalformedRow { line: 2, .. });
}

#[test]
fn missing_named_column_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("edges.tsv").as_std_path(), "from\tto\na\tb\n").unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.tsv"],
            "edge_list": {
                "path": "edges.tsv",
                "sources_column": "source",
                "destinations_column": "to"
            }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    let err = canonicalize(&dir, &recipe, &targets).unwrap_err();

    assert_matches!(err, RetrievalError::MissingColumn { ref column, .. } if column == "source");
}

#[test]
fn duplicate_nodes_are_rejected_unless_marked_correct() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("nodes.tsv").as_std_path(), "a\nb\na\n").unwrap();
    fs::write(dir.join("edges.tsv").as_std_path(), "a\tb\n").unwrap();
    let document = |is_correct: bool| {
        json!({
            "urls": ["https://example.org/graph.zip"],
            "node_list": { "path": "nodes.tsv", "header": false, "is_correct": is_correct },
            "edge_list": { "path": "edges.tsv", "header": false }
        })
    };

    let strict = recipe(document(false), true);
    let err = canonicalize(&dir, &strict, &targets(&dir, &strict)).unwrap_err();
    assert_matches!(err, RetrievalError::MalformedRow { line: 3, .. });

    let lenient = recipe(document(true), true);
    let summary = canonicalize(&dir, &lenient, &targets(&dir, &lenient)).unwrap();
    assert_eq!(summary.nodes_number, 2);
}

#[test]
fn numeric_ids_with_different_spellings_are_one_node() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(dir.join("edges.tsv").as_std_path(), "1\t2\n01\t2\n+1\t002\n").unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/edges.tsv"],
            "edge_list": { "path": "edges.tsv", "header": false, "numeric_node_ids": true }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    let summary = canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(summary.nodes_number, 2);
    assert_eq!(summary.edges_number, 1);
    assert_eq!(summary.dropped_duplicates, 2);
    assert_eq!(read(&targets.nodes), "0\t1\n1\t2\n");
    assert_eq!(read(&targets.edges), "0\t0\t1\n");
}

#[test]
fn chevrons_and_spaces_are_removed_from_node_names() {
    let temp = tempfile::tempdir().unwrap();
    let dir = root(&temp);
    fs::write(
        dir.join("nodes.tsv").as_std_path(),
        "<http://example.org/a>\n<http://example.org/b>\n",
    )
    .unwrap();
    fs::write(
        dir.join("edges.tsv").as_std_path(),
        "<http://example.org/a>\thttp://example.org/b\n<http://example.org/ a>\t<http://example.org/c>\n",
    )
    .unwrap();
    let recipe = recipe(
        json!({
            "urls": ["https://example.org/graph.zip"],
            "node_list": { "path": "nodes.tsv", "header": false, "remove_chevrons": true },
            "edge_list": {
                "path": "edges.tsv",
                "header": false,
                "remove_chevrons": true,
                "remove_spaces": true
            }
        }),
        true,
    );
    let targets = targets(&dir, &recipe);

    let summary = canonicalize(&dir, &recipe, &targets).unwrap();

    assert_eq!(summary.nodes_number, 3);
    assert_eq!(
        read(&targets.nodes),
        "0\thttp://example.org/a\n1\thttp://example.org/b\n2\thttp://example.org/c\n"
    );
    assert_eq!(read(&targets.edges), "0\t0\t1\n1\t0\t2\n");
}
