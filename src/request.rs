//! Construction requests handed to a [`GraphBuilder`](crate::graph::GraphBuilder).
//!
//! Assembly is pure: it combines either the fixed canonical layout or the raw
//! recipe layout with the caller's options. Overrides are applied last.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ColumnRef;
use crate::error::RetrievalError;
use crate::metadata::CacheMetadata;
use crate::recipe::{Defaults, ListFormat, RecipeConfig};
use crate::store::CanonicalPaths;

pub const CANONICAL_ID_COLUMN: usize = 0;
pub const CANONICAL_NAME_COLUMN: usize = 1;
pub const CANONICAL_NODE_TYPES_COLUMN: usize = 2;
pub const CANONICAL_SOURCES_COLUMN: usize = 1;
pub const CANONICAL_DESTINATIONS_COLUMN: usize = 2;
pub const CANONICAL_EDGE_TYPES_COLUMN: usize = 3;

/// Weight column of a canonical edge file: right after the edge type column
/// when the file carries one.
pub fn canonical_weights_column(has_edge_types: bool) -> usize {
    CANONICAL_EDGE_TYPES_COLUMN + usize::from(has_edge_types)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFileLayout {
    pub path: Utf8PathBuf,
    pub format: ListFormat,
    pub ids_column: Option<ColumnRef>,
    pub names_column: ColumnRef,
    pub types_column: Option<ColumnRef>,
    pub types_separator: Option<char>,
    /// The types column holds dense ids of the node type file instead of names.
    pub numeric_type_ids: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeFileLayout {
    pub path: Utf8PathBuf,
    pub format: ListFormat,
    pub ids_column: ColumnRef,
    pub names_column: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeFileLayout {
    pub path: Utf8PathBuf,
    pub format: ListFormat,
    pub ids_column: Option<ColumnRef>,
    pub sources_column: ColumnRef,
    pub destinations_column: ColumnRef,
    pub types_column: Option<ColumnRef>,
    pub weights_column: Option<ColumnRef>,
    pub numeric_node_ids: bool,
    pub numeric_type_ids: bool,
    pub drop_self_loops: bool,
    pub is_sorted: bool,
    pub is_correct: bool,
    pub may_contain_duplicates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub load_nodes: bool,
    pub load_node_types: bool,
    pub load_edge_types: bool,
    pub load_edge_weights: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            load_nodes: true,
            load_node_types: true,
            load_edge_types: true,
            load_edge_weights: true,
        }
    }
}

/// Caller-supplied values that replace whatever assembly derived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstructionOverrides {
    pub name: Option<String>,
    pub directed: Option<bool>,
    pub verbose: Option<u8>,
    pub may_have_singletons: Option<bool>,
    pub numeric_node_ids: Option<bool>,
    pub edge_list_is_sorted: Option<bool>,
    pub edge_list_is_correct: Option<bool>,
    pub edge_list_may_contain_duplicates: Option<bool>,
    pub default_node_type: Option<String>,
    pub default_edge_type: Option<String>,
    pub default_weight: Option<f32>,
}

// Overrides whose values are taken verbatim from `key=value` pairs.
const STRING_OVERRIDES: [&str; 3] = ["name", "default_node_type", "default_edge_type"];

impl ConstructionOverrides {
    /// Parses `key=value` pairs. String fields keep the value as written;
    /// every other value is read as JSON (`true`, `3`, `0.5`).
    pub fn from_key_values<'a, I>(pairs: I) -> Result<Self, RetrievalError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut object = serde_json::Map::new();
        for pair in pairs {
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                RetrievalError::ConfigParse(format!("override `{pair}` is not KEY=VALUE"))
            })?;
            let key = key.trim();
            let value = if STRING_OVERRIDES.contains(&key) {
                Value::String(raw.to_string())
            } else {
                serde_json::from_str(raw).map_err(|err| {
                    RetrievalError::ConfigParse(format!("override `{key}`: {err}"))
                })?
            };
            object.insert(key.to_string(), value);
        }
        serde_json::from_value(Value::Object(object))
            .map_err(|err| RetrievalError::ConfigParse(format!("invalid overrides: {err}")))
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, request: &mut ConstructionRequest) {
        if let Some(name) = &self.name {
            request.name = name.clone();
        }
        if let Some(directed) = self.directed {
            request.directed = directed;
        }
        if let Some(verbose) = self.verbose {
            request.verbose = verbose;
        }
        if let Some(may_have_singletons) = self.may_have_singletons {
            request.may_have_singletons = may_have_singletons;
        }
        if let Some(numeric_node_ids) = self.numeric_node_ids {
            request.edges.numeric_node_ids = numeric_node_ids;
        }
        if let Some(is_sorted) = self.edge_list_is_sorted {
            request.edges.is_sorted = is_sorted;
        }
        if let Some(is_correct) = self.edge_list_is_correct {
            request.edges.is_correct = is_correct;
        }
        if let Some(may_contain_duplicates) = self.edge_list_may_contain_duplicates {
            request.edges.may_contain_duplicates = may_contain_duplicates;
        }
        if let Some(node_type) = &self.default_node_type {
            request.defaults.node_type = Some(node_type.clone());
        }
        if let Some(edge_type) = &self.default_edge_type {
            request.defaults.edge_type = Some(edge_type.clone());
        }
        if let Some(weight) = self.default_weight {
            request.defaults.weight = Some(weight);
        }
    }
}

/// Fully specified input for graph construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructionRequest {
    pub name: String,
    pub directed: bool,
    pub verbose: u8,
    /// `None` means nodes are the numeric range `[0, counts.nodes_number)`
    /// or, without counts, whatever the edge list mentions.
    pub nodes: Option<NodeFileLayout>,
    pub node_types: Option<TypeFileLayout>,
    pub edges: EdgeFileLayout,
    pub edge_types: Option<TypeFileLayout>,
    /// Known only for canonical requests.
    pub counts: Option<CacheMetadata>,
    pub defaults: Defaults,
    pub may_have_singletons: bool,
}

impl ConstructionRequest {
    /// Request over the canonical files described by `paths` and `metadata`.
    pub fn from_canonical(
        recipe: &RecipeConfig,
        paths: &CanonicalPaths,
        metadata: &CacheMetadata,
        verbose: u8,
        load: &LoadOptions,
        overrides: &ConstructionOverrides,
    ) -> Self {
        let has_node_types = metadata.node_types_number.is_some();
        let has_edge_types = metadata.edge_types_number.is_some();
        let load_node_types = load.load_nodes && load.load_node_types && has_node_types;
        let load_edge_types = load.load_edge_types && has_edge_types;

        let nodes = load.load_nodes.then(|| NodeFileLayout {
            path: paths.nodes.clone(),
            format: ListFormat::canonical(),
            ids_column: Some(ColumnRef::Number(CANONICAL_ID_COLUMN)),
            names_column: ColumnRef::Number(CANONICAL_NAME_COLUMN),
            types_column: load_node_types
                .then_some(ColumnRef::Number(CANONICAL_NODE_TYPES_COLUMN)),
            types_separator: load_node_types
                .then_some(crate::canonical::NODE_TYPES_SEPARATOR),
            numeric_type_ids: true,
        });

        let edges = EdgeFileLayout {
            path: paths.edges.clone(),
            format: ListFormat::canonical(),
            ids_column: Some(ColumnRef::Number(CANONICAL_ID_COLUMN)),
            sources_column: ColumnRef::Number(CANONICAL_SOURCES_COLUMN),
            destinations_column: ColumnRef::Number(CANONICAL_DESTINATIONS_COLUMN),
            types_column: load_edge_types.then_some(ColumnRef::Number(CANONICAL_EDGE_TYPES_COLUMN)),
            weights_column: (load.load_edge_weights && recipe.has_edge_weights())
                .then(|| ColumnRef::Number(canonical_weights_column(has_edge_types))),
            numeric_node_ids: true,
            numeric_type_ids: true,
            drop_self_loops: false,
            is_sorted: true,
            is_correct: true,
            may_contain_duplicates: false,
        };

        let mut request = Self {
            name: recipe.graph_name.to_string(),
            directed: recipe.directed,
            verbose,
            nodes,
            node_types: load_node_types.then(|| canonical_types(&paths.node_types)),
            edges,
            edge_types: load_edge_types.then(|| canonical_types(&paths.edge_types)),
            counts: Some(*metadata),
            defaults: Defaults::default(),
            may_have_singletons: recipe.node_list.is_some(),
        };
        overrides.apply(&mut request);
        request
    }

    /// Request over the raw fetched files, with no structural guarantees.
    pub fn from_raw(
        recipe: &RecipeConfig,
        dataset_dir: &Utf8Path,
        verbose: u8,
        load: &LoadOptions,
        overrides: &ConstructionOverrides,
    ) -> Self {
        let nodes = recipe
            .node_list
            .as_ref()
            .filter(|_| load.load_nodes)
            .map(|spec| {
                let load_types = load.load_node_types && spec.has_node_types();
                NodeFileLayout {
                    path: dataset_dir.join(&spec.path),
                    format: spec.format.clone(),
                    ids_column: None,
                    names_column: spec.nodes_column.clone(),
                    types_column: spec.node_types_column.clone().filter(|_| load_types),
                    types_separator: spec.node_types_separator.filter(|_| load_types),
                    numeric_type_ids: false,
                }
            });

        let spec = &recipe.edge_list;
        let edges = EdgeFileLayout {
            path: dataset_dir.join(&spec.path),
            format: spec.format.clone(),
            ids_column: None,
            sources_column: spec.sources_column.clone(),
            destinations_column: spec.destinations_column.clone(),
            types_column: spec
                .edge_types_column
                .clone()
                .filter(|_| load.load_edge_types),
            weights_column: spec
                .weights_column
                .clone()
                .filter(|_| load.load_edge_weights),
            numeric_node_ids: spec.numeric_node_ids,
            numeric_type_ids: false,
            drop_self_loops: spec.drop_self_loops,
            is_sorted: false,
            is_correct: false,
            may_contain_duplicates: true,
        };

        let mut defaults = recipe.defaults.clone();
        if !load.load_edge_weights {
            defaults.weight = None;
        }

        let mut request = Self {
            name: recipe.graph_name.to_string(),
            directed: recipe.directed,
            verbose,
            nodes,
            node_types: None,
            edges,
            edge_types: None,
            counts: None,
            defaults,
            may_have_singletons: recipe.node_list.is_some(),
        };
        overrides.apply(&mut request);
        request
    }

    pub fn is_canonical(&self) -> bool {
        self.counts.is_some()
    }
}

fn canonical_types(path: &Utf8Path) -> TypeFileLayout {
    TypeFileLayout {
        path: path.to_path_buf(),
        format: ListFormat::canonical(),
        ids_column: ColumnRef::Number(CANONICAL_ID_COLUMN),
        names_column: ColumnRef::Number(CANONICAL_NAME_COLUMN),
    }
}
