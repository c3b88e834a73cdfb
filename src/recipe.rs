//! Declarative per-dataset recipes.
//!
//! A [`RecipeDocument`] is the serialized form found in registry files; it is
//! validated exactly once into a [`RecipeConfig`], which applies the crate-wide
//! defaulting policy and rejects contradictory column declarations.

use std::borrow::Cow;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::callbacks::{CallbackDocument, CallbackInvocation, CallbackRegistry};
use crate::domain::{ColumnRef, DatasetNamespace, GraphName, GraphVersion};
use crate::error::RetrievalError;
use crate::fs_util::is_contained_relative;

pub const DEFAULT_SEPARATOR: char = '\t';
pub const DEFAULT_HEADER: bool = true;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeListDocument {
    pub path: Utf8PathBuf,
    #[serde(default)]
    pub separator: Option<char>,
    #[serde(default)]
    pub header: Option<bool>,
    #[serde(default)]
    pub comment_symbol: Option<String>,
    #[serde(default)]
    pub rows_to_skip: Option<usize>,
    #[serde(default)]
    pub max_rows_number: Option<usize>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub remove_chevrons: Option<bool>,
    #[serde(default)]
    pub remove_spaces: Option<bool>,
    #[serde(default)]
    pub nodes_column_number: Option<usize>,
    #[serde(default)]
    pub nodes_column: Option<String>,
    #[serde(default)]
    pub node_types_column_number: Option<usize>,
    #[serde(default)]
    pub node_types_column: Option<String>,
    #[serde(default)]
    pub node_types_separator: Option<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeListDocument {
    pub path: Utf8PathBuf,
    #[serde(default)]
    pub separator: Option<char>,
    #[serde(default)]
    pub header: Option<bool>,
    #[serde(default)]
    pub comment_symbol: Option<String>,
    #[serde(default)]
    pub rows_to_skip: Option<usize>,
    #[serde(default)]
    pub max_rows_number: Option<usize>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub remove_chevrons: Option<bool>,
    #[serde(default)]
    pub remove_spaces: Option<bool>,
    #[serde(default)]
    pub numeric_node_ids: Option<bool>,
    #[serde(default)]
    pub sources_column_number: Option<usize>,
    #[serde(default)]
    pub sources_column: Option<String>,
    #[serde(default)]
    pub destinations_column_number: Option<usize>,
    #[serde(default)]
    pub destinations_column: Option<String>,
    #[serde(default)]
    pub edge_types_column_number: Option<usize>,
    #[serde(default)]
    pub edge_types_column: Option<String>,
    #[serde(default)]
    pub weights_column_number: Option<usize>,
    #[serde(default)]
    pub weights_column: Option<String>,
    #[serde(default)]
    pub drop_self_loops: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeDocument {
    pub urls: Vec<String>,
    #[serde(default)]
    pub paths: Option<Vec<Utf8PathBuf>>,
    #[serde(default)]
    pub auto_extract: Option<bool>,
    #[serde(default)]
    pub node_list: Option<NodeListDocument>,
    pub edge_list: EdgeListDocument,
    #[serde(default)]
    pub default_node_type: Option<String>,
    #[serde(default)]
    pub default_edge_type: Option<String>,
    #[serde(default)]
    pub default_weight: Option<f32>,
    #[serde(default)]
    pub callbacks: Vec<CallbackDocument>,
}

/// Row-level reading options shared by node and edge lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListFormat {
    pub separator: char,
    pub header: bool,
    pub comment_symbol: Option<String>,
    pub rows_to_skip: usize,
    pub max_rows_number: Option<usize>,
    /// The list is known to be free of duplicates and inconsistencies.
    pub is_correct: bool,
    /// Strip one pair of surrounding `<` `>` from node names, as in RDF IRIs.
    pub remove_chevrons: bool,
    /// Delete every space inside node names.
    pub remove_spaces: bool,
}

impl Default for ListFormat {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            header: DEFAULT_HEADER,
            comment_symbol: None,
            rows_to_skip: 0,
            max_rows_number: None,
            is_correct: false,
            remove_chevrons: false,
            remove_spaces: false,
        }
    }
}

impl ListFormat {
    /// Layout of the files written by the canonicalizer.
    pub fn canonical() -> Self {
        Self {
            separator: '\t',
            header: false,
            comment_symbol: None,
            rows_to_skip: 0,
            max_rows_number: None,
            is_correct: true,
            remove_chevrons: false,
            remove_spaces: false,
        }
    }

    /// Applies the node name cleanup this list asks for. The name is
    /// expected to be trimmed already.
    pub fn clean_node_name<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let mut name = Cow::Borrowed(raw);
        if self.remove_chevrons {
            if let Some(inner) = raw.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
                name = Cow::Borrowed(inner);
            }
        }
        if self.remove_spaces && name.contains(' ') {
            name = Cow::Owned(name.replace(' ', ""));
        }
        name
    }

    fn from_parts(
        separator: Option<char>,
        header: Option<bool>,
        comment_symbol: Option<String>,
        rows_to_skip: Option<usize>,
        max_rows_number: Option<usize>,
        is_correct: Option<bool>,
    ) -> Result<Self, RetrievalError> {
        let separator = separator.unwrap_or(DEFAULT_SEPARATOR);
        if separator == '\n' || separator == '\r' {
            return Err(RetrievalError::InvalidColumnSpec(
                "separator cannot be a line break".to_string(),
            ));
        }
        let comment_symbol = comment_symbol.filter(|symbol| !symbol.is_empty());
        Ok(Self {
            separator,
            header: header.unwrap_or(DEFAULT_HEADER),
            comment_symbol,
            rows_to_skip: rows_to_skip.unwrap_or(0),
            max_rows_number,
            is_correct: is_correct.unwrap_or(false),
            remove_chevrons: false,
            remove_spaces: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeListSpec {
    /// Relative to the dataset directory.
    pub path: Utf8PathBuf,
    pub format: ListFormat,
    pub nodes_column: ColumnRef,
    pub node_types_column: Option<ColumnRef>,
    pub node_types_separator: Option<char>,
}

impl NodeListSpec {
    pub fn has_node_types(&self) -> bool {
        self.node_types_column.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeListSpec {
    /// Relative to the dataset directory.
    pub path: Utf8PathBuf,
    pub format: ListFormat,
    pub numeric_node_ids: bool,
    pub sources_column: ColumnRef,
    pub destinations_column: ColumnRef,
    pub edge_types_column: Option<ColumnRef>,
    pub weights_column: Option<ColumnRef>,
    pub drop_self_loops: bool,
}

impl EdgeListSpec {
    pub fn has_edge_types(&self) -> bool {
        self.edge_types_column.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Defaults {
    pub node_type: Option<String>,
    pub edge_type: Option<String>,
    pub weight: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct RecipeConfig {
    pub graph_name: GraphName,
    pub namespace: DatasetNamespace,
    pub version: GraphVersion,
    pub directed: bool,
    pub source_urls: Vec<String>,
    pub source_paths: Option<Vec<Utf8PathBuf>>,
    pub auto_extract: bool,
    pub node_list: Option<NodeListSpec>,
    pub edge_list: EdgeListSpec,
    pub defaults: Defaults,
    pub callbacks: Vec<CallbackInvocation>,
}

impl RecipeConfig {
    pub fn from_document(
        namespace: DatasetNamespace,
        graph_name: GraphName,
        version: GraphVersion,
        directed: bool,
        document: &RecipeDocument,
        callbacks: &CallbackRegistry,
    ) -> Result<Self, RetrievalError> {
        if document.urls.is_empty() {
            return Err(RetrievalError::InvalidRecipe(format!(
                "{namespace}:{graph_name}@{version} declares no source urls"
            )));
        }
        if let Some(paths) = &document.paths {
            if paths.len() != document.urls.len() {
                return Err(RetrievalError::InvalidRecipe(format!(
                    "{} paths declared for {} urls",
                    paths.len(),
                    document.urls.len()
                )));
            }
            for path in paths {
                ensure_relative("source path", path)?;
            }
        }

        let node_list = document
            .node_list
            .as_ref()
            .map(validate_node_list)
            .transpose()?;
        let edge_list = validate_edge_list(&document.edge_list)?;

        if let Some(weight) = document.default_weight {
            if !weight.is_finite() {
                return Err(RetrievalError::InvalidRecipe(
                    "default weight must be finite".to_string(),
                ));
            }
        }

        let callbacks = document
            .callbacks
            .iter()
            .map(|callback| callbacks.instantiate(callback))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            graph_name,
            namespace,
            version,
            directed,
            source_urls: document.urls.clone(),
            source_paths: document.paths.clone(),
            auto_extract: document.auto_extract.unwrap_or(true),
            node_list,
            edge_list,
            defaults: Defaults {
                node_type: document.default_node_type.clone(),
                edge_type: document.default_edge_type.clone(),
                weight: document.default_weight,
            },
            callbacks,
        })
    }

    /// `namespace:name@version`, used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{}:{}@{}", self.namespace, self.graph_name, self.version)
    }

    pub fn has_edge_weights(&self) -> bool {
        self.edge_list.weights_column.is_some() || self.defaults.weight.is_some()
    }
}

fn validate_node_list(document: &NodeListDocument) -> Result<NodeListSpec, RetrievalError> {
    ensure_relative("node list path", &document.path)?;
    let mut format = ListFormat::from_parts(
        document.separator,
        document.header,
        document.comment_symbol.clone(),
        document.rows_to_skip,
        document.max_rows_number,
        document.is_correct,
    )?;
    format.remove_chevrons = document.remove_chevrons.unwrap_or(false);
    format.remove_spaces = document.remove_spaces.unwrap_or(false);
    let nodes_column = column_ref(
        "nodes",
        document.nodes_column_number,
        document.nodes_column.as_deref(),
        &format,
    )?
    .unwrap_or(ColumnRef::Number(0));
    let node_types_column = column_ref(
        "node types",
        document.node_types_column_number,
        document.node_types_column.as_deref(),
        &format,
    )?;
    if node_types_column.as_ref() == Some(&nodes_column) {
        return Err(RetrievalError::InvalidColumnSpec(
            "nodes and node types share the same column".to_string(),
        ));
    }
    if document.node_types_separator.is_some() && node_types_column.is_none() {
        return Err(RetrievalError::InvalidColumnSpec(
            "node types separator given without a node types column".to_string(),
        ));
    }
    if document.node_types_separator == Some(format.separator) {
        return Err(RetrievalError::InvalidColumnSpec(
            "node types separator equals the list separator".to_string(),
        ));
    }
    Ok(NodeListSpec {
        path: document.path.clone(),
        format,
        nodes_column,
        node_types_column,
        node_types_separator: document.node_types_separator,
    })
}

fn validate_edge_list(document: &EdgeListDocument) -> Result<EdgeListSpec, RetrievalError> {
    ensure_relative("edge list path", &document.path)?;
    let mut format = ListFormat::from_parts(
        document.separator,
        document.header,
        document.comment_symbol.clone(),
        document.rows_to_skip,
        document.max_rows_number,
        document.is_correct,
    )?;
    format.remove_chevrons = document.remove_chevrons.unwrap_or(false);
    format.remove_spaces = document.remove_spaces.unwrap_or(false);
    let sources_column = column_ref(
        "sources",
        document.sources_column_number,
        document.sources_column.as_deref(),
        &format,
    )?
    .unwrap_or(ColumnRef::Number(0));
    let destinations_column = column_ref(
        "destinations",
        document.destinations_column_number,
        document.destinations_column.as_deref(),
        &format,
    )?
    .unwrap_or(ColumnRef::Number(1));
    let edge_types_column = column_ref(
        "edge types",
        document.edge_types_column_number,
        document.edge_types_column.as_deref(),
        &format,
    )?;
    let weights_column = column_ref(
        "weights",
        document.weights_column_number,
        document.weights_column.as_deref(),
        &format,
    )?;

    let mut declared = vec![&sources_column, &destinations_column];
    declared.extend(edge_types_column.iter());
    declared.extend(weights_column.iter());
    for (i, column) in declared.iter().enumerate() {
        if declared[..i].contains(column) {
            return Err(RetrievalError::InvalidColumnSpec(format!(
                "edge list column {column} is declared for two fields"
            )));
        }
    }

    Ok(EdgeListSpec {
        path: document.path.clone(),
        format,
        numeric_node_ids: document.numeric_node_ids.unwrap_or(false),
        sources_column,
        destinations_column,
        edge_types_column,
        weights_column,
        drop_self_loops: document.drop_self_loops.unwrap_or(false),
    })
}

fn column_ref(
    field: &str,
    number: Option<usize>,
    name: Option<&str>,
    format: &ListFormat,
) -> Result<Option<ColumnRef>, RetrievalError> {
    match (number, name) {
        (Some(_), Some(_)) => Err(RetrievalError::InvalidColumnSpec(format!(
            "{field} column given both by number and by name"
        ))),
        (Some(number), None) => Ok(Some(ColumnRef::Number(number))),
        (None, Some(name)) if name.trim().is_empty() => Err(RetrievalError::InvalidColumnSpec(
            format!("{field} column name is empty"),
        )),
        (None, Some(_)) if !format.header => Err(RetrievalError::InvalidColumnSpec(format!(
            "{field} column given by name but the list has no header"
        ))),
        (None, Some(name)) => Ok(Some(ColumnRef::Name(name.to_string()))),
        (None, None) => Ok(None),
    }
}

fn ensure_relative(what: &str, path: &Utf8Path) -> Result<(), RetrievalError> {
    if !is_contained_relative(path) {
        return Err(RetrievalError::InvalidRecipe(format!(
            "{what} must be relative to the dataset directory: {path}"
        )));
    }
    Ok(())
}
