//! Graph construction from a [`ConstructionRequest`].

use std::borrow::Cow;

use camino::Utf8Path;
use serde::Serialize;
use tracing::debug;

use crate::canonical::{ListReader, RawRow};
use crate::domain::ColumnRef;
use crate::error::RetrievalError;
use crate::recipe::ListFormat;
use crate::request::{ConstructionRequest, EdgeFileLayout, NodeFileLayout, TypeFileLayout};
use crate::vocabulary::Vocabulary;

pub trait GraphBuilder: Send + Sync {
    type Graph;

    fn from_canonical(&self, request: &ConstructionRequest) -> Result<Self::Graph, RetrievalError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub destination: usize,
    pub edge_type: Option<usize>,
    pub weight: Option<f32>,
}

/// Adjacency-free graph representation: node and edge tables with their type
/// vocabularies. Undirected edges are stored once with `source <= destination`.
#[derive(Debug, Clone)]
pub struct InMemoryGraph {
    name: String,
    directed: bool,
    nodes: Vocabulary,
    node_types: Option<Vec<Vec<usize>>>,
    node_type_names: Vec<String>,
    edges: Vec<Edge>,
    edge_type_names: Vec<String>,
    has_edge_types: bool,
    has_weights: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSummary {
    pub name: String,
    pub directed: bool,
    pub nodes_number: usize,
    pub edges_number: usize,
    pub node_types_number: Option<usize>,
    pub edge_types_number: Option<usize>,
    pub has_edge_weights: bool,
}

impl InMemoryGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn nodes_number(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges_number(&self) -> usize {
        self.edges.len()
    }

    pub fn node_types_number(&self) -> Option<usize> {
        self.node_types.as_ref().map(|_| self.node_type_names.len())
    }

    pub fn edge_types_number(&self) -> Option<usize> {
        self.has_edge_types.then_some(self.edge_type_names.len())
    }

    pub fn node_id(&self, name: &str) -> Option<usize> {
        self.nodes.get(name)
    }

    pub fn node_name(&self, id: usize) -> Option<&str> {
        self.nodes.names().get(id).map(String::as_str)
    }

    pub fn node_type_names(&self, id: usize) -> Option<Vec<&str>> {
        let type_ids = self.node_types.as_ref()?.get(id)?;
        Some(
            type_ids
                .iter()
                .filter_map(|type_id| self.node_type_names.get(*type_id))
                .map(String::as_str)
                .collect(),
        )
    }

    pub fn edge_type_name(&self, type_id: usize) -> Option<&str> {
        self.edge_type_names.get(type_id).map(String::as_str)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn has_edge(&self, source: usize, destination: usize) -> bool {
        let key = if self.directed || source <= destination {
            (source, destination)
        } else {
            (destination, source)
        };
        self.edges
            .binary_search_by_key(&key, |edge| (edge.source, edge.destination))
            .is_ok()
    }

    pub fn has_edge_from_names(&self, source: &str, destination: &str) -> bool {
        match (self.node_id(source), self.node_id(destination)) {
            (Some(source), Some(destination)) => self.has_edge(source, destination),
            _ => false,
        }
    }

    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            name: self.name.clone(),
            directed: self.directed,
            nodes_number: self.nodes_number(),
            edges_number: self.edges_number(),
            node_types_number: self.node_types_number(),
            edge_types_number: self.edge_types_number(),
            has_edge_weights: self.has_weights,
        }
    }
}

/// Reference [`GraphBuilder`] reading separated text files.
///
/// Canonical requests are trusted for layout but verified for consistency:
/// dense ids, sorted unique edges and the recorded counts. Any violation is
/// an [`RetrievalError::IntegrityMismatch`]. Raw requests are normalised the
/// way the canonicalizer would.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvGraphBuilder;

impl CsvGraphBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl GraphBuilder for CsvGraphBuilder {
    type Graph = InMemoryGraph;

    fn from_canonical(&self, request: &ConstructionRequest) -> Result<InMemoryGraph, RetrievalError> {
        let mut node_type_names = request
            .node_types
            .as_ref()
            .map(read_types)
            .transpose()?
            .unwrap_or_default();
        let mut edge_type_names = request
            .edge_types
            .as_ref()
            .map(read_types)
            .transpose()?
            .unwrap_or_default();

        let mut nodes = Vocabulary::default();
        let mut node_types = None;
        match (&request.nodes, request.counts) {
            (Some(layout), _) => {
                node_types = read_nodes(request, layout, &mut nodes, &mut node_type_names)?;
            }
            (None, Some(counts)) => {
                for id in 0..counts.nodes_number {
                    nodes.insert(&id.to_string());
                }
            }
            (None, None) => {}
        }

        let indexed = request.is_canonical() && request.edges.numeric_node_ids;
        let mut edges = read_edges(
            request,
            &request.edges,
            indexed,
            &mut nodes,
            &mut edge_type_names,
        )?;
        if let Some(types) = &mut node_types {
            // Nodes first seen in the edge list.
            let default = default_node_types(request, &mut node_type_names);
            types.resize(nodes.len(), default);
        }

        let layout = &request.edges;
        if !request.directed && !layout.is_correct {
            for edge in &mut edges {
                if edge.source > edge.destination {
                    std::mem::swap(&mut edge.source, &mut edge.destination);
                }
            }
        }
        if layout.is_sorted && !layout.may_contain_duplicates {
            check_strictly_sorted(&edges, &layout.path)?;
        } else {
            edges.sort_by_key(|edge| (edge.source, edge.destination));
            edges.dedup_by(|next, kept| {
                next.source == kept.source && next.destination == kept.destination
            });
        }

        let graph = InMemoryGraph {
            name: request.name.clone(),
            directed: request.directed,
            nodes,
            node_types,
            node_type_names,
            has_edge_types: layout.types_column.is_some() || request.defaults.edge_type.is_some(),
            has_weights: layout.weights_column.is_some() || request.defaults.weight.is_some(),
            edges,
            edge_type_names,
        };
        if let Some(counts) = request.counts {
            check_counts(request, &graph, &counts)?;
        }
        debug!(
            name = %graph.name,
            nodes = graph.nodes_number(),
            edges = graph.edges_number(),
            "graph built"
        );
        Ok(graph)
    }
}

fn read_types(layout: &TypeFileLayout) -> Result<Vec<String>, RetrievalError> {
    let reader = ListReader::open(&layout.path, &layout.format)?;
    let ids_column = reader.column_index(&layout.ids_column)?;
    let names_column = reader.column_index(&layout.names_column)?;
    let mut names = Vec::new();
    for row in reader {
        let row = row?;
        let id = parse_index(&row, ids_column, &layout.path)?;
        if id != names.len() {
            return Err(RetrievalError::integrity(
                format!("type ids in {}", layout.path),
                names.len(),
                id,
            ));
        }
        names.push(row.field(names_column, &layout.path)?.to_string());
    }
    Ok(names)
}

fn read_nodes(
    request: &ConstructionRequest,
    layout: &NodeFileLayout,
    nodes: &mut Vocabulary,
    node_type_names: &mut Vec<String>,
) -> Result<Option<Vec<Vec<usize>>>, RetrievalError> {
    let path = &layout.path;
    let reader = ListReader::open(path, &layout.format)?;
    let ids_column = layout
        .ids_column
        .as_ref()
        .map(|column| reader.column_index(column))
        .transpose()?;
    let names_column = reader.column_index(&layout.names_column)?;
    let types_column = layout
        .types_column
        .as_ref()
        .map(|column| reader.column_index(column))
        .transpose()?;
    let mut type_vocabulary = Vocabulary::from_names(std::mem::take(node_type_names));
    let mut node_types = types_column.map(|_| Vec::new());
    let numeric = !request.is_canonical() && request.edges.numeric_node_ids;

    for row in reader {
        let row = row?;
        if let Some(column) = ids_column {
            let id = parse_index(&row, column, path)?;
            if id != nodes.len() {
                return Err(RetrievalError::integrity(
                    format!("node ids in {path}"),
                    nodes.len(),
                    id,
                ));
            }
        }
        let name = raw_node_name(
            &layout.format,
            numeric,
            row.field(names_column, path)?,
            path,
            row.line,
        )?;
        if nodes.get(&name).is_some() {
            if ids_column.is_some() {
                return Err(RetrievalError::integrity(
                    format!("node names in {path}"),
                    "unique names",
                    format!("duplicate `{name}`"),
                ));
            }
            if layout.format.is_correct {
                continue;
            }
            return Err(RetrievalError::malformed(
                path,
                row.line,
                format!("duplicate node `{name}`"),
            ));
        }
        nodes.insert(&name);

        if let (Some(column), Some(node_types)) = (types_column, node_types.as_mut()) {
            let raw = row.optional_field(column);
            let mut type_ids = Vec::new();
            match raw {
                Some(raw) if layout.numeric_type_ids => {
                    for token in split_types(raw, layout.types_separator) {
                        let type_id = parse_type_id(token, type_vocabulary.len(), path, row.line)?;
                        type_ids.push(type_id);
                    }
                }
                Some(raw) => {
                    for token in split_types(raw, layout.types_separator) {
                        type_ids.push(type_vocabulary.insert(token));
                    }
                }
                None => {
                    if let Some(default) = &request.defaults.node_type {
                        type_ids.push(type_vocabulary.insert(default));
                    }
                }
            }
            node_types.push(type_ids);
        }
    }
    *node_type_names = type_vocabulary.into_names();
    Ok(node_types)
}

fn read_edges(
    request: &ConstructionRequest,
    layout: &EdgeFileLayout,
    indexed: bool,
    nodes: &mut Vocabulary,
    edge_type_names: &mut Vec<String>,
) -> Result<Vec<Edge>, RetrievalError> {
    let path = &layout.path;
    let reader = ListReader::open(path, &layout.format)?;
    let ids_column = optional_column(&reader, layout.ids_column.as_ref())?;
    let sources_column = reader.column_index(&layout.sources_column)?;
    let destinations_column = reader.column_index(&layout.destinations_column)?;
    let types_column = optional_column(&reader, layout.types_column.as_ref())?;
    let weights_column = optional_column(&reader, layout.weights_column.as_ref())?;
    let mut type_vocabulary = Vocabulary::from_names(std::mem::take(edge_type_names));
    let mut edges = Vec::new();
    let numeric = !request.is_canonical() && layout.numeric_node_ids;

    for row in reader {
        let row = row?;
        if let Some(column) = ids_column {
            let id = parse_index(&row, column, path)?;
            if id != edges.len() {
                return Err(RetrievalError::integrity(
                    format!("edge ids in {path}"),
                    edges.len(),
                    id,
                ));
            }
        }
        let (source, destination) = if indexed {
            (
                node_index(&row, sources_column, nodes.len(), path)?,
                node_index(&row, destinations_column, nodes.len(), path)?,
            )
        } else {
            let source = row.field(sources_column, path)?;
            let destination = row.field(destinations_column, path)?;
            (
                nodes.insert(&raw_node_name(&layout.format, numeric, source, path, row.line)?),
                nodes.insert(&raw_node_name(
                    &layout.format,
                    numeric,
                    destination,
                    path,
                    row.line,
                )?),
            )
        };
        if source == destination && layout.drop_self_loops {
            continue;
        }

        let edge_type = match types_column.and_then(|column| row.optional_field(column)) {
            Some(raw) if layout.numeric_type_ids => Some(parse_type_id(
                raw,
                type_vocabulary.len(),
                path,
                row.line,
            )?),
            Some(raw) => Some(type_vocabulary.insert(raw)),
            None => request
                .defaults
                .edge_type
                .as_deref()
                .map(|name| type_vocabulary.insert(name)),
        };
        let weight = match weights_column.and_then(|column| row.optional_field(column)) {
            Some(raw) => Some(raw.parse::<f32>().map_err(|_| {
                RetrievalError::malformed(path, row.line, format!("invalid weight `{raw}`"))
            })?),
            None => request.defaults.weight,
        };

        edges.push(Edge {
            source,
            destination,
            edge_type,
            weight,
        });
    }
    *edge_type_names = type_vocabulary.into_names();
    Ok(edges)
}

fn optional_column(
    reader: &ListReader,
    column: Option<&ColumnRef>,
) -> Result<Option<usize>, RetrievalError> {
    column.map(|column| reader.column_index(column)).transpose()
}

fn default_node_types(request: &ConstructionRequest, names: &mut Vec<String>) -> Vec<usize> {
    let Some(default) = &request.defaults.node_type else {
        return Vec::new();
    };
    let id = match names.iter().position(|name| name == default) {
        Some(id) => id,
        None => {
            names.push(default.clone());
            names.len() - 1
        }
    };
    vec![id]
}

/// Node name as the canonicalizer would key it: cleaned per `format`, and in
/// canonical decimal form when ids are numeric.
fn raw_node_name<'a>(
    format: &ListFormat,
    numeric: bool,
    raw: &'a str,
    path: &Utf8Path,
    line: usize,
) -> Result<Cow<'a, str>, RetrievalError> {
    let name = format.clean_node_name(raw);
    if !numeric {
        return Ok(name);
    }
    let id = name.parse::<u64>().map_err(|_| {
        RetrievalError::malformed(path, line, format!("node id `{name}` is not numeric"))
    })?;
    Ok(Cow::Owned(id.to_string()))
}

fn split_types(raw: &str, separator: Option<char>) -> Vec<&str> {
    match separator {
        Some(separator) => raw
            .split(separator)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect(),
        None => vec![raw],
    }
}

fn parse_index(row: &RawRow, column: usize, path: &Utf8Path) -> Result<usize, RetrievalError> {
    let raw = row.field(column, path)?;
    raw.parse::<usize>()
        .map_err(|_| RetrievalError::malformed(path, row.line, format!("invalid id `{raw}`")))
}

fn node_index(
    row: &RawRow,
    column: usize,
    nodes_number: usize,
    path: &Utf8Path,
) -> Result<usize, RetrievalError> {
    let id = parse_index(row, column, path)?;
    if id >= nodes_number {
        return Err(RetrievalError::integrity(
            format!("node id at {path}:{}", row.line),
            format!("< {nodes_number}"),
            id,
        ));
    }
    Ok(id)
}

fn parse_type_id(
    raw: &str,
    types_number: usize,
    path: &Utf8Path,
    line: usize,
) -> Result<usize, RetrievalError> {
    let id = raw
        .parse::<usize>()
        .map_err(|_| RetrievalError::malformed(path, line, format!("invalid type id `{raw}`")))?;
    if id >= types_number {
        return Err(RetrievalError::integrity(
            format!("type id at {path}:{line}"),
            format!("< {types_number}"),
            id,
        ));
    }
    Ok(id)
}

fn check_strictly_sorted(edges: &[Edge], path: &Utf8Path) -> Result<(), RetrievalError> {
    for (position, pair) in edges.windows(2).enumerate() {
        let previous = (pair[0].source, pair[0].destination);
        let current = (pair[1].source, pair[1].destination);
        if previous >= current {
            return Err(RetrievalError::integrity(
                format!("edge order in {path} at edge {}", position + 1),
                format!("after {previous:?}"),
                format!("{current:?}"),
            ));
        }
    }
    Ok(())
}

fn check_counts(
    request: &ConstructionRequest,
    graph: &InMemoryGraph,
    counts: &crate::metadata::CacheMetadata,
) -> Result<(), RetrievalError> {
    if graph.nodes_number() as u64 != counts.nodes_number {
        return Err(RetrievalError::integrity(
            "nodes number",
            counts.nodes_number,
            graph.nodes_number(),
        ));
    }
    if graph.edges_number() as u64 != counts.edges_number {
        return Err(RetrievalError::integrity(
            "edges number",
            counts.edges_number,
            graph.edges_number(),
        ));
    }
    if request.node_types.is_some() {
        let actual = graph.node_type_names.len() as u64;
        if counts.node_types_number != Some(actual) {
            return Err(RetrievalError::integrity(
                "node types number",
                format!("{:?}", counts.node_types_number),
                actual,
            ));
        }
    }
    if request.edge_types.is_some() {
        let actual = graph.edge_type_names.len() as u64;
        if counts.edge_types_number != Some(actual) {
            return Err(RetrievalError::integrity(
                "edge types number",
                format!("{:?}", counts.edge_types_number),
                actual,
            ));
        }
    }
    Ok(())
}
