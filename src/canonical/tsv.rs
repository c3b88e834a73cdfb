use camino::Utf8Path;
use tracing::{debug, info};

use crate::canonical::{
    CanonicalSummary, CanonicalizeRequest, Canonicalizer, ListReader, NODE_TYPES_SEPARATOR,
};
use crate::error::RetrievalError;
use crate::recipe::{ListFormat, NodeListSpec};
use crate::store::Store;
use crate::vocabulary::Vocabulary;

/// In-memory canonicalizer. Platform independent: sorting and deduplication
/// happen in process instead of through an external sort utility.
///
/// Dense ids follow first-seen order (node list rows first, then edge list
/// endpoints); with numeric raw ids they follow ascending numeric order.
/// Among rows sharing a (source, destination) pair the first row wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvCanonicalizer;

impl TsvCanonicalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Canonicalizer for TsvCanonicalizer {
    fn build_optimal_lists(
        &self,
        request: &CanonicalizeRequest<'_>,
    ) -> Result<CanonicalSummary, RetrievalError> {
        let mut pass = Pass::new(*request);
        if let (Some(spec), Some(path)) = (request.node_list, request.node_path) {
            pass.read_nodes(spec, path)?;
        }
        pass.read_edges()?;
        pass.finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct EdgeRecord {
    source: usize,
    destination: usize,
    edge_type: Option<usize>,
    weight: Option<f32>,
}

struct Pass<'a> {
    request: CanonicalizeRequest<'a>,
    nodes: Vocabulary,
    node_types: Vocabulary,
    node_type_ids: Vec<Vec<usize>>,
    edge_types: Vocabulary,
    edges: Vec<EdgeRecord>,
    dropped_self_loops: u64,
    want_node_types: bool,
    want_edge_types: bool,
    want_weights: bool,
}

impl<'a> Pass<'a> {
    fn new(request: CanonicalizeRequest<'a>) -> Self {
        let want_node_types = request.targets.node_types.is_some()
            && request.node_list.is_some_and(NodeListSpec::has_node_types);
        let want_edge_types =
            request.targets.edge_types.is_some() && request.edge_list.has_edge_types();
        let want_weights =
            request.edge_list.weights_column.is_some() || request.defaults.weight.is_some();
        Self {
            request,
            nodes: Vocabulary::default(),
            node_types: Vocabulary::default(),
            node_type_ids: Vec::new(),
            edge_types: Vocabulary::default(),
            edges: Vec::new(),
            dropped_self_loops: 0,
            want_node_types,
            want_edge_types,
            want_weights,
        }
    }

    fn read_nodes(&mut self, spec: &NodeListSpec, path: &Utf8Path) -> Result<(), RetrievalError> {
        let reader = ListReader::open(path, &spec.format)?;
        let nodes_column = reader.column_index(&spec.nodes_column)?;
        let types_column = match &spec.node_types_column {
            Some(column) if self.want_node_types => Some(reader.column_index(column)?),
            _ => None,
        };

        for row in reader {
            let row = row?;
            let name = self.node_key(row.field(nodes_column, path)?, &spec.format, path, row.line)?;
            if self.nodes.get(&name).is_some() {
                if spec.format.is_correct {
                    continue;
                }
                return Err(RetrievalError::malformed(
                    path,
                    row.line,
                    format!("duplicate node `{name}`"),
                ));
            }
            self.nodes.insert(&name);
            if self.want_node_types {
                let type_ids = match types_column.and_then(|column| row.optional_field(column)) {
                    Some(raw) => {
                        self.parse_node_types(raw, spec.node_types_separator, path, row.line)?
                    }
                    None => self.default_node_type_ids(),
                };
                self.node_type_ids.push(type_ids);
            }
        }
        debug!(nodes = self.nodes.len(), %path, "node list read");
        Ok(())
    }

    fn read_edges(&mut self) -> Result<(), RetrievalError> {
        let spec = self.request.edge_list;
        let path = self.request.edge_path;
        let defaults = self.request.defaults;

        let reader = ListReader::open(path, &spec.format)?;
        let sources_column = reader.column_index(&spec.sources_column)?;
        let destinations_column = reader.column_index(&spec.destinations_column)?;
        let types_column = match &spec.edge_types_column {
            Some(column) if self.want_edge_types => Some(reader.column_index(column)?),
            _ => None,
        };
        let weights_column = match &spec.weights_column {
            Some(column) if self.want_weights => Some(reader.column_index(column)?),
            _ => None,
        };

        for row in reader {
            let row = row?;
            let source = row.field(sources_column, path)?;
            let destination = row.field(destinations_column, path)?;
            if source.is_empty() || destination.is_empty() {
                return Err(RetrievalError::malformed(path, row.line, "empty edge endpoint"));
            }
            let source = self.node_id(source, path, row.line)?;
            let destination = self.node_id(destination, path, row.line)?;
            if source == destination && spec.drop_self_loops {
                self.dropped_self_loops += 1;
                continue;
            }

            let edge_type = if self.want_edge_types {
                let name = types_column
                    .and_then(|column| row.optional_field(column))
                    .or(defaults.edge_type.as_deref())
                    .ok_or_else(|| {
                        RetrievalError::malformed(
                            path,
                            row.line,
                            "missing edge type and no default edge type",
                        )
                    })?;
                check_token(name, path, row.line)?;
                Some(self.edge_types.insert(name))
            } else {
                None
            };

            let weight = if self.want_weights {
                let weight = match weights_column.and_then(|column| row.optional_field(column)) {
                    Some(raw) => parse_weight(raw, path, row.line)?,
                    None => defaults.weight.ok_or_else(|| {
                        RetrievalError::malformed(
                            path,
                            row.line,
                            "missing weight and no default weight",
                        )
                    })?,
                };
                Some(weight)
            } else {
                None
            };

            self.edges.push(EdgeRecord {
                source,
                destination,
                edge_type,
                weight,
            });
        }
        debug!(edges = self.edges.len(), %path, "edge list read");
        Ok(())
    }

    fn node_id(&mut self, raw: &str, path: &Utf8Path, line: usize) -> Result<usize, RetrievalError> {
        let spec = self.request.edge_list;
        let name = self.node_key(raw, &spec.format, path, line)?;
        if let Some(id) = self.nodes.get(&name) {
            return Ok(id);
        }
        let id = self.nodes.insert(&name);
        if self.want_node_types {
            let type_ids = self.default_node_type_ids();
            self.node_type_ids.push(type_ids);
        }
        Ok(id)
    }

    /// Vocabulary key of a raw node name: cleaned per `format` and, with
    /// numeric ids, spelled in canonical decimal form so `01` and `1` meet.
    fn node_key(
        &self,
        raw: &str,
        format: &ListFormat,
        path: &Utf8Path,
        line: usize,
    ) -> Result<String, RetrievalError> {
        let name = format.clean_node_name(raw);
        if name.is_empty() {
            return Err(RetrievalError::malformed(path, line, "empty node name"));
        }
        check_token(&name, path, line)?;
        if self.request.edge_list.numeric_node_ids {
            let id = name.parse::<u64>().map_err(|_| {
                RetrievalError::malformed(path, line, format!("node id `{name}` is not numeric"))
            })?;
            return Ok(id.to_string());
        }
        Ok(name.into_owned())
    }

    fn parse_node_types(
        &mut self,
        raw: &str,
        separator: Option<char>,
        path: &Utf8Path,
        line: usize,
    ) -> Result<Vec<usize>, RetrievalError> {
        let names: Vec<&str> = match separator {
            Some(separator) => raw
                .split(separator)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect(),
            None => vec![raw],
        };
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            check_token(name, path, line)?;
            if name.contains(NODE_TYPES_SEPARATOR) {
                return Err(RetrievalError::malformed(
                    path,
                    line,
                    format!("node type `{name}` contains `{NODE_TYPES_SEPARATOR}`"),
                ));
            }
            ids.push(self.node_types.insert(name));
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn default_node_type_ids(&mut self) -> Vec<usize> {
        let defaults = self.request.defaults;
        match defaults.node_type.as_deref() {
            Some(node_type) => vec![self.node_types.insert(node_type)],
            None => Vec::new(),
        }
    }

    fn finish(mut self) -> Result<CanonicalSummary, RetrievalError> {
        if self.request.edge_list.numeric_node_ids {
            // Keys are canonical decimal strings.
            let mapping = self
                .nodes
                .reorder_by(|name| name.parse::<u64>().unwrap_or(u64::MAX));
            for edge in &mut self.edges {
                edge.source = mapping[edge.source];
                edge.destination = mapping[edge.destination];
            }
            if self.want_node_types {
                let mut reordered = vec![Vec::new(); self.node_type_ids.len()];
                for (old_id, type_ids) in std::mem::take(&mut self.node_type_ids)
                    .into_iter()
                    .enumerate()
                {
                    reordered[mapping[old_id]] = type_ids;
                }
                self.node_type_ids = reordered;
            }
        }

        if !self.request.directed {
            for edge in &mut self.edges {
                if edge.source > edge.destination {
                    std::mem::swap(&mut edge.source, &mut edge.destination);
                }
            }
        }

        self.edges.sort_by_key(|edge| (edge.source, edge.destination));
        let before = self.edges.len();
        self.edges
            .dedup_by(|next, kept| next.source == kept.source && next.destination == kept.destination);
        let dropped_duplicates = (before - self.edges.len()) as u64;

        self.write()?;

        let summary = CanonicalSummary {
            node_types_number: self
                .want_node_types
                .then_some(self.node_types.len() as u64),
            nodes_number: self.nodes.len() as u64,
            edge_types_number: self
                .want_edge_types
                .then_some(self.edge_types.len() as u64),
            edges_number: self.edges.len() as u64,
            dropped_self_loops: self.dropped_self_loops,
            dropped_duplicates,
        };
        info!(
            name = self.request.name,
            nodes = summary.nodes_number,
            edges = summary.edges_number,
            dropped_self_loops = summary.dropped_self_loops,
            dropped_duplicates = summary.dropped_duplicates,
            "canonical lists written"
        );
        Ok(summary)
    }

    fn write(&self) -> Result<(), RetrievalError> {
        let targets = self.request.targets;
        if self.want_node_types {
            if let Some(path) = &targets.node_types {
                write_types(path, &self.node_types)?;
            }
        }
        if self.want_edge_types {
            if let Some(path) = &targets.edge_types {
                write_types(path, &self.edge_types)?;
            }
        }

        let separator = NODE_TYPES_SEPARATOR.to_string();
        Store::write_atomic(&targets.nodes, |writer| {
            for (id, name) in self.nodes.names().iter().enumerate() {
                write!(writer, "{id}\t{name}").map_err(io_error)?;
                if self.want_node_types {
                    let type_ids = self
                        .node_type_ids
                        .get(id)
                        .map(|ids| {
                            ids.iter()
                                .map(usize::to_string)
                                .collect::<Vec<_>>()
                                .join(separator.as_str())
                        })
                        .unwrap_or_default();
                    write!(writer, "\t{type_ids}").map_err(io_error)?;
                }
                writeln!(writer).map_err(io_error)?;
            }
            Ok(())
        })?;

        Store::write_atomic(&targets.edges, |writer| {
            for (id, edge) in self.edges.iter().enumerate() {
                write!(writer, "{id}\t{}\t{}", edge.source, edge.destination).map_err(io_error)?;
                if let Some(edge_type) = edge.edge_type {
                    write!(writer, "\t{edge_type}").map_err(io_error)?;
                }
                if let Some(weight) = edge.weight {
                    write!(writer, "\t{weight}").map_err(io_error)?;
                }
                writeln!(writer).map_err(io_error)?;
            }
            Ok(())
        })
    }
}

fn write_types(path: &Utf8Path, vocabulary: &Vocabulary) -> Result<(), RetrievalError> {
    Store::write_atomic(path, |writer| {
        for (id, name) in vocabulary.names().iter().enumerate() {
            writeln!(writer, "{id}\t{name}").map_err(io_error)?;
        }
        Ok(())
    })
}

fn check_token(value: &str, path: &Utf8Path, line: usize) -> Result<(), RetrievalError> {
    if value.contains(['\t', '\n', '\r']) {
        return Err(RetrievalError::malformed(
            path,
            line,
            format!("value `{}` contains a tab or line break", value.escape_debug()),
        ));
    }
    Ok(())
}

fn parse_weight(raw: &str, path: &Utf8Path, line: usize) -> Result<f32, RetrievalError> {
    match raw.parse::<f32>() {
        Ok(weight) if weight.is_finite() => Ok(weight),
        _ => Err(RetrievalError::malformed(
            path,
            line,
            format!("invalid weight `{raw}`"),
        )),
    }
}

fn io_error(err: std::io::Error) -> RetrievalError {
    RetrievalError::Filesystem(err.to_string())
}
