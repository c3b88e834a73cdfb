//! Conversion of raw node and edge lists into the canonical layout.
//!
//! The canonical files are tab separated, without header, and use dense
//! numeric ids:
//!
//! * `nodes.tsv`: `node_id, node_name[, node_type_ids]`
//! * `edges.tsv`: `edge_id, source_id, destination_id[, edge_type_id][, weight]`
//! * `node_types.tsv` / `edge_types.tsv`: `type_id, type_name`
//!
//! Multiple node types of one node are joined with [`NODE_TYPES_SEPARATOR`].

mod reader;
mod tsv;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::RetrievalError;
use crate::recipe::{Defaults, EdgeListSpec, NodeListSpec};

pub use reader::{ListReader, RawRow};
pub use tsv::TsvCanonicalizer;

pub const NODE_TYPES_SEPARATOR: char = '|';

/// Output locations. Type targets are `None` when the raw lists declare no
/// type column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTargets {
    pub nodes: Utf8PathBuf,
    pub edges: Utf8PathBuf,
    pub node_types: Option<Utf8PathBuf>,
    pub edge_types: Option<Utf8PathBuf>,
}

impl CanonicalTargets {
    pub fn all(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        [Some(&self.nodes), Some(&self.edges)]
            .into_iter()
            .chain([self.node_types.as_ref(), self.edge_types.as_ref()])
            .flatten()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CanonicalizeRequest<'a> {
    pub name: &'a str,
    pub node_list: Option<&'a NodeListSpec>,
    /// Absolute path of the raw node list, present with `node_list`.
    pub node_path: Option<&'a Utf8Path>,
    pub edge_list: &'a EdgeListSpec,
    pub edge_path: &'a Utf8Path,
    pub defaults: &'a Defaults,
    pub directed: bool,
    pub targets: &'a CanonicalTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanonicalSummary {
    pub node_types_number: Option<u64>,
    pub nodes_number: u64,
    pub edge_types_number: Option<u64>,
    pub edges_number: u64,
    pub dropped_self_loops: u64,
    pub dropped_duplicates: u64,
}

pub trait Canonicalizer: Send + Sync {
    /// Reports whether this canonicalizer can run here. Checked before any
    /// I/O so an unsupported platform surfaces as a configuration error.
    fn ensure_supported(&self) -> Result<(), RetrievalError> {
        Ok(())
    }

    fn build_optimal_lists(
        &self,
        request: &CanonicalizeRequest<'_>,
    ) -> Result<CanonicalSummary, RetrievalError>;
}
