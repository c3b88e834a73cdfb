//! Retrieval orchestration: cache decision, fetch, callbacks,
//! canonicalization and construction request assembly.

use std::fs;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::callbacks::CallbackRegistry;
use crate::canonical::{CanonicalSummary, CanonicalTargets, CanonicalizeRequest, Canonicalizer};
use crate::domain::{
    DatasetNamespace, DatasetSpecifier, GraphName, GraphVersion, PreprocessMode,
    directedness_label,
};
use crate::error::RetrievalError;
use crate::fetch::{FetchRequest, Fetcher};
use crate::graph::GraphBuilder;
use crate::lock::DirectoryLocks;
use crate::metadata::CacheMetadata;
use crate::recipe::RecipeConfig;
use crate::registry::DatasetRegistry;
use crate::request::{ConstructionOverrides, ConstructionRequest, LoadOptions};
use crate::store::{CanonicalPaths, Store, StoredDataset};

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub use_cache: bool,
    pub preprocess: PreprocessMode,
    pub verbose: u8,
    pub load: LoadOptions,
    pub overrides: ConstructionOverrides,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            preprocess: PreprocessMode::Auto,
            verbose: 0,
            load: LoadOptions::default(),
            overrides: ConstructionOverrides::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn timed(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            message: message.into(),
            elapsed: Some(elapsed),
        }
    }

    /// The `phase=...` prefix of the message, if any.
    pub fn phase(&self) -> Option<&str> {
        self.message
            .strip_prefix("phase=")
            .map(|rest| rest.split(';').next().unwrap_or(rest))
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<StoredDataset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
    pub path: String,
}

/// What to remove from the cache. `None` fields widen the scope.
#[derive(Debug, Clone, Default)]
pub struct ClearTarget {
    pub graph: Option<(DatasetNamespace, GraphName, Option<GraphVersion>)>,
}

pub struct Retriever<F: Fetcher, C: Canonicalizer> {
    store: Store,
    fetcher: F,
    canonicalizer: C,
    locks: DirectoryLocks,
}

impl<F: Fetcher, C: Canonicalizer> Retriever<F, C> {
    pub fn new(store: Store, fetcher: F, canonicalizer: C) -> Self {
        Self {
            store,
            fetcher,
            canonicalizer,
            locks: DirectoryLocks::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn canonical_paths(&self, recipe: &RecipeConfig) -> CanonicalPaths {
        self.store.canonical_paths(recipe)
    }

    /// Looks `specifier` up in `registry` and resolves it. Unknown graphs
    /// and versions fail before any fetch.
    pub fn resolve_named(
        &self,
        registry: &DatasetRegistry,
        specifier: &DatasetSpecifier,
        directed: bool,
        callbacks: &CallbackRegistry,
        options: &ResolveOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ConstructionRequest, RetrievalError> {
        let recipe = registry.recipe(specifier, directed, callbacks)?;
        self.resolve(&recipe, options, sink)
    }

    /// Makes the dataset available locally and returns the request that
    /// describes how to build it. The graph itself is not constructed.
    pub fn resolve(
        &self,
        recipe: &RecipeConfig,
        options: &ResolveOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ConstructionRequest, RetrievalError> {
        let preprocess = self.should_preprocess(options.preprocess)?;
        let dataset_dir = self.store.recipe_dir(recipe);
        let paths = CanonicalPaths::new(&dataset_dir, recipe.directed);
        sink.event(ProgressEvent::new(format!(
            "phase=Resolve; {} ({})",
            recipe.label(),
            directedness_label(recipe.directed)
        )));

        let _guard = self.locks.acquire(&paths.directory);

        if !options.use_cache && Store::remove_dir_if_exists(&paths.directory)? {
            info!(directory = %paths.directory, "removed cached canonical lists");
            sink.event(ProgressEvent::new(format!(
                "phase=Cache; removed {}",
                paths.directory
            )));
        }

        let started = Instant::now();
        sink.event(ProgressEvent::new(format!(
            "phase=Fetch; {} source file(s)",
            recipe.source_urls.len()
        )));
        self.fetcher.fetch(&FetchRequest {
            urls: &recipe.source_urls,
            destination_paths: recipe.source_paths.as_deref(),
            target_dir: &dataset_dir,
            auto_extract: recipe.auto_extract,
            use_cache: options.use_cache,
        })?;
        sink.event(ProgressEvent::timed(
            "phase=Fetch; raw files ready",
            started.elapsed(),
        ));

        Store::ensure_dir(&paths.directory)?;

        for callback in &recipe.callbacks {
            sink.event(ProgressEvent::new(format!(
                "phase=Callbacks; running {}",
                callback.name()
            )));
            debug!(callback = callback.name(), "running callback");
            callback.run(&dataset_dir)?;
        }

        let request = if preprocess {
            if CacheMetadata::exists(&paths.metadata) {
                sink.event(ProgressEvent::new(
                    "phase=Store; using cached canonical lists",
                ));
            } else {
                let summary = self.canonicalize(recipe, &dataset_dir, &paths, sink)?;
                CacheMetadata {
                    node_types_number: summary.node_types_number,
                    nodes_number: summary.nodes_number,
                    edge_types_number: summary.edge_types_number,
                    edges_number: summary.edges_number,
                }
                .store(&paths.metadata)?;
            }
            let metadata = CacheMetadata::load(&paths.metadata)?;
            ConstructionRequest::from_canonical(
                recipe,
                &paths,
                &metadata,
                options.verbose,
                &options.load,
                &options.overrides,
            )
        } else {
            sink.event(ProgressEvent::new("phase=Store; using raw files"));
            ConstructionRequest::from_raw(
                recipe,
                &dataset_dir,
                options.verbose,
                &options.load,
                &options.overrides,
            )
        };
        sink.event(ProgressEvent::timed(
            format!("phase=Done; {}", recipe.label()),
            started.elapsed(),
        ));
        Ok(request)
    }

    /// Resolves and builds the graph with `builder`.
    pub fn retrieve<B: GraphBuilder>(
        &self,
        builder: &B,
        recipe: &RecipeConfig,
        options: &ResolveOptions,
        sink: &dyn ProgressSink,
    ) -> Result<B::Graph, RetrievalError> {
        let request = self.resolve(recipe, options, sink)?;
        sink.event(ProgressEvent::new(format!("phase=Build; {}", request.name)));
        builder.from_canonical(&request)
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, RetrievalError> {
        sink.event(ProgressEvent::new("phase=Resolve; scanning cache"));
        Ok(ListResult {
            datasets: self.store.list_preprocessed()?,
        })
    }

    pub fn clear(
        &self,
        target: &ClearTarget,
        sink: &dyn ProgressSink,
    ) -> Result<ClearResult, RetrievalError> {
        let (cleared, path) = match &target.graph {
            Some((namespace, name, version)) => {
                let path = match version {
                    Some(version) => self.store.dataset_dir(namespace, name, version),
                    None => self.store.graph_dir(namespace, name),
                };
                sink.event(ProgressEvent::new(format!("phase=Store; clearing {path}")));
                (
                    self.store.clear_graph(namespace, name, version.as_ref())?,
                    path,
                )
            }
            None => {
                let path = self.store.cache_root().to_path_buf();
                sink.event(ProgressEvent::new(format!("phase=Store; clearing {path}")));
                (self.store.clear()?, path)
            }
        };
        Ok(ClearResult {
            cleared,
            path: path.to_string(),
        })
    }

    fn should_preprocess(&self, mode: PreprocessMode) -> Result<bool, RetrievalError> {
        match mode {
            PreprocessMode::Never => Ok(false),
            PreprocessMode::Always => {
                self.canonicalizer.ensure_supported()?;
                Ok(true)
            }
            PreprocessMode::Auto => match self.canonicalizer.ensure_supported() {
                Ok(()) => Ok(true),
                Err(err) => {
                    debug!(error = %err, "preprocessing unavailable, using raw files");
                    Ok(false)
                }
            },
        }
    }

    fn canonicalize(
        &self,
        recipe: &RecipeConfig,
        dataset_dir: &Utf8Path,
        paths: &CanonicalPaths,
        sink: &dyn ProgressSink,
    ) -> Result<CanonicalSummary, RetrievalError> {
        let node_types_declared = recipe
            .node_list
            .as_ref()
            .is_some_and(|spec| spec.has_node_types());
        let targets = CanonicalTargets {
            nodes: paths.nodes.clone(),
            edges: paths.edges.clone(),
            node_types: node_types_declared.then(|| paths.node_types.clone()),
            edge_types: recipe
                .edge_list
                .has_edge_types()
                .then(|| paths.edge_types.clone()),
        };
        let node_path = recipe
            .node_list
            .as_ref()
            .map(|spec| dataset_dir.join(&spec.path));
        let edge_path = dataset_dir.join(&recipe.edge_list.path);
        let name = recipe.graph_name.to_string();

        let started = Instant::now();
        sink.event(ProgressEvent::new("phase=Canonicalize; building canonical lists"));
        let result = self.canonicalizer.build_optimal_lists(&CanonicalizeRequest {
            name: &name,
            node_list: recipe.node_list.as_ref(),
            node_path: node_path.as_deref(),
            edge_list: &recipe.edge_list,
            edge_path: &edge_path,
            defaults: &recipe.defaults,
            directed: recipe.directed,
            targets: &targets,
        });
        match result {
            Ok(summary) => {
                sink.event(ProgressEvent::timed(
                    format!(
                        "phase=Canonicalize; {} nodes, {} edges",
                        summary.nodes_number, summary.edges_number
                    ),
                    started.elapsed(),
                ));
                Ok(summary)
            }
            Err(err) => {
                for target in targets.all() {
                    if target.as_std_path().exists() {
                        if let Err(remove_err) = fs::remove_file(target.as_std_path()) {
                            warn!(path = %target, error = %remove_err, "failed to remove partial canonical file");
                        }
                    }
                }
                Err(err)
            }
        }
    }
}
