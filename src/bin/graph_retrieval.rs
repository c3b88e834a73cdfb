use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use graph_retrieval::callbacks::CallbackRegistry;
use graph_retrieval::canonical::TsvCanonicalizer;
use graph_retrieval::config::{ConfigLoader, ResolvedConfig};
use graph_retrieval::domain::{DatasetSpecifier, PreprocessMode};
use graph_retrieval::error::{ErrorKind, RetrievalError};
use graph_retrieval::fetch::{FetchRequest, Fetcher, HttpFetcher};
use graph_retrieval::graph::{CsvGraphBuilder, GraphBuilder};
use graph_retrieval::output::{ConsoleProgress, JsonOutput};
use graph_retrieval::registry::DatasetRegistry;
use graph_retrieval::request::{ConstructionOverrides, LoadOptions};
use graph_retrieval::retrieval::{ClearTarget, ResolveOptions, Retriever};
use graph_retrieval::store::Store;

#[derive(Parser)]
#[command(name = "graph-retrieval")]
#[command(about = "Retrieve graph datasets and convert them into a canonical layout")]
#[command(version, author)]
struct Cli {
    /// Cache root; defaults to $GRAPH_CACHE_DIR, then ~/.cache/graph-retrieval.
    #[arg(long, global = true)]
    cache_path: Option<String>,

    /// Dataset registry file (.json or .json.gz), repeatable.
    #[arg(long = "registry", global = true)]
    registries: Vec<String>,

    /// Project file; defaults to graph-retrieval.json when present.
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Prepare a graph and print its construction request")]
    Resolve(GraphArgs),
    #[command(about = "Prepare and load a graph, then print a summary")]
    Retrieve(GraphArgs),
    #[command(about = "List preprocessed graphs in the cache")]
    List,
    #[command(about = "Remove cached graphs")]
    Clear(ClearArgs),
}

#[derive(Args, Clone)]
struct GraphArgs {
    /// `namespace:graph[@version]`
    specifier: String,

    #[arg(long)]
    directed: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long, value_enum, default_value_t = PreprocessMode::Auto)]
    preprocess: PreprocessMode,

    #[arg(long)]
    no_nodes: bool,

    #[arg(long)]
    no_node_types: bool,

    #[arg(long)]
    no_edge_types: bool,

    #[arg(long)]
    no_edge_weights: bool,

    /// Construction override as `key=value`, repeatable.
    #[arg(long = "override", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[derive(Args)]
struct ClearArgs {
    /// `namespace:graph[@version]`; clears the whole cache when omitted.
    specifier: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<RetrievalError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RetrievalError) -> u8 {
    match error.kind() {
        ErrorKind::Configuration => 2,
        ErrorKind::Transport => 3,
        ErrorKind::Format => 4,
        ErrorKind::Integrity => 5,
        ErrorKind::Callback | ErrorKind::Filesystem => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project = match ConfigLoader::resolve(cli.config.as_deref()) {
        Ok(project) => Some(project),
        Err(RetrievalError::MissingConfig) if cli.command.is_some() => None,
        Err(err) => return Err(err.into()),
    };

    let cache_path = cli
        .cache_path
        .clone()
        .or_else(|| project.as_ref().and_then(|project| project.cache_path.clone()));
    let store = Store::from_cache_path(cache_path.as_deref())?;

    match cli.command {
        Some(Commands::Resolve(args)) => {
            let registry = load_registry(&cli.registries, project.as_ref())?;
            let retriever = http_retriever(store)?;
            let specifier: DatasetSpecifier = args.specifier.parse()?;
            let options = resolve_options(&args, cli.verbose)?;
            let progress = ConsoleProgress::new(cli.verbose);
            let request = retriever.resolve_named(
                &registry,
                &specifier,
                args.directed,
                &CallbackRegistry::with_builtins(),
                &options,
                &progress,
            )?;
            JsonOutput::print_request(&request).into_diagnostic()?;
            Ok(())
        }
        Some(Commands::Retrieve(args)) => {
            let registry = load_registry(&cli.registries, project.as_ref())?;
            let retriever = http_retriever(store)?;
            let specifier: DatasetSpecifier = args.specifier.parse()?;
            let options = resolve_options(&args, cli.verbose)?;
            let progress = ConsoleProgress::new(cli.verbose);
            let recipe =
                registry.recipe(&specifier, args.directed, &CallbackRegistry::with_builtins())?;
            let graph = retriever.retrieve(&CsvGraphBuilder::new(), &recipe, &options, &progress)?;
            JsonOutput::print_summary(&graph.summary()).into_diagnostic()?;
            Ok(())
        }
        Some(Commands::List) => {
            let retriever = Retriever::new(store, NopFetcher, TsvCanonicalizer::new());
            let result = retriever.list(&JsonOutput)?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(())
        }
        Some(Commands::Clear(args)) => {
            let retriever = Retriever::new(store, NopFetcher, TsvCanonicalizer::new());
            let target = match args.specifier {
                Some(value) => {
                    let specifier: DatasetSpecifier = value.parse()?;
                    ClearTarget {
                        graph: Some((specifier.namespace, specifier.name, specifier.version)),
                    }
                }
                None => ClearTarget::default(),
            };
            let result = retriever.clear(&target, &JsonOutput)?;
            JsonOutput::print_clear(&result).into_diagnostic()?;
            Ok(())
        }
        None => {
            let Some(project) = project else {
                return Err(miette::Report::msg(
                    "command required (try `graph-retrieval --help`)",
                ));
            };
            run_project(&project, &cli.registries, store, cli.verbose)
        }
    }
}

fn run_project(
    project: &ResolvedConfig,
    registries: &[String],
    store: Store,
    verbose: u8,
) -> miette::Result<()> {
    let registry = load_registry(registries, Some(project))?;
    let retriever = http_retriever(store)?;
    let callbacks = CallbackRegistry::with_builtins();
    let progress = ConsoleProgress::new(verbose);
    let builder = CsvGraphBuilder::new();
    for graph in &project.graphs {
        let recipe = registry.recipe(&graph.specifier, graph.directed, &callbacks)?;
        let options = ResolveOptions {
            use_cache: graph.use_cache,
            preprocess: graph.preprocess,
            verbose,
            load: graph.load,
            overrides: graph.overrides.clone(),
        };
        let request = retriever.resolve(&recipe, &options, &progress)?;
        let built = builder.from_canonical(&request)?;
        JsonOutput::print_summary(&built.summary()).into_diagnostic()?;
    }
    Ok(())
}

fn http_retriever(store: Store) -> miette::Result<Retriever<HttpFetcher, TsvCanonicalizer>> {
    let fetcher = HttpFetcher::new()?;
    Ok(Retriever::new(store, fetcher, TsvCanonicalizer::new()))
}

fn load_registry(
    registries: &[String],
    project: Option<&ResolvedConfig>,
) -> miette::Result<DatasetRegistry> {
    let mut registry = DatasetRegistry::new();
    let project_registries = project
        .map(|project| project.registries.as_slice())
        .unwrap_or_default();
    for path in project_registries {
        registry.load_file(path)?;
    }
    for path in registries {
        registry.load_file(camino::Utf8Path::new(path))?;
    }
    Ok(registry)
}

fn resolve_options(args: &GraphArgs, verbose: u8) -> miette::Result<ResolveOptions> {
    Ok(ResolveOptions {
        use_cache: !args.no_cache,
        preprocess: args.preprocess,
        verbose,
        load: LoadOptions {
            load_nodes: !args.no_nodes,
            load_node_types: !args.no_node_types,
            load_edge_types: !args.no_edge_types,
            load_edge_weights: !args.no_edge_weights,
        },
        overrides: ConstructionOverrides::from_key_values(
            args.overrides.iter().map(String::as_str),
        )?,
    })
}

/// Fetcher for commands that never download.
struct NopFetcher;

impl Fetcher for NopFetcher {
    fn fetch(&self, _request: &FetchRequest<'_>) -> Result<(), RetrievalError> {
        Ok(())
    }
}
