// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  costgate: GraphQL query complexity gate
//
//  Loads a schema and gate config, runs one query through the
//  request lifecycle and prints the GraphQL response.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use anyhow::Context;
use clap::Parser;
use costgate_core::Schema;
use costgate_core::config::CostgateConfig;
use costgate_host::{GraphQLRequest, GraphQLServer, StaticResolver};
use costgate_observability::MetricsCollector;
use costgate_plugin::registry::PluginRegistry;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "costgate", version, about = "costgate: GraphQL query complexity gate")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "costgate.yaml")]
    config: PathBuf,

    /// Path to the schema SDL
    #[arg(short, long)]
    schema: PathBuf,

    /// Path to the query document
    #[arg(short, long)]
    query: PathBuf,

    /// Operation to run when the document holds several
    #[arg(long)]
    operation_name: Option<String>,

    /// Variables as a JSON object
    #[arg(long)]
    variables: Option<String>,

    /// JSON file whose top-level keys serve the root fields
    #[arg(long)]
    root_value: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // ── Config ──
    if !cli.config.is_file() {
        anyhow::bail!("Config file not found: {}", cli.config.display());
    }
    info!(path = %cli.config.display(), "Loading config file");
    let config = CostgateConfig::load(&cli.config)
        .with_context(|| format!("Invalid config file {}", cli.config.display()))?;

    // ── Schema ──
    let sdl = read(&cli.schema)?;
    let schema = Schema::parse(&sdl)?;
    info!(types = schema.len(), "Schema loaded");

    // ── Plugins ──
    let mut registry = PluginRegistry::new();
    costgate_plugins::register_all(&mut registry);
    let gate = registry.configure("query-complexity", &config.complexity.to_plugin_config())?;
    info!(
        maximum_complexity = config.complexity.maximum_complexity,
        estimators = config.complexity.estimators.len(),
        "Complexity gate configured"
    );

    // ── Metrics ──
    let prometheus = &config.observability.prometheus;
    let metrics = Arc::new(MetricsCollector::new(prometheus.enabled, &prometheus.namespace)?);

    let resolver = match &cli.root_value {
        Some(path) => StaticResolver::from_object(json_object(&read(path)?, "root value")?),
        None => StaticResolver::new(),
    };

    let server = GraphQLServer::builder()
        .schema(schema)
        .plugin(gate)
        .resolver(Arc::new(resolver))
        .metrics(metrics.clone())
        .build()?;

    let mut request = GraphQLRequest::new(read(&cli.query)?);
    if let Some(name) = cli.operation_name {
        request = request.operation_name(name);
    }
    if let Some(variables) = &cli.variables {
        request = request.variables(json_object(variables, "variables")?);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let response = rt.block_on(server.execute_operation(request));

    println!("{}", serde_json::to_string_pretty(&response)?);
    if metrics.is_enabled() {
        eprint!("{}", metrics.render());
    }

    if !response.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn json_object(text: &str, what: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).with_context(|| format!("Invalid {what} JSON"))? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("{what} must be a JSON object"),
    }
}
