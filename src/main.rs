//! gozzmock - CLI Entry Point

use anyhow::Result;
use clap::{Parser, ValueEnum};
use gozzmock::server::wait_for_signal;
use gozzmock::{
    Dispatcher, ExpectationStore, HandlebarsEvaluator, JsTemplateEvaluator, MockServer,
    ReqwestTransport, TemplateEvaluator,
};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "gozzmock",
    about = "HTTP test double - request expectations with canned, templated, or forwarded responses",
    version
)]
struct Args {
    /// Initial expectations as a JSON array
    #[arg(long, env = "GOZZMOCK_EXPECTATIONS", default_value = "[]")]
    expectations: String,

    /// File with initial expectations (JSON, or YAML for .yaml/.yml)
    #[arg(long, env = "GOZZMOCK_EXPECTATIONS_FILE", value_name = "PATH")]
    expectations_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, env = "GOZZMOCK_LOG_LEVEL", default_value = "debug")]
    log_level: Level,

    /// Address to listen on
    #[arg(long, env = "GOZZMOCK_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "GOZZMOCK_PORT", default_value_t = 8080)]
    port: u16,

    /// Engine used for `jstemplate` response templates
    #[arg(long, value_enum, default_value_t = TemplateEngine::Js)]
    template_engine: TemplateEngine,

    /// Validate the initial expectations and exit
    #[arg(long)]
    validate: bool,

    /// Print the initial expectations and exit
    #[arg(long)]
    print_expectations: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TemplateEngine {
    Js,
    Handlebars,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Inline expectations first, so the file can override them by key
    let store = Arc::new(ExpectationStore::new());
    store.add_from_str(&args.expectations).await?;
    if let Some(path) = &args.expectations_file {
        info!(path = %path.display(), "Loading expectations file");
        store.add_from_file(path).await?;
    }

    if args.validate {
        println!("Expectations are valid ({} defined)", store.len().await);
        return Ok(());
    }

    if args.print_expectations {
        let snapshot = store.snapshot_ordered().await;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let evaluator: Arc<dyn TemplateEvaluator> = match args.template_engine {
        TemplateEngine::Js => Arc::new(JsTemplateEvaluator::new()),
        TemplateEngine::Handlebars => Arc::new(HandlebarsEvaluator::new()),
    };
    let transport = Arc::new(ReqwestTransport::new()?);
    let dispatcher = Arc::new(Dispatcher::new(store, evaluator, transport));

    let addr = SocketAddr::new(args.host, args.port);
    info!(
        %addr,
        engine = ?args.template_engine,
        expectations = dispatcher.store().len().await,
        "Starting gozzmock"
    );

    let server = MockServer::bind(addr, dispatcher).await?;
    server
        .run_until(wait_for_signal(tokio::signal::ctrl_c()))
        .await
}
