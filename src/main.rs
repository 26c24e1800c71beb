//! `refine` command-line tool.
//!
//! Refines text from an argument or stdin with the configured backend. Only
//! the offline backend is built in, so this is mostly useful for checking a
//! configuration file and watching the resilience layer's logs.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use refine_guard::config::loader::load_config;
use refine_guard::config::SharedConfig;
use refine_guard::observability::logging::init_logging;
use refine_guard::templates::InMemoryTemplates;
use refine_guard::validator::BasicValidator;
use refine_guard::{BackendRegistry, RefineOptions, Refiner, RefinerConfig, Shutdown};

#[derive(Parser)]
#[command(name = "refine")]
#[command(about = "Refine text through a resilient LLM backend layer", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend to use instead of the configured one.
    #[arg(short, long)]
    backend: Option<String>,

    /// Template id.
    #[arg(short, long)]
    template: Option<String>,

    /// Validate the refined text and report issues on stderr.
    #[arg(long)]
    validate: bool,

    /// Text to refine. Read from stdin when omitted.
    text: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RefinerConfig::default(),
    };
    init_logging(&config.observability)?;

    tracing::debug!(
        backend = %config.backend.active,
        cache_enabled = config.cache.enabled,
        max_retries = config.retries.max_retries,
        "Configuration loaded"
    );

    let text = match cli.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let settings = Arc::new(SharedConfig::new(config.clone()));
    let backends = BackendRegistry::new(settings.clone());
    let templates = Arc::new(InMemoryTemplates::from_config(&config.templates));
    let refiner =
        Refiner::new(&config, settings, backends, templates).with_validator(Arc::new(BasicValidator));

    let shutdown = Shutdown::new();
    let cancel = shutdown.request_token();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            ctrl_c.trigger();
        }
    });

    let options = RefineOptions {
        template_id: cli.template,
        backend_id: cli.backend,
        validate_output: cli.validate,
        ..RefineOptions::default()
    };

    let outcome = refiner.refine_with_failover(&text, Some(&cancel), &options).await;
    refiner.shutdown();

    match outcome {
        Ok(result) => {
            println!("{}", result.refined_text);
            if let Some(report) = result.validation.filter(|r| !r.valid) {
                for issue in report.issues {
                    eprintln!("warning: {issue}");
                }
            }
            Ok(())
        }
        Err(e) => {
            let recovery = e.recovery(&config.backend.fallback);
            tracing::error!(error = %e, recovery = ?recovery, "Refinement failed");
            Err(e.into())
        }
    }
}
