//! Document Translator Web - HTTP service for translating documents.

mod helpers;
mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use doc_translator_core::{AppConfig, Provider, RenderEngine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "doc-translator-web")]
#[command(author, version, about = "Document Translator Web Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Config file (defaults to ~/.config/doc-translator/config.toml and ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Translation provider (overrides config)
    #[arg(long, value_parser = ["google", "openai"])]
    provider: Option<String>,

    /// OpenAI API base URL (overrides config)
    #[arg(long, env = "OPENAI_API_BASE")]
    api_base: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY")]
    api_key: Option<String>,

    /// Model name for OpenAI-compatible API (overrides config)
    #[arg(long, env = "OPENAI_MODEL")]
    model: Option<String>,

    /// PDF renderer (overrides config)
    #[arg(long, value_parser = ["auto", "chromium", "builtin"])]
    renderer: Option<String>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Clear translation cache on startup
    #[arg(long)]
    clear_cache: bool,
}

impl Args {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AppConfig::load().context("Failed to load config")?,
        };

        match self.provider.as_deref() {
            Some("google") => config.translator.provider = Provider::Google,
            Some("openai") => config.translator.provider = Provider::OpenAi,
            _ => {}
        }
        if let Some(api_base) = &self.api_base {
            config.translator.api_base.clone_from(api_base);
        }
        if self.api_key.is_some() {
            config.translator.api_key.clone_from(&self.api_key);
        }
        if let Some(model) = &self.model {
            config.translator.model.clone_from(model);
        }
        match self.renderer.as_deref() {
            Some("auto") => config.render.engine = RenderEngine::Auto,
            Some("chromium") => config.render.engine = RenderEngine::Chromium,
            Some("builtin") => config.render.engine = RenderEngine::Builtin,
            _ => {}
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},sled=warn")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Clear cache if requested
    if args.clear_cache {
        match doc_translator_core::clear_translation_cache() {
            Ok(count) => info!("Cleared {} cached translations", count),
            Err(e) => tracing::warn!("Failed to clear cache: {}", e),
        }
    }

    let config = args.load_config()?;
    info!(
        "Using {:?} provider, {} renderer, {:?} reconciliation",
        config.translator.provider,
        config.render.engine.as_str(),
        config.pipeline.reconcile
    );

    // Create application state (opens cache - fails fast if locked)
    let state = Arc::new(AppState::new(config).context("Failed to initialize application state")?);
    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
