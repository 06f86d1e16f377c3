//! AutoRead - unattended reader for Discourse forums
//!
//! Main entry point. Attaches to a Chrome started with
//! `--remote-debugging-port`, picks a tab on one of the configured forums and
//! keeps reading from there.
//!
//! # Execution Flow
//!
//! 1. Parse CLI, initialize logging → logs/autoread.<date>
//! 2. Create a current-thread tokio runtime (every engine callback runs to completion)
//! 3. Load `autoread.yaml` and open the persisted session
//! 4. Attach to the browser and determine the forum base URL
//! 5. Start the engine and the console control surface
//! 6. Run until `q` or Ctrl-C, then stop all timers and log metrics

use anyhow::{Context, Result, anyhow};
use autoread::models::determine_base_url;
use autoread::page::CdpPage;
use autoread::page::cdp::discover_ws_url;
use autoread::services::HttpItemSource;
use autoread::state::JsonFileStore;
use autoread::ui::{ConsoleBridge, ControlSurface};
use autoread::{APP_NAME, AutoReader, ConfigManager, Metrics, Page, SessionManager, VERSION};
use camino::Utf8PathBuf;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "autoread", version, about = "Unattended reader for Discourse forums")]
struct Cli {
    /// Directory holding autoread.yaml and the session file
    #[arg(long, default_value = "autoread-data")]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Do not read commands from stdin or log to the console
    #[arg(long)]
    no_console: bool,

    /// Chrome remote debugging port
    #[arg(long, default_value_t = 9222)]
    port: u16,

    /// Browser WebSocket URL (skips discovery on --port)
    #[arg(long)]
    ws_url: Option<String>,

    /// Page to open when no tab is on a configured forum
    #[arg(long)]
    url: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard =
        autoread::logging::setup_logging_with_console("logs", "autoread", cli.debug, !cli.no_console)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli));

    if let Err(e) = &result {
        tracing::error!("Fatal: {:#}", e);
    }
    tracing::info!("Application shutdown complete");
    result
}

async fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    if config_manager.write_default_config()? {
        tracing::info!("Wrote default config to {}", config_manager.config_path());
    }
    let mut config = config_manager.load_config()?;

    let export_dir = Utf8PathBuf::from(&config.export.dir);
    if export_dir.is_relative() {
        config.export.dir = cli.config_dir.join(export_dir).into_string();
    }

    let store = JsonFileStore::open(cli.config_dir.join(&config.storage.state_file))?;
    let session = SessionManager::new(Arc::new(store));
    let metrics = Arc::new(Metrics::new());

    let ws_url = match cli.ws_url {
        Some(url) => url,
        None => discover_ws_url(cli.port).await?,
    };

    let fallback_url = cli
        .url
        .clone()
        .or_else(|| config.sites.base_urls.first().cloned())
        .ok_or_else(|| anyhow!("No base URLs configured and no --url given"))?;

    let page = CdpPage::attach(
        &ws_url,
        &config.sites.base_urls,
        &fallback_url,
        config.selectors.clone(),
    )
    .await?;
    let page: Arc<dyn Page> = Arc::new(page);

    let current_url = page.current_url().await.unwrap_or_default();
    let base_url = determine_base_url(&current_url, &config.sites)
        .ok_or_else(|| anyhow!("No base URLs configured"))?;
    tracing::info!("Current page {}, forum {}", current_url, base_url);

    let source = Arc::new(
        HttpItemSource::new(
            base_url.clone(),
            config.limits.comment_ceiling,
            config.network.request_timeout(),
            Arc::clone(&metrics),
        )?
        .with_max_pages(config.limits.max_pages),
    );

    let mut reader = AutoReader::new(
        config,
        session.clone(),
        page,
        source,
        base_url,
        Arc::clone(&metrics),
    );
    reader.start();

    if !cli.no_console {
        ConsoleBridge::new(ControlSurface::new(reader.handle(), session)).spawn();
    }

    let handle = reader.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
            handle.shutdown();
        }
    });

    reader.run().await;
    metrics.log_summary();
    Ok(())
}
