use anyhow::Result;
use clap::{Parser, Subcommand};
use gatesync_access::AccessControlEngine;
use gatesync_config::{GatewayConfig, OverrideWatcher};
use gatesync_keys::{HttpKeyFetcher, PublicKeyRegistry};
use gatesync_refresh::{Backoff, CoordinatorSettings, RefreshCoordinator, RetryPolicy, SseEventBus};
use gatesync_registry::HttpRegistryClient;
use gatesync_types::{AccessDecision, ClientAccessDto, EventBus, KeyFetcher, RegistrySource};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "gatesync", about = "gatesync — policy and key synchronization core for API gateways")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the synchronization core until interrupted.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Load and validate a configuration file, then print a summary.
    Validate {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Evaluate an access decision offline against the configured overrides.
    Check {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// Client id to evaluate.
        #[arg(long)]
        client: String,
        /// Target service name.
        #[arg(long)]
        service: String,
        /// Target route name.
        #[arg(long)]
        route: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => cmd_serve(config).await,
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Check {
            config,
            client,
            service,
            route,
        } => cmd_check(&config, &client, &service, &route),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let config = match path {
        Some(path) => GatewayConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("config error: {e}"))?,
        None => GatewayConfig::default(),
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn cmd_serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    let registry: Arc<dyn RegistrySource> = Arc::new(HttpRegistryClient::new(
        config.registry.base_url.clone(),
        Duration::from_secs(config.registry.timeout_secs),
    ));
    let bus: Arc<dyn EventBus> = Arc::new(SseEventBus::new(
        config.bus.events_url.clone(),
        config.bus.channel.clone(),
        Duration::from_secs(config.registry.timeout_secs),
    ));
    let fetcher: Arc<dyn KeyFetcher> = Arc::new(HttpKeyFetcher::new(Duration::from_secs(
        config.registry.timeout_secs,
    )));
    let keys = Arc::new(PublicKeyRegistry::new(
        config.key_sources.iter().map(|s| s.to_source()).collect(),
        fetcher,
    ));
    let engine = Arc::new(AccessControlEngine::new());

    // Overrides: inline entries first, then the watched file (file wins on
    // duplicate client ids by iteration order).
    let override_watcher = match &config.override_file {
        Some(path) => {
            let (watcher, rx) = OverrideWatcher::new(path.clone())
                .map_err(|e| anyhow::anyhow!("override file error: {e}"))?;
            let watcher = Arc::new(watcher);
            Arc::clone(&watcher).watch();
            spawn_override_task(Arc::clone(&watcher), rx, Arc::clone(&engine), config.access_overrides.clone());
            Some(watcher)
        }
        None => None,
    };
    engine.set_overrides(combined_overrides(
        &config.access_overrides,
        override_watcher.as_deref(),
    ));

    let retry = RetryPolicy {
        max_attempts: config.refresh.max_attempts,
        base_delay: Duration::from_millis(config.refresh.retry_delay_ms),
        backoff: if config.refresh.exponential_backoff {
            Backoff::Exponential
        } else {
            Backoff::Fixed
        },
        attempt_timeout: Duration::from_secs(config.refresh.attempt_timeout_secs),
    };
    let settings = CoordinatorSettings {
        poll_interval: Duration::from_secs(config.refresh.poll_interval_secs),
        bus_enabled: config.bus.enabled,
        fail_fast: config.bus.fail_fast,
    };
    let coordinator = Arc::new(RefreshCoordinator::new(
        registry,
        bus,
        Arc::clone(&engine),
        Arc::clone(&keys),
        retry,
        settings,
    ));

    let key_tasks = keys.spawn_refresh_tasks();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = Arc::clone(&coordinator);
    let run_handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    let health = serde_json::to_string(&coordinator.health()).unwrap_or_default();
    tracing::info!(health = %health, "gatesync started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    shutdown_tx.send(true)?;
    keys.shutdown();
    run_handle
        .await?
        .map_err(|e| anyhow::anyhow!("coordinator failed: {e}"))?;
    for task in key_tasks {
        task.await?;
    }
    Ok(())
}

fn spawn_override_task(
    watcher: Arc<OverrideWatcher>,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<()>,
    engine: Arc<AccessControlEngine>,
    inline: Vec<ClientAccessDto>,
) {
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let count = engine.set_overrides(combined_overrides(&inline, Some(&watcher)));
            tracing::info!(configs = count, "access overrides re-applied");
        }
    });
}

fn combined_overrides(
    inline: &[ClientAccessDto],
    watcher: Option<&OverrideWatcher>,
) -> Vec<ClientAccessDto> {
    let mut overrides = inline.to_vec();
    if let Some(watcher) = watcher {
        overrides.extend(watcher.load().iter().cloned());
    }
    overrides
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    let config = load_config(Some(config_path))?;
    println!("configuration OK");
    println!("  registry:        {}", config.registry.base_url);
    println!(
        "  bus:             {} (channel {}, enabled: {})",
        config.bus.events_url, config.bus.channel, config.bus.enabled
    );
    println!("  key sources:     {}", config.key_sources.len());
    println!("  overrides:       {}", config.access_overrides.len());
    println!(
        "  poll interval:   {}s, retry attempts: {}",
        config.refresh.poll_interval_secs, config.refresh.max_attempts
    );
    Ok(())
}

fn cmd_check(config_path: &Path, client: &str, service: &str, route: &str) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let engine = AccessControlEngine::new();
    engine.set_overrides(config.access_overrides.clone());

    match engine.check(service, route, client) {
        AccessDecision::Allowed => println!("ALLOWED"),
        AccessDecision::Denied(reason) => {
            println!("DENIED ({reason})");
            std::process::exit(1);
        }
    }
    Ok(())
}
