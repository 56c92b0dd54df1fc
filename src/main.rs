use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;

pub mod collector;
pub mod config;
pub mod metrics;
pub mod mimir;
pub mod probe;
pub mod server;

use collector::Collector;
use config::app_config::{load_config, setup_resolver};
use config::probe_config::Config;
use metrics::{MetricsSink, Registry};
use mimir::MimirPusher;
use probe::certificate::setup_tls_connector;
use server::Server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app_config = load_config().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        e
    })?;
    let settings = app_config.settings;

    log::info!("Start Domain Exporter version={}", VERSION);
    log::info!(
        "Collect duration: {}s",
        app_config.config.collect_interval().as_secs()
    );

    let resolver = Arc::new(setup_resolver(settings.dns_hosts.as_deref())?);
    let connector = setup_tls_connector()?;
    let registry = Arc::new(Registry::new());
    let config = Arc::new(RwLock::new(app_config.config));

    let mimir = settings.mimir_endpoint.as_ref().map(|endpoint| {
        log::info!("Using Mimir endpoint: {}", endpoint);
        MimirPusher::new(endpoint.clone(), settings.mimir_tenant.clone())
    });

    let collector = Collector::new(config.clone(), resolver.clone(), connector, registry.clone())
        .with_mimir(mimir);
    tokio::spawn(collector.clone().run());

    let listener = TcpListener::bind(&settings.listen_address).await?;
    log::info!(
        "Start web server at {}, metrics at {}",
        settings.listen_address,
        settings.metrics_path
    );
    let server = Server::new(
        config.clone(),
        resolver,
        registry.clone(),
        settings.metrics_path.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            log::error!("Web server stopped: {}", e);
            std::process::exit(1);
        }
    });

    wait_signal(|| {
        let config = config.clone();
        let registry = registry.clone();
        let collector = collector.clone();
        let path = settings.config_file.clone();
        tokio::spawn(async move {
            match Config::read(&path) {
                Ok(fresh) => {
                    config.write().await.reload_from(fresh);
                    registry.reset();
                    collector.collect_once().await;
                }
                Err(e) => log::error!("Reload failed, keeping previous configuration: {}", e),
            }
        });
    })
    .await?;

    log::info!("Server exit");
    Ok(())
}

/// Calls `on_reload` for every SIGHUP and returns on SIGINT or SIGTERM.
#[cfg(unix)]
async fn wait_signal(on_reload: impl Fn()) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = hangup.recv() => {
                log::info!("Reloading");
                on_reload();
            }
            _ = interrupt.recv() => return Ok(()),
            _ = terminate.recv() => return Ok(()),
        }
    }
}

#[cfg(not(unix))]
async fn wait_signal(_on_reload: impl Fn()) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
