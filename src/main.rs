use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use lodgr::city::CityNormalizer;
use lodgr::collaborator::{HttpCollaborator, SearchCollaborator};
use lodgr::config::Config;
use lodgr::engine::Engine;
use lodgr::planner::Planner;
use lodgr::{compactor, observability, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;
    let tls_acceptor = config.tls_acceptor()?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path(), CityNormalizer::default())?);
    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let collaborator: Option<Arc<dyn SearchCollaborator>> = match &config.search_url {
        Some(url) => Some(Arc::new(HttpCollaborator::new(url.clone(), config.search_timeout)?)),
        None => {
            warn!("LODGR_SEARCH_URL not set, search uses the local quiz and city scan only");
            None
        }
    };
    let planner = Arc::new(Planner::new(engine, collaborator, config.search_timeout));
    let factory = wire::LodgrFactory::new(planner, config.password.clone());

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("lodgr listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {}", config.max_connections);
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  search: {}", config.search_url.as_deref().unwrap_or("fallback only"));
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };

    wire::serve(listener, factory, tls_acceptor, config.max_connections, shutdown).await;

    info!("lodgr stopped");
    Ok(())
}
