mod assets;
mod config;
mod mesh;
mod physics;
mod proto;
mod transports;
mod world;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assets::{AssetCache, AssetCatalog, AssetStreamer};
use config::ServerConfig;
use physics::PhysicsConfig;
use transports::signaling::Signaler;
use world::{SessionManager, Simulation, World};

#[cfg(feature = "jemalloc")]
mod allocator {
    #[cfg(not(target_env = "msvc"))]
    use tikv_jemallocator::Jemalloc;
    #[cfg(not(target_env = "msvc"))]
    #[global_allocator]
    static GLOBAL: Jemalloc = Jemalloc;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {

    // ================
    //      Tracing
    // ================
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("{}=info,tower_http=debug", env!("CARGO_CRATE_NAME")).into()
                })
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    info!(?config, "Configuration loaded");

    // Assets
    let catalog = Arc::new(AssetCatalog::builtin());
    let cache = AssetCache::new(config.cache_retention);
    let assets = Arc::new(AssetStreamer::new(
        cache.clone(),
        catalog.clone(),
        config.texture_dir.clone(),
    ));

    // World + bootstrap chunk
    let (world, registrations) = World::new(config.chunk_size);
    let world = Arc::new(world);
    world.bootstrap(&catalog);

    let sessions = Arc::new(SessionManager::new(world.clone(), assets));

    // Physics init failure aborts startup
    let physics = PhysicsConfig {
        step: config.tick_interval(),
        solver_iterations: config.solver_iterations,
        ..Default::default()
    };
    let simulation = Simulation::new(physics, world.clone(), sessions.clone(), registrations)?;
    info!(hz = config.tick_hz, "Physics engine initialized");

    // Transport events -> session loop
    let (events_tx, events_rx) = mpsc::channel(1024);
    let signaler = Arc::new(Signaler::new(events_tx));

    let cache_manager = tokio::spawn(cache.run_manager(config.cache_sweep_interval));
    let sim = tokio::spawn(simulation.run(config.tick_interval()));
    let session_loop = tokio::spawn(sessions.run(events_rx));
    let http = tokio::spawn(transports::https::serve(config.clone(), signaler));

    info!("chunkworld v{}", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        res = http => {
            match res {
                Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
                Err(e) => error!(error = %e, "HTTP server task panicked"),
                Ok(Ok(())) => info!("HTTP server stopped"),
            }
        },
        _ = cache_manager => {
            error!("Asset cache manager task terminated unexpectedly");
        },
        _ = sim => {
            error!("Simulation task terminated unexpectedly");
        },
        _ = session_loop => {
            error!("Session loop terminated unexpectedly");
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())

}
