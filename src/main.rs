//! Emoji Mosaic - turns images into mosaics of emoji tiles.
//!
//! This binary loads the tile library, then either starts the HTTP server or
//! renders a single mosaic from the command line.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emoji_mosaic::{
    config::{Cli, Command, MosaicArgs, RenderConfig, ServeConfig},
    library::TileLibrary,
    mosaic::{decode_source, Compositor, ProgressEvent},
    server::{create_router, RouterConfig},
    task::{save_png, JsonFileStore, MosaicService, ServiceConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Emoji Mosaic v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Tiles: {}", config.mosaic.tiles_dir.display());
    info!("  Output: {}", config.output_dir.display());
    info!("  Records: {}", config.db_path.display());
    info!(
        "  Defaults: {}x{} grid, {}px tiles",
        config.mosaic.max_width, config.mosaic.max_height, config.mosaic.tile_size
    );
    info!(
        "  Tasks: {} max, {}s retention",
        config.max_tasks, config.task_ttl
    );

    let library = match load_library(&config.mosaic).await {
        Some(library) => library,
        None => return ExitCode::FAILURE,
    };

    let compositor = Compositor::with_cache_capacity(library, config.mosaic.tile_cache);
    let store = Arc::new(JsonFileStore::new(&config.db_path));
    let service_config = ServiceConfig::default()
        .with_output_dir(&config.output_dir)
        .with_default_params(config.mosaic.params())
        .with_task_limits(config.max_tasks, config.task_ttl());

    let service = Arc::new(MosaicService::new(compositor, store, service_config));
    let reaper = service.spawn_reaper(config.reap_interval());

    let router = create_router(Arc::clone(&service), build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/server-status", addr);
    info!(
        "    curl -F image=@photo.jpg http://{}/create-mosaic",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    reaper.abort();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_max_upload_bytes(config.max_upload);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let library = match load_library(&config.mosaic).await {
        Some(library) => library,
        None => return ExitCode::FAILURE,
    };

    let params = config.mosaic.params();
    let compositor = Compositor::with_cache_capacity(library, config.mosaic.tile_cache);
    let input = config.input.clone();
    let output = config.output.clone();

    let result = tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&input).map_err(|e| e.to_string())?;
        let source = decode_source(&bytes).map_err(|e| e.to_string())?;

        let started = Instant::now();
        let sink = |event: ProgressEvent| match event {
            ProgressEvent::Compositing { percent } => debug!(percent, "Compositing"),
            other => info!(?other, "Progress"),
        };

        let mosaic = compositor
            .composite(&source, &params, &sink, &CancellationToken::new())
            .map_err(|e| e.to_string())?;
        let size = save_png(&mosaic.image, &output).map_err(|e| e.to_string())?;

        Ok::<_, String>((mosaic, size, started.elapsed()))
    })
    .await;

    match result {
        Ok(Ok((mosaic, size, elapsed))) => {
            info!(
                grid_width = mosaic.grid_width,
                grid_height = mosaic.grid_height,
                blank_cells = mosaic.blank_cells,
                size_bytes = size,
                elapsed_ms = elapsed.as_millis() as u64,
                "Wrote {}",
                config.output.display()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Render failed: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Render worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Shared
// =============================================================================

/// Load the tile library on the blocking pool. Logs and returns None on failure.
async fn load_library(args: &MosaicArgs) -> Option<Arc<TileLibrary>> {
    let dir = args.tiles_dir.clone();
    info!("Loading tiles from {}...", dir.display());

    match tokio::task::spawn_blocking(move || TileLibrary::load(dir)).await {
        Ok(Ok(library)) => {
            info!(
                "  Loaded {} tile(s), skipped {}",
                library.len(),
                library.skipped().len()
            );
            Some(Arc::new(library))
        }
        Ok(Err(e)) => {
            error!("Failed to load tile library: {}", e);
            None
        }
        Err(e) => {
            error!("Tile loader failed: {}", e);
            None
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "emoji_mosaic=debug,tower_http=debug"
    } else {
        "emoji_mosaic=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
