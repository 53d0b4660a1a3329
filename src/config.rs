//! Configuration management for the mosaic server.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `MOSAIC_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use emoji_mosaic::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Render(config) => println!("Rendering {}", config.input.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `MOSAIC_HOST` - Server bind address (default: 0.0.0.0)
//! - `MOSAIC_PORT` - Server port (default: 10000)
//! - `MOSAIC_TILES_DIR` - Tile image directory (default: static/emojis)
//! - `MOSAIC_OUTPUT_DIR` - Finished mosaic directory (default: static/mosaics)
//! - `MOSAIC_DB_PATH` - Task record file (default: static/mosaic_db.json)
//! - `MOSAIC_MAX_WIDTH` / `MOSAIC_MAX_HEIGHT` - Grid bounding box (default: 400x400)
//! - `MOSAIC_TILE_SIZE` - Tile edge in pixels (default: 10)
//! - `MOSAIC_MAX_TASKS` - Tracked task limit (default: 1024)
//! - `MOSAIC_TASK_TTL` - Finished task retention in seconds (default: 3600)
//! - `MOSAIC_TILE_CACHE` - Tile raster cache size in bytes (default: 100MB)
//! - `MOSAIC_MAX_UPLOAD` - Upload limit in bytes (default: 32 MiB)
//! - `MOSAIC_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::mosaic::{
    MosaicParams, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, DEFAULT_TILE_CACHE_CAPACITY,
    DEFAULT_TILE_SIZE, MAX_TILE_SIZE,
};
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;
use crate::task::{DEFAULT_MAX_TASKS, DEFAULT_OUTPUT_DIR};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 10000;

/// Default tile image directory.
pub const DEFAULT_TILES_DIR: &str = "static/emojis";

/// Default task record file.
pub const DEFAULT_DB_PATH: &str = "static/mosaic_db.json";

/// Default finished task retention in seconds.
pub const DEFAULT_TASK_TTL_SECS: u64 = 3600;

/// Interval of the background task reaper in seconds.
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 60;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Emoji Mosaic - turns images into mosaics of emoji tiles.
///
/// Without a subcommand the HTTP server is started.
#[derive(Parser, Debug, Clone)]
#[command(name = "emoji-mosaic")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run, defaulting to `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeConfig),

    /// Build one mosaic from a file and exit
    Render(RenderConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Mosaic shape arguments shared by both commands.
#[derive(Args, Debug, Clone)]
pub struct MosaicArgs {
    /// Directory of tile images.
    #[arg(long, default_value = DEFAULT_TILES_DIR, env = "MOSAIC_TILES_DIR")]
    pub tiles_dir: PathBuf,

    /// Maximum mosaic grid width in cells.
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH, env = "MOSAIC_MAX_WIDTH")]
    pub max_width: u32,

    /// Maximum mosaic grid height in cells.
    #[arg(long, default_value_t = DEFAULT_MAX_HEIGHT, env = "MOSAIC_MAX_HEIGHT")]
    pub max_height: u32,

    /// Edge length of each tile in the output, in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "MOSAIC_TILE_SIZE")]
    pub tile_size: u32,

    /// Maximum bytes of resized tile rasters to cache (0 disables).
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "MOSAIC_TILE_CACHE")]
    pub tile_cache: usize,
}

impl MosaicArgs {
    pub fn params(&self) -> MosaicParams {
        MosaicParams::new(self.max_width, self.max_height, self.tile_size)
    }

    fn validate(&self) -> Result<(), String> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err("max_width and max_height must be greater than 0".to_string());
        }
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(format!("tile_size must be between 1 and {}", MAX_TILE_SIZE));
        }
        if self.tiles_dir.as_os_str().is_empty() {
            return Err("Tile directory is required. Set --tiles-dir or MOSAIC_TILES_DIR".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Serve Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MOSAIC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MOSAIC_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub mosaic: MosaicArgs,

    /// Directory where finished mosaics are written.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, env = "MOSAIC_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// JSON file holding task records.
    #[arg(long, default_value = DEFAULT_DB_PATH, env = "MOSAIC_DB_PATH")]
    pub db_path: PathBuf,

    /// Maximum number of tracked tasks.
    #[arg(long, default_value_t = DEFAULT_MAX_TASKS, env = "MOSAIC_MAX_TASKS")]
    pub max_tasks: usize,

    /// Seconds a finished task stays pollable in memory.
    #[arg(long, default_value_t = DEFAULT_TASK_TTL_SECS, env = "MOSAIC_TASK_TTL")]
    pub task_ttl: u64,

    /// Maximum upload size in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "MOSAIC_MAX_UPLOAD")]
    pub max_upload: usize,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "MOSAIC_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.mosaic.validate()?;

        if self.max_tasks == 0 {
            return Err("max_tasks must be greater than 0".to_string());
        }
        if self.max_upload == 0 {
            return Err("max_upload must be greater than 0".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err("Output directory is required. Set --output-dir or MOSAIC_OUTPUT_DIR".to_string());
        }
        if self.db_path.as_os_str().is_empty() {
            return Err("Database path is required. Set --db-path or MOSAIC_DB_PATH".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl)
    }

    /// Reaper interval, never longer than the retention itself.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.task_ttl.clamp(1, DEFAULT_REAP_INTERVAL_SECS))
    }
}

// =============================================================================
// Render Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Source image.
    pub input: PathBuf,

    /// Output PNG path.
    #[arg(short, long, default_value = "mosaic.png")]
    pub output: PathBuf,

    #[command(flatten)]
    pub mosaic: MosaicArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.mosaic.validate()?;

        if !self.input.is_file() {
            return Err(format!("Input image not found: {}", self.input.display()));
        }
        if self.output.as_os_str().is_empty() {
            return Err("Output path is required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
