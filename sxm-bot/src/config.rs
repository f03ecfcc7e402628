//! sxm-bot configuration
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`SXM_BOT_*`)
//! 3. TOML configuration file
//! 4. Built-in defaults
//!
//! The config file itself is located via `--config`, then `SXM_BOT_CONFIG`,
//! then the platform config directories (see [`sxm_common::config`]).

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sxm_common::config::{load_toml, resolve_config_path};
use tracing::info;

use crate::error::{Error, Result};

/// Application name used for config file discovery
pub const APP_NAME: &str = "sxm-bot";

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SXM_BOT_CONFIG";

/// Command-line arguments for sxm-bot
#[derive(Parser, Debug, Default)]
#[command(name = "sxm-bot")]
#[command(about = "SXM radio playback bot")]
#[command(version)]
pub struct CliArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "SXM_BOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root command name the bot answers to
    #[arg(long, env = "SXM_BOT_ROOT_COMMAND")]
    pub root_command: Option<String>,

    /// Bot description
    #[arg(long)]
    pub description: Option<String>,

    /// Channel that receives status announcements
    #[arg(long, env = "SXM_BOT_OUTPUT_CHANNEL")]
    pub output_channel_id: Option<String>,

    /// Folder of processed (archived) recordings; enables archive commands
    #[arg(long, env = "SXM_BOT_PROCESSED_FOLDER")]
    pub processed_folder: Option<PathBuf>,

    /// SQLite archive database
    #[arg(long, env = "SXM_BOT_DATABASE")]
    pub database_path: Option<PathBuf>,

    /// HTTP control surface bind address
    #[arg(long, env = "SXM_BOT_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// ffmpeg executable
    #[arg(long, env = "SXM_BOT_FFMPEG")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Directory the PCM output sink writes into
    #[arg(long, env = "SXM_BOT_OUTPUT_ROOT")]
    pub output_root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "SXM_BOT_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Audio player timings and capacities
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerTimings {
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub cleanup_timeout_ms: u64,
    pub queue_poll_ms: u64,
    pub error_backoff_ms: u64,
    pub recent_capacity: usize,
    pub upcoming_capacity: usize,
    pub playlist_prefill: usize,
    pub refill_threshold: usize,
}

impl Default for PlayerTimings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            enqueue_timeout_ms: 5_000,
            connect_timeout_ms: 30_000,
            cleanup_timeout_ms: 10_000,
            queue_poll_ms: 1_000,
            error_backoff_ms: 1_000,
            recent_capacity: 10,
            upcoming_capacity: 50,
            playlist_prefill: 5,
            refill_threshold: 5,
        }
    }
}

impl PlayerTimings {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_millis(self.cleanup_timeout_ms)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Status reconciler periods and delays
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilerTimings {
    pub tick_ms: u64,
    pub presence_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub idle_check_ms: u64,
    pub idle_timeout_ms: u64,
    /// Pause between stopping one playback kind and starting another
    pub switch_delay_ms: u64,
}

impl Default for ReconcilerTimings {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            presence_interval_ms: 60_000,
            settle_delay_ms: 5_000,
            idle_check_ms: 60_000,
            idle_timeout_ms: 300_000,
            switch_delay_ms: 500,
        }
    }
}

impl ReconcilerTimings {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_millis(self.presence_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn idle_check(&self) -> Duration {
        Duration::from_millis(self.idle_check_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn switch_delay(&self) -> Duration {
        Duration::from_millis(self.switch_delay_ms)
    }
}

/// Carousel registry bounds
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CarouselSettings {
    pub ttl_secs: u64,
    pub sweep_secs: u64,
    pub max_sessions: usize,
}

impl Default for CarouselSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sweep_secs: 60,
            max_sessions: 256,
        }
    }
}

impl CarouselSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_secs)
    }
}

/// Config file contents; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub root_command: Option<String>,
    pub description: Option<String>,
    pub output_channel_id: Option<String>,
    pub processed_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub log_level: Option<String>,

    #[serde(default)]
    pub player: PlayerTimings,

    #[serde(default)]
    pub reconciler: ReconcilerTimings,

    #[serde(default)]
    pub carousel: CarouselSettings,
}

/// Fully resolved bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Root command name, threaded into every command group
    pub root_command: String,
    pub description: String,
    pub output_channel_id: Option<String>,
    pub processed_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub bind_addr: String,
    pub ffmpeg_path: PathBuf,
    pub output_root: PathBuf,
    pub log_level: String,
    pub player: PlayerTimings,
    pub reconciler: ReconcilerTimings,
    pub carousel: CarouselSettings,
}

fn default_root_command() -> String {
    "music".to_string()
}

fn default_description() -> String {
    "SXM radio bot".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:5750".to_string()
}

fn default_log_level() -> String {
    "sxm_bot=info,sxm_common=info,tower_http=info".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl BotConfig {
    /// Resolve configuration from CLI/env arguments and the discovered config file
    pub fn load(args: CliArgs) -> Result<Self> {
        let path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, APP_NAME);
        if let Some(path) = &path {
            info!("Using config file: {}", path.display());
        }

        let file: TomlConfig = load_toml(path.as_deref())?;
        let config = Self::merge(args, file);
        config.validate()?;
        Ok(config)
    }

    /// Apply the argument > file > default priority per field
    pub fn merge(args: CliArgs, file: TomlConfig) -> Self {
        Self {
            root_command: args
                .root_command
                .or(file.root_command)
                .unwrap_or_else(default_root_command),
            description: args
                .description
                .or(file.description)
                .unwrap_or_else(default_description),
            output_channel_id: args.output_channel_id.or(file.output_channel_id),
            processed_folder: args.processed_folder.or(file.processed_folder),
            database_path: args.database_path.or(file.database_path),
            bind_addr: args
                .bind_addr
                .or(file.bind_addr)
                .unwrap_or_else(default_bind_addr),
            ffmpeg_path: args
                .ffmpeg_path
                .or(file.ffmpeg_path)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            output_root: args
                .output_root
                .or(file.output_root)
                .unwrap_or_else(|| PathBuf::from("sxm-output")),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(default_log_level),
            player: file.player,
            reconciler: file.reconciler,
            carousel: file.carousel,
        }
    }

    /// Reject values the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.root_command.trim().is_empty() {
            return Err(Error::Config("root_command must not be empty".to_string()));
        }
        if self.player.queue_capacity == 0 {
            return Err(Error::Config("player.queue_capacity must be at least 1".to_string()));
        }
        if self.reconciler.tick_ms == 0 {
            return Err(Error::Config("reconciler.tick_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Archive commands are only offered when processed recordings exist
    pub fn archive_enabled(&self) -> bool {
        self.processed_folder.is_some()
    }
}
