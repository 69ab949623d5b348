use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Stratum binary.
#[derive(Debug, Parser)]
#[command(name = "stratum", version, about = "Stratum content cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "STRATUM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the caching HTTP service.
    Serve(Box<ServeArgs>),
    /// Ask a running server to warm its cache for the given pages.
    Prefetch(PrefetchArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,

    /// Pages to prefetch before accepting requests.
    #[arg(long = "warm", value_name = "SLUG")]
    pub warm: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PrefetchArgs {
    /// Base URL of the running server; defaults to the configured listener.
    #[arg(long = "server-url", env = "STRATUM_SERVER_URL", value_name = "URL")]
    pub server_url: Option<String>,

    /// Page slugs to prefetch.
    #[arg(value_name = "SLUG", required = true)]
    pub slugs: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct OriginOverrides {
    /// Override the origin base URL.
    #[arg(long = "origin-base-url", value_name = "URL")]
    pub origin_base_url: Option<String>,

    /// Override the origin request timeout.
    #[arg(long = "origin-timeout-seconds", value_name = "SECONDS")]
    pub origin_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub origin: OriginOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the HTTP response cache.
    #[arg(
        long = "response-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub response_cache: Option<bool>,

    /// Override the per-store entry limit (0 = unbounded).
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the expired-entry sweep period (0 disables it).
    #[arg(long = "cache-sweep-interval-seconds", value_name = "SECONDS")]
    pub cache_sweep_interval_seconds: Option<u64>,
}
