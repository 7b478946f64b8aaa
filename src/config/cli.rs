use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the sitemapd binary.
#[derive(Debug, Parser)]
#[command(name = "sitemapd", version, about = "Per-site XML sitemap builder and server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SITEMAPD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server and the scheduled rebuild workers.
    Serve(Box<ServeArgs>),
    /// Rebuild one site's sitemap now and exit.
    Rebuild(RebuildArgs),
    /// Print the configured site contexts.
    Sites,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RebuildArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the artifact storage directory.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,

    /// Site context to rebuild.
    #[arg(value_name = "SITE")]
    pub site: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the artifact storage directory.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,

    /// Rebuild every site once at startup.
    #[arg(
        long = "run-on-start",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub run_on_start: Option<bool>,
}
