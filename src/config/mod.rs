//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeMap, net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    application::jobs::rebuild_schedule,
    domain::site::{SectionPlan, SiteContext, SiteProfile, SiteRegistry},
};

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, RebuildArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sitemapd";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STORAGE_DIR: &str = "artifacts";
const DEFAULT_POINTER_TTL_SECS: u64 = 259_200;
const DEFAULT_LEASE_TTL_SECS: u64 = 600;
const MAX_TTL_SECS: u64 = 31_536_000;
const DEFAULT_LOCALE: &str = "nl";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub sitemap: SitemapSettings,
    pub sites: SiteRegistry,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SitemapSettings {
    /// Lifetime of the current-artifact pointer.
    pub pointer_ttl: Duration,
    /// Upper bound on one rebuild; an abandoned lease is reclaimable after this.
    pub lease_ttl: Duration,
    /// Lease owner identity; generated per process when unset.
    pub instance_id: Option<String>,
    pub run_on_start: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SITEMAPD").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Rebuild(args)) => raw.apply_rebuild_overrides(args),
        Some(Command::Sites) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    storage: RawStorageSettings,
    sitemap: RawSitemapSettings,
    sites: BTreeMap<String, RawSiteSettings>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
        if let Some(enabled) = overrides.run_on_start {
            self.sitemap.run_on_start = Some(enabled);
        }
    }

    fn apply_rebuild_overrides(&mut self, args: &RebuildArgs) {
        self.apply_database_override(&args.database);
        if let Some(directory) = args.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            storage,
            sitemap,
            sites,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            storage: build_storage_settings(storage)?,
            sitemap: build_sitemap_settings(sitemap)?,
            sites: build_site_registry(sites)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = Duration::from_secs(positive(
        graceful_secs,
        "server.graceful_shutdown_seconds",
    )?);

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let acquire_timeout = Duration::from_secs(positive(
        database
            .acquire_timeout_seconds
            .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
        "database.acquire_timeout_seconds",
    )?);

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let directory = storage
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.directory",
            "path must not be empty",
        ));
    }

    Ok(StorageSettings { directory })
}

fn build_sitemap_settings(sitemap: RawSitemapSettings) -> Result<SitemapSettings, LoadError> {
    let pointer_ttl = ttl(
        sitemap
            .pointer_ttl_seconds
            .unwrap_or(DEFAULT_POINTER_TTL_SECS),
        "sitemap.pointer_ttl_seconds",
    )?;
    let lease_ttl = ttl(
        sitemap.lease_ttl_seconds.unwrap_or(DEFAULT_LEASE_TTL_SECS),
        "sitemap.lease_ttl_seconds",
    )?;

    let instance_id = sitemap.instance_id.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(SitemapSettings {
        pointer_ttl,
        lease_ttl,
        instance_id,
        run_on_start: sitemap.run_on_start.unwrap_or(true),
    })
}

fn build_site_registry(sites: BTreeMap<String, RawSiteSettings>) -> Result<SiteRegistry, LoadError> {
    if sites.is_empty() {
        return Err(LoadError::invalid(
            "sites",
            "at least one site must be configured",
        ));
    }

    let profiles = sites
        .into_iter()
        .map(|(key, raw)| build_site_profile(&key, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SiteRegistry::new(profiles))
}

fn build_site_profile(key: &str, raw: RawSiteSettings) -> Result<SiteProfile, LoadError> {
    let context = SiteContext::parse(key)
        .map_err(|err| LoadError::invalid(format!("sites.{key}"), err.to_string()))?;

    let base_url = raw
        .base_url
        .ok_or_else(|| LoadError::invalid(format!("sites.{key}.base_url"), "is required"))?;
    let base_url = parse_base_url(&base_url)
        .map_err(|reason| LoadError::invalid(format!("sites.{key}.base_url"), reason))?;

    let locales: Vec<String> = raw
        .locales
        .unwrap_or_else(|| vec![DEFAULT_LOCALE.to_string()])
        .into_iter()
        .map(|locale| locale.trim().to_string())
        .collect();
    if locales.is_empty() || locales.iter().any(String::is_empty) {
        return Err(LoadError::invalid(
            format!("sites.{key}.locales"),
            "must list at least one non-empty locale",
        ));
    }

    let schedule = raw
        .schedule
        .ok_or_else(|| LoadError::invalid(format!("sites.{key}.schedule"), "is required"))?;
    rebuild_schedule(&schedule)
        .map_err(|reason| LoadError::invalid(format!("sites.{key}.schedule"), reason))?;

    let membership = raw.membership.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(SiteProfile {
        context,
        base_url,
        locales,
        membership,
        schedule,
        sections: raw.sections.unwrap_or_default(),
    })
}

/// Validate an absolute http(s) URL and strip its trailing slash.
fn parse_base_url(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed).map_err(|err| format!("invalid URL `{trimmed}`: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("must not carry a query or fragment".to_string());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSitemapSettings {
    pointer_ttl_seconds: Option<u64>,
    lease_ttl_seconds: Option<u64>,
    instance_id: Option<String>,
    run_on_start: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
    locales: Option<Vec<String>>,
    schedule: Option<String>,
    membership: Option<String>,
    sections: Option<SectionPlan>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

/// Expiry window between one second and one year.
fn ttl(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    let seconds = positive(value, key)?;
    if seconds > MAX_TTL_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_TTL_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(seconds))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
