//! Daemon configuration
//!
//! Grounded in atlas's `bin/atlas.rs` CLI parsing (`getopts::Options`,
//! `opt_present`/`opt_str`) and `ServerContext`'s field set (context.rs),
//! generalized to a file-backed `Config` per spec §4.10. Loaded from TOML
//! with `serde`, the way the rest of the crate already uses `serde_derive`
//! for the zone/health JSON shapes.

use std::fs;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Display, From, Error)]
pub enum ConfigError {
    #[display(fmt = "failed to read config file {}: {}", path, source)]
    Read {
        path: String,
        #[error(not(source))]
        source: std::io::Error,
    },
    #[display(fmt = "failed to parse config: {}", _0)]
    Parse(#[error(not(source))] String),
    #[display(fmt = "failed to write config template: {}", _0)]
    Write(#[error(not(source))] std::io::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_dns_udp")]
    pub dns_udp: String,
    #[serde(default = "default_dns_tcp")]
    pub dns_tcp: String,
}

fn default_dns_udp() -> String {
    "0.0.0.0:53".to_string()
}
fn default_dns_tcp() -> String {
    "0.0.0.0:53".to_string()
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            dns_udp: default_dns_udp(),
            dns_tcp: default_dns_tcp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of zone JSON fixtures, for `FileZoneStore`. Empty means the
    /// deployment supplies its own `ZoneStore` (e.g. a redis-backed one) in
    /// code rather than through this file.
    #[serde(default)]
    pub zones_dir: Option<PathBuf>,
    #[serde(default = "default_zone_cache_ttl_secs")]
    pub zone_cache_ttl_secs: u64,
    #[serde(default = "default_record_cache_ttl_secs")]
    pub record_cache_ttl_secs: u64,
}

fn default_zone_cache_ttl_secs() -> u64 {
    60
}
fn default_record_cache_ttl_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            zones_dir: None,
            zone_cache_ttl_secs: default_zone_cache_ttl_secs(),
            record_cache_ttl_secs: default_record_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckerTuning {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_max_pending")]
    pub max_pending_requests: usize,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
}

fn default_max_requests() -> usize {
    16
}
fn default_max_pending() -> usize {
    1024
}
fn default_check_interval() -> u64 {
    10
}
fn default_update_interval() -> u64 {
    30
}

impl Default for HealthCheckerTuning {
    fn default() -> Self {
        HealthCheckerTuning {
            max_requests: default_max_requests(),
            max_pending_requests: default_max_pending(),
            check_interval_secs: default_check_interval(),
            update_interval_secs: default_update_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitTuning {
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_burst")]
    pub burst: f64,
    #[serde(default = "default_global_rate")]
    pub global_rate: f64,
}

fn default_rate() -> f64 {
    50.0
}
fn default_burst() -> f64 {
    100.0
}
fn default_global_rate() -> f64 {
    10_000.0
}

impl Default for RateLimitTuning {
    fn default() -> Self {
        RateLimitTuning {
            rate: default_rate(),
            burst: default_burst(),
            global_rate: default_global_rate(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoConfig {
    #[serde(default)]
    pub city_db_path: Option<PathBuf>,
    #[serde(default)]
    pub asn_db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnssecConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub key_dir: Option<PathBuf>,
}

impl Default for DnssecConfig {
    fn default() -> Self {
        DnssecConfig {
            enable: false,
            key_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub query_log_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            query_log_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub health_checker: HealthCheckerTuning,
    #[serde(default)]
    pub rate_limit: RateLimitTuning,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub dnssec: DnssecConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// CNAME/ANAME flattening hop cap (spec §9: 8, supersedes atlas's own
    /// default of 10).
    #[serde(default = "default_max_flatten_hops")]
    pub max_flatten_hops: u8,
}

fn default_max_flatten_hops() -> u8 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: ListenConfig::default(),
            store: StoreConfig::default(),
            health_checker: HealthCheckerTuning::default(),
            rate_limit: RateLimitTuning::default(),
            geo: GeoConfig::default(),
            dnssec: DnssecConfig::default(),
            log: LogConfig::default(),
            max_flatten_hops: default_max_flatten_hops(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Writes a fully-commented default config to `path`, for `-g`.
    pub fn write_template(path: &Path) -> Result<()> {
        let template = toml::to_string_pretty(&Config::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, template).map_err(ConfigError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.max_flatten_hops, 8);
        assert_eq!(cfg.health_checker.max_requests, 16);
        assert_eq!(cfg.health_checker.update_interval_secs, 30);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string(&cfg).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.listen.dns_udp, cfg.listen.dns_udp);
        assert_eq!(parsed.rate_limit.rate, cfg.rate_limit.rate);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/z42.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
