//! `ServerContext` holds the common state shared across the listener threads,
//! the health checker and the admin reload path.
//!
//! Replaces the old `Authority`/`ResolveStrategy` pair with the component set
//! the rest of this crate was generalized into: a `RecordStore` backed by
//! whatever `ZoneStore` the deployment configures, a `HealthStore`/
//! `HealthChecker` pair, a `GeoLookup`, a `RateLimiter`, a `DnssecSigner` and
//! an `UpstreamResolver` for flattening. The admin HTTP API and ACME/TLS
//! surface atlas carried are out of scope here, so `ssl_config`/`api_port`
//! are gone along with them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Display, Error, From};

use crate::dns::client::{DnsClient, DnsNetworkClient};
use crate::dns::config::Config;
use crate::dns::dnssec::{DnssecSigner, SigningConfig};
use crate::dns::geo::{GeoError, GeoLookup, MaxMindGeoLookup, StaticGeoLookup};
use crate::dns::health_checker::{HealthChecker, HealthCheckerConfig};
use crate::dns::health_store::HealthStore;
use crate::dns::rate_limit::{RateLimitConfig, RateLimiter};
use crate::dns::record_store::{RecordStore, ZoneStore};
use crate::dns::upstream_resolver::{UpstreamResolver, UpstreamServer};

#[derive(Debug, Display, From, Error)]
pub enum ContextError {
    Client(crate::dns::client::ClientError),
    Geo(GeoError),
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ContextError>;

pub struct ServerStatistics {
    pub tcp_query_count: AtomicUsize,
    pub udp_query_count: AtomicUsize,
}

impl ServerStatistics {
    pub fn get_tcp_query_count(&self) -> usize {
        self.tcp_query_count.load(Ordering::Acquire)
    }

    pub fn get_udp_query_count(&self) -> usize {
        self.udp_query_count.load(Ordering::Acquire)
    }
}

impl Default for ServerStatistics {
    fn default() -> Self {
        ServerStatistics {
            tcp_query_count: AtomicUsize::new(0),
            udp_query_count: AtomicUsize::new(0),
        }
    }
}

/// Common state shared by the UDP/TCP listeners, the health checker and the
/// reload path triggered on SIGHUP.
pub struct ServerContext {
    pub record_store: Arc<RecordStore>,
    pub health_store: Arc<HealthStore>,
    pub health_checker: Arc<HealthChecker>,
    pub geo_lookup: Arc<dyn GeoLookup>,
    pub rate_limiter: Arc<RateLimiter>,
    pub dnssec_signer: Arc<DnssecSigner>,
    pub upstream_resolver: Arc<UpstreamResolver>,
    pub client: Box<dyn DnsClient + Sync + Send>,
    pub dns_udp_addr: String,
    pub dns_tcp_addr: String,
    pub max_flatten_hops: u8,
    pub statistics: ServerStatistics,
}

impl ServerContext {
    pub fn new(config: &Config, store: Arc<dyn ZoneStore>) -> Result<ServerContext> {
        let record_store = Arc::new(RecordStore::new(
            store,
            Duration::from_secs(config.store.zone_cache_ttl_secs),
            Duration::from_secs(config.store.record_cache_ttl_secs),
        ));

        let health_store = Arc::new(HealthStore::new(Duration::from_secs(
            config.health_checker.update_interval_secs,
        )));

        let health_checker = Arc::new(HealthChecker::new(
            HealthCheckerConfig {
                max_requests: config.health_checker.max_requests,
                max_pending_requests: config.health_checker.max_pending_requests,
                check_interval: Duration::from_secs(config.health_checker.check_interval_secs),
                update_interval: Duration::from_secs(config.health_checker.update_interval_secs),
            },
            health_store.clone(),
            record_store.clone(),
        ));

        let geo_lookup: Arc<dyn GeoLookup> = match (&config.geo.city_db_path, &config.geo.asn_db_path) {
            (Some(city), Some(asn)) => Arc::new(MaxMindGeoLookup::open(city, asn)?),
            _ => Arc::new(StaticGeoLookup::new()),
        };

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            rate: config.rate_limit.rate,
            burst: config.rate_limit.burst,
            global_rate: config.rate_limit.global_rate,
            global_burst: config.rate_limit.global_rate * 2.0,
            cleanup_interval: Duration::from_secs(60),
        }));

        let dnssec_signer = Arc::new(DnssecSigner::new(SigningConfig {
            enabled: config.dnssec.enable,
            ..SigningConfig::default()
        }));

        // Port 0 lets the OS pick an available ephemeral port for the
        // outbound socket, same as atlas's own client setup.
        let client: Box<dyn DnsClient + Sync + Send> = Box::new(DnsNetworkClient::new(0)?);

        let upstream_resolver = Arc::new(UpstreamResolver::new(
            Arc::new(DnsNetworkClient::new(0)?),
            Vec::<UpstreamServer>::new(),
            config.max_flatten_hops,
        ));

        Ok(ServerContext {
            record_store,
            health_store,
            health_checker,
            geo_lookup,
            rate_limiter,
            dnssec_signer,
            upstream_resolver,
            client,
            dns_udp_addr: config.listen.dns_udp.clone(),
            dns_tcp_addr: config.listen.dns_tcp.clone(),
            max_flatten_hops: config.max_flatten_hops,
            statistics: ServerStatistics::default(),
        })
    }

    /// Starts the transport client and the health-checker worker pool.
    /// Called once after construction, before the listener threads bind.
    pub fn initialize(&self) -> Result<()> {
        self.client.run()?;
        self.health_checker.run();
        Ok(())
    }

    /// SIGHUP handler: drops cached zone/record data so the next lookup
    /// re-reads from the `ZoneStore`, without rebinding sockets or losing
    /// in-flight health status.
    pub fn reload(&self) {
        self.record_store.invalidate_all();
        self.dnssec_signer.clear();
    }
}
