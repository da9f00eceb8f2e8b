//! Authoritative DNS resolver
//!
//! * `protocol` - DNS wire format (packets, records, query types)
//! * `buffer` - low-level packet buffer operations
//! * `zone_index` - per-zone label matching (exact/wildcard/closest-encloser)
//! * `record_store` - cached view over a `ZoneStore` backend
//! * `filters` - health/geo/order record selection
//! * `health_store` / `health_checker` - health-check state and probing
//! * `geo` - country/ASN/coordinate lookups
//! * `rate_limit` - per-client and global query rate limiting
//! * `upstream_resolver` - CNAME flattening and ANAME resolution
//! * `dnssec` - zone signing
//! * `edns0` - EDNS0 client-subnet and UDP size handling
//! * `pipeline` - the query state machine tying the above together
//! * `context` - shared server state
//! * `server` - UDP/TCP listeners
//! * `client` - outbound DNS client used for flattening/ANAME lookups
//! * `cache` - TTL-aware answer cache backing `upstream_resolver`'s flatten loop
//! * `config` - on-disk configuration
//! * `errors` - crate-wide error type and RCODE mapping

pub mod buffer;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod dnssec;
pub mod edns0;
pub mod errors;
pub mod filters;
pub mod geo;
pub mod health_checker;
pub mod health_store;
pub mod pipeline;
pub mod protocol;
pub mod rate_limit;
pub mod record_store;
pub mod server;
pub mod upstream_resolver;
pub mod zone_index;

mod netutil;
