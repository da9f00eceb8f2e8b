//! z42 authoritative DNS resolver
//!
//! * Authoritative zone serving with wildcard/closest-encloser matching
//! * Health-checked, geo/weighted record selection
//! * CNAME flattening and ANAME resolution via an upstream client
//! * Optional DNSSEC zone signing
//! * Per-client and global rate limiting

/// DNS server implementation and protocol handling
pub mod dns;
