//! Forwarding resolver used for ANAME expansion and CNAME flattening
//!
//! Grounded in resolve.rs's `ForwardingDnsResolver` (consult a configured
//! server via the synchronous `DnsClient`, cap iteration) and
//! cname_flattening.rs's depth-capped CNAME-chain walk, collapsed into one
//! small module per spec §4.6 since flattening/ANAME share the same upstream
//! lookup + local-CNAME-first behavior.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use derive_more::{Display, Error, From};

use crate::dns::cache::SynchronizedCache;
use crate::dns::client::DnsClient;
use crate::dns::protocol::{DnsRecord, QueryType, TransientTtl};

#[derive(Debug, Display, From, Error)]
pub enum UpstreamError {
    #[display(fmt = "upstream query failed: {}", _0)]
    Client(crate::dns::client::ClientError),
    #[display(fmt = "no upstream server configured")]
    NoServerConfigured,
    #[display(fmt = "CNAME/ANAME chain exceeded the hop cap")]
    HopCapExceeded,
}

type Result<T> = std::result::Result<T, UpstreamError>;

#[derive(Debug, Clone)]
pub struct UpstreamServer {
    pub host: String,
    pub port: u16,
}

/// A/AAAA result collapsed from one or more upstream/local hops, with the TTL
/// already reduced to the minimum observed along the chain (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct FlattenedAddresses {
    pub a: Vec<(Ipv4Addr, u32)>,
    pub aaaa: Vec<(Ipv6Addr, u32)>,
}

impl FlattenedAddresses {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.aaaa.is_empty()
    }

    pub fn into_records(self, owner: &str, max_ttl: u32) -> Vec<DnsRecord> {
        let mut records = Vec::with_capacity(self.a.len() + self.aaaa.len());
        for (addr, ttl) in self.a {
            records.push(DnsRecord::A {
                domain: owner.to_string(),
                addr,
                ttl: TransientTtl(ttl.min(max_ttl)),
            });
        }
        for (addr, ttl) in self.aaaa {
            records.push(DnsRecord::Aaaa {
                domain: owner.to_string(),
                addr,
                ttl: TransientTtl(ttl.min(max_ttl)),
            });
        }
        records
    }
}

/// Callback the resolver uses to try resolving a name from in-zone data
/// before falling back to the network, so CNAME flattening prefers a local
/// answer over an upstream round trip (spec §4.6, §4.8 CNAME dispatch).
pub trait LocalLookup: Send + Sync {
    fn lookup_local(&self, qname: &str, qtype: QueryType) -> Option<Vec<DnsRecord>>;
}

pub struct UpstreamResolver {
    client: Arc<dyn DnsClient + Send + Sync>,
    servers: Vec<UpstreamServer>,
    max_hops: u8,
    cache: SynchronizedCache,
}

impl UpstreamResolver {
    pub fn new(
        client: Arc<dyn DnsClient + Send + Sync>,
        servers: Vec<UpstreamServer>,
        max_hops: u8,
    ) -> UpstreamResolver {
        UpstreamResolver {
            client,
            servers,
            max_hops,
            cache: SynchronizedCache::new(),
        }
    }

    /// Resolves `qname` to A/AAAA by asking configured upstreams in order,
    /// stopping at the first that answers (spec §4.6), serving from the
    /// answer cache first so a hot CNAME/ANAME target doesn't round-trip
    /// upstream on every flatten.
    fn query_upstream(&self, qname: &str, qtype: QueryType) -> Result<Vec<DnsRecord>> {
        if let Some(packet) = self.cache.lookup(qname, qtype) {
            return Ok(packet.answers);
        }

        if self.servers.is_empty() {
            return Err(UpstreamError::NoServerConfigured);
        }

        let mut last_err = None;
        for server in &self.servers {
            match self
                .client
                .send_query(qname, qtype, (server.host.as_str(), server.port), true)
            {
                Ok(packet) => {
                    if packet.answers.is_empty() {
                        let _ = self.cache.store_nxdomain(qname, qtype, 60);
                    } else {
                        let _ = self.cache.store(&packet.answers);
                    }
                    return Ok(packet.answers);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.map(UpstreamError::Client).unwrap_or(UpstreamError::NoServerConfigured))
    }

    /// Follows a CNAME/ANAME chain up to `max_hops`, preferring `local` at
    /// every step and only going to the network when the target isn't served
    /// by this instance. Returns `HopCapExceeded` rather than looping.
    pub fn flatten(
        &self,
        target: &str,
        local: &dyn LocalLookup,
    ) -> Result<FlattenedAddresses> {
        let mut current = target.to_string();
        let mut result = FlattenedAddresses::default();
        let mut min_ttl_a = u32::MAX;
        let mut min_ttl_aaaa = u32::MAX;

        for _ in 0..self.max_hops {
            let mut followed_cname = false;

            for (qtype, is_v6) in [(QueryType::A, false), (QueryType::Aaaa, true)] {
                let records = match local.lookup_local(&current, qtype) {
                    Some(records) => records,
                    None => self.query_upstream(&current, qtype)?,
                };

                for record in records {
                    match record {
                        DnsRecord::A { addr, ttl, .. } if !is_v6 => {
                            result.a.push((addr, ttl.0));
                            min_ttl_a = min_ttl_a.min(ttl.0);
                        }
                        DnsRecord::Aaaa { addr, ttl, .. } if is_v6 => {
                            result.aaaa.push((addr, ttl.0));
                            min_ttl_aaaa = min_ttl_aaaa.min(ttl.0);
                        }
                        DnsRecord::Cname { host, .. } => {
                            current = host;
                            followed_cname = true;
                        }
                        _ => {}
                    }
                }

                if followed_cname {
                    break;
                }
            }

            if !followed_cname {
                return Ok(result);
            }
            result = FlattenedAddresses::default();
        }

        Err(UpstreamError::HopCapExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::client::ClientError;
    use crate::dns::protocol::DnsPacket;
    use std::sync::Mutex;

    struct StubClient {
        responses: Mutex<std::collections::VecDeque<Result<DnsPacket>>>,
    }

    impl DnsClient for StubClient {
        fn get_sent_count(&self) -> usize {
            0
        }
        fn get_failed_count(&self) -> usize {
            0
        }
        fn run(&self) -> std::result::Result<(), ClientError> {
            Ok(())
        }
        fn send_query(
            &self,
            _qname: &str,
            _qtype: QueryType,
            _server: (&str, u16),
            _recursive: bool,
        ) -> std::result::Result<DnsPacket, ClientError> {
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(packet)) => Ok(packet),
                Some(Err(e)) => Err(e),
                None => Err(ClientError::LookupFailed),
            }
        }
    }

    struct NoLocal;
    impl LocalLookup for NoLocal {
        fn lookup_local(&self, _qname: &str, _qtype: QueryType) -> Option<Vec<DnsRecord>> {
            None
        }
    }

    fn packet_with(records: Vec<DnsRecord>) -> DnsPacket {
        let mut packet = DnsPacket::new();
        packet.answers = records;
        packet
    }

    #[test]
    fn no_servers_configured_fails_fast() {
        let client = Arc::new(StubClient {
            responses: Mutex::new(Default::default()),
        });
        let resolver = UpstreamResolver::new(client, vec![], 8);
        let err = resolver.flatten("example.com.", &NoLocal).unwrap_err();
        assert!(matches!(err, UpstreamError::NoServerConfigured));
    }

    #[test]
    fn flattens_a_and_aaaa_from_upstream() {
        let client = Arc::new(StubClient {
            responses: Mutex::new(
                vec![
                    Ok(packet_with(vec![DnsRecord::A {
                        domain: "target.com.".to_string(),
                        addr: "1.2.3.4".parse().unwrap(),
                        ttl: TransientTtl(300),
                    }])),
                    Ok(packet_with(vec![DnsRecord::Aaaa {
                        domain: "target.com.".to_string(),
                        addr: "::1".parse().unwrap(),
                        ttl: TransientTtl(300),
                    }])),
                ]
                .into(),
            ),
        });
        let resolver = UpstreamResolver::new(
            client,
            vec![UpstreamServer { host: "8.8.8.8".to_string(), port: 53 }],
            8,
        );
        let flattened = resolver.flatten("target.com.", &NoLocal).unwrap();
        assert_eq!(flattened.a.len(), 1);
        assert_eq!(flattened.aaaa.len(), 1);
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let client = Arc::new(StubClient {
            responses: Mutex::new(
                vec![Ok(packet_with(vec![DnsRecord::A {
                    domain: "target.com.".to_string(),
                    addr: "1.2.3.4".parse().unwrap(),
                    ttl: TransientTtl(300),
                }]))]
                .into(),
            ),
        });
        let resolver = UpstreamResolver::new(
            client,
            vec![UpstreamServer { host: "8.8.8.8".to_string(), port: 53 }],
            8,
        );
        assert_eq!(resolver.query_upstream("target.com.", QueryType::A).unwrap().len(), 1);
        // The stub has no more queued responses; a second lookup must come from cache.
        assert_eq!(resolver.query_upstream("target.com.", QueryType::A).unwrap().len(), 1);
    }

    #[test]
    fn cname_chain_beyond_cap_errors() {
        struct LoopingLocal;
        impl LocalLookup for LoopingLocal {
            fn lookup_local(&self, qname: &str, _qtype: QueryType) -> Option<Vec<DnsRecord>> {
                Some(vec![DnsRecord::Cname {
                    domain: qname.to_string(),
                    host: format!("next-{qname}"),
                    ttl: TransientTtl(60),
                }])
            }
        }

        let client = Arc::new(StubClient {
            responses: Mutex::new(Default::default()),
        });
        let resolver = UpstreamResolver::new(client, vec![], 3);
        let err = resolver.flatten("a.com.", &LoopingLocal).unwrap_err();
        assert!(matches!(err, UpstreamError::HopCapExceeded));
    }
}
