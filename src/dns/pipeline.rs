//! The query state machine: Received → RateCheck → ZoneLookup → LabelMatch →
//! TypeDispatch → FilterChain → Flatten? → Sign? → Respond.
//!
//! Grounded in server.rs's `execute_query`/`process_valid_query`/
//! `resolve_question` shape (build a response skeleton, validate, dispatch,
//! populate), replacing `Authority`/`DnsResolver` lookups with
//! `RecordStore`/`ZoneIndex`/`filters`/`HealthStore`/`GeoLookup`/
//! `UpstreamResolver`/`DnssecSigner` per spec §4.8.

use std::net::IpAddr;
use std::sync::Arc;

use crate::dns::context::ServerContext;
use crate::dns::dnssec::LabelRecords;
use crate::dns::edns0;
use crate::dns::errors::Z42Error;
use crate::dns::filters::{self, ClientContext};
use crate::dns::protocol::{DnsPacket, DnsQuestion, DnsRecord, QueryType, ResultCode, TransientTtl};
use crate::dns::record_store::{IpRRSet, Location, RecordStoreError, Zone};
use crate::dns::upstream_resolver::LocalLookup;
use crate::dns::zone_index::{locate_zone, MatchKind};

/// Owns the per-query logic; stateless beyond the shared `ServerContext`.
pub struct QueryPipeline {
    context: Arc<ServerContext>,
}

/// Per-query result handed back from `dispatch` to `execute`'s request log
/// (spec.md's `source_ip, client_subnet, record, type, response_code,
/// domain_uuid` fields) — `domain_id` is `None` whenever no zone was matched
/// or reached.
struct DispatchOutcome {
    rescode: ResultCode,
    domain_id: Option<String>,
    client_subnet: Option<IpAddr>,
}

impl DispatchOutcome {
    fn failed(rescode: ResultCode, client_subnet: Option<IpAddr>) -> DispatchOutcome {
        DispatchOutcome { rescode, domain_id: None, client_subnet }
    }
}

fn fqdn(apex: &str, label: &str) -> String {
    if label == "@" {
        apex.to_string()
    } else {
        format!("{}.{}", label, apex)
    }
}

/// Translates the simple value-object RRsets into wire records owned by
/// `owner`, for every type that needs no filter chain (spec §4.8 "return
/// as-is" branches and the `ANY` synthesis).
fn simple_records(owner: &str, location: &Location) -> Vec<DnsRecord> {
    let mut out = Vec::new();

    if let Some(ns) = &location.ns {
        for r in &ns.records {
            out.push(DnsRecord::Ns {
                domain: owner.to_string(),
                host: r.host.clone(),
                ttl: TransientTtl(ns.ttl),
            });
        }
    }
    if let Some(mx) = &location.mx {
        for r in &mx.records {
            out.push(DnsRecord::Mx {
                domain: owner.to_string(),
                priority: r.preference,
                host: r.host.clone(),
                ttl: TransientTtl(mx.ttl),
            });
        }
    }
    if let Some(srv) = &location.srv {
        for r in &srv.records {
            out.push(DnsRecord::Srv {
                domain: owner.to_string(),
                priority: r.priority,
                weight: r.weight,
                port: r.port,
                host: r.target.clone(),
                ttl: TransientTtl(srv.ttl),
            });
        }
    }
    if let Some(txt) = &location.txt {
        for r in &txt.records {
            out.push(DnsRecord::Txt {
                domain: owner.to_string(),
                data: r.text.clone(),
                ttl: TransientTtl(txt.ttl),
            });
        }
    }
    if let Some(caa) = &location.caa {
        for r in &caa.records {
            out.push(DnsRecord::Caa {
                domain: owner.to_string(),
                flag: r.flag,
                tag: r.tag.clone(),
                value: r.value.clone(),
                ttl: TransientTtl(caa.ttl),
            });
        }
    }
    if let Some(ptr) = &location.ptr {
        for r in &ptr.records {
            out.push(DnsRecord::Ptr {
                domain: owner.to_string(),
                host: r.domain.clone(),
                ttl: TransientTtl(ptr.ttl),
            });
        }
    }
    if let Some(tlsa) = &location.tlsa {
        for r in &tlsa.records {
            out.push(DnsRecord::Tlsa {
                domain: owner.to_string(),
                cert_usage: r.usage,
                selector: r.selector,
                matching_type: r.matching_type,
                cert_data: hex_decode(&r.certificate),
                ttl: TransientTtl(tlsa.ttl),
            });
        }
    }
    if let Some(ds) = &location.ds {
        for r in &ds.records {
            out.push(DnsRecord::Ds {
                domain: owner.to_string(),
                key_tag: r.key_tag,
                algorithm: r.algorithm,
                digest_type: r.digest_type,
                digest: hex_decode(&r.digest),
                ttl: TransientTtl(ds.ttl),
            });
        }
    }
    if let Some(cname) = &location.cname {
        for r in &cname.records {
            out.push(DnsRecord::Cname {
                domain: owner.to_string(),
                host: r.host.clone(),
                ttl: TransientTtl(cname.ttl),
            });
        }
    }

    out
}

fn hex_decode(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap_or_default()
}

/// Runs the health → geo → order/count filter chain over an `IpRRSet` and
/// materializes the survivors as A or AAAA records owned by `owner` (spec
/// §4.5, §4.8 TypeDispatch's A/AAAA branch).
fn filtered_ip_records(
    context: &ServerContext,
    host: &str,
    owner: &str,
    rrset: &IpRRSet,
    client: &ClientContext,
    is_v6: bool,
    seed: u64,
) -> Vec<DnsRecord> {
    let mask = filters::health_mask(
        host,
        &rrset.records,
        rrset.health_check.as_ref(),
        &context.health_store,
    );
    let mask = filters::geo_mask(
        &rrset.records,
        &mask,
        rrset.filter.geo_filter,
        client,
        context.geo_lookup.as_ref(),
    );
    let single = rrset.filter.count == crate::dns::record_store::Count::Single;
    let selected = filters::select(&rrset.records, &mask, rrset.filter.order, single, seed);

    selected
        .into_iter()
        .filter_map(|r| r.ip.parse().ok().map(|ip| (r, ip)))
        .filter_map(|(r, ip): (_, IpAddr)| match (ip, is_v6) {
            (IpAddr::V4(addr), false) => Some(DnsRecord::A {
                domain: owner.to_string(),
                addr,
                ttl: TransientTtl(rrset.ttl),
            }),
            (IpAddr::V6(addr), true) => Some(DnsRecord::Aaaa {
                domain: owner.to_string(),
                addr,
                ttl: TransientTtl(rrset.ttl),
            }),
            _ => None,
        })
        .collect()
}

/// Lets `UpstreamResolver::flatten` consult in-zone data before going
/// upstream, per spec §4.6.
struct ZoneLocalLookup<'a> {
    context: &'a ServerContext,
    zone: &'a Zone,
}

impl<'a> LocalLookup for ZoneLocalLookup<'a> {
    fn lookup_local(&self, qname: &str, qtype: QueryType) -> Option<Vec<DnsRecord>> {
        let (label, kind) = self.zone.index.find_label(qname);
        if !matches!(kind, MatchKind::Exact | MatchKind::Wildcard) {
            return None;
        }
        let location = self.context.record_store.get_records(&self.zone.apex, &label).ok()?;

        if let Some(cname) = &location.cname {
            return Some(
                cname
                    .records
                    .iter()
                    .map(|r| DnsRecord::Cname {
                        domain: qname.to_string(),
                        host: r.host.clone(),
                        ttl: TransientTtl(cname.ttl),
                    })
                    .collect(),
            );
        }

        let rrset = match qtype {
            QueryType::A => &location.a,
            QueryType::Aaaa => &location.aaaa,
            _ => return None,
        };
        let rrset = rrset.as_ref()?;
        let records: Vec<DnsRecord> = rrset
            .records
            .iter()
            .filter_map(|r| r.ip.parse::<IpAddr>().ok())
            .filter_map(|ip| match (ip, qtype) {
                (IpAddr::V4(addr), QueryType::A) => Some(DnsRecord::A {
                    domain: qname.to_string(),
                    addr,
                    ttl: TransientTtl(rrset.ttl),
                }),
                (IpAddr::V6(addr), QueryType::Aaaa) => Some(DnsRecord::Aaaa {
                    domain: qname.to_string(),
                    addr,
                    ttl: TransientTtl(rrset.ttl),
                }),
                _ => None,
            })
            .collect();
        Some(records)
    }
}

impl QueryPipeline {
    pub fn new(context: Arc<ServerContext>) -> QueryPipeline {
        QueryPipeline { context }
    }

    /// Always returns a well-formed packet, even on internal failure, since
    /// the caller must send something back to the client.
    pub fn execute(&self, request: &DnsPacket, client_addr: IpAddr) -> DnsPacket {
        let mut response = DnsPacket::new();
        response.header.id = request.header.id;
        response.header.response = true;
        response.header.recursion_available = false;

        if request.questions.is_empty() {
            response.header.rescode = ResultCode::FORMERR;
            return response;
        }

        let question = request.questions[0].clone();
        response.questions.push(question.clone());

        let outcome = self.dispatch(&question, request, client_addr, &mut response);
        response.header.rescode = outcome.rescode;

        let opt = edns0::response_opt(
            edns0::requested_udp_size(&request.resources).min(u16::MAX as usize) as u16,
            None,
        );
        response.resources.push(opt);

        log::info!(
            "query source_ip={} client_subnet={} record={} type={:?} response_code={:?} domain_uuid={}",
            client_addr,
            outcome
                .client_subnet
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            question.name,
            question.qtype,
            response.header.rescode,
            outcome.domain_id.unwrap_or_else(|| "-".to_string())
        );

        response
    }

    fn dispatch(
        &self,
        question: &DnsQuestion,
        request: &DnsPacket,
        client_addr: IpAddr,
        response: &mut DnsPacket,
    ) -> DispatchOutcome {
        let client_subnet = edns0::client_subnet(&request.resources);

        if !self.context.rate_limiter.allow(client_addr) {
            return DispatchOutcome::failed(Z42Error::RateLimited.to_rcode(), client_subnet);
        }

        let effective_client = client_subnet.unwrap_or(client_addr);
        let client = ClientContext { addr: effective_client };

        let zone_names = self.context.record_store.zone_names();
        let zone_name = match locate_zone(&question.name, zone_names.iter().map(|s| s.as_str())) {
            Some(z) => z,
            None => return DispatchOutcome::failed(Z42Error::NotAuthoritative.to_rcode(), client_subnet),
        };

        let zone = match self.context.record_store.get_zone(&zone_name) {
            Ok(z) => z,
            Err(RecordStoreError::ZoneDisabled(_)) | Err(RecordStoreError::NotAuthoritative(_)) => {
                return DispatchOutcome::failed(Z42Error::NotAuthoritative.to_rcode(), client_subnet);
            }
            Err(_) => return DispatchOutcome::failed(Z42Error::StoreUnavailable.to_rcode(), client_subnet),
        };

        let domain_id = zone.config.domain_id.clone();

        let (label, kind) = zone.index.find_label(&question.name);

        match kind {
            MatchKind::EmptyNonterminal => {
                response.authorities.push(self.soa_record(&zone));
                return DispatchOutcome { rescode: ResultCode::NOERROR, domain_id, client_subnet };
            }
            MatchKind::ClosestEncloser | MatchKind::None => {
                response.authorities.push(self.soa_record(&zone));
                if zone.config.dnssec {
                    self.attach_negative_proof(&zone, &question.name, response);
                }
                return DispatchOutcome { rescode: ResultCode::NXDOMAIN, domain_id, client_subnet };
            }
            MatchKind::Exact | MatchKind::Wildcard => {}
        }

        let location = match self.context.record_store.get_records(&zone.apex, &label) {
            Ok(l) => l,
            Err(_) => {
                return DispatchOutcome { rescode: Z42Error::StoreUnavailable.to_rcode(), domain_id, client_subnet }
            }
        };

        let owner = question.name.clone();
        let seed = rand::random::<u64>();

        self.type_dispatch(&zone, &owner, &location, question.qtype, &client, seed, response);

        if response.answers.is_empty() {
            response.authorities.push(self.soa_record(&zone));
        }

        if zone.config.dnssec {
            self.sign_response(&zone, response);
        }

        DispatchOutcome { rescode: ResultCode::NOERROR, domain_id, client_subnet }
    }

    fn soa_record(&self, zone: &Zone) -> DnsRecord {
        let soa = &zone.config.soa;
        DnsRecord::Soa {
            domain: zone.apex.clone(),
            m_name: soa.m_name.clone(),
            r_name: soa.r_name.clone(),
            serial: soa.serial,
            refresh: soa.refresh,
            retry: soa.retry,
            expire: soa.expire,
            minimum: soa.minimum,
            ttl: TransientTtl(soa.minimum),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn type_dispatch(
        &self,
        zone: &Zone,
        owner: &str,
        location: &Location,
        qtype: QueryType,
        client: &ClientContext,
        seed: u64,
        response: &mut DnsPacket,
    ) {
        match qtype {
            QueryType::Soa => response.answers.push(self.soa_record(zone)),
            QueryType::Dnskey => {
                if let Some(signed) = self.context.dnssec_signer.signed_zone(&zone.apex) {
                    response.answers.extend(signed.dnskeys);
                }
            }
            QueryType::A | QueryType::Aaaa => {
                self.dispatch_address(zone, owner, location, qtype, client, seed, response);
            }
            QueryType::Cname => {
                response.answers.extend(location_cname(owner, location));
            }
            QueryType::Any => {
                response.answers.extend(simple_records(owner, location));
                if let Some(rrset) = &location.a {
                    response.answers.extend(filtered_ip_records(
                        &self.context,
                        owner,
                        owner,
                        rrset,
                        client,
                        false,
                        seed,
                    ));
                }
                if let Some(rrset) = &location.aaaa {
                    response.answers.extend(filtered_ip_records(
                        &self.context,
                        owner,
                        owner,
                        rrset,
                        client,
                        true,
                        seed,
                    ));
                }
            }
            _ => {
                response.answers.extend(simple_records(owner, location));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_address(
        &self,
        zone: &Zone,
        owner: &str,
        location: &Location,
        qtype: QueryType,
        client: &ClientContext,
        seed: u64,
        response: &mut DnsPacket,
    ) {
        if location.cname.is_some() {
            if zone.config.cname_flattening {
                if let Some(records) = self.flatten(zone, owner, location, qtype) {
                    response.answers.extend(records);
                    return;
                }
            }
            response.answers.extend(location_cname(owner, location));
            return;
        }

        let is_v6 = qtype == QueryType::Aaaa;
        let rrset = if is_v6 { &location.aaaa } else { &location.a };

        if let Some(rrset) = rrset {
            let answers = filtered_ip_records(&self.context, owner, owner, rrset, client, is_v6, seed);
            if !answers.is_empty() {
                response.answers.extend(answers);
                return;
            }
        }

        if let Some(aname) = &location.aname {
            if let Some(target) = aname.records.first() {
                if let Ok(flattened) = self.context.upstream_resolver.flatten(
                    &target.target,
                    &ZoneLocalLookup { context: &self.context, zone },
                ) {
                    response
                        .answers
                        .extend(flattened.into_records(owner, u32::MAX));
                }
            }
        }
    }

    fn flatten(
        &self,
        zone: &Zone,
        owner: &str,
        location: &Location,
        qtype: QueryType,
    ) -> Option<Vec<DnsRecord>> {
        let target = &location.cname.as_ref()?.records.first()?.host;
        let flattened = self
            .context
            .upstream_resolver
            .flatten(target, &ZoneLocalLookup { context: &self.context, zone })
            .ok()?;

        let records = flattened.into_records(owner, u32::MAX);
        let records: Vec<DnsRecord> = records
            .into_iter()
            .filter(|r| matches!((r, qtype), (DnsRecord::A { .. }, QueryType::A) | (DnsRecord::Aaaa { .. }, QueryType::Aaaa)))
            .collect();
        if records.is_empty() {
            None
        } else {
            Some(records)
        }
    }

    /// Attaches only the NSEC record(s) bracketing `qname` (spec §8: "NSEC
    /// covering the closest encloser"), not the zone's full NSEC chain.
    fn attach_negative_proof(&self, zone: &Zone, qname: &str, response: &mut DnsPacket) {
        if let Some(signed) = self.context.dnssec_signer.signed_zone(&zone.apex) {
            if let Some(covering) = select_covering_nsec(&signed.nsec_records, qname) {
                response.authorities.push(covering.clone());
            }
        }
    }

    fn sign_response(&self, zone: &Zone, response: &mut DnsPacket) {
        let signed = match self.context.dnssec_signer.signed_zone(&zone.apex) {
            Some(s) => s,
            None => {
                let labels = self.gather_labels(zone);
                match self.context.dnssec_signer.enable_zone(&zone.apex, &labels) {
                    Ok(s) => s,
                    Err(e) => {
                        log::warn!("dnssec signing failed for {}: {}", zone.apex, e);
                        return;
                    }
                }
            }
        };

        let covered_types: std::collections::HashSet<u16> = response
            .answers
            .iter()
            .chain(response.authorities.iter())
            .map(|r| r.get_querytype().to_num())
            .collect();

        let matching: Vec<DnsRecord> = signed
            .rrsigs
            .iter()
            .filter(|r| {
                if let DnsRecord::Rrsig { type_covered, .. } = r {
                    covered_types.contains(type_covered)
                } else {
                    false
                }
            })
            .cloned()
            .collect();
        response.answers.extend(matching);
    }

    /// Gathers every label's records for the `DnssecSigner`, used to build
    /// the zone's DNSKEY/RRSIG/NSEC set the first time a signed zone is
    /// queried (spec §4.9: "pre-signed once per zone load and cached").
    fn gather_labels(&self, zone: &Zone) -> Vec<LabelRecords> {
        zone.labels
            .iter()
            .filter_map(|label| {
                let owner = fqdn(&zone.apex, label);
                let location = self.context.record_store.get_records(&zone.apex, label).ok()?;
                let mut records = simple_records(&owner, &location);
                if let Some(rrset) = &location.a {
                    for r in &rrset.records {
                        if let Ok(std::net::IpAddr::V4(addr)) = r.ip.parse() {
                            records.push(DnsRecord::A {
                                domain: owner.clone(),
                                addr,
                                ttl: TransientTtl(rrset.ttl),
                            });
                        }
                    }
                }
                if let Some(rrset) = &location.aaaa {
                    for r in &rrset.records {
                        if let Ok(std::net::IpAddr::V6(addr)) = r.ip.parse() {
                            records.push(DnsRecord::Aaaa {
                                domain: owner.clone(),
                                addr,
                                ttl: TransientTtl(rrset.ttl),
                            });
                        }
                    }
                }
                Some(LabelRecords { owner, records })
            })
            .collect()
    }
}

/// Finds the NSEC record covering `qname`: the one whose owner is the
/// immediate predecessor of `qname` in the chain's canonical order, or the
/// wrap-around record (the one whose span crosses back through the apex) if
/// `qname` sorts before every owner in the chain.
fn select_covering_nsec<'a>(nsec_records: &'a [DnsRecord], qname: &str) -> Option<&'a DnsRecord> {
    let qname = qname.to_lowercase();
    let mut sorted: Vec<&DnsRecord> = nsec_records.iter().collect();
    sorted.sort_by(|a, b| match (a, b) {
        (DnsRecord::Nsec { domain: da, .. }, DnsRecord::Nsec { domain: db, .. }) => da.cmp(db),
        _ => std::cmp::Ordering::Equal,
    });

    let mut predecessor: Option<&DnsRecord> = None;
    for record in &sorted {
        if let DnsRecord::Nsec { domain, .. } = record {
            if domain.as_str() < qname.as_str() {
                predecessor = Some(record);
            }
        }
    }

    predecessor.or_else(|| sorted.last().copied())
}

fn location_cname(owner: &str, location: &Location) -> Vec<DnsRecord> {
    location
        .cname
        .as_ref()
        .map(|cname| {
            cname
                .records
                .iter()
                .map(|r| DnsRecord::Cname {
                    domain: owner.to_string(),
                    host: r.host.clone(),
                    ttl: TransientTtl(cname.ttl),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::context::tests::create_test_context;
    use crate::dns::protocol::DnsQuestion;
    use crate::dns::record_store::{
        Count, FilterConfig, GeoFilter, IpRecord, IpRRSet, Location, Order, Soa, ZoneConfig,
    };
    use crate::dns::record_store::MemoryZoneStore;
    use std::net::Ipv4Addr;

    fn soa() -> Soa {
        Soa {
            m_name: "ns1.example.com.".to_string(),
            r_name: "hostmaster.example.com.".to_string(),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 60,
        }
    }

    fn build_query(qname: &str, qtype: QueryType) -> DnsPacket {
        let mut packet = DnsPacket::new();
        packet
            .questions
            .push(DnsQuestion::new(qname.to_string(), qtype));
        packet
    }

    #[test]
    fn not_authoritative_returns_notauth() {
        let context = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));
        let pipeline = QueryPipeline::new(context);
        let response = pipeline.execute(
            &build_query("nowhere.net.", QueryType::A),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        );
        assert_eq!(response.header.rescode, ResultCode::NOTAUTH);
    }

    #[test]
    fn empty_request_is_formerr() {
        let context = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));
        let pipeline = QueryPipeline::new(context);
        let response = pipeline.execute(&DnsPacket::new(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(response.header.rescode, ResultCode::FORMERR);
    }

    #[test]
    fn serves_a_record_from_zone_store() {
        let context = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));

        let store = MemoryZoneStore::new();
        store.insert_zone(
            "example.com.",
            ZoneConfig {
                soa: soa(),
                dnssec: false,
                cname_flattening: false,
                domain_id: None,
            },
        );
        store.insert_location(
            "example.com.",
            "www",
            Location {
                a: Some(IpRRSet {
                    ttl: 300,
                    records: vec![IpRecord {
                        ip: "192.0.2.1".to_string(),
                        weight: 1,
                        country: vec![],
                        asn: vec![],
                    }],
                    filter: FilterConfig {
                        count: Count::Multi,
                        order: Order::None,
                        geo_filter: GeoFilter::None,
                    },
                    health_check: None,
                }),
                ..Default::default()
            },
        );

        // Replace the store on a fresh record store backed by our fixture.
        let context = Arc::new(test_context_with_store(context, store));
        let pipeline = QueryPipeline::new(context);
        let response = pipeline.execute(
            &build_query("www.example.com.", QueryType::A),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        );

        assert_eq!(response.header.rescode, ResultCode::NOERROR);
        assert_eq!(response.answers.len(), 1);
        match &response.answers[0] {
            DnsRecord::A { domain, .. } => assert_eq!(domain, "www.example.com."),
            _ => panic!("expected an A record"),
        }
    }

    fn test_context_with_store(
        context: Arc<ServerContext>,
        store: MemoryZoneStore,
    ) -> ServerContext {
        use crate::dns::record_store::RecordStore;
        use std::time::Duration;

        ServerContext {
            record_store: Arc::new(RecordStore::new(
                Arc::new(store),
                Duration::from_secs(60),
                Duration::from_secs(30),
            )),
            health_store: context.health_store.clone(),
            health_checker: context.health_checker.clone(),
            geo_lookup: context.geo_lookup.clone(),
            rate_limiter: Arc::new(crate::dns::rate_limit::RateLimiter::new(
                crate::dns::rate_limit::RateLimitConfig::default(),
            )),
            dnssec_signer: context.dnssec_signer.clone(),
            upstream_resolver: context.upstream_resolver.clone(),
            client: Box::new(crate::dns::client::tests::DnsStubClient::new(Box::new(
                |_, _, _, _| Err(crate::dns::client::ClientError::LookupFailed),
            ))),
            dns_udp_addr: context.dns_udp_addr.clone(),
            dns_tcp_addr: context.dns_tcp_addr.clone(),
            max_flatten_hops: context.max_flatten_hops,
            statistics: crate::dns::context::ServerStatistics::default(),
        }
    }
}
