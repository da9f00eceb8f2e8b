//! EDNS0 (RFC 6891) client-subnet handling and UDP payload-size negotiation
//!
//! Grounded in the teacher's own edns0.rs option-parsing shape, trimmed to
//! what the pipeline (§4.8) actually consults: the request's advertised UDP
//! payload size (for TC-bit truncation) and RFC 7871 client subnet (for geo
//! filtering). Cookies/padding/NSID/keepalive are dropped — nothing in this
//! crate's scope reads them back.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::dns::protocol::DnsRecord;

const OPT_CODE_CLIENT_SUBNET: u16 = 8;

/// RFC 7871 ECS option, truncated to the bits the source prefix covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSubnetOption {
    pub family: u16,
    pub source_prefix_len: u8,
    pub scope_prefix_len: u8,
    pub address: IpAddr,
}

impl ClientSubnetOption {
    pub fn new(address: IpAddr, source_prefix_len: u8) -> ClientSubnetOption {
        let family = match address {
            IpAddr::V4(_) => 1,
            IpAddr::V6(_) => 2,
        };
        ClientSubnetOption {
            family,
            source_prefix_len,
            scope_prefix_len: 0,
            address,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.family.to_be_bytes());
        out.push(self.source_prefix_len);
        out.push(self.scope_prefix_len);

        let byte_len = ((self.source_prefix_len as usize) + 7) / 8;
        match self.address {
            IpAddr::V4(addr) => out.extend_from_slice(&addr.octets()[..byte_len.min(4)]),
            IpAddr::V6(addr) => out.extend_from_slice(&addr.octets()[..byte_len.min(16)]),
        }
        out
    }

    pub fn parse(data: &[u8]) -> Option<ClientSubnetOption> {
        if data.len() < 4 {
            return None;
        }
        let family = u16::from_be_bytes([data[0], data[1]]);
        let source_prefix_len = data[2];
        let scope_prefix_len = data[3];
        let byte_len = ((source_prefix_len as usize) + 7) / 8;

        let address = match family {
            1 => {
                let mut bytes = [0u8; 4];
                let n = byte_len.min(4).min(data.len() - 4);
                bytes[..n].copy_from_slice(&data[4..4 + n]);
                IpAddr::V4(Ipv4Addr::from(bytes))
            }
            2 => {
                let mut bytes = [0u8; 16];
                let n = byte_len.min(16).min(data.len() - 4);
                bytes[..n].copy_from_slice(&data[4..4 + n]);
                IpAddr::V6(Ipv6Addr::from(bytes))
            }
            _ => return None,
        };

        Some(ClientSubnetOption {
            family,
            source_prefix_len,
            scope_prefix_len,
            address,
        })
    }
}

/// Pulls the UDP payload size a request advertises via its OPT record, or
/// the classic 512-byte default if none is present (spec §4.8 truncation).
pub fn requested_udp_size(resources: &[DnsRecord]) -> usize {
    for record in resources {
        if let DnsRecord::Opt { packet_len, .. } = record {
            return (*packet_len).max(512) as usize;
        }
    }
    512
}

/// Extracts the RFC 7871 client subnet address from a request's OPT record,
/// if present (spec §4.8: used as the effective client address for geo
/// filtering ahead of the UDP source address).
pub fn client_subnet(resources: &[DnsRecord]) -> Option<IpAddr> {
    let data = resources.iter().find_map(|r| match r {
        DnsRecord::Opt { data, .. } => Some(data),
        _ => None,
    })?;

    let mut offset = 0;
    while offset + 4 <= data.len() {
        let code = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;
        if offset + len > data.len() {
            break;
        }
        if code == OPT_CODE_CLIENT_SUBNET {
            if let Some(cs) = ClientSubnetOption::parse(&data[offset..offset + len]) {
                return Some(cs.address);
            }
        }
        offset += len;
    }
    None
}

/// Builds the OPT record a response carries: advertised payload size, no
/// extended flags, and — when the request echoed one — the client subnet
/// option with `scope_prefix_len` set to the full address length (this
/// instance never does subnet-scoped answers narrower than a /32 or /128).
pub fn response_opt(udp_size: u16, request_subnet: Option<&ClientSubnetOption>) -> DnsRecord {
    let mut data = Vec::new();

    if let Some(cs) = request_subnet {
        let scope = match cs.address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let echoed = ClientSubnetOption {
            scope_prefix_len: scope,
            ..cs.clone()
        };
        let payload = echoed.serialize();
        data.extend_from_slice(&OPT_CODE_CLIENT_SUBNET.to_be_bytes());
        data.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        data.extend_from_slice(&payload);
    }

    DnsRecord::Opt {
        packet_len: udp_size,
        flags: 0,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::protocol::TransientTtl;

    fn opt_with_ecs(addr: IpAddr, prefix: u8) -> DnsRecord {
        let cs = ClientSubnetOption::new(addr, prefix);
        let payload = cs.serialize();
        let mut data = Vec::new();
        data.extend_from_slice(&OPT_CODE_CLIENT_SUBNET.to_be_bytes());
        data.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        data.extend_from_slice(&payload);
        DnsRecord::Opt {
            packet_len: 4096,
            flags: 0,
            data,
        }
    }

    #[test]
    fn roundtrips_ipv4_client_subnet() {
        let addr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 0));
        let resources = vec![opt_with_ecs(addr, 24)];
        assert_eq!(client_subnet(&resources), Some(addr));
    }

    #[test]
    fn no_opt_record_means_no_subnet() {
        let resources = vec![DnsRecord::A {
            domain: "example.com.".to_string(),
            addr: Ipv4Addr::new(1, 2, 3, 4),
            ttl: TransientTtl(60),
        }];
        assert_eq!(client_subnet(&resources), None);
    }

    #[test]
    fn requested_size_falls_back_to_512() {
        assert_eq!(requested_udp_size(&[]), 512);
    }

    #[test]
    fn requested_size_reads_opt_packet_len() {
        let resources = vec![DnsRecord::Opt {
            packet_len: 4096,
            flags: 0,
            data: Vec::new(),
        }];
        assert_eq!(requested_udp_size(&resources), 4096);
    }

    #[test]
    fn response_opt_echoes_full_scope() {
        let addr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));
        let cs = ClientSubnetOption::new(addr, 24);
        let record = response_opt(1232, Some(&cs));
        match record {
            DnsRecord::Opt { packet_len, data, .. } => {
                assert_eq!(packet_len, 1232);
                assert!(!data.is_empty());
            }
            _ => panic!("expected an OPT record"),
        }
    }
}
