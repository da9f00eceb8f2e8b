//! UDP and TCP server implementations for DNS
//!
//! Threading shape kept from atlas: a bounded worker pool reading off a
//! shared queue for UDP (`Condvar`-woken, since UDP has no per-connection
//! thread to pin work to) and one `mpsc` channel per worker for TCP (one
//! accepted connection handed to exactly one worker). `execute_query` no
//! longer drives a `DnsResolver`/`Authority` pair — it now just invokes
//! `QueryPipeline` per spec §4.8.

use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::net::{Shutdown, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::Builder;

use derive_more::{Display, Error, From};
use rand::random;

use crate::dns::buffer::{BytePacketBuffer, PacketBuffer, StreamPacketBuffer, VectorPacketBuffer};
use crate::dns::context::ServerContext;
use crate::dns::netutil::{read_packet_length, write_packet_length};
use crate::dns::pipeline::QueryPipeline;
use crate::dns::protocol::DnsPacket;

#[derive(Debug, Display, From, Error)]
pub enum ServerError {
    Io(std::io::Error),
}

type Result<T> = std::result::Result<T, ServerError>;

macro_rules! return_or_report {
    ( $x:expr, $message:expr ) => {
        match $x {
            Ok(res) => res,
            Err(_) => {
                log::info!($message);
                return;
            }
        }
    };
}

macro_rules! ignore_or_report {
    ( $x:expr, $message:expr ) => {
        match $x {
            Ok(_) => {}
            Err(_) => {
                log::info!($message);
                return;
            }
        };
    };
}

/// Common trait for DNS servers
pub trait DnsServer {
    /// Initialize the server and start listenening
    ///
    /// This method should _NOT_ block. Rather, servers are expected to spawn a new
    /// thread to handle requests and return immediately.
    fn run_server(self) -> Result<()>;
}

/// This function will always return a valid packet, even if the request could not
/// be performed, since we still want to send something back to the client.
pub fn execute_query(context: Arc<ServerContext>, request: &DnsPacket, client_addr: std::net::IpAddr) -> DnsPacket {
    QueryPipeline::new(context).execute(request, client_addr)
}

/// The UDP server
///
/// Accepts DNS queries through UDP, and uses the `ServerContext` to determine
/// how to service the request. Packets are read on a single thread, after which
/// a new thread is spawned to service the request asynchronously.
pub struct DnsUdpServer {
    context: Arc<ServerContext>,
    request_queue: Arc<Mutex<VecDeque<(SocketAddr, DnsPacket)>>>,
    request_cond: Arc<Condvar>,
    thread_count: usize,
}

impl DnsUdpServer {
    pub fn new(context: Arc<ServerContext>, thread_count: usize) -> DnsUdpServer {
        DnsUdpServer {
            context,
            request_queue: Arc::new(Mutex::new(VecDeque::new())),
            request_cond: Arc::new(Condvar::new()),
            thread_count,
        }
    }
}

impl DnsUdpServer {
    /// Process a single DNS request and send the response
    fn process_request(
        socket: &UdpSocket,
        context: Arc<ServerContext>,
        src: std::net::SocketAddr,
        request: &DnsPacket,
    ) {
        let mut res_buffer = VectorPacketBuffer::new();

        let mut packet = execute_query(context, request, src.ip());
        let size_limit = crate::dns::edns0::requested_udp_size(&packet.resources);
        let _ = packet.write(&mut res_buffer, size_limit);

        let len = res_buffer.pos();
        let data = return_or_report!(
            res_buffer.get_range(0, len),
            "Failed to get buffer data"
        );
        ignore_or_report!(
            socket.send_to(data, src),
            "Failed to send response packet"
        );
    }

    /// Spawn a worker thread to handle DNS requests
    fn spawn_request_handler(
        &self,
        thread_id: usize,
        socket: UdpSocket,
    ) -> std::io::Result<()> {
        let context = self.context.clone();
        let request_cond = self.request_cond.clone();
        let request_queue = self.request_queue.clone();

        let name = format!("DnsUdpServer-request-{}", thread_id);

        Builder::new().name(name).spawn(move || {
            loop {
                let (src, request) = match request_queue
                    .lock()
                    .ok()
                    .and_then(|x| request_cond.wait(x).ok())
                    .and_then(|mut x| x.pop_front())
                {
                    Some(x) => x,
                    None => continue,
                };

                Self::process_request(&socket, context.clone(), src, &request);
            }
        })?;

        Ok(())
    }

    /// Spawn the main incoming request handler thread
    fn spawn_incoming_handler(self, socket: UdpSocket) -> std::io::Result<()> {
        Builder::new()
            .name("DnsUdpServer-incoming".into())
            .spawn(move || {
                loop {
                    let _ = self
                        .context
                        .statistics
                        .udp_query_count
                        .fetch_add(1, Ordering::Release);

                    let mut req_buffer = BytePacketBuffer::new();
                    let (_, src) = match socket.recv_from(&mut req_buffer.buf) {
                        Ok(x) => x,
                        Err(e) => {
                            log::info!("Failed to read from UDP socket: {:?}", e);
                            continue;
                        }
                    };

                    let request = match DnsPacket::from_buffer(&mut req_buffer) {
                        Ok(x) => x,
                        Err(e) => {
                            log::info!("Failed to parse UDP query packet: {:?}", e);
                            continue;
                        }
                    };

                    self.enqueue_request(src, request);
                }
            })?;

        Ok(())
    }

    /// Add a request to the queue and notify waiting threads
    fn enqueue_request(&self, src: std::net::SocketAddr, request: DnsPacket) {
        match self.request_queue.lock() {
            Ok(mut queue) => {
                queue.push_back((src, request));
                self.request_cond.notify_one();
            }
            Err(e) => {
                log::info!("Failed to send UDP request for processing: {}", e);
            }
        }
    }
}

impl DnsServer for DnsUdpServer {
    /// Launch the server
    ///
    /// This method takes ownership of the server, preventing the method from
    /// being called multiple times.
    fn run_server(self) -> Result<()> {
        let socket = UdpSocket::bind(&self.context.dns_udp_addr)?;

        for thread_id in 0..self.thread_count {
            let socket_clone = match socket.try_clone() {
                Ok(x) => x,
                Err(e) => {
                    log::info!("Failed to clone socket when starting UDP server: {:?}", e);
                    continue;
                }
            };

            self.spawn_request_handler(thread_id, socket_clone)?;
        }

        self.spawn_incoming_handler(socket)?;

        Ok(())
    }
}

/// TCP DNS server
pub struct DnsTcpServer {
    context: Arc<ServerContext>,
    senders: Vec<Sender<TcpStream>>,
    thread_count: usize,
}

impl DnsTcpServer {
    pub fn new(context: Arc<ServerContext>, thread_count: usize) -> DnsTcpServer {
        DnsTcpServer {
            context,
            senders: Vec::new(),
            thread_count,
        }
    }
}

impl DnsServer for DnsTcpServer {
    fn run_server(mut self) -> Result<()> {
        let socket = TcpListener::bind(&self.context.dns_tcp_addr)?;

        for thread_id in 0..self.thread_count {
            let (tx, rx) = channel();
            self.senders.push(tx);

            let context = self.context.clone();

            let name = "DnsTcpServer-request-".to_string() + &thread_id.to_string();
            let _ = Builder::new().name(name).spawn(move || {
                loop {
                    let mut stream = match rx.recv() {
                        Ok(x) => x,
                        Err(_) => continue,
                    };

                    let _ = context
                        .statistics
                        .tcp_query_count
                        .fetch_add(1, Ordering::Release);

                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr.ip(),
                        Err(_) => continue,
                    };

                    // When DNS packets are sent over TCP, they're prefixed with a two byte
                    // length. We don't really need to know the length in advance, so we
                    // just move past it and continue reading as usual
                    ignore_or_report!(
                        read_packet_length(&mut stream),
                        "Failed to read query packet length"
                    );

                    let request = {
                        let mut stream_buffer = StreamPacketBuffer::new(&mut stream);
                        return_or_report!(
                            DnsPacket::from_buffer(&mut stream_buffer),
                            "Failed to read query packet"
                        )
                    };

                    let mut res_buffer = VectorPacketBuffer::new();

                    let mut packet = execute_query(context.clone(), &request, peer_addr);
                    ignore_or_report!(
                        packet.write(&mut res_buffer, 0xFFFF),
                        "Failed to write packet to buffer"
                    );

                    // As is the case for incoming queries, we need to send a 2 byte length
                    // value before handing of the actual packet.
                    let len = res_buffer.pos();
                    ignore_or_report!(
                        write_packet_length(&mut stream, len),
                        "Failed to write packet size"
                    );

                    let data = return_or_report!(
                        res_buffer.get_range(0, len),
                        "Failed to get packet data"
                    );

                    ignore_or_report!(stream.write_all(data), "Failed to write response packet");

                    ignore_or_report!(stream.shutdown(Shutdown::Both), "Failed to shutdown socket");
                }
            })?;
        }

        let _ = Builder::new()
            .name("DnsTcpServer-incoming".into())
            .spawn(move || {
                for wrap_stream in socket.incoming() {
                    let stream = match wrap_stream {
                        Ok(stream) => stream,
                        Err(err) => {
                            log::info!("Failed to accept TCP connection: {:?}", err);
                            continue;
                        }
                    };

                    let thread_no = random::<usize>() % self.thread_count;
                    match self.senders[thread_no].send(stream) {
                        Ok(_) => {}
                        Err(e) => {
                            log::info!(
                                "Failed to send TCP request for processing on thread {}: {}",
                                thread_no, e
                            );
                        }
                    }
                }
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use crate::dns::protocol::{DnsPacket, DnsQuestion, DnsRecord, QueryType, ResultCode, TransientTtl};

    use super::*;

    use crate::dns::context::tests::create_test_context;

    fn build_query(qname: &str, qtype: QueryType) -> DnsPacket {
        let mut query_packet = DnsPacket::new();
        query_packet
            .questions
            .push(DnsQuestion::new(qname.into(), qtype));
        query_packet
    }

    #[test]
    fn not_authoritative_is_notauth() {
        let context = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));

        let res = execute_query(
            context,
            &build_query("google.com", QueryType::A),
            Ipv4Addr::new(127, 0, 0, 1).into(),
        );
        assert_eq!(ResultCode::NOTAUTH, res.header.rescode);
    }

    #[test]
    fn empty_question_is_formerr() {
        let context = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));

        let res = execute_query(context, &DnsPacket::new(), Ipv4Addr::new(127, 0, 0, 1).into());
        assert_eq!(ResultCode::FORMERR, res.header.rescode);
    }

    #[test]
    fn serves_a_record_when_zone_is_authoritative() {
        use crate::dns::record_store::{
            Count, FilterConfig, GeoFilter, IpRRSet, IpRecord, Location, MemoryZoneStore, Order,
            RecordStore, Soa, ZoneConfig, ZoneStore,
        };
        use std::time::Duration;

        let store = MemoryZoneStore::new();
        store.insert_zone(
            "example.com.",
            ZoneConfig {
                soa: Soa {
                    m_name: "ns1.example.com.".to_string(),
                    r_name: "hostmaster.example.com.".to_string(),
                    serial: 1,
                    refresh: 3600,
                    retry: 600,
                    expire: 86400,
                    minimum: 60,
                },
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

        let base = create_test_context(Box::new(|_, _, _, _| {
            Err(crate::dns::client::ClientError::LookupFailed)
        }));

        let store: Arc<dyn ZoneStore> = Arc::new(store);
        let record_store = Arc::new(RecordStore::new(store, Duration::from_secs(60), Duration::from_secs(30)));

        let context = Arc::new(ServerContext {
            record_store,
            health_store: base.health_store.clone(),
            health_checker: base.health_checker.clone(),
            geo_lookup: base.geo_lookup.clone(),
            rate_limiter: base.rate_limiter.clone(),
            dnssec_signer: base.dnssec_signer.clone(),
            upstream_resolver: base.upstream_resolver.clone(),
            client: Box::new(crate::dns::client::tests::DnsStubClient::new(Box::new(
                |_, _, _, _| Err(crate::dns::client::ClientError::LookupFailed),
            ))),
            dns_udp_addr: base.dns_udp_addr.clone(),
            dns_tcp_addr: base.dns_tcp_addr.clone(),
            max_flatten_hops: base.max_flatten_hops,
            statistics: crate::dns::context::ServerStatistics::default(),
        });

        let res = execute_query(
            context,
            &build_query("www.example.com.", QueryType::A),
            Ipv4Addr::new(127, 0, 0, 1).into(),
        );
        assert_eq!(ResultCode::NOERROR, res.header.rescode);
        assert_eq!(1, res.answers.len());
        match res.answers[0] {
            DnsRecord::A { ref domain, ttl, .. } => {
                assert_eq!("www.example.com.", domain);
                assert_eq!(ttl, TransientTtl(300));
            }
            _ => panic!("expected an A record"),
        }
    }
}
