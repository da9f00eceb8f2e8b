//! Active health-check engine
//!
//! Worker-pool + dispatcher + reconciler, grounded in the bounded
//! thread-pool/`Condvar` pattern `DnsUdpServer` (server.rs) uses to hand work
//! to a fixed set of threads, and in the probe-and-reconcile shape of
//! `FailoverManager`/`HealthChecker` (intelligent_failover.rs,
//! geo_loadbalancing.rs). Probes use `reqwest`'s blocking client for
//! http/https per spec §4.4; a bare TCP connect stands in for `ping` since
//! raw ICMP needs elevated privileges atlas's own teacher code never takes.

use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::dns::health_store::HealthStore;
use crate::dns::record_store::RecordStore;

#[derive(Clone, Debug)]
pub struct HealthCheckerConfig {
    pub max_requests: usize,
    pub max_pending_requests: usize,
    pub check_interval: Duration,
    pub update_interval: Duration,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        HealthCheckerConfig {
            max_requests: 16,
            max_pending_requests: 1024,
            check_interval: Duration::from_secs(10),
            update_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug)]
struct Probe {
    host: String,
    ip: String,
    protocol: String,
    uri: String,
    port: u16,
    timeout_ms: u64,
    up_count: i32,
    down_count: i32,
}

struct Queue {
    pending: Mutex<VecDeque<Probe>>,
    condvar: Condvar,
}

/// Continuously probes every enabled `(host, ip)` pair derived from zone data
/// and writes outcomes to `HealthStore` (spec §4.4).
pub struct HealthChecker {
    config: HealthCheckerConfig,
    health_store: Arc<HealthStore>,
    record_store: Arc<RecordStore>,
    queue: Arc<Queue>,
    shutdown: Arc<AtomicBool>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckerConfig,
        health_store: Arc<HealthStore>,
        record_store: Arc<RecordStore>,
    ) -> HealthChecker {
        HealthChecker {
            config,
            health_store,
            record_store,
            queue: Arc::new(Queue {
                pending: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the worker pool, the probe dispatcher and the reconciler.
    /// Returns immediately; all three run on background threads until
    /// `shutdown` is called.
    pub fn run(&self) {
        for worker_id in 0..self.config.max_requests {
            let queue = self.queue.clone();
            let health_store = self.health_store.clone();
            let shutdown = self.shutdown.clone();

            std::thread::Builder::new()
                .name(format!("z42-healthcheck-worker-{worker_id}"))
                .spawn(move || worker_loop(queue, health_store, shutdown))
                .expect("failed to spawn health check worker");
        }

        {
            let queue = self.queue.clone();
            let record_store = self.record_store.clone();
            let health_store = self.health_store.clone();
            let interval = self.config.check_interval;
            let max_pending = self.config.max_pending_requests;
            let shutdown = self.shutdown.clone();

            std::thread::Builder::new()
                .name("z42-healthcheck-dispatcher".to_string())
                .spawn(move || {
                    dispatcher_loop(queue, record_store, health_store, interval, max_pending, shutdown)
                })
                .expect("failed to spawn health check dispatcher");
        }

        {
            let record_store = self.record_store.clone();
            let health_store = self.health_store.clone();
            let interval = self.config.update_interval;
            let shutdown = self.shutdown.clone();

            std::thread::Builder::new()
                .name("z42-healthcheck-reconciler".to_string())
                .spawn(move || reconciler_loop(record_store, health_store, interval, shutdown))
                .expect("failed to spawn health check reconciler");
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue.condvar.notify_all();
    }
}

fn worker_loop(queue: Arc<Queue>, health_store: Arc<HealthStore>, shutdown: Arc<AtomicBool>) {
    loop {
        let probe = {
            let mut pending = queue.pending.lock().unwrap();
            loop {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(probe) = pending.pop_front() {
                    break probe;
                }
                pending = queue.condvar.wait(pending).unwrap();
            }
        };

        let success = run_probe(&probe);
        health_store.update_status(
            &probe.host,
            &probe.ip,
            probe.up_count,
            probe.down_count,
            success,
        );
    }
}

fn run_probe(probe: &Probe) -> bool {
    let timeout = Duration::from_millis(probe.timeout_ms);

    match probe.protocol.as_str() {
        "http" | "https" => {
            let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(client) => client,
                Err(_) => return false,
            };

            let url = format!("{}://{}:{}{}", probe.protocol, probe.ip, probe.port, probe.uri);
            let host_header = probe.host.trim_end_matches('.').to_string();

            client
                .get(&url)
                .header("Host", host_header)
                .send()
                .map(|resp| resp.status().is_success())
                .unwrap_or(false)
        }
        _ => {
            // ping stand-in: a bounded TCP connect, the privilege-free probe
            // available without raw sockets.
            let addr = format!("{}:{}", probe.ip, probe.port);
            TcpStream::connect_timeout(
                &addr.parse().unwrap_or_else(|_| "0.0.0.0:0".parse().unwrap()),
                timeout,
            )
            .is_ok()
        }
    }
}

fn dispatcher_loop(
    queue: Arc<Queue>,
    record_store: Arc<RecordStore>,
    health_store: Arc<HealthStore>,
    interval: Duration,
    max_pending: usize,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let probes = enabled_probes(&record_store, &health_store);

        {
            let mut pending = queue.pending.lock().unwrap();
            for probe in probes {
                if pending.len() >= max_pending {
                    log::warn!("health check queue full, dropping probe for this cycle");
                    break;
                }
                pending.push_back(probe);
            }
        }
        queue.condvar.notify_all();

        std::thread::sleep(interval);
    }
}

fn reconciler_loop(
    record_store: Arc<RecordStore>,
    health_store: Arc<HealthStore>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(interval);

        let expected: std::collections::HashSet<(String, String)> =
            enabled_probes(&record_store, &health_store)
                .into_iter()
                .map(|p| (p.host, p.ip))
                .collect();

        for key in health_store.all_keys() {
            if !expected.contains(&key) {
                health_store.remove_item(&key.0, &key.1);
            }
        }

        health_store.sweep_expired();
    }
}

/// Walks every zone/label via `RecordStore` and derives the expected probe
/// set from each IP_RRSet's `health_check` config (spec §4.4 step 1).
fn enabled_probes(record_store: &RecordStore, _health_store: &HealthStore) -> Vec<Probe> {
    let mut probes = Vec::new();

    for zone_name in record_store.zone_names() {
        let zone = match record_store.get_zone(&zone_name) {
            Ok(z) => z,
            Err(_) => continue,
        };

        for label in &zone.labels {
            let location = match record_store.get_records(&zone_name, label) {
                Ok(l) => l,
                Err(_) => continue,
            };

            for rrset in [location.a.as_ref(), location.aaaa.as_ref()].into_iter().flatten() {
                let Some(hc) = rrset.health_check.as_ref() else {
                    continue;
                };
                if !hc.enable {
                    continue;
                }

                let host = if label == "@" {
                    zone_name.clone()
                } else {
                    format!("{}.{}", label, zone_name)
                };

                for record in &rrset.records {
                    probes.push(Probe {
                        host: host.clone(),
                        ip: record.ip.clone(),
                        protocol: hc.protocol.clone(),
                        uri: hc.uri.clone(),
                        port: hc.port,
                        timeout_ms: hc.timeout_ms,
                        up_count: hc.up_count,
                        down_count: hc.down_count,
                    });
                }
            }
        }
    }

    probes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_probe_tcp_fallback_handles_unparseable_address() {
        let probe = Probe {
            host: "h.".to_string(),
            ip: "not-an-ip".to_string(),
            protocol: "ping".to_string(),
            uri: String::new(),
            port: 9,
            timeout_ms: 50,
            up_count: 3,
            down_count: -3,
        };
        assert!(!run_probe(&probe));
    }
}
