//! Rate limiting for DNS queries to prevent abuse and DoS attacks
//!
//! Converted from a sliding-window/adaptive design to the strict token-bucket
//! model spec §4.7 calls for (rate + burst per client IP, a secondary global
//! bucket bounding aggregate QPS, idle buckets expiring after `2/rate`).
//! Keeps the teacher's two-tier per-client/global `Mutex<HashMap>` structure
//! and background cleanup-thread idiom (`start_cleanup_thread`).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Sustained queries/sec allowed per client IP.
    pub rate: f64,
    /// Per-client burst capacity (bucket size in tokens).
    pub burst: f64,
    /// Sustained aggregate queries/sec across all clients.
    pub global_rate: f64,
    /// Global burst capacity.
    pub global_burst: f64,
    /// How often the cleanup thread sweeps idle per-client buckets.
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            rate: 50.0,
            burst: 100.0,
            global_rate: 10_000.0,
            global_burst: 20_000.0,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

struct TokenBucket {
    tokens: f64,
    rate: f64,
    capacity: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64, capacity: f64) -> TokenBucket {
        TokenBucket {
            tokens: capacity,
            rate,
            capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    fn consume(&mut self) {
        self.tokens -= 1.0;
    }
}

struct ClientBucket {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Per-IP token bucket with a global backstop bucket (spec §4.7).
pub struct RateLimiter {
    clients: Arc<Mutex<HashMap<IpAddr, ClientBucket>>>,
    global: Arc<Mutex<TokenBucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> RateLimiter {
        let limiter = RateLimiter {
            clients: Arc::new(Mutex::new(HashMap::new())),
            global: Arc::new(Mutex::new(TokenBucket::new(config.global_rate, config.global_burst))),
            config,
        };

        limiter.start_cleanup_thread();
        limiter
    }

    /// `canHandle(ip)`: atomically checks and, if allowed, consumes one
    /// token from both the client's bucket and the global bucket. Denying a
    /// request consumes neither, so a client blocked locally doesn't also
    /// drain the global budget.
    pub fn allow(&self, client: IpAddr) -> bool {
        let now = Instant::now();

        let mut global = self.global.lock().unwrap();
        global.refill(now);

        let mut clients = self.clients.lock().unwrap();
        let entry = clients.entry(client).or_insert_with(|| ClientBucket {
            bucket: TokenBucket::new(self.config.rate, self.config.burst),
            last_seen: now,
        });
        entry.bucket.refill(now);
        entry.last_seen = now;

        if !global.has_token() || !entry.bucket.has_token() {
            return false;
        }

        global.consume();
        entry.bucket.consume();
        true
    }

    fn idle_timeout(&self) -> Duration {
        if self.config.rate <= 0.0 {
            return self.config.cleanup_interval;
        }
        Duration::from_secs_f64(2.0 / self.config.rate)
    }

    fn start_cleanup_thread(&self) {
        let clients = self.clients.clone();
        let interval = self.config.cleanup_interval;
        let idle_timeout = self.idle_timeout();

        std::thread::Builder::new()
            .name("z42-ratelimit-cleanup".to_string())
            .spawn(move || loop {
                std::thread::sleep(interval);
                let now = Instant::now();
                clients
                    .lock()
                    .unwrap()
                    .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < idle_timeout);
            })
            .expect("failed to spawn rate limiter cleanup thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, n))
    }

    #[test]
    fn allows_up_to_burst_then_denies() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 1.0,
            burst: 3.0,
            global_rate: 1000.0,
            global_burst: 1000.0,
            cleanup_interval: Duration::from_secs(60),
        });
        let client = ip(1);

        assert!(limiter.allow(client));
        assert!(limiter.allow(client));
        assert!(limiter.allow(client));
        assert!(!limiter.allow(client));
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 100.0,
            burst: 1.0,
            global_rate: 1000.0,
            global_burst: 1000.0,
            cleanup_interval: Duration::from_secs(60),
        });
        let client = ip(2);

        assert!(limiter.allow(client));
        assert!(!limiter.allow(client));

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.allow(client));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 1.0,
            burst: 1.0,
            global_rate: 1000.0,
            global_burst: 1000.0,
            cleanup_interval: Duration::from_secs(60),
        });

        assert!(limiter.allow(ip(1)));
        assert!(!limiter.allow(ip(1)));
        assert!(limiter.allow(ip(2)));
    }

    #[test]
    fn global_bucket_bounds_aggregate_traffic() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 1000.0,
            burst: 1000.0,
            global_rate: 1.0,
            global_burst: 2.0,
            cleanup_interval: Duration::from_secs(60),
        });

        assert!(limiter.allow(ip(1)));
        assert!(limiter.allow(ip(2)));
        assert!(!limiter.allow(ip(3)));
    }

    #[test]
    fn denied_client_request_does_not_drain_global_budget() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate: 1.0,
            burst: 1.0,
            global_rate: 1.0,
            global_burst: 5.0,
            cleanup_interval: Duration::from_secs(60),
        });

        assert!(limiter.allow(ip(1)));
        for _ in 0..3 {
            assert!(!limiter.allow(ip(1)));
        }
        // the global bucket should still have budget for a different client
        assert!(limiter.allow(ip(2)));
    }

    #[test]
    fn concurrent_access_is_consistent() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            rate: 50.0,
            burst: 50.0,
            global_rate: 200.0,
            global_burst: 200.0,
            cleanup_interval: Duration::from_secs(60),
        }));

        let mut handles = vec![];
        for i in 0..4u8 {
            let limiter = limiter.clone();
            handles.push(std::thread::spawn(move || {
                let client = ip(i);
                let mut allowed = 0;
                for _ in 0..30 {
                    if limiter.allow(client) {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }

        for handle in handles {
            let allowed = handle.join().unwrap();
            assert!(allowed > 0);
        }
    }
}
