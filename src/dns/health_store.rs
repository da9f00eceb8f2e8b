//! Shared per-`(host, ip)` health status store
//!
//! Grounded in original_source/healthcheck/healthcheck_test.go's
//! `HealthCheckItem{Host,Ip,Protocol,Uri,Port,Status,Enable}` fixtures: status
//! is a signed counter clamped to `[down_count, up_count]`, written by the
//! checker and read by the filter chain without synchronizing the two (spec
//! §4.3/§5 — "filters tolerate stale reads by design"). Kept as a flat
//! `RwLock<HashMap>` the way atlas's `DnssecSigner.stats` (dnssec.rs) and
//! `Authority.zones` (authority.rs) both guard their shared maps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckItem {
    pub host: String,
    pub ip: String,
    pub protocol: String,
    pub uri: String,
    pub port: u16,
    pub enable: bool,
    pub status: i32,
    pub up_count: i32,
    pub down_count: i32,
    pub timeout_ms: u64,
}

impl HealthCheckItem {
    fn clamp(&mut self) {
        self.status = self.status.clamp(self.down_count, self.up_count);
    }

    pub fn record_success(&mut self) {
        self.status += 1;
        self.clamp();
    }

    pub fn record_failure(&mut self) {
        self.status -= 1;
        self.clamp();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthClass {
    White,
    Grey,
    Black,
}

/// Maps a status reading onto the White/Grey/Black classes the filter chain
/// consumes, per spec §4.4's filter-mapping table.
pub fn classify(status: i32, up_count: i32, down_count: i32) -> HealthClass {
    if up_count > 0 && status >= up_count {
        HealthClass::White
    } else if status <= down_count {
        HealthClass::Black
    } else {
        // covers 0 < status < up_count, status == 0, and down_count < status < 0
        HealthClass::Grey
    }
}

struct StoredItem {
    item: HealthCheckItem,
    expires_at: Instant,
}

/// `(host, ip)` keyed facade over health status, with a TTL per spec §4.3 so
/// configs an `UpdateInterval` reconciliation no longer reasserts self-expire.
pub struct HealthStore {
    items: RwLock<HashMap<(String, String), StoredItem>>,
    item_ttl: Duration,
}

impl HealthStore {
    pub fn new(update_interval: Duration) -> HealthStore {
        HealthStore {
            items: RwLock::new(HashMap::new()),
            item_ttl: update_interval * 2,
        }
    }

    pub fn get_status(&self, host: &str, ip: &str) -> i32 {
        self.items
            .read()
            .get(&(host.to_string(), ip.to_string()))
            .map(|s| s.item.status)
            .unwrap_or(0)
    }

    pub fn get_item(&self, host: &str, ip: &str) -> Option<HealthCheckItem> {
        self.items
            .read()
            .get(&(host.to_string(), ip.to_string()))
            .map(|s| s.item.clone())
    }

    pub fn set_item(&self, item: HealthCheckItem) {
        let key = (item.host.clone(), item.ip.clone());
        self.items.write().insert(
            key,
            StoredItem {
                item,
                expires_at: Instant::now() + self.item_ttl,
            },
        );
    }

    pub fn remove_item(&self, host: &str, ip: &str) {
        self.items
            .write()
            .remove(&(host.to_string(), ip.to_string()));
    }

    /// Mutates the stored counter in place via `update`, creating the item
    /// with `status = 0` first if it doesn't yet exist. Used by the checker
    /// after a probe completes.
    pub fn update_status(
        &self,
        host: &str,
        ip: &str,
        up_count: i32,
        down_count: i32,
        success: bool,
    ) {
        let key = (host.to_string(), ip.to_string());
        let mut items = self.items.write();
        let entry = items.entry(key).or_insert_with(|| StoredItem {
            item: HealthCheckItem {
                host: host.to_string(),
                ip: ip.to_string(),
                protocol: String::new(),
                uri: String::new(),
                port: 0,
                enable: true,
                status: 0,
                up_count,
                down_count,
                timeout_ms: 1000,
            },
            expires_at: Instant::now() + self.item_ttl,
        });

        if success {
            entry.item.record_success();
        } else {
            entry.item.record_failure();
        }
        entry.expires_at = Instant::now() + self.item_ttl;
    }

    /// All currently stored keys, for reconciliation (spec §4.4 step 3).
    pub fn all_keys(&self) -> Vec<(String, String)> {
        self.items.read().keys().cloned().collect()
    }

    /// Drops entries whose TTL has lapsed without a refresh.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.items.write().retain(|_, stored| stored.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_filter_mapping_table() {
        assert_eq!(classify(3, 3, -3), HealthClass::White);
        assert_eq!(classify(1, 3, -3), HealthClass::Grey);
        assert_eq!(classify(0, 3, -3), HealthClass::Grey);
        assert_eq!(classify(-1, 3, -3), HealthClass::Grey);
        assert_eq!(classify(-3, 3, -3), HealthClass::Black);
    }

    #[test]
    fn status_clamps_within_bounds() {
        let mut item = HealthCheckItem {
            host: "w0.healthcheck.com.".to_string(),
            ip: "1.2.3.4".to_string(),
            protocol: "http".to_string(),
            uri: "/".to_string(),
            port: 80,
            enable: true,
            status: 2,
            up_count: 3,
            down_count: -3,
            timeout_ms: 1000,
        };

        item.record_success();
        item.record_success();
        item.record_success();
        assert_eq!(item.status, 3);

        for _ in 0..10 {
            item.record_failure();
        }
        assert_eq!(item.status, -3);
    }

    #[test]
    fn store_defaults_missing_status_to_zero() {
        let store = HealthStore::new(Duration::from_secs(30));
        assert_eq!(store.get_status("host.", "1.2.3.4"), 0);
    }

    #[test]
    fn update_status_creates_and_clamps() {
        let store = HealthStore::new(Duration::from_secs(30));
        for _ in 0..5 {
            store.update_status("w0.healthcheck.com.", "1.2.3.4", 3, -3, true);
        }
        assert_eq!(store.get_status("w0.healthcheck.com.", "1.2.3.4"), 3);
    }
}
