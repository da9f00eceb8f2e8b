//! Pure record-set filter pipeline
//!
//! Implements spec §4.5 exactly as original_source/internal/handler's test
//! fixtures pin it down: `weight_test.go`'s weighted/rr/none draws,
//! `geotools_test.go`'s fail-open country/ASN/location matching, and
//! `healthcheck_test.go`'s health-mask fixtures. Every function here is pure
//! given its `rng` — no I/O, no locking — so the pipeline can unit test
//! selection behavior without spinning up a health checker or geo database.

use std::net::IpAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dns::geo::{haversine_km, Coordinate, GeoLookup};
use crate::dns::health_store::{classify, HealthClass, HealthStore};
use crate::dns::record_store::{GeoFilter, HealthCheckConfig, IpRecord, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    White,
    Grey,
    Black,
}

/// Client attributes the filter chain consults — the EDNS0 client subnet if
/// present, else the query's source address (spec §4.8).
pub struct ClientContext {
    pub addr: IpAddr,
}

/// Health stage (spec §4.4's selection rule). Unconfigured or disabled
/// health checking leaves every record White.
pub fn health_mask(
    host: &str,
    records: &[IpRecord],
    health_check: Option<&HealthCheckConfig>,
    store: &HealthStore,
) -> Vec<Mask> {
    let Some(hc) = health_check.filter(|hc| hc.enable) else {
        return vec![Mask::White; records.len()];
    };

    let classes: Vec<HealthClass> = records
        .iter()
        .map(|r| {
            let status = store.get_status(host, &r.ip);
            classify(status, hc.up_count, hc.down_count)
        })
        .collect();

    let any_white = classes.iter().any(|c| *c == HealthClass::White);

    classes
        .into_iter()
        .map(|c| match (any_white, c) {
            (_, HealthClass::White) => Mask::White,
            (true, _) => Mask::Black,
            (false, HealthClass::Grey) => Mask::White, // degraded-serve
            (false, HealthClass::Black) => Mask::Black,
        })
        .collect()
}

fn country_pass(records: &[IpRecord], mask: &[Mask], client_country: &str) -> Vec<Mask> {
    let eligible: Vec<usize> = (0..records.len())
        .filter(|&i| mask[i] == Mask::White)
        .collect();

    let target = |r: &IpRecord| -> bool {
        if client_country.is_empty() {
            r.country.is_empty()
        } else {
            r.country.iter().any(|c| c == client_country)
        }
    };

    let any_match = eligible.iter().any(|&i| target(&records[i]));
    if !any_match {
        // fail-open: no record expresses an opinion worth enforcing
        return mask.to_vec();
    }

    mask.iter()
        .enumerate()
        .map(|(i, m)| {
            if *m == Mask::White && !target(&records[i]) {
                Mask::Black
            } else {
                *m
            }
        })
        .collect()
}

fn asn_pass(records: &[IpRecord], mask: &[Mask], client_asn: u32) -> Vec<Mask> {
    let eligible: Vec<usize> = (0..records.len())
        .filter(|&i| mask[i] == Mask::White)
        .collect();

    let target = |r: &IpRecord| -> bool {
        if client_asn == 0 {
            r.asn.is_empty()
        } else {
            r.asn.iter().any(|a| *a == client_asn)
        }
    };

    let any_match = eligible.iter().any(|&i| target(&records[i]));
    if !any_match {
        return mask.to_vec();
    }

    mask.iter()
        .enumerate()
        .map(|(i, m)| {
            if *m == Mask::White && !target(&records[i]) {
                Mask::Black
            } else {
                *m
            }
        })
        .collect()
}

fn location_pass(
    records: &[IpRecord],
    mask: &[Mask],
    client_coord: Option<Coordinate>,
    geo: &dyn GeoLookup,
) -> Vec<Mask> {
    let Some(client_coord) = client_coord else {
        return mask.to_vec();
    };

    let mut distances: Vec<(usize, f64)> = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if mask[i] != Mask::White {
            continue;
        }
        let ip: IpAddr = match record.ip.parse() {
            Ok(ip) => ip,
            Err(_) => continue,
        };
        if let Ok(Some(coord)) = geo.coord(ip) {
            distances.push((i, haversine_km(client_coord, coord)));
        }
    }

    if distances.is_empty() {
        return mask.to_vec();
    }

    let min_distance = distances
        .iter()
        .map(|(_, d)| *d)
        .fold(f64::INFINITY, f64::min);

    let nearest: std::collections::HashSet<usize> = distances
        .iter()
        .filter(|(_, d)| (*d - min_distance).abs() < 1e-9)
        .map(|(i, _)| *i)
        .collect();

    mask.iter()
        .enumerate()
        .map(|(i, m)| {
            if *m == Mask::White && !nearest.contains(&i) {
                Mask::Black
            } else {
                *m
            }
        })
        .collect()
}

/// Geo stage (spec §4.5 step 2). `GeoDisabled`/`BadDB` are handled by the
/// caller substituting `GeoFilter::None` before calling this (spec §7).
pub fn geo_mask(
    records: &[IpRecord],
    mask: &[Mask],
    filter: GeoFilter,
    client: &ClientContext,
    geo: &dyn GeoLookup,
) -> Vec<Mask> {
    let country = geo.country(client.addr).unwrap_or_default();
    let asn = geo.asn(client.addr).unwrap_or(0);

    match filter {
        GeoFilter::None => mask.to_vec(),
        GeoFilter::Country => country_pass(records, mask, &country),
        GeoFilter::Asn => asn_pass(records, mask, asn),
        GeoFilter::AsnCountry => {
            let both = {
                let c = country_pass(records, mask, &country);
                asn_pass(records, &c, asn)
            };
            if both.iter().any(|m| *m == Mask::White) {
                both
            } else {
                let country_only = country_pass(records, mask, &country);
                if country_only.iter().any(|m| *m == Mask::White) {
                    country_only
                } else {
                    let asn_only = asn_pass(records, mask, asn);
                    if asn_only.iter().any(|m| *m == Mask::White) {
                        asn_only
                    } else {
                        mask.to_vec()
                    }
                }
            }
        }
        GeoFilter::Location => {
            let coord = geo.coord(client.addr).unwrap_or(None);
            location_pass(records, mask, coord, geo)
        }
    }
}

/// Order/count stage (spec §4.5 step 3 and §8's weighted-draw property).
/// `seed` is the per-request PRNG seed; deterministic given a fixed seed.
pub fn select(
    records: &[IpRecord],
    mask: &[Mask],
    order: Order,
    single: bool,
    seed: u64,
) -> Vec<IpRecord> {
    let white: Vec<usize> = (0..records.len())
        .filter(|&i| mask[i] == Mask::White)
        .collect();

    if white.is_empty() {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let ordered: Vec<usize> = match order {
        Order::None => white,
        Order::Rr => {
            let mut shuffled = white;
            shuffle(&mut shuffled, &mut rng);
            shuffled
        }
        Order::Weighted => weighted_order(records, &white, &mut rng),
    };

    let chosen = if single {
        ordered.into_iter().take(1).collect::<Vec<_>>()
    } else {
        ordered
    };

    chosen.into_iter().map(|i| records[i].clone()).collect()
}

fn shuffle(items: &mut [usize], rng: &mut StdRng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Weighted draw without replacement. All-zero weights among the eligible
/// set draw uniformly; a mix of zero and nonzero weights never draws a
/// zero-weight record (spec §9 / weight_test.go).
fn weighted_order(records: &[IpRecord], white: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let mut remaining: Vec<usize> = white.to_vec();
    let mut result = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let total: u64 = remaining.iter().map(|&i| records[i].weight as u64).sum();

        let pick_idx = if total == 0 {
            rng.gen_range(0..remaining.len())
        } else {
            let mut draw = rng.gen_range(0..total);
            let mut chosen = 0;
            for (pos, &i) in remaining.iter().enumerate() {
                let w = records[i].weight as u64;
                if w == 0 {
                    continue;
                }
                if draw < w {
                    chosen = pos;
                    break;
                }
                draw -= w;
            }
            chosen
        };

        result.push(remaining.remove(pick_idx));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ip: &str, weight: u32) -> IpRecord {
        IpRecord {
            ip: ip.to_string(),
            weight,
            country: vec![],
            asn: vec![],
        }
    }

    #[test]
    fn health_mask_promotes_when_no_white() {
        let store = HealthStore::new(std::time::Duration::from_secs(30));
        let hc = HealthCheckConfig {
            enable: true,
            protocol: "http".to_string(),
            uri: "/".to_string(),
            port: 80,
            timeout_ms: 1000,
            up_count: 3,
            down_count: -3,
        };

        store.update_status("host.", "1.1.1.1", 3, -3, false); // -> -1 (Grey)
        let records = vec![rec("1.1.1.1", 1)];
        let mask = health_mask("host.", &records, Some(&hc), &store);
        assert_eq!(mask, vec![Mask::White]); // degraded-serve
    }

    #[test]
    fn health_mask_blacks_out_nonwhite_when_white_exists() {
        let store = HealthStore::new(std::time::Duration::from_secs(30));
        let hc = HealthCheckConfig {
            enable: true,
            protocol: "http".to_string(),
            uri: "/".to_string(),
            port: 80,
            timeout_ms: 1000,
            up_count: 3,
            down_count: -3,
        };
        for _ in 0..3 {
            store.update_status("host.", "1.1.1.1", 3, -3, true);
        }
        store.update_status("host.", "2.2.2.2", 3, -3, false);

        let records = vec![rec("1.1.1.1", 1), rec("2.2.2.2", 1)];
        let mask = health_mask("host.", &records, Some(&hc), &store);
        assert_eq!(mask, vec![Mask::White, Mask::Black]);
    }

    #[test]
    fn disabled_health_check_is_all_white() {
        let store = HealthStore::new(std::time::Duration::from_secs(30));
        let records = vec![rec("1.1.1.1", 1), rec("2.2.2.2", 1)];
        let mask = health_mask("host.", &records, None, &store);
        assert_eq!(mask, vec![Mask::White, Mask::White]);
    }

    #[test]
    fn weighted_zero_weight_never_drawn_when_others_nonzero() {
        let records = vec![rec("a", 0), rec("b", 5), rec("c", 7), rec("d", 0)];
        let mask = vec![Mask::White; 4];

        let mut counts = [0u32; 4];
        for seed in 0..2000u64 {
            let picked = select(&records, &mask, Order::Weighted, true, seed);
            let idx = records.iter().position(|r| r.ip == picked[0].ip).unwrap();
            counts[idx] += 1;
        }

        assert_eq!(counts[0], 0);
        assert_eq!(counts[3], 0);
        assert!(counts[1] > 0);
        assert!(counts[2] > 0);
    }

    #[test]
    fn rr_order_ignores_weight() {
        let records = vec![rec("a", 100), rec("b", 1)];
        let mask = vec![Mask::White; 2];

        let mut counts = [0u32; 2];
        for seed in 0..2000u64 {
            let picked = select(&records, &mask, Order::Rr, true, seed);
            let idx = records.iter().position(|r| r.ip == picked[0].ip).unwrap();
            counts[idx] += 1;
        }

        // roughly uniform regardless of the lopsided weights
        assert!(counts[0] > 700 && counts[0] < 1300, "counts={counts:?}");
    }

    #[test]
    fn country_filter_fail_open_when_no_record_matches() {
        let records = vec![IpRecord {
            ip: "1.2.3.4".to_string(),
            weight: 0,
            country: vec!["FR".to_string()],
            asn: vec![],
        }];
        let mask = vec![Mask::White];
        let out = country_pass(&records, &mask, "DE");
        assert_eq!(out, vec![Mask::White]);
    }

    #[test]
    fn country_filter_excludes_nonmatching_when_a_match_exists() {
        let records = vec![
            IpRecord { ip: "1.2.3.4".to_string(), weight: 0, country: vec!["DE".to_string()], asn: vec![] },
            IpRecord { ip: "2.3.4.5".to_string(), weight: 0, country: vec!["FR".to_string()], asn: vec![] },
        ];
        let mask = vec![Mask::White, Mask::White];
        let out = country_pass(&records, &mask, "DE");
        assert_eq!(out, vec![Mask::White, Mask::Black]);
    }
}
