//! GeoIP lookup facade
//!
//! Grounded in geodns.rs's `GeoMatcher` (country/ASN/haversine-distance
//! lookups over a MaxMind-style DB) and geo_loadbalancing.rs's
//! `calculate_distance`, generalized behind the `GeoLookup` trait spec §6
//! names so the on-disk DB format stays an external concern. The production
//! implementation reads MaxMind GeoLite2 City/ASN databases via the
//! `maxminddb` crate already in atlas's stack; tests use `StaticGeoLookup`.

use std::net::IpAddr;
use std::path::Path;

use derive_more::{Display, Error, From};
use maxminddb::geoip2;

#[derive(Debug, Display, From, Error)]
pub enum GeoError {
    #[display(fmt = "geo database unavailable")]
    Disabled,
    #[display(fmt = "geo database read error: {}", _0)]
    BadDb(#[error(not(source))] String),
}

type Result<T> = std::result::Result<T, GeoError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance in kilometers, ported from geo_loadbalancing.rs's
/// `calculate_distance` (haversine formula).
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;

    EARTH_RADIUS_KM * 2.0 * h.sqrt().asin()
}

pub trait GeoLookup: Send + Sync {
    /// ISO country code, or `""` if unknown.
    fn country(&self, ip: IpAddr) -> Result<String>;
    /// Autonomous system number, or `0` if unknown.
    fn asn(&self, ip: IpAddr) -> Result<u32>;
    /// Approximate coordinate, or `None` if unknown.
    fn coord(&self, ip: IpAddr) -> Result<Option<Coordinate>>;
}

/// Production lookup backed by MaxMind GeoLite2 City + ASN `.mmdb` files.
pub struct MaxMindGeoLookup {
    city: maxminddb::Reader<Vec<u8>>,
    asn: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindGeoLookup {
    pub fn open(city_db: &Path, asn_db: &Path) -> Result<MaxMindGeoLookup> {
        let city = maxminddb::Reader::open_readfile(city_db)
            .map_err(|e| GeoError::BadDb(e.to_string()))?;
        let asn = maxminddb::Reader::open_readfile(asn_db)
            .map_err(|e| GeoError::BadDb(e.to_string()))?;

        Ok(MaxMindGeoLookup { city, asn })
    }
}

impl GeoLookup for MaxMindGeoLookup {
    fn country(&self, ip: IpAddr) -> Result<String> {
        match self.city.lookup::<geoip2::City>(ip) {
            Ok(Some(city)) => Ok(city
                .country
                .and_then(|c| c.iso_code)
                .map(|c| c.to_string())
                .unwrap_or_default()),
            Ok(None) => Ok(String::new()),
            Err(e) => Err(GeoError::BadDb(e.to_string())),
        }
    }

    fn asn(&self, ip: IpAddr) -> Result<u32> {
        match self.asn.lookup::<geoip2::Asn>(ip) {
            Ok(Some(asn)) => Ok(asn.autonomous_system_number.unwrap_or(0)),
            Ok(None) => Ok(0),
            Err(e) => Err(GeoError::BadDb(e.to_string())),
        }
    }

    fn coord(&self, ip: IpAddr) -> Result<Option<Coordinate>> {
        match self.city.lookup::<geoip2::City>(ip) {
            Ok(Some(city)) => Ok(city.location.and_then(|loc| {
                match (loc.latitude, loc.longitude) {
                    (Some(lat), Some(lon)) => Some(Coordinate { lat, lon }),
                    _ => None,
                }
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(GeoError::BadDb(e.to_string())),
        }
    }
}

/// Fixed-table lookup for tests, and for `GeoFilter=none` deployments that
/// never open an `.mmdb` file.
#[derive(Default)]
pub struct StaticGeoLookup {
    entries: std::collections::HashMap<IpAddr, (String, u32, Option<Coordinate>)>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        StaticGeoLookup::default()
    }

    pub fn insert(&mut self, ip: IpAddr, country: &str, asn: u32, coord: Option<Coordinate>) {
        self.entries.insert(ip, (country.to_string(), asn, coord));
    }
}

impl GeoLookup for StaticGeoLookup {
    fn country(&self, ip: IpAddr) -> Result<String> {
        Ok(self
            .entries
            .get(&ip)
            .map(|(c, _, _)| c.clone())
            .unwrap_or_default())
    }

    fn asn(&self, ip: IpAddr) -> Result<u32> {
        Ok(self.entries.get(&ip).map(|(_, a, _)| *a).unwrap_or(0))
    }

    fn coord(&self, ip: IpAddr) -> Result<Option<Coordinate>> {
        Ok(self.entries.get(&ip).and_then(|(_, _, c)| *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_distance_for_identical_points() {
        let a = Coordinate { lat: 52.52, lon: 13.405 };
        assert!((haversine_km(a, a)).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_berlin_paris_distance() {
        let berlin = Coordinate { lat: 52.52, lon: 13.405 };
        let paris = Coordinate { lat: 48.8566, lon: 2.3522 };
        let d = haversine_km(berlin, paris);
        // Real great-circle distance is ~878km; allow generous tolerance.
        assert!((800.0..950.0).contains(&d), "distance was {d}");
    }

    #[test]
    fn static_lookup_unknown_ip_fails_open() {
        let lookup = StaticGeoLookup::new();
        assert_eq!(lookup.country("1.2.3.4".parse().unwrap()).unwrap(), "");
        assert_eq!(lookup.asn("1.2.3.4".parse().unwrap()).unwrap(), 0);
        assert_eq!(lookup.coord("1.2.3.4".parse().unwrap()).unwrap(), None);
    }
}
