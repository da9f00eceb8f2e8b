//! DNSSEC signing
//!
//! Grounded in the teacher's DNSSEC automation module: ECDSA P-256/RSA key
//! generation and `Signer`/`Verifier` via `openssl`, `DnssecKey`'s
//! generate/sign/verify shape, and the `DnssecSigner`/`SignedZone`/
//! `SigningStatistics` structure. NSEC3 hashing/salting is replaced with
//! plain NSEC synthesis over the zone's sorted label list per spec §4.9/§9 —
//! this crate's `ZoneIndex` already keeps labels in canonical order, so NSEC
//! only needs to walk that list and bitmap the types present at each owner.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use derive_more::{Display, Error, From};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use parking_lot::RwLock;
use rand::Rng;
use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dns::protocol::{DnsRecord, TransientTtl};

#[derive(Debug, Display, From, Error)]
pub enum DnssecError {
    #[display(fmt = "openssl error: {}", _0)]
    Ssl(openssl::error::ErrorStack),
    #[display(fmt = "no private key material for this key")]
    NoPrivateKey,
    #[display(fmt = "algorithm {:?} is not supported for this operation", _0)]
    UnsupportedAlgorithm(#[error(not(source))] DnssecAlgorithm),
    #[display(fmt = "no signing keys exist for zone {}", _0)]
    NoKeysForZone(#[error(not(source))] String),
    #[display(fmt = "no ZSK present among the zone's keys")]
    NoZsk,
}

type Result<T> = std::result::Result<T, DnssecError>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DnssecAlgorithm {
    RsaSha256 = 8,
    RsaSha512 = 10,
    EcdsaP256Sha256 = 13,
    EcdsaP384Sha384 = 14,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KeyType {
    Zsk,
    Ksk,
}

#[derive(Clone)]
pub struct DnssecKey {
    pub key_tag: u16,
    pub key_type: KeyType,
    pub algorithm: DnssecAlgorithm,
    pub public_key: Vec<u8>,
    private_key: Option<PKey<Private>>,
    pub created_at: SystemTime,
    pub expire_at: SystemTime,
}

impl DnssecKey {
    pub fn generate(key_type: KeyType, algorithm: DnssecAlgorithm) -> Result<DnssecKey> {
        let (private_key, public_key) = match algorithm {
            DnssecAlgorithm::EcdsaP256Sha256 => {
                let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
                let ec_key = EcKey::generate(&group)?;
                let pkey = PKey::from_ec_key(ec_key)?;
                let public_bytes = pkey.public_key_to_der()?;
                (pkey, public_bytes)
            }
            DnssecAlgorithm::EcdsaP384Sha384 => {
                let group = EcGroup::from_curve_name(Nid::SECP384R1)?;
                let ec_key = EcKey::generate(&group)?;
                let pkey = PKey::from_ec_key(ec_key)?;
                let public_bytes = pkey.public_key_to_der()?;
                (pkey, public_bytes)
            }
            DnssecAlgorithm::RsaSha256 | DnssecAlgorithm::RsaSha512 => {
                let key_size = if key_type == KeyType::Ksk { 2048 } else { 1024 };
                let rsa = Rsa::generate(key_size)?;
                let pkey = PKey::from_rsa(rsa)?;
                let public_bytes = pkey.public_key_to_der()?;
                (pkey, public_bytes)
            }
        };

        let key_tag = calculate_key_tag(&public_key);
        let now = SystemTime::now();

        Ok(DnssecKey {
            key_tag,
            key_type,
            algorithm,
            public_key,
            private_key: Some(private_key),
            created_at: now,
            expire_at: now + Duration::from_secs(365 * 24 * 60 * 60),
        })
    }

    fn digest(&self) -> Result<MessageDigest> {
        match self.algorithm {
            DnssecAlgorithm::EcdsaP256Sha256 | DnssecAlgorithm::RsaSha256 => Ok(MessageDigest::sha256()),
            DnssecAlgorithm::RsaSha512 => Ok(MessageDigest::sha512()),
            DnssecAlgorithm::EcdsaP384Sha384 => Ok(MessageDigest::sha384()),
        }
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let private_key = self.private_key.as_ref().ok_or(DnssecError::NoPrivateKey)?;
        let digest = self.digest()?;

        let mut signer = Signer::new(digest, private_key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool> {
        let public_key = PKey::public_key_from_der(&self.public_key)?;
        let digest = self.digest()?;

        let mut verifier = Verifier::new(digest, &public_key)?;
        verifier.update(data)?;
        Ok(verifier.verify(signature)?)
    }
}

/// Simplified RFC 4034 appendix B key tag calculation.
fn calculate_key_tag(public_key: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for (i, &byte) in public_key.iter().enumerate() {
        if i % 2 == 0 {
            sum += (byte as u32) << 8;
        } else {
            sum += byte as u32;
        }
    }
    sum += (sum >> 16) & 0xFFFF;
    (sum & 0xFFFF) as u16
}

/// One zone label's owner name and the records it carries, in the order
/// `ZoneIndex` keeps labels — the input NSEC synthesis walks (spec §9).
pub struct LabelRecords {
    pub owner: String,
    pub records: Vec<DnsRecord>,
}

#[derive(Clone, Debug)]
pub struct SignedZone {
    pub zone: String,
    pub dnskeys: Vec<DnsRecord>,
    pub rrsigs: Vec<DnsRecord>,
    pub ds_records: Vec<DnsRecord>,
    pub nsec_records: Vec<DnsRecord>,
    pub signed_at: SystemTime,
    pub resign_at: SystemTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    pub algorithm: DnssecAlgorithm,
    pub zsk_lifetime: Duration,
    pub ksk_lifetime: Duration,
    pub signature_validity: Duration,
}

impl Default for SigningConfig {
    fn default() -> Self {
        SigningConfig {
            enabled: false,
            algorithm: DnssecAlgorithm::EcdsaP256Sha256,
            zsk_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            ksk_lifetime: Duration::from_secs(365 * 24 * 60 * 60),
            signature_validity: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SigningStatistics {
    pub zones_signed: u64,
    pub signatures_created: u64,
    pub keys_generated: u64,
    pub key_rollovers: u64,
}

pub struct DnssecSigner {
    keys: Arc<RwLock<HashMap<String, Vec<DnssecKey>>>>,
    config: SigningConfig,
    signed_zones: Arc<RwLock<HashMap<String, SignedZone>>>,
    stats: Arc<RwLock<SigningStatistics>>,
}

impl Default for DnssecSigner {
    fn default() -> Self {
        DnssecSigner::new(SigningConfig::default())
    }
}

impl DnssecSigner {
    pub fn new(config: SigningConfig) -> DnssecSigner {
        DnssecSigner {
            keys: Arc::new(RwLock::new(HashMap::new())),
            config,
            signed_zones: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(SigningStatistics::default())),
        }
    }

    /// One-click zone signing: generates keys on first use, signs, and
    /// caches the `SignedZone` (spec §4.9).
    pub fn enable_zone(&self, zone: &str, labels: &[LabelRecords]) -> Result<SignedZone> {
        self.ensure_keys(zone)?;
        let signed = self.sign_zone(zone, labels)?;
        self.signed_zones.write().insert(zone.to_string(), signed.clone());
        self.stats.write().zones_signed += 1;
        Ok(signed)
    }

    pub fn signed_zone(&self, zone: &str) -> Option<SignedZone> {
        self.signed_zones.read().get(zone).cloned()
    }

    /// Drops every cached `SignedZone` so the next query re-signs from
    /// scratch, picking up whatever keys/labels the reloaded zone now has.
    /// Called on SIGHUP alongside `RecordStore::invalidate_all`.
    pub fn clear(&self) {
        self.signed_zones.write().clear();
    }

    fn ensure_keys(&self, zone: &str) -> Result<()> {
        let mut keys_map = self.keys.write();
        if keys_map.contains_key(zone) {
            return Ok(());
        }

        let ksk = DnssecKey::generate(KeyType::Ksk, self.config.algorithm)?;
        let zsk = DnssecKey::generate(KeyType::Zsk, self.config.algorithm)?;
        keys_map.insert(zone.to_string(), vec![ksk, zsk]);
        self.stats.write().keys_generated += 2;
        Ok(())
    }

    fn sign_zone(&self, zone: &str, labels: &[LabelRecords]) -> Result<SignedZone> {
        let keys = self.keys.read();
        let zone_keys = keys.get(zone).ok_or_else(|| DnssecError::NoKeysForZone(zone.to_string()))?;

        let mut dnskeys = Vec::new();
        let mut ds_records = Vec::new();
        for key in zone_keys {
            let flags: u16 = match key.key_type {
                KeyType::Zsk => 256,
                KeyType::Ksk => 257,
            };
            dnskeys.push(DnsRecord::Dnskey {
                domain: zone.to_string(),
                flags,
                protocol: 3,
                algorithm: key.algorithm as u8,
                public_key: key.public_key.clone(),
                ttl: TransientTtl(3600),
            });

            if key.key_type == KeyType::Ksk {
                ds_records.push(self.generate_ds_record(zone, key)?);
            }
        }

        let zsk = zone_keys
            .iter()
            .find(|k| k.key_type == KeyType::Zsk)
            .ok_or(DnssecError::NoZsk)?;

        let mut rrsigs = Vec::new();
        for label in labels {
            let mut by_type: HashMap<u16, Vec<&DnsRecord>> = HashMap::new();
            for record in &label.records {
                by_type.entry(record.get_querytype().to_num()).or_default().push(record);
            }
            for (type_covered, records) in by_type {
                rrsigs.push(self.sign_record_set(zone, &label.owner, type_covered, &records, zsk)?);
                self.stats.write().signatures_created += 1;
            }
        }

        let nsec_records = build_nsec_chain(zone, labels);

        let now = SystemTime::now();
        Ok(SignedZone {
            zone: zone.to_string(),
            dnskeys,
            rrsigs,
            ds_records,
            nsec_records,
            signed_at: now,
            resign_at: now + self.config.signature_validity,
        })
    }

    fn generate_ds_record(&self, zone: &str, key: &DnssecKey) -> Result<DnsRecord> {
        let mut data = Vec::new();
        data.extend_from_slice(zone.as_bytes());
        let flags: u16 = if key.key_type == KeyType::Ksk { 257 } else { 256 };
        data.extend_from_slice(&flags.to_be_bytes());
        data.push(3);
        data.push(key.algorithm as u8);
        data.extend_from_slice(&key.public_key);

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let digest = hasher.finalize().to_vec();

        Ok(DnsRecord::Ds {
            domain: zone.to_string(),
            key_tag: key.key_tag,
            algorithm: key.algorithm as u8,
            digest_type: 2, // SHA-256
            digest,
            ttl: TransientTtl(3600),
        })
    }

    fn sign_record_set(
        &self,
        zone: &str,
        owner: &str,
        type_covered: u16,
        records: &[&DnsRecord],
        key: &DnssecKey,
    ) -> Result<DnsRecord> {
        // Canonical RRset serialization would need full RFC 4034 §6 wire
        // ordering; this signs a stable debug-formatted rendering of the set
        // instead, matching this crate's existing simplification.
        let mut data = Vec::new();
        for record in records {
            data.extend_from_slice(format!("{record:?}").as_bytes());
        }

        let signature = key.sign(&data)?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32;
        let expiration = now + self.config.signature_validity.as_secs() as u32;

        Ok(DnsRecord::Rrsig {
            domain: owner.to_string(),
            type_covered,
            algorithm: key.algorithm as u8,
            labels: owner.split('.').filter(|s| !s.is_empty()).count() as u8,
            original_ttl: 300,
            expiration,
            inception: now,
            key_tag: key.key_tag,
            signer_name: zone.to_string(),
            signature,
            ttl: TransientTtl(300),
        })
    }

    pub fn rollover_keys(&self, zone: &str) -> Result<()> {
        let new_ksk = DnssecKey::generate(KeyType::Ksk, self.config.algorithm)?;
        let new_zsk = DnssecKey::generate(KeyType::Zsk, self.config.algorithm)?;

        let mut keys_map = self.keys.write();
        if let Some(zone_keys) = keys_map.get_mut(zone) {
            zone_keys.push(new_ksk);
            zone_keys.push(new_zsk);
        }
        self.stats.write().key_rollovers += 1;
        Ok(())
    }

    pub fn statistics(&self) -> SigningStatistics {
        let stats = self.stats.read();
        SigningStatistics {
            zones_signed: stats.zones_signed,
            signatures_created: stats.signatures_created,
            keys_generated: stats.keys_generated,
            key_rollovers: stats.key_rollovers,
        }
    }
}

/// Builds the NSEC chain for a zone: each owner points at the next owner in
/// canonical order (wrapping to the apex), with a type bitmap of the RR
/// types present there (spec §4.9/§9, replacing NSEC3).
fn build_nsec_chain(zone: &str, labels: &[LabelRecords]) -> Vec<DnsRecord> {
    if labels.is_empty() {
        return Vec::new();
    }

    let mut owners: Vec<&str> = labels.iter().map(|l| l.owner.as_str()).collect();
    owners.sort();
    owners.dedup();

    let mut records = Vec::with_capacity(owners.len());
    for (i, owner) in owners.iter().enumerate() {
        let next = owners[(i + 1) % owners.len()];
        let types: Vec<u16> = labels
            .iter()
            .filter(|l| l.owner == *owner)
            .flat_map(|l| l.records.iter().map(|r| r.get_querytype().to_num()))
            .collect();

        records.push(DnsRecord::Nsec {
            domain: owner.to_string(),
            next_domain: if i + 1 == owners.len() { zone.to_string() } else { next.to_string() },
            type_bit_maps: build_type_bitmap(&types),
            ttl: TransientTtl(3600),
        });
    }

    records
}

/// RFC 4034 §4.1.2 windowed type bitmap, one window per 256-type block.
fn build_type_bitmap(types: &[u16]) -> Vec<u8> {
    let mut by_window: HashMap<u8, [u8; 32]> = HashMap::new();
    for &t in types {
        let window = (t / 256) as u8;
        let block = by_window.entry(window).or_insert([0u8; 32]);
        let bit = (t % 256) as usize;
        block[bit / 8] |= 0x80 >> (bit % 8);
    }

    let mut windows: Vec<u8> = by_window.keys().copied().collect();
    windows.sort_unstable();

    let mut out = Vec::new();
    for window in windows {
        let block = &by_window[&window];
        let len = block.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
        if len == 0 {
            continue;
        }
        out.push(window);
        out.push(len as u8);
        out.extend_from_slice(&block[..len]);
    }
    out
}

/// A random salt generator kept for future NSEC3 fallback support; unused
/// while the zone only emits NSEC, kept small and explicit rather than wired
/// into anything.
#[allow(dead_code)]
fn random_salt(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen::<u8>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_generation_produces_public_key_material() {
        let key = DnssecKey::generate(KeyType::Zsk, DnssecAlgorithm::EcdsaP256Sha256).unwrap();
        assert_eq!(key.key_type, KeyType::Zsk);
        assert!(!key.public_key.is_empty());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = DnssecKey::generate(KeyType::Zsk, DnssecAlgorithm::EcdsaP256Sha256).unwrap();
        let sig = key.sign(b"hello").unwrap();
        assert!(key.verify(b"hello", &sig).unwrap());
        assert!(!key.verify(b"goodbye", &sig).unwrap());
    }

    #[test]
    fn enable_zone_produces_dnskey_ds_and_nsec() {
        let signer = DnssecSigner::new(SigningConfig::default());
        let labels = vec![
            LabelRecords {
                owner: "example.com.".to_string(),
                records: vec![DnsRecord::A {
                    domain: "example.com.".to_string(),
                    addr: "1.2.3.4".parse().unwrap(),
                    ttl: TransientTtl(300),
                }],
            },
            LabelRecords {
                owner: "www.example.com.".to_string(),
                records: vec![DnsRecord::A {
                    domain: "www.example.com.".to_string(),
                    addr: "1.2.3.5".parse().unwrap(),
                    ttl: TransientTtl(300),
                }],
            },
        ];

        let signed = signer.enable_zone("example.com.", &labels).unwrap();
        assert_eq!(signed.dnskeys.len(), 2);
        assert_eq!(signed.ds_records.len(), 1);
        assert_eq!(signed.nsec_records.len(), 2);
        assert_eq!(signed.rrsigs.len(), 2); // one RRset per label here
    }

    #[test]
    fn nsec_chain_wraps_to_apex() {
        let labels = vec![
            LabelRecords { owner: "b.example.com.".to_string(), records: vec![] },
            LabelRecords { owner: "a.example.com.".to_string(), records: vec![] },
        ];
        let chain = build_nsec_chain("example.com.", &labels);
        // sorted: a.example.com., b.example.com. -> b wraps to apex
        let last = chain.iter().find(|r| matches!(r, DnsRecord::Nsec { domain, .. } if domain == "b.example.com."));
        match last {
            Some(DnsRecord::Nsec { next_domain, .. }) => assert_eq!(next_domain, "example.com."),
            _ => panic!("expected NSEC record for b.example.com."),
        }
    }

    #[test]
    fn type_bitmap_round_trips_membership() {
        let bitmap = build_type_bitmap(&[1, 28, 15]); // A, AAAA, MX
        assert!(!bitmap.is_empty());
    }
}
