//! In-memory zone label index
//!
//! Ported from the reference implementation's `iradix`-backed `Zone.FindLocation`
//! (original_source/types/zone.go): reverse the query name's labels, insert
//! every intermediate `.`-boundary as an empty-nonterminal marker, and do a
//! longest-prefix match. No radix/trie crate appears anywhere in the example
//! corpus, so the tree is a `BTreeMap` keyed by the reversed label path —
//! `BTreeMap::range` gives the same longest-prefix-via-ordered-keys behavior
//! a radix tree would, without a new dependency.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Wildcard,
    EmptyNonterminal,
    ClosestEncloser,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    /// A real label with records (or the apex).
    Label(String),
    /// An intermediate boundary with no records of its own.
    EmptyNonterminal,
}

/// Reverses a name's labels so "www.example.com." becomes "com.example.www.",
/// giving ordinary lexicographic `BTreeMap` ordering the same locality a
/// radix tree built on labels would have.
fn reverse_labels(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed.split('.').rev().collect::<Vec<_>>().join(".")
}

/// Index over a single zone's labels, built once per zone load and swapped
/// in place on reload (never mutated after construction).
pub struct ZoneIndex {
    apex: String,
    tree: BTreeMap<String, Entry>,
}

impl ZoneIndex {
    /// Builds the index from a zone apex and its label list (as returned by
    /// `ZoneStore::getLocations`). Labels are `@` for the apex, `*` for the
    /// wildcard, or a relative label such as `www`.
    pub fn new(apex: &str, labels: &[String]) -> ZoneIndex {
        let mut tree = BTreeMap::new();

        for label in labels {
            // The apex is handled as a standalone shortcut in `find_label`,
            // mirroring zone.go's `query == z.Name` check ahead of any tree
            // lookup — it never goes into `tree` itself, so a miss on some
            // other name can't walk up into a spurious apex hit.
            if label == "@" {
                continue;
            }

            let fqdn = Self::fqdn(apex, label);
            let key = reverse_labels(&fqdn);

            // Insert every intermediate "." boundary as an empty nonterminal,
            // mirroring zone.go's NewZone inserting nil-valued prefixes.
            let parts: Vec<&str> = key.split('.').collect();
            for i in 1..parts.len() {
                let prefix = parts[..i].join(".");
                tree.entry(prefix).or_insert(Entry::EmptyNonterminal);
            }

            tree.insert(key, Entry::Label(label.clone()));
        }

        ZoneIndex {
            apex: apex.to_lowercase(),
            tree,
        }
    }

    fn fqdn(apex: &str, label: &str) -> String {
        if label == "@" {
            apex.to_string()
        } else {
            format!("{}.{}", label, apex)
        }
    }

    /// Longest-prefix match of `qname` (lower-cased, trailing dot) against
    /// this zone, per spec §4.1's result matrix.
    pub fn find_label(&self, qname: &str) -> (String, MatchKind) {
        let qname = qname.to_lowercase();

        if qname == self.apex {
            return ("@".to_string(), MatchKind::Exact);
        }

        let key = reverse_labels(&qname);

        if let Some(Entry::Label(label)) = self.tree.get(&key) {
            // Exact match. A sibling wildcard never outranks an exact hit.
            return (label.clone(), MatchKind::Exact);
        }

        // Longest matching prefix, walking from the full key down to nothing.
        let parts: Vec<&str> = key.split('.').collect();
        for i in (0..parts.len()).rev() {
            let prefix = parts[..i].join(".");
            let prefix_key = if prefix.is_empty() {
                String::new()
            } else {
                prefix
            };

            match self.tree.get(&prefix_key) {
                Some(Entry::Label(label)) => {
                    let wildcard_key = format!("{}.*", prefix_key);
                    if let Some(Entry::Label(wlabel)) = self.tree.get(&wildcard_key) {
                        return (wlabel.clone(), MatchKind::Wildcard);
                    }
                    return (label.clone(), MatchKind::ClosestEncloser);
                }
                Some(Entry::EmptyNonterminal) => {
                    if prefix_key == key {
                        return (String::new(), MatchKind::EmptyNonterminal);
                    }
                    // keep walking up; this boundary alone proves nothing matched yet
                }
                None => {}
            }
        }

        if let Some(Entry::Label(label)) = self.tree.get("*") {
            return (label.clone(), MatchKind::Wildcard);
        }

        (String::new(), MatchKind::None)
    }
}

/// Returns the longest configured zone apex that is a suffix of `qname`, or
/// `None` if no zone is authoritative for it.
pub fn locate_zone<'a>(qname: &str, zones: impl Iterator<Item = &'a str>) -> Option<String> {
    let qname = qname.to_lowercase();
    let mut best: Option<&str> = None;

    for zone in zones {
        let zone_lower = zone.to_lowercase();
        if qname == zone_lower || qname.ends_with(&format!(".{}", zone_lower)) {
            if best.map(|b| zone_lower.len() > b.len()).unwrap_or(true) {
                best = Some(zone);
            }
        }
    }

    best.map(|z| z.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec![
            "@".to_string(),
            "www".to_string(),
            "mail".to_string(),
            "*".to_string(),
        ]
    }

    #[test]
    fn locate_zone_picks_longest_apex() {
        let zones = vec!["example.com.", "sub.example.com."];
        let found = locate_zone("www.sub.example.com.", zones.into_iter());
        assert_eq!(found, Some("sub.example.com.".to_string()));
    }

    #[test]
    fn locate_zone_none_when_not_authoritative() {
        let zones = vec!["example.com."];
        assert_eq!(locate_zone("other.net.", zones.into_iter()), None);
    }

    #[test]
    fn apex_is_exact() {
        let idx = ZoneIndex::new("example.com.", &labels());
        assert_eq!(
            idx.find_label("example.com."),
            ("@".to_string(), MatchKind::Exact)
        );
    }

    #[test]
    fn exact_label_match() {
        let idx = ZoneIndex::new("example.com.", &labels());
        assert_eq!(
            idx.find_label("www.example.com."),
            ("www".to_string(), MatchKind::Exact)
        );
    }

    #[test]
    fn wildcard_used_when_no_closer_match() {
        let idx = ZoneIndex::new("example.com.", &labels());
        let (label, kind) = idx.find_label("nope.example.com.");
        assert_eq!(label, "*");
        assert_eq!(kind, MatchKind::Wildcard);
    }

    #[test]
    fn exact_beats_sibling_wildcard() {
        let labels = vec!["@".to_string(), "www".to_string(), "*".to_string()];
        let idx = ZoneIndex::new("example.com.", &labels);
        let (label, kind) = idx.find_label("www.example.com.");
        assert_eq!(label, "www");
        assert_eq!(kind, MatchKind::Exact);
    }

    #[test]
    fn no_match_without_any_wildcard() {
        let labels = vec!["@".to_string(), "www".to_string()];
        let idx = ZoneIndex::new("example.com.", &labels);
        let (_, kind) = idx.find_label("nope.example.com.");
        assert_eq!(kind, MatchKind::None);
    }
}
