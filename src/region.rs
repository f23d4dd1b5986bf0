// 🗺️ Region Canonicalizer - one key space for three datasets
//
// Problem solved:
// - "Uttar Pradesh", "UTTARPRADESH", "uttar pradesh " → UTTARPRADESH
// - "Jammu & Kashmir", "Jammu and Kashmir" → JAMMUANDKASHMIR
// - Historical renamings/mergers ("Daman & Diu", "Orissa") → current region id
// - "100000", "" → rejected (data-entry corruption, not a region)

use crate::error::AliasTableError;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

/// Alias table shipped with the crate, used when no external table is configured
pub const BUNDLED_ALIAS_TABLE: &str = include_str!("../config/region_aliases.json");

// ============================================================================
// CANONICAL REGION
// ============================================================================

/// One real administrative region. `id` is the canonical key; `aliases` are
/// the normalized spellings that collapse onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRegion {
    pub id: String,

    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct AliasTableFile {
    #[serde(default)]
    version: u32,
    regions: Vec<CanonicalRegion>,
}

// ============================================================================
// REJECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// Nothing left after normalization
    Empty,
    /// Only digits, e.g. a pincode typed into the state column
    Numeric,
}

/// A raw label that does not name a region. Callers drop the record and count it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub raw: String,
    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            RejectReason::Empty => write!(f, "empty region label {:?}", self.raw),
            RejectReason::Numeric => write!(f, "numeric region label {:?}", self.raw),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Steps 1-5 of canonicalization, without alias lookup:
/// uppercase, trim, `&` → `AND`, leading `THE` token dropped, whitespace removed.
///
/// The article is only dropped when it is a separate word, so "Theni" keeps its
/// prefix while "The Dadra ..." loses it.
pub fn normalize_label(raw: &str) -> String {
    let upper = raw.to_uppercase().replace('&', "AND");
    let mut tokens: Vec<&str> = upper.split_whitespace().collect();

    // A lone "THE" goes too, leaving an empty label
    if tokens.first() == Some(&"THE") {
        tokens.remove(0);
    }

    tokens.concat()
}

fn reject_reason(normalized: &str) -> Option<RejectReason> {
    if normalized.is_empty() {
        Some(RejectReason::Empty)
    } else if normalized.chars().all(char::is_numeric) {
        Some(RejectReason::Numeric)
    } else {
        None
    }
}

// ============================================================================
// ALIAS TABLE
// ============================================================================

/// Static raw → canonical mapping, validated once at load and never mutated.
#[derive(Debug, Clone)]
pub struct AliasTable {
    version: u32,
    regions: Vec<CanonicalRegion>,
    lookup: HashMap<String, String>,
}

impl AliasTable {
    /// The table bundled at `config/region_aliases.json`
    pub fn bundled() -> Result<Self, AliasTableError> {
        AliasTable::from_json(BUNDLED_ALIAS_TABLE)
    }

    /// Load an external alias table from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AliasTableError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| AliasTableError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;

        AliasTable::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, AliasTableError> {
        let file: AliasTableFile = serde_json::from_str(json)?;
        AliasTable::from_regions(file.version, file.regions)
    }

    /// Validate and index a list of regions.
    ///
    /// Aliases may be written in natural form; they are normalized here. An
    /// alias that normalizes to its own region id is dropped as redundant.
    pub fn from_regions(
        version: u32,
        regions: Vec<CanonicalRegion>,
    ) -> Result<Self, AliasTableError> {
        let mut lookup: HashMap<String, String> = HashMap::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut indexed = Vec::with_capacity(regions.len());

        for region in regions {
            let normalized_id = normalize_label(&region.id);
            if reject_reason(&normalized_id).is_some() {
                return Err(AliasTableError::InvalidAlias {
                    region: region.id.clone(),
                    alias: region.id,
                });
            }
            if normalized_id != region.id {
                return Err(AliasTableError::NonCanonicalId {
                    id: region.id,
                    normalized: normalized_id,
                });
            }
            if !seen_ids.insert(region.id.clone()) {
                return Err(AliasTableError::DuplicateRegion(region.id));
            }

            let mut aliases = BTreeSet::new();
            for alias in &region.aliases {
                let key = normalize_label(alias);
                if reject_reason(&key).is_some() {
                    return Err(AliasTableError::InvalidAlias {
                        region: region.id.clone(),
                        alias: alias.clone(),
                    });
                }
                if key == region.id {
                    continue;
                }
                if let Some(existing) = lookup.get(&key) {
                    if existing != &region.id {
                        return Err(AliasTableError::ConflictingAlias {
                            alias: alias.clone(),
                            first: existing.clone(),
                            second: region.id.clone(),
                        });
                    }
                }
                lookup.insert(key.clone(), region.id.clone());
                aliases.insert(key);
            }

            indexed.push(CanonicalRegion {
                id: region.id,
                aliases,
            });
        }

        // A canonical id that is also someone else's alias would make
        // canonicalization non-idempotent.
        for region in &indexed {
            if let Some(target) = lookup.get(&region.id) {
                return Err(AliasTableError::ChainedAlias {
                    id: region.id.clone(),
                    target: target.clone(),
                });
            }
        }

        info!(
            "Loaded alias table v{}: {} regions, {} aliases",
            version,
            indexed.len(),
            lookup.len()
        );

        Ok(AliasTable {
            version,
            regions: indexed,
            lookup,
        })
    }

    /// Canonical id for an already-normalized key, if the table knows it
    pub fn resolve(&self, normalized: &str) -> Option<&str> {
        self.lookup.get(normalized).map(String::as_str)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn regions(&self) -> &[CanonicalRegion] {
        &self.regions
    }

    /// Number of alias keys
    pub fn alias_count(&self) -> usize {
        self.lookup.len()
    }
}

// ============================================================================
// CANONICALIZER
// ============================================================================

/// Pure raw-label → region-id function over a static alias table.
/// Read-only after construction, so safe to share across rayon workers.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    table: AliasTable,
}

impl Canonicalizer {
    pub fn new(table: AliasTable) -> Self {
        Canonicalizer { table }
    }

    pub fn bundled() -> Result<Self, AliasTableError> {
        Ok(Canonicalizer::new(AliasTable::bundled()?))
    }

    /// Map a raw region label to its canonical id, or reject it.
    ///
    /// Example: "uttar pradesh " → "UTTARPRADESH", "Daman & Diu" →
    /// "DADRAANDNAGARHAVELIANDDAMANDIU", "560001" → rejected.
    pub fn canonicalize(&self, raw: &str) -> Result<String, Rejection> {
        let normalized = normalize_label(raw);

        if let Some(reason) = reject_reason(&normalized) {
            return Err(Rejection {
                raw: raw.to_string(),
                reason,
            });
        }

        match self.table.resolve(&normalized) {
            Some(id) => Ok(id.to_string()),
            None => Ok(normalized),
        }
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: &str, aliases: &[&str]) -> CanonicalRegion {
        CanonicalRegion {
            id: id.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_spelling_variants_collapse() {
        let canon = Canonicalizer::bundled().unwrap();

        for raw in ["Uttar Pradesh", "UTTARPRADESH", "uttar pradesh ", "  Uttar  Pradesh"] {
            assert_eq!(canon.canonicalize(raw).unwrap(), "UTTARPRADESH");
        }
    }

    #[test]
    fn test_ampersand_becomes_and() {
        let canon = Canonicalizer::bundled().unwrap();

        assert_eq!(
            canon.canonicalize("Jammu & Kashmir").unwrap(),
            canon.canonicalize("Jammu and Kashmir").unwrap()
        );
        assert_eq!(canon.canonicalize("Jammu & Kashmir").unwrap(), "JAMMUANDKASHMIR");
    }

    #[test]
    fn test_leading_article_stripped_only_as_word() {
        assert_eq!(normalize_label("The Nilgiris"), "NILGIRIS");
        assert_eq!(normalize_label("Theni"), "THENI");
        assert_eq!(normalize_label("THE"), "");
        assert_eq!(normalize_label("  the  "), "");

        let canon = Canonicalizer::bundled().unwrap();
        assert_eq!(canon.canonicalize("THE").unwrap_err().reason, RejectReason::Empty);
        assert_eq!(canon.canonicalize("Theni").unwrap(), "THENI");
    }

    #[test]
    fn test_merger_aliases_resolve() {
        let canon = Canonicalizer::bundled().unwrap();
        let merged = "DADRAANDNAGARHAVELIANDDAMANDIU";

        assert_eq!(canon.canonicalize("Daman & Diu").unwrap(), merged);
        assert_eq!(canon.canonicalize("Dadra and Nagar Haveli").unwrap(), merged);
        assert_eq!(
            canon
                .canonicalize("The Dadra And Nagar Haveli And Daman And Diu")
                .unwrap(),
            merged
        );
        assert_eq!(canon.canonicalize("West Bangal").unwrap(), "WESTBENGAL");
        assert_eq!(canon.canonicalize("West Bengal").unwrap(), "WESTBENGAL");
    }

    #[test]
    fn test_numeric_and_empty_rejected() {
        let canon = Canonicalizer::bundled().unwrap();

        let numeric = canon.canonicalize("100000").unwrap_err();
        assert_eq!(numeric.reason, RejectReason::Numeric);
        assert_eq!(numeric.raw, "100000");

        let spaced = canon.canonicalize(" 560 001 ").unwrap_err();
        assert_eq!(spaced.reason, RejectReason::Numeric);

        assert_eq!(canon.canonicalize("").unwrap_err().reason, RejectReason::Empty);
        assert_eq!(canon.canonicalize("   ").unwrap_err().reason, RejectReason::Empty);
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let canon = Canonicalizer::bundled().unwrap();
        let samples = [
            "Uttar Pradesh",
            "Daman & Diu",
            "the dadra and nagar haveli",
            "West Bangal",
            "Orissa",
            "Theni",
            "The The Odd Case",
            "tamil nadu",
        ];

        for raw in samples {
            let once = canon.canonicalize(raw).unwrap();
            let twice = canon.canonicalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_bundled_table_is_valid() {
        let table = AliasTable::bundled().unwrap();
        assert!(table.version() >= 1);
        assert!(table.alias_count() > 0);
        assert!(table
            .regions()
            .iter()
            .any(|r| r.id == "DADRAANDNAGARHAVELIANDDAMANDIU" && r.aliases.contains("DAMANANDDIU")));
    }

    #[test]
    fn test_conflicting_alias_is_fatal() {
        let err = AliasTable::from_regions(
            1,
            vec![region("ALPHA", &["Shared Name"]), region("BETA", &["shared name"])],
        )
        .unwrap_err();

        match err {
            AliasTableError::ConflictingAlias { first, second, .. } => {
                assert_eq!(first, "ALPHA");
                assert_eq!(second, "BETA");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_chained_alias_is_fatal() {
        let err = AliasTable::from_regions(
            1,
            vec![region("ALPHA", &["Beta"]), region("BETA", &["Gamma"])],
        )
        .unwrap_err();

        assert!(matches!(err, AliasTableError::ChainedAlias { ref id, .. } if id == "BETA"));
    }

    #[test]
    fn test_non_canonical_id_is_fatal() {
        let err = AliasTable::from_regions(1, vec![region("West Bengal", &[])]).unwrap_err();
        assert!(matches!(err, AliasTableError::NonCanonicalId { ref normalized, .. } if normalized == "WESTBENGAL"));
    }

    #[test]
    fn test_numeric_alias_is_fatal() {
        let err = AliasTable::from_regions(1, vec![region("ALPHA", &["12345"])]).unwrap_err();
        assert!(matches!(err, AliasTableError::InvalidAlias { .. }));
    }

    #[test]
    fn test_duplicate_region_is_fatal() {
        let err =
            AliasTable::from_regions(1, vec![region("ALPHA", &[]), region("ALPHA", &[])]).unwrap_err();
        assert!(matches!(err, AliasTableError::DuplicateRegion(ref id) if id == "ALPHA"));
    }

    #[test]
    fn test_self_alias_is_dropped() {
        let table = AliasTable::from_regions(1, vec![region("WESTBENGAL", &["West Bengal"])]).unwrap();
        assert_eq!(table.alias_count(), 0);
    }

    #[test]
    fn test_from_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.json");
        fs::write(
            &path,
            r#"{"version": 3, "regions": [{"id": "ODISHA", "aliases": ["Orissa"]}]}"#,
        )
        .unwrap();

        let canon = Canonicalizer::new(AliasTable::from_file(&path).unwrap());
        assert_eq!(canon.table().version(), 3);
        assert_eq!(canon.canonicalize("orissa").unwrap(), "ODISHA");

        assert!(matches!(
            AliasTable::from_json("{ not json"),
            Err(AliasTableError::Parse(_))
        ));
        assert!(matches!(
            AliasTable::from_file(dir.path().join("missing.json")),
            Err(AliasTableError::Io { .. })
        ));
    }
}
