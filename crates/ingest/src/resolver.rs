//! Fuzzy site-name resolution against the canonical registry.
//!
//! Two tiers: full canonical names first, then the short/generic aliases of
//! the same municipality. Results depend only on the distinct (municipality,
//! raw name) pairs and the registry snapshot, never on row order.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::DEFAULT_MATCH_THRESHOLD;
use crate::error::IngestError;
use crate::model::{CanonicalSite, CleanedRow, MatchTier, SiteKey, SiteMapping, SiteMatch};
use crate::normalize::{code_key, normalize_name};
use crate::similarity::similarity;

/// Read-only lookup of canonical sites.
pub trait SiteRegistry {
    /// Every site owned by `municipality`. Implementations compare
    /// municipality names with `code_key`, so case and accents do not matter.
    fn sites_for_municipality(&self, municipality: &str) -> Result<Vec<CanonicalSite>, IngestError>;
}

/// In-memory registry, mostly for tests and CSV-loaded snapshots.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    sites: Vec<CanonicalSite>,
}

impl StaticRegistry {
    pub fn new(sites: Vec<CanonicalSite>) -> Self {
        Self { sites }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl SiteRegistry for StaticRegistry {
    fn sites_for_municipality(
        &self,
        municipality: &str,
    ) -> Result<Vec<CanonicalSite>, IngestError> {
        let key = code_key(municipality);
        Ok(self
            .sites
            .iter()
            .filter(|s| code_key(&s.municipality) == key)
            .cloned()
            .collect())
    }
}

/// Generic names that mean "no alias".
const SENTINEL_GENERIC_NAMES: &[&str] = &[
    "",
    "no aplica",
    "na",
    "n a",
    "sin definir",
    "sin nombre",
    "ninguno",
    "no registra",
];

/// Candidate pools for one municipality, built once per resolve call.
struct Pools {
    sites: Vec<CanonicalSite>,
    /// (normalized full name, site index), sorted.
    full: Vec<(String, usize)>,
    /// (normalized generic name, site index), sorted, sentinels removed.
    generic: Vec<(String, usize)>,
}

impl Pools {
    fn build(sites: Vec<CanonicalSite>) -> Self {
        let mut full: Vec<(String, usize)> = sites
            .iter()
            .enumerate()
            .map(|(i, s)| (normalize_name(&s.full_name), i))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        let mut generic: Vec<(String, usize)> = sites
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.generic_name.as_deref().map(|g| (normalize_name(g), i)))
            .filter(|(name, _)| !SENTINEL_GENERIC_NAMES.contains(&name.as_str()))
            .collect();

        // Stable pool order makes ties deterministic
        let order = |a: &(String, usize), b: &(String, usize)| {
            a.0.cmp(&b.0).then_with(|| sites[a.1].code.cmp(&sites[b.1].code))
        };
        full.sort_by(order);
        generic.sort_by(order);

        Self { sites, full, generic }
    }

    fn is_empty(&self) -> bool {
        self.full.is_empty() && self.generic.is_empty()
    }
}

/// Highest-scoring entry; the first one wins a tie.
fn best(pool: &[(String, usize)], name: &str) -> Option<(u8, usize)> {
    let mut winner: Option<(u8, usize)> = None;
    for (candidate, idx) in pool {
        let score = similarity(name, candidate);
        if winner.map_or(true, |(s, _)| score > s) {
            winner = Some((score, *idx));
        }
        if score == 100 {
            break;
        }
    }
    winner
}

/// Mapping plus the non-fatal problems met while building it.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub mapping: SiteMapping,
    pub warnings: Vec<String>,
}

impl Resolution {
    pub fn get(&self, key: &SiteKey) -> Option<&SiteMatch> {
        self.mapping.get(key)
    }
}

pub struct SiteNameResolver<'a> {
    registry: &'a dyn SiteRegistry,
    threshold: u8,
    fallback_municipality: String,
}

impl<'a> SiteNameResolver<'a> {
    pub fn new(registry: &'a dyn SiteRegistry, fallback_municipality: &str) -> Self {
        Self {
            registry,
            threshold: DEFAULT_MATCH_THRESHOLD,
            fallback_municipality: code_key(fallback_municipality),
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Municipality a row is resolved in: its own, or the scope fallback
    /// when the layout carries none.
    pub fn key_for(&self, row: &CleanedRow) -> SiteKey {
        let municipality = row
            .municipality
            .as_deref()
            .map(code_key)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.fallback_municipality.clone());
        SiteKey {
            municipality,
            raw_name: row.site.clone(),
        }
    }

    /// Distinct keys over a row set.
    pub fn distinct_keys(&self, rows: &[CleanedRow]) -> BTreeSet<SiteKey> {
        rows.iter().map(|r| self.key_for(r)).collect()
    }

    pub fn resolve(&self, keys: &BTreeSet<SiteKey>) -> Resolution {
        let mut resolution = Resolution::default();
        let mut pools: BTreeMap<&str, Option<Pools>> = BTreeMap::new();

        for key in keys {
            let pool = pools.entry(key.municipality.as_str()).or_insert_with(|| {
                match self.registry.sites_for_municipality(&key.municipality) {
                    Ok(sites) => Some(Pools::build(sites)),
                    Err(e) => {
                        log::warn!("site registry failed for {}: {}", key.municipality, e);
                        resolution.warnings.push(format!(
                            "site registry unavailable for municipality {}: {}",
                            key.municipality, e
                        ));
                        None
                    }
                }
            });

            let site_match = match pool {
                Some(pool) => self.match_name(pool, &key.raw_name),
                None => SiteMatch::unmatched(0),
            };
            log::debug!(
                "{} / {:?} -> {} ({})",
                key.municipality,
                key.raw_name,
                site_match.tier,
                site_match.score
            );
            resolution.mapping.insert(key.clone(), site_match);
        }

        resolution
    }

    fn match_name(&self, pools: &Pools, raw_name: &str) -> SiteMatch {
        let name = normalize_name(raw_name);
        if name.is_empty() || pools.is_empty() {
            return SiteMatch::unmatched(0);
        }

        let full = best(&pools.full, &name);
        if let Some((score, idx)) = full {
            if score >= self.threshold {
                return accepted(&pools.sites[idx], MatchTier::ExactOrFuzzyFull, score);
            }
        }

        let generic = best(&pools.generic, &name);
        if let Some((score, idx)) = generic {
            if score >= self.threshold {
                return accepted(&pools.sites[idx], MatchTier::FuzzyGeneric, score);
            }
        }

        let top = full.map(|(s, _)| s).max(generic.map(|(s, _)| s)).unwrap_or(0);
        SiteMatch::unmatched(top)
    }
}

fn accepted(site: &CanonicalSite, tier: MatchTier, score: u8) -> SiteMatch {
    SiteMatch {
        resolved_name: Some(site.full_name.clone()),
        site_code: Some(site.code.clone()),
        industrialized: Some(site.industrialized),
        tier,
        score,
    }
}
