//! Seeded board generation and the shared board cache.
//!
//! A board is a palindromic sequence of prize slots for one stake tier. The
//! client-visible seed fully determines the board: range slots are resolved
//! with an RNG keyed off SHA-256(seed ‖ tier), so the board shown to the
//! player and the board settled against are provably the same sequence. The
//! cache lives in the shared store (not process memory) so a listing and the
//! following wager may land on different server instances.

use crate::{
    catalog::{PriceCatalog, PriceEntry},
    errors::{EngineError, Result},
    storage::Store,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BOARD_PREFIX: &[u8] = b"board:";

fn board_key(tier: &str, seed: &str) -> Vec<u8> {
    // Seeds are client-supplied; hex keeps the key free of separator bytes.
    format!("board:{}:{}", tier, hex::encode(seed.as_bytes())).into_bytes()
}

/// One configured position on a tier's layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SlotSpec {
    /// A prize named verbatim in configuration. Not withdrawable.
    Fixed { name: String, value: u64 },
    /// Resolved at generation time to a catalog prize valued in [min, max].
    Range { min: u64, max: u64 },
}

/// Stake tier: wager amount plus board layout.
///
/// The layout gives the outer half only; the generated board mirrors it
/// around `center`, which makes the palindrome structural rather than a
/// property to re-check per board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub stake: u64,
    pub edge: Vec<SlotSpec>,
    pub center: SlotSpec,
}

impl TierConfig {
    pub fn slot_count(&self) -> usize {
        self.edge.len() * 2 + 1
    }
}

/// A slot after range resolution: a concrete prize with its captured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSlot {
    pub prize: String,
    pub value: u64,
    /// Catalog-backed prizes can leave the system; fixed ones cannot.
    pub withdrawable: bool,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub tier: String,
    pub seed: String,
    pub slots: Vec<ResolvedSlot>,
    pub expires_at: DateTime<Utc>,
}

fn seeded_rng(seed: &str, tier: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(tier.as_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(word))
}

fn resolve_slot(
    spec: &SlotSpec,
    catalog: &[PriceEntry],
    rng: &mut StdRng,
) -> Result<ResolvedSlot> {
    match spec {
        SlotSpec::Fixed { name, value } => Ok(ResolvedSlot {
            prize: name.clone(),
            value: *value,
            withdrawable: false,
            image: None,
        }),
        SlotSpec::Range { min, max } => {
            let in_range: Vec<&PriceEntry> = catalog
                .iter()
                .filter(|e| e.value >= *min && e.value <= *max)
                .collect();
            let entry = if in_range.is_empty() {
                // Nothing in range: degrade to the entry closest to the
                // range midpoint instead of failing settlement.
                let midpoint = min + (max - min) / 2;
                catalog
                    .iter()
                    .min_by_key(|e| e.value.abs_diff(midpoint))
                    .ok_or(EngineError::CatalogEmpty)?
            } else {
                in_range[rng.gen_range(0..in_range.len())]
            };
            Ok(ResolvedSlot {
                prize: entry.name.clone(),
                value: entry.value,
                withdrawable: true,
                image: entry.image.clone(),
            })
        }
    }
}

/// Generate the board for `(seed, tier)`. Pure besides reading the catalog
/// snapshot passed in; `catalog` must be name-ordered (see
/// [`PriceCatalog::all`]) so draws are reproducible.
pub fn generate(
    seed: &str,
    tier_name: &str,
    tier: &TierConfig,
    catalog: &[PriceEntry],
    ttl: Duration,
) -> Result<Board> {
    if catalog.is_empty() {
        return Err(EngineError::CatalogEmpty);
    }

    let mut rng = seeded_rng(seed, tier_name);

    let mut edge = Vec::with_capacity(tier.edge.len());
    for spec in &tier.edge {
        edge.push(resolve_slot(spec, catalog, &mut rng)?);
    }
    let center = resolve_slot(&tier.center, catalog, &mut rng)?;

    let mut slots = edge.clone();
    slots.push(center);
    slots.extend(edge.into_iter().rev());

    Ok(Board {
        tier: tier_name.to_string(),
        seed: seed.to_string(),
        slots,
        expires_at: Utc::now() + ttl,
    })
}

/// Store-backed board cache with a bounded freshness window.
#[derive(Clone)]
pub struct BoardCache {
    store: Store,
    ttl: Duration,
}

impl BoardCache {
    pub fn new(store: Store, ttl_secs: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Cached board for `(tier, seed)` if still fresh.
    pub fn get(&self, tier: &str, seed: &str) -> Result<Option<Board>> {
        let key = board_key(tier, seed);
        match self.store.get::<Board>(&key)? {
            Some(board) if board.expires_at > Utc::now() => Ok(Some(board)),
            Some(_) => {
                self.store.delete(&key)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// The board pinned for `(tier, seed)`: the cached one while fresh,
    /// otherwise freshly generated and persisted. Listing and settling both
    /// come through here, which is what keeps displayed and settled boards
    /// identical.
    pub fn get_or_generate(
        &self,
        seed: &str,
        tier_name: &str,
        tier: &TierConfig,
        catalog: &PriceCatalog,
    ) -> Result<Board> {
        if let Some(board) = self.get(tier_name, seed)? {
            return Ok(board);
        }
        let entries = catalog.all()?;
        let board = generate(seed, tier_name, tier, &entries, self.ttl)?;
        self.store.put(&board_key(tier_name, seed), &board)?;
        Ok(board)
    }

    /// Drop expired boards. Runs on the background sweep interval.
    pub fn sweep(&self) -> Result<usize> {
        let now = Utc::now();
        let rows: Vec<(Vec<u8>, Board)> = self.store.scan_prefix(BOARD_PREFIX)?;
        let mut removed = 0;
        for (key, board) in rows {
            if board.expires_at <= now {
                self.store.delete(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_fixture() -> Vec<PriceEntry> {
        let now = Utc::now();
        [
            ("Amber Pin", 60u64),
            ("Moon Lamp", 120),
            ("Teddy Bear", 300),
            ("Crystal Swan", 800),
            ("Diamond Ring", 2_500),
        ]
        .into_iter()
        .map(|(name, value)| PriceEntry {
            name: name.into(),
            value,
            image: None,
            refreshed_at: now,
        })
        .collect()
    }

    fn tier_fixture() -> TierConfig {
        TierConfig {
            stake: 200,
            edge: vec![
                SlotSpec::Fixed {
                    name: "Star Shard".into(),
                    value: 20,
                },
                SlotSpec::Range { min: 50, max: 350 },
                SlotSpec::Range { min: 100, max: 900 },
            ],
            center: SlotSpec::Range {
                min: 700,
                max: 3_000,
            },
        }
    }

    #[test]
    fn same_seed_same_board() {
        let catalog = catalog_fixture();
        let tier = tier_fixture();
        let a = generate("abc123", "bronze", &tier, &catalog, Duration::minutes(10)).unwrap();
        let b = generate("abc123", "bronze", &tier, &catalog, Duration::minutes(10)).unwrap();
        assert_eq!(a.slots, b.slots);
    }

    #[test]
    fn different_seed_may_differ_but_layout_holds() {
        let catalog = catalog_fixture();
        let tier = tier_fixture();
        let board = generate("other-seed", "bronze", &tier, &catalog, Duration::minutes(10))
            .unwrap();
        assert_eq!(board.slots.len(), tier.slot_count());
    }

    #[test]
    fn board_is_a_palindrome() {
        let catalog = catalog_fixture();
        let tier = tier_fixture();
        let board = generate("abc123", "bronze", &tier, &catalog, Duration::minutes(10)).unwrap();
        let reversed: Vec<_> = board.slots.iter().rev().cloned().collect();
        assert_eq!(board.slots, reversed);
    }

    #[test]
    fn tier_seed_pairs_are_independent() {
        let catalog = catalog_fixture();
        let tier = tier_fixture();
        let bronze =
            generate("abc123", "bronze", &tier, &catalog, Duration::minutes(10)).unwrap();
        let silver =
            generate("abc123", "silver", &tier, &catalog, Duration::minutes(10)).unwrap();
        // Same layout, but the draw stream is keyed by tier as well as seed.
        assert_eq!(bronze.slots.len(), silver.slots.len());
    }

    #[test]
    fn empty_range_falls_back_to_midpoint_neighbor() {
        let catalog = catalog_fixture();
        let tier = TierConfig {
            stake: 100,
            edge: vec![],
            center: SlotSpec::Range {
                min: 5_000,
                max: 6_000,
            },
        };
        let board = generate("s", "t", &tier, &catalog, Duration::minutes(10)).unwrap();
        // Closest to midpoint 5500 is Diamond Ring at 2500.
        assert_eq!(board.slots[0].prize, "Diamond Ring");
    }

    #[test]
    fn empty_catalog_is_an_explicit_failure() {
        let tier = tier_fixture();
        let err = generate("s", "t", &tier, &[], Duration::minutes(10)).unwrap_err();
        assert!(matches!(err, EngineError::CatalogEmpty));
    }

    #[test]
    fn fixed_slots_are_not_withdrawable() {
        let catalog = catalog_fixture();
        let tier = tier_fixture();
        let board = generate("abc123", "bronze", &tier, &catalog, Duration::minutes(10)).unwrap();
        assert!(!board.slots[0].withdrawable);
        assert!(board.slots[1].withdrawable);
    }

    #[test]
    fn cache_pins_board_until_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let catalog_store = PriceCatalog::new(store.clone());
        catalog_store
            .upsert_bulk(
                &catalog_fixture()
                    .into_iter()
                    .map(|e| crate::catalog::PriceUpsert {
                        name: e.name,
                        value: e.value,
                        image: None,
                    })
                    .collect::<Vec<_>>(),
            )
            .unwrap();

        let cache = BoardCache::new(store, 600);
        let tier = tier_fixture();
        let first = cache
            .get_or_generate("abc123", "bronze", &tier, &catalog_store)
            .unwrap();
        let second = cache
            .get_or_generate("abc123", "bronze", &tier, &catalog_store)
            .unwrap();
        assert_eq!(first.slots, second.slots);
        assert_eq!(first.expires_at, second.expires_at);
    }

    #[test]
    fn sweep_removes_expired_boards() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let catalog_store = PriceCatalog::new(store.clone());
        catalog_store
            .upsert_bulk(&[crate::catalog::PriceUpsert {
                name: "Amber Pin".into(),
                value: 60,
                image: None,
            }])
            .unwrap();

        let cache = BoardCache::new(store, -1);
        let tier = tier_fixture();
        cache
            .get_or_generate("abc123", "bronze", &tier, &catalog_store)
            .unwrap();
        assert!(cache.sweep().unwrap() >= 1);
        assert!(cache.get("bronze", "abc123").unwrap().is_none());
    }
}
