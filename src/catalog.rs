//! Price catalog: current external market value per prize name.
//!
//! The catalog is read-only to the settlement core. Writes arrive as periodic
//! bulk upserts from the external price-refresh job through the service API.

use crate::{
    errors::Result,
    storage::Store,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PRICE_PREFIX: &[u8] = b"price:name:";

fn price_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(PRICE_PREFIX.len() + name.len());
    key.extend_from_slice(PRICE_PREFIX);
    key.extend_from_slice(name.as_bytes());
    key
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub name: String,
    /// Current market value in internal minor units.
    pub value: u64,
    pub image: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

/// Incoming row of a bulk upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpsert {
    pub name: String,
    pub value: u64,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Clone)]
pub struct PriceCatalog {
    store: Store,
}

impl PriceCatalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn lookup(&self, name: &str) -> Result<Option<PriceEntry>> {
        self.store.get(&price_key(name))
    }

    /// Every entry, ordered by name. Board generation relies on this ordering
    /// so that range draws do not depend on store iteration details.
    pub fn all(&self) -> Result<Vec<PriceEntry>> {
        let rows: Vec<(Vec<u8>, PriceEntry)> = self.store.scan_prefix(PRICE_PREFIX)?;
        Ok(rows.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Replace or insert entries in one atomic write.
    pub fn upsert_bulk(&self, entries: &[PriceUpsert]) -> Result<usize> {
        let now = Utc::now();
        let mut batch = self.store.batch();
        for upsert in entries {
            let entry = PriceEntry {
                name: upsert.name.clone(),
                value: upsert.value,
                image: upsert.image.clone(),
                refreshed_at: now,
            };
            batch.put(&price_key(&entry.name), &entry)?;
        }
        self.store.commit(batch)?;
        Ok(entries.len())
    }
}
