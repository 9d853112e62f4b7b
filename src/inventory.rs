//! Prizes a player currently holds, pending conversion or withdrawal.

use crate::{
    errors::{EngineError, Result},
    ledger::{account_key, account_lock, Account},
    storage::{RowLocks, Store},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Item keys embed the owning account, so an ownership check is a key
/// lookup rather than a field comparison.
pub fn item_key(account: u64, id: Uuid) -> Vec<u8> {
    format!("item:{account}:{id}").into_bytes()
}

fn account_items_prefix(account: u64) -> Vec<u8> {
    format!("item:{account}:").into_bytes()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub account: u64,
    pub prize: String,
    /// Value captured at the moment of winning; catalog moves don't touch it.
    pub value: u64,
    pub image: Option<String>,
    pub withdrawable: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub payout: u64,
    pub new_balance: u64,
}

#[derive(Clone)]
pub struct InventoryStore {
    store: Store,
    locks: RowLocks,
    bonus_permille: u64,
}

impl InventoryStore {
    pub fn new(store: Store, locks: RowLocks, bonus_permille: u64) -> Self {
        Self {
            store,
            locks,
            bonus_permille,
        }
    }

    pub fn list(&self, account: u64) -> Result<Vec<InventoryItem>> {
        let rows: Vec<(Vec<u8>, InventoryItem)> =
            self.store.scan_prefix(&account_items_prefix(account))?;
        let mut items: Vec<_> = rows.into_iter().map(|(_, item)| item).collect();
        items.sort_by_key(|item| item.created_at);
        Ok(items)
    }

    pub fn get(&self, account: u64, id: Uuid) -> Result<Option<InventoryItem>> {
        self.store.get(&item_key(account, id))
    }

    /// Convert a held prize back into balance: credit value × bonus and
    /// delete the item in one batch, under the account lock. The item being
    /// gone is the proof the credit was applied; the pair can't diverge.
    pub async fn convert(&self, account: u64, id: Uuid) -> Result<Conversion> {
        let lock = self.locks.key(&account_lock(account));
        let _guard = lock.lock().await;

        let item = self
            .store
            .get::<InventoryItem>(&item_key(account, id))?
            .ok_or(EngineError::ItemNotFound)?;
        let mut row = self
            .store
            .get::<Account>(&account_key(account))?
            .ok_or(EngineError::AccountNotFound(account))?;

        let payout = (item.value as u128 * self.bonus_permille as u128 / 1_000) as u64;
        row.balance += payout;

        let mut batch = self.store.batch();
        batch.put(&account_key(account), &row)?;
        batch.delete(&item_key(account, id));
        self.store.commit(batch)?;

        info!(
            account,
            item = %id,
            prize = %item.prize,
            payout,
            "inventory item converted"
        );

        Ok(Conversion {
            payout,
            new_balance: row.balance,
        })
    }
}
