//! Deposit reconciliation: correlating deposit intents with transfers
//! observed on the external ledger.
//!
//! An intent moves `pending → completed` or `pending → expired`, exactly
//! once. The transition and the balance credit commit in one batch under the
//! intent's token lock, so two concurrent verifies on the same token cannot
//! both credit.

use crate::{
    chain::{ChainGateway, InboundTransfer},
    config::DepositConfig,
    errors::{EngineError, Result},
    ledger::{account_key, account_lock, Account},
    storage::{RowLocks, Store},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NANO_PER_COIN: u128 = 1_000_000_000;

fn intent_key(token: &str) -> Vec<u8> {
    format!("deposit:intent:{token}").into_bytes()
}

fn intent_lock(token: &str) -> String {
    format!("deposit:intent:{token}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Completed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositIntent {
    pub token: String,
    pub account: u64,
    pub external_kind: String,
    pub status: DepositStatus,
    /// Internal units credited, set on completion.
    pub credited: Option<u64>,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a verify call reports back to the player.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    NotFound,
    /// Non-terminal; the caller may verify again later.
    Pending,
    Expired,
    Credited { amount: u64, new_balance: u64 },
}

#[derive(Clone)]
pub struct DepositReconciler {
    store: Store,
    locks: RowLocks,
    gateway: Arc<dyn ChainGateway>,
    cfg: DepositConfig,
}

impl DepositReconciler {
    pub fn new(
        store: Store,
        locks: RowLocks,
        gateway: Arc<dyn ChainGateway>,
        cfg: DepositConfig,
    ) -> Self {
        Self {
            store,
            locks,
            gateway,
            cfg,
        }
    }

    /// Destination players transfer to, returned alongside the token.
    pub fn destination(&self) -> &str {
        &self.cfg.wallet_address
    }

    /// Create a fresh pending intent with an unguessable correlation token.
    pub fn begin(&self, account: u64) -> Result<DepositIntent> {
        let nonce: [u8; 8] = rand::random();
        let token = format!("{}_{}", self.cfg.token_prefix, hex::encode(nonce));
        let now = Utc::now();
        let intent = DepositIntent {
            token: token.clone(),
            account,
            external_kind: self.cfg.external_kind.clone(),
            status: DepositStatus::Pending,
            credited: None,
            requested_at: now,
            expires_at: now + Duration::seconds(self.cfg.expiry_secs),
        };
        self.store.put(&intent_key(&token), &intent)?;
        info!(account, token = %token, "deposit intent created");
        Ok(intent)
    }

    /// Run one verification pass for `(account, token)`.
    pub async fn verify(&self, account: u64, token: &str) -> Result<VerifyOutcome> {
        let lock = self.locks.key(&intent_lock(token));
        let _guard = lock.lock().await;

        let Some(mut intent) = self.store.get::<DepositIntent>(&intent_key(token))? else {
            return Ok(VerifyOutcome::NotFound);
        };
        // Terminal intents and foreign tokens both read as not-found; a
        // completed token must not leak whether it ever existed.
        if intent.account != account || intent.status != DepositStatus::Pending {
            return Ok(VerifyOutcome::NotFound);
        }

        let now = Utc::now();
        if now > intent.expires_at {
            intent.status = DepositStatus::Expired;
            self.store.put(&intent_key(token), &intent)?;
            info!(account, token = %token, "deposit intent expired");
            return Ok(VerifyOutcome::Expired);
        }

        let Some(transfer) = self.find_transfer(token).await else {
            return Ok(VerifyOutcome::Pending);
        };

        let amount = self.to_internal_units(&transfer);
        // Lock order is fixed crate-wide: intent token, then account row.
        let row_lock = self.locks.key(&account_lock(intent.account));
        let _row_guard = row_lock.lock().await;

        let mut row = self
            .store
            .get::<Account>(&account_key(intent.account))?
            .ok_or(EngineError::AccountNotFound(intent.account))?;
        row.balance += amount;
        intent.status = DepositStatus::Completed;
        intent.credited = Some(amount);

        let mut batch = self.store.batch();
        batch.put(&account_key(intent.account), &row)?;
        batch.put(&intent_key(token), &intent)?;
        self.store.commit(batch)?;

        info!(
            account,
            token = %token,
            amount,
            nano = transfer.amount_nano,
            "deposit credited"
        );
        Ok(VerifyOutcome::Credited {
            amount,
            new_balance: row.balance,
        })
    }

    fn to_internal_units(&self, transfer: &InboundTransfer) -> u64 {
        (transfer.amount_nano as u128 * self.cfg.units_per_coin as u128 / NANO_PER_COIN) as u64
    }

    /// Bounded scan of the external ledger: a fixed number of attempts with
    /// a fixed delay, the whole thing under one overall timeout. Transient
    /// gateway failures count as not-found-this-attempt.
    async fn find_transfer(&self, memo: &str) -> Option<InboundTransfer> {
        let overall = std::time::Duration::from_secs(self.cfg.verify_timeout_secs);
        let scan = async {
            for attempt in 1..=self.cfg.retry_attempts {
                match self
                    .gateway
                    .find_inbound(&self.cfg.wallet_address, memo)
                    .await
                {
                    Ok(Some(transfer)) => return Some(transfer),
                    Ok(None) => {
                        debug!(memo, attempt, "no matching transfer yet");
                    }
                    Err(e) => {
                        warn!(memo, attempt, error = %e, "gateway query failed");
                    }
                }
                if attempt < self.cfg.retry_attempts {
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.cfg.retry_delay_ms,
                    ))
                    .await;
                }
            }
            None
        };
        match tokio::time::timeout(overall, scan).await {
            Ok(found) => found,
            Err(_) => {
                warn!(memo, "verify scan hit the overall timeout");
                None
            }
        }
    }
}
