//! Durable hand-off of prize withdrawals to the external fulfillment worker.
//!
//! Tasks live in the shared store under two key families: `wtask:pending:`
//! and `wtask:leased:`. A drain atomically moves every pending task (plus
//! any task whose lease lapsed) into the leased set and returns the batch;
//! the worker acknowledges each task with `complete`, which removes the task
//! and consumes the referenced inventory item. A worker crash therefore
//! costs a lease interval, not an item.

use crate::{
    errors::{EngineError, Result},
    inventory::{item_key, InventoryItem},
    storage::{RowLocks, Store},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const PENDING_PREFIX: &[u8] = b"wtask:pending:";
const LEASED_PREFIX: &[u8] = b"wtask:leased:";

// One logical queue; drains and acks serialize on a single lock key.
const QUEUE_LOCK: &str = "wtask:queue";

fn pending_key(id: Uuid) -> Vec<u8> {
    format!("wtask:pending:{id}").into_bytes()
}

fn leased_key(id: Uuid) -> Vec<u8> {
    format!("wtask:leased:{id}").into_bytes()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalTask {
    pub id: Uuid,
    pub account: u64,
    pub prize: String,
    /// The inventory item to hand off; left in place until the ack.
    pub item: Uuid,
    pub created_at: DateTime<Utc>,
    /// Deadline for the current fulfillment attempt, set while leased.
    pub lease: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct WithdrawalQueue {
    store: Store,
    locks: RowLocks,
    lease: Duration,
}

impl WithdrawalQueue {
    pub fn new(store: Store, locks: RowLocks, lease_secs: i64) -> Self {
        Self {
            store,
            locks,
            lease: Duration::seconds(lease_secs),
        }
    }

    /// Queue a withdrawal for `item`. The item must be a withdrawable prize;
    /// fixed-value slots never leave the system. The item itself is neither
    /// deleted nor marked here.
    pub async fn enqueue(&self, account: u64, item: &InventoryItem) -> Result<WithdrawalTask> {
        if item.account != account {
            return Err(EngineError::ItemNotFound);
        }
        if !item.withdrawable {
            return Err(EngineError::NotWithdrawable);
        }

        let lock = self.locks.key(QUEUE_LOCK);
        let _guard = lock.lock().await;

        let task = WithdrawalTask {
            id: Uuid::new_v4(),
            account,
            prize: item.prize.clone(),
            item: item.id,
            created_at: Utc::now(),
            lease: None,
        };
        self.store.put(&pending_key(task.id), &task)?;
        info!(account, task = %task.id, prize = %task.prize, "withdrawal queued");
        Ok(task)
    }

    /// Claim every pending task (and every task whose lease has lapsed)
    /// under a fresh lease, in one atomic batch.
    pub async fn drain(&self) -> Result<Vec<WithdrawalTask>> {
        let lock = self.locks.key(QUEUE_LOCK);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let deadline = now + self.lease;

        let mut claimed = Vec::new();
        let mut batch = self.store.batch();

        let pending: Vec<(Vec<u8>, WithdrawalTask)> = self.store.scan_prefix(PENDING_PREFIX)?;
        for (key, mut task) in pending {
            batch.delete(&key);
            task.lease = Some(deadline);
            batch.put(&leased_key(task.id), &task)?;
            claimed.push(task);
        }

        // Re-offer work whose worker went quiet.
        let leased: Vec<(Vec<u8>, WithdrawalTask)> = self.store.scan_prefix(LEASED_PREFIX)?;
        for (key, mut task) in leased {
            if task.lease.is_some_and(|lease| lease <= now) {
                batch.delete(&key);
                task.lease = Some(deadline);
                batch.put(&leased_key(task.id), &task)?;
                claimed.push(task);
            }
        }

        self.store.commit(batch)?;
        if !claimed.is_empty() {
            info!(count = claimed.len(), "withdrawal tasks drained");
        }
        Ok(claimed)
    }

    /// Acknowledge fulfillment: remove the task and consume the item it
    /// referenced, atomically.
    pub async fn complete(&self, task_id: Uuid) -> Result<()> {
        let lock = self.locks.key(QUEUE_LOCK);
        let _guard = lock.lock().await;

        let key = leased_key(task_id);
        let task: WithdrawalTask = match self.store.get(&key)? {
            Some(task) => task,
            // An ack may race a re-drain that has not happened yet.
            None => self
                .store
                .get(&pending_key(task_id))?
                .ok_or(EngineError::TaskNotFound)?,
        };

        let mut batch = self.store.batch();
        batch.delete(&leased_key(task_id));
        batch.delete(&pending_key(task_id));
        // The item may already be gone if the player converted it while the
        // withdrawal was in flight; the ack still stands.
        batch.delete(&item_key(task.account, task.item));
        self.store.commit(batch)?;

        info!(task = %task_id, account = task.account, "withdrawal completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(lease_secs: i64) -> (tempfile::TempDir, Store, WithdrawalQueue) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = WithdrawalQueue::new(store.clone(), RowLocks::new(), lease_secs);
        (dir, store, queue)
    }

    fn seed_item(store: &Store, account: u64, withdrawable: bool) -> InventoryItem {
        let item = InventoryItem {
            id: Uuid::new_v4(),
            account,
            prize: "Crystal Swan".into(),
            value: 800,
            image: None,
            withdrawable,
            created_at: Utc::now(),
        };
        store.put(&item_key(account, item.id), &item).unwrap();
        item
    }

    #[tokio::test]
    async fn enqueue_leaves_the_item_in_place() {
        let (_dir, store, queue) = fixture(300);
        let item = seed_item(&store, 1, true);

        let task = queue.enqueue(1, &item).await.unwrap();
        assert_eq!(task.item, item.id);
        assert!(store
            .get::<InventoryItem>(&item_key(1, item.id))
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn fixed_value_prizes_cannot_be_withdrawn() {
        let (_dir, store, queue) = fixture(300);
        let item = seed_item(&store, 1, false);
        let err = queue.enqueue(1, &item).await.unwrap_err();
        assert!(matches!(err, EngineError::NotWithdrawable));
    }

    #[tokio::test]
    async fn foreign_items_cannot_be_enqueued() {
        let (_dir, store, queue) = fixture(300);
        let item = seed_item(&store, 2, true);
        let err = queue.enqueue(1, &item).await.unwrap_err();
        assert!(matches!(err, EngineError::ItemNotFound));
    }

    #[tokio::test]
    async fn drain_claims_once_per_lease() {
        let (_dir, store, queue) = fixture(300);
        let item_a = seed_item(&store, 1, true);
        let item_b = seed_item(&store, 2, true);
        queue.enqueue(1, &item_a).await.unwrap();
        queue.enqueue(2, &item_b).await.unwrap();

        let first = queue.drain().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.lease.is_some()));

        // Nothing pending and no lease lapsed: second drain is empty.
        let second = queue.drain().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn lapsed_leases_are_reoffered() {
        let (_dir, store, queue) = fixture(0);
        let item = seed_item(&store, 1, true);
        queue.enqueue(1, &item).await.unwrap();

        let first = queue.drain().await.unwrap();
        assert_eq!(first.len(), 1);
        // Lease of 0s lapses immediately; the task comes back.
        let second = queue.drain().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
    }

    #[tokio::test]
    async fn complete_consumes_task_and_item() {
        let (_dir, store, queue) = fixture(300);
        let item = seed_item(&store, 1, true);
        queue.enqueue(1, &item).await.unwrap();
        let tasks = queue.drain().await.unwrap();

        queue.complete(tasks[0].id).await.unwrap();
        assert!(store
            .get::<InventoryItem>(&item_key(1, item.id))
            .unwrap()
            .is_none());
        assert!(queue.drain().await.unwrap().is_empty());

        let err = queue.complete(tasks[0].id).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskNotFound));
    }

    #[tokio::test]
    async fn complete_before_drain_acks_a_pending_task() {
        let (_dir, store, queue) = fixture(300);
        let item = seed_item(&store, 1, true);
        let task = queue.enqueue(1, &item).await.unwrap();

        queue.complete(task.id).await.unwrap();
        assert!(queue.drain().await.unwrap().is_empty());
    }
}
