//! API request/response models.

use crate::{
    board::{Board, ResolvedSlot},
    deposit::DepositIntent,
    inventory::InventoryItem,
    ledger::Account,
    withdraw::WithdrawalTask,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: u64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub balance: u64,
    pub last_free_wager: Option<DateTime<Utc>>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            display_name: account.display_name,
            balance: account.balance,
            last_free_wager: account.last_free_wager,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub prize: String,
    pub value: u64,
    pub withdrawable: bool,
    pub image: Option<String>,
}

impl From<&ResolvedSlot> for SlotView {
    fn from(slot: &ResolvedSlot) -> Self {
        Self {
            prize: slot.prize.clone(),
            value: slot.value,
            withdrawable: slot.withdrawable,
            image: slot.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardResponse {
    pub tier: String,
    pub seed: String,
    pub stake: u64,
    pub slots: Vec<SlotView>,
    pub expires_at: DateTime<Utc>,
}

impl BoardResponse {
    pub fn new(board: &Board, stake: u64) -> Self {
        Self {
            tier: board.tier.clone(),
            seed: board.seed.clone(),
            stake,
            slots: board.slots.iter().map(SlotView::from).collect(),
            expires_at: board.expires_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardQuery {
    pub seed: String,
}

// Missing fields deserialize empty and fail the explicit 400 checks instead
// of bouncing off the JSON extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct WagerRequest {
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub seed: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeWagerRequest {
    #[serde(default)]
    pub seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerResponse {
    pub prize: String,
    pub value: u64,
    pub slot_index: usize,
    pub new_balance: u64,
    pub item_id: Uuid,
    pub free: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositBeginResponse {
    pub token: String,
    pub destination: String,
    pub expires_at: DateTime<Utc>,
}

impl DepositBeginResponse {
    pub fn new(intent: &DepositIntent, destination: &str) -> Self {
        Self {
            token: intent.token.clone(),
            destination: destination.to_string(),
            expires_at: intent.expires_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositVerifyRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositVerifyResponse {
    /// `not_found | pending | expired | success`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credited: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemView {
    pub id: Uuid,
    pub prize: String,
    pub value: u64,
    pub withdrawable: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<InventoryItem> for ItemView {
    fn from(item: InventoryItem) -> Self {
        Self {
            id: item.id,
            prize: item.prize,
            value: item.value,
            withdrawable: item.withdrawable,
            image: item.image,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryResponse {
    pub items: Vec<ItemView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub payout: u64,
    pub new_balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawRequest {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub id: Uuid,
    pub account: u64,
    pub prize: String,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub lease: Option<DateTime<Utc>>,
}

impl From<WithdrawalTask> for TaskView {
    fn from(task: WithdrawalTask) -> Self {
        Self {
            id: task.id,
            account: task.account,
            prize: task.prize,
            item_id: task.item,
            created_at: task.created_at,
            lease: task.lease,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainResponse {
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditRequest {
    pub account: u64,
    pub prize: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditResponse {
    pub credited: u64,
    pub new_balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogUpsertRequest {
    pub entries: Vec<crate::catalog::PriceUpsert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogUpsertResponse {
    pub upserted: usize,
}
