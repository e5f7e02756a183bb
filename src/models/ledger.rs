use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{purchase_entity as purchases, usage_entity as usages};

/// 流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Earn,
    Spend,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Earn => write!(f, "earn"),
            EntryKind::Spend => write!(f, "spend"),
        }
    }
}

/// 指向某条流水的引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EntryRef {
    pub kind: EntryKind,
    pub id: i64,
}

/// 账本流水：赚取或消费
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    Earn(purchases::Model),
    Spend(usages::Model),
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::Earn(_) => EntryKind::Earn,
            LedgerEntry::Spend(_) => EntryKind::Spend,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            LedgerEntry::Earn(p) => p.id,
            LedgerEntry::Spend(u) => u.id,
        }
    }

    pub fn entry_ref(&self) -> EntryRef {
        EntryRef {
            kind: self.kind(),
            id: self.id(),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEntry::Earn(p) => p.created_at,
            LedgerEntry::Spend(u) => u.created_at,
        }
    }
}

/// 一行赚取明细；points_earned 由外部定价/返现比例计算，这里不再重算
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarnItem {
    pub product_id: Option<i64>,
    pub quantity: i32,
    /// 金额（美分）
    pub gross_amount: i64,
    pub points_earned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordEarnRequest {
    pub customer_id: i64,
    pub items: Vec<EarnItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordEarnResponse {
    pub entry_ids: Vec<i64>,
    pub points_earned: i64,
    pub new_balance: i64,
    pub lifetime_earnings: i64,
}

/// 消费上下文（可选）
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SpendContext {
    pub product_id: Option<i64>,
    pub quantity: Option<i32>,
    /// 单价（美分），缺省等于积分数
    pub unit_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordSpendRequest {
    pub customer_id: i64,
    pub points: i64,
    #[serde(default)]
    pub context: Option<SpendContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecordSpendResponse {
    pub entry_id: i64,
    pub points_spent: i64,
    pub new_balance: i64,
}

/// 撤销（或冲正）结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReversalResponse {
    pub kind: EntryKind,
    pub entry_id: i64,
    pub customer_id: i64,
    pub points: i64,
    pub new_balance: i64,
    /// 仅撤销赚取时返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_earnings: Option<i64>,
}
