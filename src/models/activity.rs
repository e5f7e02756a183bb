use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::EntryKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ActivityQuery {
    /// 回看天数（默认 7，最大 90）
    pub days: Option<u32>,
}

impl ActivityQuery {
    pub const DEFAULT_DAYS: u32 = 7;
    pub const MAX_DAYS: u32 = 90;

    pub fn get_days(&self) -> u32 {
        self.days
            .unwrap_or(Self::DEFAULT_DAYS)
            .clamp(1, Self::MAX_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivityItem {
    pub kind: EntryKind,
    pub entry_id: i64,
    pub customer_id: i64,
    pub points: i64,
    /// 金额（美分）：赚取为 gross_amount，消费为 unit_price * quantity
    pub amount: i64,
    pub quantity: i32,
    pub product_id: Option<i64>,
    pub created_by_staff: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// 仅当前查看员工可撤销的那一条为 true
    pub reversible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub points_earned: i64,
    pub points_spent: i64,
    pub items: Vec<ActivityItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ActivityFeed {
    pub days: Vec<ActivityDay>,
    /// 条数超限时为 true；此时只返回最新的一段，最旧一天的合计可能不完整
    pub truncated: bool,
}
