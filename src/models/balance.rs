use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 会员等级，由累计赚取积分纯函数推导，不落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyTier {
    pub const SILVER_THRESHOLD: i64 = 1_000;
    pub const GOLD_THRESHOLD: i64 = 5_000;
    pub const PLATINUM_THRESHOLD: i64 = 20_000;

    pub fn from_lifetime_earnings(points: i64) -> Self {
        match points {
            p if p >= Self::PLATINUM_THRESHOLD => LoyaltyTier::Platinum,
            p if p >= Self::GOLD_THRESHOLD => LoyaltyTier::Gold,
            p if p >= Self::SILVER_THRESHOLD => LoyaltyTier::Silver,
            _ => LoyaltyTier::Bronze,
        }
    }

    /// 下一等级及其门槛；白金为最高级
    pub fn next(self) -> Option<(LoyaltyTier, i64)> {
        match self {
            LoyaltyTier::Bronze => Some((LoyaltyTier::Silver, Self::SILVER_THRESHOLD)),
            LoyaltyTier::Silver => Some((LoyaltyTier::Gold, Self::GOLD_THRESHOLD)),
            LoyaltyTier::Gold => Some((LoyaltyTier::Platinum, Self::PLATINUM_THRESHOLD)),
            LoyaltyTier::Platinum => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub customer_id: i64,
    pub business_id: i64,
    pub total_points: i64,
    pub lifetime_earnings: i64,
    pub tier: LoyaltyTier,
    pub next_tier: Option<LoyaltyTier>,
    pub points_to_next_tier: Option<i64>,
}

impl BalanceResponse {
    pub fn new(customer_id: i64, business_id: i64, total_points: i64, lifetime_earnings: i64) -> Self {
        let tier = LoyaltyTier::from_lifetime_earnings(lifetime_earnings);
        let next = tier.next();
        Self {
            customer_id,
            business_id,
            total_points,
            lifetime_earnings,
            tier,
            next_tier: next.map(|(t, _)| t),
            points_to_next_tier: next.map(|(_, threshold)| threshold - lifetime_earnings),
        }
    }
}

/// 余额审计：物化值与按流水重算值对比
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BalanceAudit {
    pub customer_id: i64,
    pub business_id: i64,
    pub materialized: i64,
    pub recomputed: i64,
    pub consistent: bool,
}
