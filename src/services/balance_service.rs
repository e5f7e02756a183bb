use crate::database::DbPool;
use crate::entities::{
    customer_entity as customers, purchase_entity as purchases, usage_entity as usages,
};
use crate::error::{AppError, AppResult};
use crate::models::{BalanceAudit, BalanceResponse};
use crate::services::ledger_service::{load_balance, resolve_active_staff};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, QueryFilter, QuerySelect};

#[derive(Debug, FromQueryResult)]
struct SumRow {
    total: i64,
}

/// 按流水重算余额：Σ points_earned − Σ points_spent
pub(crate) async fn recompute_balance<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
    business_id: i64,
) -> AppResult<i64> {
    let earned = purchases::Entity::find()
        .filter(purchases::Column::CustomerId.eq(customer_id))
        .filter(purchases::Column::BusinessId.eq(business_id))
        .select_only()
        .column_as(
            Expr::cust("CAST(COALESCE(SUM(points_earned), 0) AS BIGINT)"),
            "total",
        )
        .into_model::<SumRow>()
        .one(conn)
        .await?
        .map(|r| r.total)
        .unwrap_or(0);

    let spent = usages::Entity::find()
        .filter(usages::Column::CustomerId.eq(customer_id))
        .filter(usages::Column::BusinessId.eq(business_id))
        .select_only()
        .column_as(
            Expr::cust("CAST(COALESCE(SUM(points_spent), 0) AS BIGINT)"),
            "total",
        )
        .into_model::<SumRow>()
        .one(conn)
        .await?
        .map(|r| r.total)
        .unwrap_or(0);

    Ok(earned - spent)
}

/// 余额读模型
#[derive(Clone)]
pub struct BalanceService {
    pool: DbPool,
}

impl BalanceService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// 查看员工必须在职且属于该商家
    async fn check_viewer(&self, staff_id: i64, business_id: i64) -> AppResult<()> {
        let member = resolve_active_staff(&self.pool, staff_id).await?;
        if member.business_id != business_id {
            return Err(AppError::Unauthorized(format!(
                "Staff {staff_id} does not belong to business {business_id}"
            )));
        }
        Ok(())
    }

    pub async fn get_balance(
        &self,
        customer_id: i64,
        business_id: i64,
        viewer_staff: i64,
    ) -> AppResult<BalanceResponse> {
        self.check_viewer(viewer_staff, business_id).await?;
        let customer = customers::Entity::find_by_id(customer_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {customer_id} not found")))?;
        let total_points = load_balance(&self.pool, customer_id, business_id).await?;

        Ok(BalanceResponse::new(
            customer_id,
            business_id,
            total_points,
            customer.lifetime_earnings,
        ))
    }

    /// 对比物化余额与按流水重算的余额
    pub async fn audit_balance(
        &self,
        customer_id: i64,
        business_id: i64,
        viewer_staff: i64,
    ) -> AppResult<BalanceAudit> {
        self.check_viewer(viewer_staff, business_id).await?;
        if customers::Entity::find_by_id(customer_id)
            .one(&self.pool)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!("Customer {customer_id} not found")));
        }

        let materialized = load_balance(&self.pool, customer_id, business_id).await?;
        let recomputed = recompute_balance(&self.pool, customer_id, business_id).await?;
        if materialized != recomputed {
            log::warn!(
                "Balance drift for customer {customer_id} at business {business_id}: materialized {materialized}, recomputed {recomputed}"
            );
        }

        Ok(BalanceAudit {
            customer_id,
            business_id,
            materialized,
            recomputed,
            consistent: materialized == recomputed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EarnItem, LoyaltyTier};
    use crate::test_support::fixture;

    #[tokio::test]
    async fn test_balance_for_new_customer_is_zero() {
        let fx = fixture().await;
        let svc = BalanceService::new(fx.db.clone());
        let resp = svc.get_balance(fx.customer.id, fx.business.id, fx.staff.id).await.unwrap();
        assert_eq!(resp.total_points, 0);
        assert_eq!(resp.lifetime_earnings, 0);
        assert_eq!(resp.tier, LoyaltyTier::Bronze);
        assert_eq!(resp.points_to_next_tier, Some(LoyaltyTier::SILVER_THRESHOLD));
    }

    #[tokio::test]
    async fn test_unknown_customer_not_found() {
        let fx = fixture().await;
        let svc = BalanceService::new(fx.db.clone());
        assert!(matches!(
            svc.get_balance(9_999, fx.business.id, fx.staff.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.audit_balance(9_999, fx.business.id, fx.staff.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_tier_follows_lifetime_not_balance() {
        let fx = fixture().await;
        let svc = BalanceService::new(fx.db.clone());
        let item = EarnItem {
            product_id: Some(1),
            quantity: 3,
            gross_amount: 12_000,
            points_earned: 1_200,
        };
        fx.ledger
            .record_earn(fx.customer.id, fx.business.id, &[item], None, None)
            .await
            .unwrap();
        fx.ledger
            .record_spend(fx.customer.id, fx.business.id, 1_100, None, None, None)
            .await
            .unwrap();

        let resp = svc.get_balance(fx.customer.id, fx.business.id, fx.staff.id).await.unwrap();
        assert_eq!(resp.total_points, 100);
        assert_eq!(resp.tier, LoyaltyTier::Silver);

        let audit = svc.audit_balance(fx.customer.id, fx.business.id, fx.staff.id).await.unwrap();
        assert_eq!(audit.materialized, 100);
        assert_eq!(audit.recomputed, 100);
        assert!(audit.consistent);
    }

    #[tokio::test]
    async fn test_inactive_or_foreign_viewer_is_unauthorized() {
        let fx = fixture().await;
        let svc = BalanceService::new(fx.db.clone());
        for staff_id in [fx.inactive_staff.id, fx.foreign_staff.id, 9_999] {
            assert!(matches!(
                svc.get_balance(fx.customer.id, fx.business.id, staff_id).await,
                Err(AppError::Unauthorized(_))
            ));
            assert!(matches!(
                svc.audit_balance(fx.customer.id, fx.business.id, staff_id).await,
                Err(AppError::Unauthorized(_))
            ));
        }
    }
}
