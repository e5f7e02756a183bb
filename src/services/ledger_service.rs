use crate::clock::LedgerClock;
use crate::database::{DbPool, begin_unit};
use crate::entities::{
    balance_entity as balances, business_entity as businesses, customer_entity as customers,
    purchase_entity as purchases, staff_entity as staff, usage_entity as usages,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    EarnItem, EntryKind, EntryRef, LedgerEntry, RecordEarnResponse, RecordSpendResponse,
    ReversalResponse, SpendContext,
};
use crate::services::idempotency_service::{self as idempotency, Claim, IdempotentOperation};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set,
};
use std::sync::Arc;

/// 单次赚取最多明细行数
pub const MAX_EARN_ITEMS: usize = 100;

/// 交易引擎：赚取、消费、冲正。
///
/// 每个操作都是一个数据库事务：流水行、余额聚合、累计赚取计数器要么全部写入，
/// 要么全部不写。同一 (customer, business) 余额行上的读改写依赖数据库行锁串行化
/// （条件 UPDATE / UPSERT / `SELECT ... FOR UPDATE`），进程内不缓存余额。
#[derive(Clone)]
pub struct LedgerService {
    pool: DbPool,
    clock: Arc<dyn LedgerClock>,
    statement_timeout_ms: Option<u64>,
}

impl LedgerService {
    pub fn new(
        pool: DbPool,
        clock: Arc<dyn LedgerClock>,
        statement_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            pool,
            clock,
            statement_timeout_ms,
        }
    }

    pub fn clock(&self) -> &dyn LedgerClock {
        self.clock.as_ref()
    }

    /// 开启一个原子单元
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        begin_unit(&self.pool, self.statement_timeout_ms).await
    }

    /// 记录一次销售（赚取积分）。所有明细在同一事务内写入。
    pub async fn record_earn(
        &self,
        customer_id: i64,
        business_id: i64,
        items: &[EarnItem],
        acting_staff: Option<i64>,
        idempotency_key: Option<&str>,
    ) -> AppResult<RecordEarnResponse> {
        let total_points = validate_earn_items(items)?;
        if let Some(key) = idempotency_key {
            idempotency::validate_key(key)?;
        }

        let txn = self.begin().await?;
        check_scope(&txn, customer_id, business_id, acting_staff).await?;
        let now = self.clock.now(&txn).await?;

        if let Some(key) = idempotency_key
            && let Claim::Replay(saved) = idempotency::claim(
                &txn,
                business_id,
                key,
                IdempotentOperation::Earn,
                customer_id,
                now,
            )
            .await?
        {
            txn.commit().await?;
            log::info!("Replaying earn for idempotency key {key} (business {business_id})");
            return Ok(serde_json::from_str(&saved)?);
        }

        let mut entry_ids = Vec::with_capacity(items.len());
        for item in items {
            let entry = purchases::ActiveModel {
                customer_id: Set(customer_id),
                business_id: Set(business_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                gross_amount: Set(item.gross_amount),
                points_earned: Set(item.points_earned),
                created_by_staff: Set(acting_staff),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            entry_ids.push(entry.id);
        }

        credit_balance(&txn, customer_id, business_id, total_points, now).await?;
        let lifetime_earnings = adjust_lifetime_earnings(&txn, customer_id, total_points).await?;
        let new_balance = load_balance(&txn, customer_id, business_id).await?;

        let response = RecordEarnResponse {
            entry_ids,
            points_earned: total_points,
            new_balance,
            lifetime_earnings,
        };
        if let Some(key) = idempotency_key {
            idempotency::store_response(&txn, business_id, key, &response).await?;
        }

        txn.commit().await?;

        log::info!(
            "Recorded earn of {} points for customer {} at business {} by staff {:?} ({} items)",
            total_points,
            customer_id,
            business_id,
            acting_staff,
            items.len()
        );
        Ok(response)
    }

    /// 记录一次兑换（消费积分）。余额充足性检查与扣减是同一条条件 UPDATE。
    pub async fn record_spend(
        &self,
        customer_id: i64,
        business_id: i64,
        points: i64,
        context: Option<&SpendContext>,
        acting_staff: Option<i64>,
        idempotency_key: Option<&str>,
    ) -> AppResult<RecordSpendResponse> {
        if points <= 0 {
            return Err(AppError::ValidationError(
                "Points to spend must be positive".to_string(),
            ));
        }
        let (product_id, quantity, unit_price) = resolve_spend_context(points, context)?;
        if let Some(key) = idempotency_key {
            idempotency::validate_key(key)?;
        }

        let txn = self.begin().await?;
        check_scope(&txn, customer_id, business_id, acting_staff).await?;
        let now = self.clock.now(&txn).await?;

        if let Some(key) = idempotency_key
            && let Claim::Replay(saved) = idempotency::claim(
                &txn,
                business_id,
                key,
                IdempotentOperation::Spend,
                customer_id,
                now,
            )
            .await?
        {
            txn.commit().await?;
            log::info!("Replaying spend for idempotency key {key} (business {business_id})");
            return Ok(serde_json::from_str(&saved)?);
        }

        if let Err(e) = debit_balance(&txn, customer_id, business_id, points, now).await {
            if let AppError::InsufficientBalance { available, .. } = &e {
                log::info!(
                    "Rejected spend of {points} points for customer {customer_id} at business {business_id}: available {available}"
                );
            }
            return Err(e);
        }

        let entry = usages::ActiveModel {
            customer_id: Set(customer_id),
            business_id: Set(business_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            points_spent: Set(points),
            created_by_staff: Set(acting_staff),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let new_balance = load_balance(&txn, customer_id, business_id).await?;
        let response = RecordSpendResponse {
            entry_id: entry.id,
            points_spent: points,
            new_balance,
        };
        if let Some(key) = idempotency_key {
            idempotency::store_response(&txn, business_id, key, &response).await?;
        }

        txn.commit().await?;

        log::info!(
            "Recorded spend of {points} points for customer {customer_id} at business {business_id} by staff {acting_staff:?}"
        );
        Ok(response)
    }

    /// 冲正指定流水（删除流水并反向调整余额与累计赚取）
    pub async fn reverse(&self, entry: EntryRef) -> AppResult<ReversalResponse> {
        let txn = self.begin().await?;
        let now = self.clock.now(&txn).await?;
        let response = self.reverse_in(&txn, entry, now).await?;
        txn.commit().await?;
        Ok(response)
    }

    /// 在调用方事务内冲正。先加锁重读确认流水仍存在，删除必须恰好影响一行，
    /// 并发重复冲正时只有一方成功，另一方得到 NotFound。
    pub(crate) async fn reverse_in(
        &self,
        txn: &DatabaseTransaction,
        entry: EntryRef,
        now: DateTime<Utc>,
    ) -> AppResult<ReversalResponse> {
        let current = lock_entry(txn, entry).await?.ok_or_else(|| {
            AppError::NotFound(format!("Ledger entry {} {} no longer exists", entry.kind, entry.id))
        })?;

        let deleted = match entry.kind {
            EntryKind::Earn => purchases::Entity::delete_by_id(entry.id).exec(txn).await?,
            EntryKind::Spend => usages::Entity::delete_by_id(entry.id).exec(txn).await?,
        };
        if deleted.rows_affected != 1 {
            return Err(AppError::NotFound(format!(
                "Ledger entry {} {} no longer exists",
                entry.kind, entry.id
            )));
        }

        let response = match current {
            LedgerEntry::Earn(p) => {
                // 积分若已被消费则拒绝撤销赚取，余额不允许为负
                debit_balance(txn, p.customer_id, p.business_id, p.points_earned, now).await?;
                let lifetime =
                    adjust_lifetime_earnings(txn, p.customer_id, -p.points_earned).await?;
                ReversalResponse {
                    kind: EntryKind::Earn,
                    entry_id: p.id,
                    customer_id: p.customer_id,
                    points: p.points_earned,
                    new_balance: load_balance(txn, p.customer_id, p.business_id).await?,
                    lifetime_earnings: Some(lifetime),
                }
            }
            LedgerEntry::Spend(u) => {
                credit_balance(txn, u.customer_id, u.business_id, u.points_spent, now).await?;
                ReversalResponse {
                    kind: EntryKind::Spend,
                    entry_id: u.id,
                    customer_id: u.customer_id,
                    points: u.points_spent,
                    new_balance: load_balance(txn, u.customer_id, u.business_id).await?,
                    lifetime_earnings: None,
                }
            }
        };

        log::info!(
            "Reversed {} entry {} for customer {} (points {}, balance now {})",
            response.kind,
            response.entry_id,
            response.customer_id,
            response.points,
            response.new_balance
        );
        Ok(response)
    }
}

/// 校验赚取明细并返回积分合计
fn validate_earn_items(items: &[EarnItem]) -> AppResult<i64> {
    if items.is_empty() {
        return Err(AppError::ValidationError(
            "At least one line item is required".to_string(),
        ));
    }
    if items.len() > MAX_EARN_ITEMS {
        return Err(AppError::ValidationError(format!(
            "At most {MAX_EARN_ITEMS} line items are allowed"
        )));
    }

    let mut total: i64 = 0;
    for (idx, item) in items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(AppError::ValidationError(format!(
                "Item {idx}: quantity must be positive"
            )));
        }
        if item.gross_amount < 0 {
            return Err(AppError::ValidationError(format!(
                "Item {idx}: gross amount must not be negative"
            )));
        }
        if item.points_earned < 0 {
            return Err(AppError::ValidationError(format!(
                "Item {idx}: points earned must not be negative"
            )));
        }
        total = total
            .checked_add(item.points_earned)
            .ok_or_else(|| AppError::ValidationError("Points total overflows".to_string()))?;
    }
    Ok(total)
}

/// 消费上下文缺省值：数量 1，单价等于积分数
fn resolve_spend_context(
    points: i64,
    context: Option<&SpendContext>,
) -> AppResult<(Option<i64>, i32, i64)> {
    let ctx = context.cloned().unwrap_or_default();
    let quantity = ctx.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(AppError::ValidationError(
            "Quantity must be positive".to_string(),
        ));
    }
    let unit_price = ctx.unit_price.unwrap_or(points);
    if unit_price < 0 {
        return Err(AppError::ValidationError(
            "Unit price must not be negative".to_string(),
        ));
    }
    Ok((ctx.product_id, quantity, unit_price))
}

/// 解析在职员工；不存在或已停用视为无权限
pub(crate) async fn resolve_active_staff<C: ConnectionTrait>(
    conn: &C,
    staff_id: i64,
) -> AppResult<staff::Model> {
    let member = staff::Entity::find_by_id(staff_id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown staff {staff_id}")))?;
    if !member.is_active {
        return Err(AppError::Unauthorized(format!(
            "Staff {staff_id} is inactive"
        )));
    }
    Ok(member)
}

async fn check_scope(
    txn: &DatabaseTransaction,
    customer_id: i64,
    business_id: i64,
    acting_staff: Option<i64>,
) -> AppResult<()> {
    if businesses::Entity::find_by_id(business_id)
        .one(txn)
        .await?
        .is_none()
    {
        return Err(AppError::ValidationError(format!(
            "Unknown business {business_id}"
        )));
    }
    if customers::Entity::find_by_id(customer_id)
        .one(txn)
        .await?
        .is_none()
    {
        return Err(AppError::ValidationError(format!(
            "Unknown customer {customer_id}"
        )));
    }
    if let Some(staff_id) = acting_staff {
        let member = resolve_active_staff(txn, staff_id).await?;
        if member.business_id != business_id {
            return Err(AppError::Unauthorized(format!(
                "Staff {staff_id} does not belong to business {business_id}"
            )));
        }
    }
    Ok(())
}

async fn lock_entry(txn: &DatabaseTransaction, entry: EntryRef) -> AppResult<Option<LedgerEntry>> {
    let found = match entry.kind {
        EntryKind::Earn => purchases::Entity::find_by_id(entry.id)
            .lock_exclusive()
            .one(txn)
            .await?
            .map(LedgerEntry::Earn),
        EntryKind::Spend => usages::Entity::find_by_id(entry.id)
            .lock_exclusive()
            .one(txn)
            .await?
            .map(LedgerEntry::Spend),
    };
    Ok(found)
}

/// 增加余额；余额行不存在时创建（UPSERT 依赖 (customer_id, business_id) 唯一索引）
async fn credit_balance(
    txn: &DatabaseTransaction,
    customer_id: i64,
    business_id: i64,
    points: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    balances::Entity::insert(balances::ActiveModel {
        customer_id: Set(customer_id),
        business_id: Set(business_id),
        total_points: Set(points),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([balances::Column::CustomerId, balances::Column::BusinessId])
            .value(
                balances::Column::TotalPoints,
                Expr::col((balances::Entity, balances::Column::TotalPoints)).add(points),
            )
            .value(balances::Column::UpdatedAt, Expr::value(now))
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;
    Ok(())
}

/// 扣减余额：`WHERE total_points >= points` 的条件更新，未命中即余额不足
async fn debit_balance(
    txn: &DatabaseTransaction,
    customer_id: i64,
    business_id: i64,
    points: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let res = balances::Entity::update_many()
        .col_expr(
            balances::Column::TotalPoints,
            Expr::col(balances::Column::TotalPoints).sub(points),
        )
        .col_expr(balances::Column::UpdatedAt, Expr::value(now))
        .filter(balances::Column::CustomerId.eq(customer_id))
        .filter(balances::Column::BusinessId.eq(business_id))
        .filter(balances::Column::TotalPoints.gte(points))
        .exec(txn)
        .await?;

    if res.rows_affected == 0 {
        let available = load_balance(txn, customer_id, business_id).await?;
        return Err(AppError::InsufficientBalance {
            available,
            requested: points,
        });
    }
    Ok(())
}

/// 调整累计赚取并返回新值
async fn adjust_lifetime_earnings(
    txn: &DatabaseTransaction,
    customer_id: i64,
    delta: i64,
) -> AppResult<i64> {
    let res = customers::Entity::update_many()
        .col_expr(
            customers::Column::LifetimeEarnings,
            Expr::col(customers::Column::LifetimeEarnings).add(delta),
        )
        .filter(customers::Column::Id.eq(customer_id))
        .exec(txn)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::ValidationError(format!(
            "Unknown customer {customer_id}"
        )));
    }

    let customer = customers::Entity::find_by_id(customer_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::ValidationError(format!("Unknown customer {customer_id}")))?;
    Ok(customer.lifetime_earnings)
}

/// 读取物化余额；没有余额行视为 0
pub(crate) async fn load_balance<C: ConnectionTrait>(
    conn: &C,
    customer_id: i64,
    business_id: i64,
) -> AppResult<i64> {
    let row = balances::Entity::find()
        .filter(balances::Column::CustomerId.eq(customer_id))
        .filter(balances::Column::BusinessId.eq(business_id))
        .one(conn)
        .await?;
    Ok(row.map(|b| b.total_points).unwrap_or(0))
}
