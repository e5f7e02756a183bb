use crate::database::DbPool;
use crate::entities::idempotency_key_entity as idem;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
    Set,
};
use serde::Serialize;

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotentOperation {
    Earn,
    Spend,
}

impl IdempotentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotentOperation::Earn => "earn",
            IdempotentOperation::Spend => "spend",
        }
    }
}

/// 幂等键认领结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// 首次出现，继续执行
    Fresh,
    /// 已成功执行过，返回保存的 JSON 响应
    Replay(String),
}

pub fn validate_key(key: &str) -> AppResult<()> {
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::ValidationError(format!(
            "Idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(())
}

/// 在调用方事务内认领幂等键。
///
/// `INSERT ... ON CONFLICT DO NOTHING`：插入成功即首次请求；冲突时（PostgreSQL 上会
/// 等待持有该键的事务结束）读取已保存的响应重放。
pub async fn claim(
    txn: &DatabaseTransaction,
    business_id: i64,
    key: &str,
    operation: IdempotentOperation,
    customer_id: i64,
    now: DateTime<Utc>,
) -> AppResult<Claim> {
    let inserted = idem::Entity::insert(idem::ActiveModel {
        id: NotSet,
        business_id: Set(business_id),
        idempotency_key: Set(key.to_string()),
        operation: Set(operation.as_str().to_string()),
        customer_id: Set(customer_id),
        response: Set(None),
        created_at: Set(now),
    })
    .on_conflict(
        OnConflict::columns([idem::Column::BusinessId, idem::Column::IdempotencyKey])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    if inserted > 0 {
        return Ok(Claim::Fresh);
    }

    let existing = idem::Entity::find()
        .filter(idem::Column::BusinessId.eq(business_id))
        .filter(idem::Column::IdempotencyKey.eq(key))
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| AppError::InternalError("Idempotency key vanished after conflict".into()))?;

    if existing.operation != operation.as_str() || existing.customer_id != customer_id {
        return Err(AppError::ValidationError(
            "Idempotency key was already used for a different request".to_string(),
        ));
    }

    match existing.response {
        Some(response) => Ok(Claim::Replay(response)),
        None => Err(AppError::ValidationError(
            "Idempotency key is still being processed".to_string(),
        )),
    }
}

/// 保存首次执行的响应，与业务写入在同一事务中提交
pub async fn store_response<T: Serialize>(
    txn: &DatabaseTransaction,
    business_id: i64,
    key: &str,
    response: &T,
) -> AppResult<()> {
    let json = serde_json::to_string(response)?;
    idem::Entity::update_many()
        .col_expr(idem::Column::Response, Expr::value(json))
        .filter(idem::Column::BusinessId.eq(business_id))
        .filter(idem::Column::IdempotencyKey.eq(key))
        .exec(txn)
        .await?;
    Ok(())
}

#[derive(Clone)]
pub struct IdempotencyService {
    pool: DbPool,
    ttl_secs: i64,
}

impl IdempotencyService {
    pub fn new(pool: DbPool, ttl_secs: i64) -> Self {
        Self { pool, ttl_secs }
    }

    /// 清理超过保留期的幂等键；返回删除条数
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.purge_created_before(Utc::now() - Duration::seconds(self.ttl_secs))
            .await
    }

    pub async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let res = idem::Entity::delete_many()
            .filter(idem::Column::CreatedAt.lt(cutoff))
            .exec(&self.pool)
            .await?;
        Ok(res.rows_affected)
    }
}
