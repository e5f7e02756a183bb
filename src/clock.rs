//! 账本时间源。
//!
//! 流水的 created_at 与撤销窗口判断都必须使用存储自身的事务时间，
//! 不使用调用方或应用进程的本地时间，以免多实例之间时钟漂移。

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseTransaction, Statement};

#[async_trait]
pub trait LedgerClock: Send + Sync {
    /// 在给定事务内读取当前时间
    async fn now(&self, txn: &DatabaseTransaction) -> AppResult<DateTime<Utc>>;
}

/// 生产时钟：读取数据库的事务时间
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreClock;

#[async_trait]
impl LedgerClock for StoreClock {
    async fn now(&self, txn: &DatabaseTransaction) -> AppResult<DateTime<Utc>> {
        let backend = txn.get_database_backend();
        match backend {
            DatabaseBackend::Postgres => {
                let row = txn
                    .query_one(Statement::from_string(
                        backend,
                        "SELECT NOW() AS now".to_string(),
                    ))
                    .await?
                    .ok_or_else(|| AppError::InternalError("NOW() returned no row".into()))?;
                Ok(row.try_get::<DateTime<Utc>>("", "now")?)
            }
            DatabaseBackend::Sqlite => {
                let row = txn
                    .query_one(Statement::from_string(
                        backend,
                        "SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now') AS now".to_string(),
                    ))
                    .await?
                    .ok_or_else(|| AppError::InternalError("strftime returned no row".into()))?;
                let raw: String = row.try_get("", "now")?;
                DateTime::parse_from_rfc3339(&raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| AppError::InternalError(format!("Bad store timestamp {raw}: {e}")))
            }
            other => Err(AppError::InternalError(format!(
                "Unsupported database backend for ledger clock: {other:?}"
            ))),
        }
    }
}

/// 测试用手动时钟
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn get(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
#[async_trait]
impl LedgerClock for ManualClock {
    async fn now(&self, _txn: &DatabaseTransaction) -> AppResult<DateTime<Utc>> {
        Ok(self.get())
    }
}
