use crate::config::DatabaseConfig;
use crate::error::AppResult;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, Statement, TransactionTrait,
};
use std::time::Duration;

pub type DbPool = DatabaseConnection;

pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let pool = Database::connect(opt).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    Migrator::up(pool, None).await?;
    Ok(())
}

/// 开启一个原子单元（数据库事务）。
///
/// PostgreSQL 上设置 `SET LOCAL statement_timeout`，任一语句超时即整体回滚。
pub async fn begin_unit(
    pool: &DbPool,
    statement_timeout_ms: Option<u64>,
) -> AppResult<DatabaseTransaction> {
    let txn = pool.begin().await?;
    if let Some(ms) = statement_timeout_ms
        && txn.get_database_backend() == DatabaseBackend::Postgres
    {
        txn.execute(Statement::from_string(
            DatabaseBackend::Postgres,
            format!("SET LOCAL statement_timeout = {ms}"),
        ))
        .await?;
    }
    Ok(txn)
}
