//! 测试夹具：SQLite 内存库 + 真实迁移 + 手动时钟。
//!
//! 设置 `TEST_DATABASE_URL`（PostgreSQL）时，[`pg_fixture`] 提供多连接的真实存储，
//! 用于验证并发事务在行锁下的行为；未设置时相关测试直接跳过。

use crate::clock::ManualClock;
use crate::entities::{business_entity as businesses, customer_entity as customers, staff_entity as staff};
use crate::services::LedgerService;
use chrono::{TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

static PG_MIGRATED: OnceCell<()> = OnceCell::const_new();

pub async fn setup_db() -> DatabaseConnection {
    // 单连接：内存库按连接隔离，且并发任务会在连接上排队
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub async fn seed_business(db: &DatabaseConnection, name: &str) -> businesses::Model {
    businesses::ActiveModel {
        name: Set(name.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed business")
}

pub async fn seed_customer(db: &DatabaseConnection, name: &str) -> customers::Model {
    customers::ActiveModel {
        name: Set(name.to_string()),
        lifetime_earnings: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed customer")
}

pub async fn seed_staff(
    db: &DatabaseConnection,
    business_id: i64,
    name: &str,
    is_active: bool,
) -> staff::Model {
    staff::ActiveModel {
        business_id: Set(business_id),
        name: Set(name.to_string()),
        is_active: Set(is_active),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed staff")
}

pub struct Fixture {
    pub db: DatabaseConnection,
    pub clock: ManualClock,
    pub ledger: LedgerService,
    pub business: businesses::Model,
    pub other_business: businesses::Model,
    pub customer: customers::Model,
    pub other_customer: customers::Model,
    /// business 的在职员工
    pub staff: staff::Model,
    /// business 的另一名在职员工
    pub colleague: staff::Model,
    /// business 的离职员工
    pub inactive_staff: staff::Model,
    /// other_business 的员工
    pub foreign_staff: staff::Model,
}

pub async fn fixture() -> Fixture {
    seed_fixture(setup_db().await).await
}

/// PostgreSQL 多连接夹具；未配置 `TEST_DATABASE_URL` 时返回 None
pub async fn pg_fixture() -> Option<Fixture> {
    let url = std::env::var(TEST_DATABASE_URL).ok()?;
    let mut opt = ConnectOptions::new(url);
    opt.max_connections(8).min_connections(2).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect postgres");
    PG_MIGRATED
        .get_or_init(|| async {
            Migrator::up(&db, None).await.expect("run migrations");
        })
        .await;
    Some(seed_fixture(db).await)
}

async fn seed_fixture(db: DatabaseConnection) -> Fixture {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
    let ledger = LedgerService::new(db.clone(), Arc::new(clock.clone()), None);

    let business = seed_business(&db, "Corner Cafe").await;
    let other_business = seed_business(&db, "Book Nook").await;
    let customer = seed_customer(&db, "Avery").await;
    let other_customer = seed_customer(&db, "Jordan").await;
    let staff = seed_staff(&db, business.id, "Terminal 1", true).await;
    let colleague = seed_staff(&db, business.id, "Terminal 2", true).await;
    let inactive_staff = seed_staff(&db, business.id, "Former", false).await;
    let foreign_staff = seed_staff(&db, other_business.id, "Elsewhere", true).await;

    Fixture {
        db,
        clock,
        ledger,
        business,
        other_business,
        customer,
        other_customer,
        staff,
        colleague,
        inactive_staff,
        foreign_staff,
    }
}
