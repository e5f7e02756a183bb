use sea_orm_migration::prelude::*;

use crate::id_column;

#[derive(DeriveIden)]
enum Businesses {
    Table,
    Id,
    Name,
    CreatedAt,
}

/// 顾客；lifetime_earnings 为跨商户累计赚取积分（用于等级）
#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    Name,
    LifetimeEarnings,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Staff {
    Table,
    Id,
    BusinessId,
    Name,
    IsActive,
    CreatedAt,
}

/// 赚取流水 (earn)
#[derive(DeriveIden)]
enum Purchases {
    Table,
    Id,
    CustomerId,
    BusinessId,
    ProductId,
    Quantity,
    GrossAmount,
    PointsEarned,
    CreatedByStaff,
    CreatedAt,
}

/// 消费流水 (spend)
#[derive(DeriveIden)]
enum Usages {
    Table,
    Id,
    CustomerId,
    BusinessId,
    ProductId,
    Quantity,
    UnitPrice,
    PointsSpent,
    CreatedByStaff,
    CreatedAt,
}

/// (customer, business) 余额聚合
#[derive(DeriveIden)]
enum Balances {
    Table,
    Id,
    CustomerId,
    BusinessId,
    TotalPoints,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Businesses::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Businesses::Id))
                    .col(ColumnDef::new(Businesses::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Businesses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Customers::Id))
                    .col(ColumnDef::new(Customers::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Customers::LifetimeEarnings)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Staff::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Staff::Id))
                    .col(ColumnDef::new(Staff::BusinessId).big_integer().not_null())
                    .col(ColumnDef::new(Staff::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Staff::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Staff::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_staff_business")
                            .from(Staff::Table, Staff::BusinessId)
                            .to(Businesses::Table, Businesses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Purchases::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Purchases::Id))
                    .col(ColumnDef::new(Purchases::CustomerId).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::BusinessId).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::ProductId).big_integer().null())
                    .col(ColumnDef::new(Purchases::Quantity).integer().not_null())
                    .col(ColumnDef::new(Purchases::GrossAmount).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::PointsEarned).big_integer().not_null())
                    .col(ColumnDef::new(Purchases::CreatedByStaff).big_integer().null())
                    .col(
                        ColumnDef::new(Purchases::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_purchases_customer")
                            .from(Purchases::Table, Purchases::CustomerId)
                            .to(Customers::Table, Customers::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_purchases_business")
                            .from(Purchases::Table, Purchases::BusinessId)
                            .to(Businesses::Table, Businesses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Usages::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Usages::Id))
                    .col(ColumnDef::new(Usages::CustomerId).big_integer().not_null())
                    .col(ColumnDef::new(Usages::BusinessId).big_integer().not_null())
                    .col(ColumnDef::new(Usages::ProductId).big_integer().null())
                    .col(ColumnDef::new(Usages::Quantity).integer().not_null())
                    .col(ColumnDef::new(Usages::UnitPrice).big_integer().not_null())
                    .col(ColumnDef::new(Usages::PointsSpent).big_integer().not_null())
                    .col(ColumnDef::new(Usages::CreatedByStaff).big_integer().null())
                    .col(
                        ColumnDef::new(Usages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usages_customer")
                            .from(Usages::Table, Usages::CustomerId)
                            .to(Customers::Table, Customers::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usages_business")
                            .from(Usages::Table, Usages::BusinessId)
                            .to(Businesses::Table, Businesses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 撤销查询 (created_by_staff, created_at) 与动态查询 (business_id, created_at)
        for (name, table, first) in [
            ("idx_purchases_staff_created", Purchases::Table, Purchases::CreatedByStaff),
            ("idx_purchases_business_created", Purchases::Table, Purchases::BusinessId),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(table)
                        .col(first)
                        .col(Purchases::CreatedAt)
                        .to_owned(),
                )
                .await?;
        }
        for (name, table, first) in [
            ("idx_usages_staff_created", Usages::Table, Usages::CreatedByStaff),
            ("idx_usages_business_created", Usages::Table, Usages::BusinessId),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(table)
                        .col(first)
                        .col(Usages::CreatedAt)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Balances::Table)
                    .if_not_exists()
                    .col(&mut id_column(manager, Balances::Id))
                    .col(ColumnDef::new(Balances::CustomerId).big_integer().not_null())
                    .col(ColumnDef::new(Balances::BusinessId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Balances::TotalPoints)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Balances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Balances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_balances_customer")
                            .from(Balances::Table, Balances::CustomerId)
                            .to(Customers::Table, Customers::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_balances_business")
                            .from(Balances::Table, Balances::BusinessId)
                            .to(Businesses::Table, Businesses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // upsert 依赖该唯一索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_balances_customer_business_unique")
                    .table(Balances::Table)
                    .col(Balances::CustomerId)
                    .col(Balances::BusinessId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Balances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Usages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Purchases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Staff::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Customers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Businesses::Table).to_owned())
            .await?;

        Ok(())
    }
}
