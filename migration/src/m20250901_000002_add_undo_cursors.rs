use sea_orm_migration::prelude::*;

/// 每个员工一行：最近一次撤销的时间（撤销水位线）。
/// 只有晚于水位线创建的流水才可再被撤销，保证撤销不可叠加。
#[derive(DeriveIden)]
enum UndoCursors {
    Table,
    StaffId,
    LastUndoAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Staff {
    Table,
    Id,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UndoCursors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UndoCursors::StaffId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UndoCursors::LastUndoAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UndoCursors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_undo_cursors_staff")
                            .from(UndoCursors::Table, UndoCursors::StaffId)
                            .to(Staff::Table, Staff::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(UndoCursors::Table).to_owned())
            .await?;
        Ok(())
    }
}
