pub use sea_orm_migration::prelude::*;

mod m20250901_000001_initial;
mod m20250901_000002_add_undo_cursors;
mod m20250905_000001_add_idempotency_keys;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_initial::Migration),
            Box::new(m20250901_000002_add_undo_cursors::Migration),
            Box::new(m20250905_000001_add_idempotency_keys::Migration),
        ]
    }
}

/// 64 位自增主键。SQLite 只接受 `INTEGER PRIMARY KEY AUTOINCREMENT`，其它后端用 BIGINT。
pub(crate) fn id_column<T: IntoIden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    match manager.get_database_backend() {
        sea_orm::DatabaseBackend::Sqlite => def.integer(),
        _ => def.big_integer(),
    };
    def.not_null().auto_increment().primary_key().to_owned()
}
