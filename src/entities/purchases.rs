use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 赚取流水 (earn)：创建后不可修改，只允许撤销时整行删除
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: i64,
    pub business_id: i64,
    pub product_id: Option<i64>,
    pub quantity: i32,
    pub gross_amount: i64, // 美分
    pub points_earned: i64,
    pub created_by_staff: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
