use crate::entities::{
    purchase_entity as purchases, staff_entity as staff, undo_cursor_entity as undo_cursors,
    usage_entity as usages,
};
use crate::error::{AppError, AppResult};
use crate::models::{LedgerEntry, ReversalResponse};
use crate::services::ledger_service::{LedgerService, resolve_active_staff};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

/// 撤销窗口（秒）
pub const UNDO_WINDOW_SECS: i64 = 120;

pub fn undo_window() -> Duration {
    Duration::seconds(UNDO_WINDOW_SECS)
}

/// 撤销上一步操作。
///
/// 只在操作员自己、自己所属商家、最近两分钟内创建的流水中选择最新的一条，
/// 交给 [`LedgerService`] 的冲正路径。每次成功撤销都会推进该员工的撤销水位，
/// 所以连续两次撤销不会叠加到更早的流水上。
#[derive(Clone)]
pub struct UndoService {
    ledger: LedgerService,
}

impl UndoService {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    pub async fn undo_last_action(&self, staff_id: i64) -> AppResult<ReversalResponse> {
        let txn = self.ledger.begin().await?;
        let (response, business_id) = self.undo_in(&txn, staff_id).await?;
        txn.commit().await?;

        log::info!(
            "Staff {} undid {} entry {} at business {}",
            staff_id,
            response.kind,
            response.entry_id,
            business_id
        );
        Ok(response)
    }

    /// 在调用方事务内撤销；返回冲正结果与员工所属商家
    pub(crate) async fn undo_in(
        &self,
        txn: &DatabaseTransaction,
        staff_id: i64,
    ) -> AppResult<(ReversalResponse, i64)> {
        let member = resolve_active_staff(txn, staff_id).await?;
        let now = self.ledger.clock().now(txn).await?;

        // 锁住该员工的撤销游标，同一员工的并发撤销在此串行
        let cursor = lock_cursor(txn, staff_id).await?;

        let Some(candidate) = find_candidate(txn, &member, cursor.last_undo_at, now).await? else {
            log::debug!("Nothing to undo for staff {staff_id}");
            return Err(AppError::NothingToUndo);
        };

        let response = self
            .ledger
            .reverse_in(txn, candidate.entry_ref(), now)
            .await?;

        undo_cursors::Entity::update(undo_cursors::ActiveModel {
            staff_id: Set(staff_id),
            last_undo_at: Set(Some(now)),
            updated_at: Set(Some(now)),
        })
        .exec(txn)
        .await?;

        Ok((response, member.business_id))
    }

    /// 当前可撤销的流水（不执行撤销）
    pub async fn current_candidate(&self, staff_id: i64) -> AppResult<Option<LedgerEntry>> {
        let txn = self.ledger.begin().await?;
        let member = resolve_active_staff(&txn, staff_id).await?;
        let now = self.ledger.clock().now(&txn).await?;
        let last_undo_at = undo_cursors::Entity::find_by_id(staff_id)
            .one(&txn)
            .await?
            .and_then(|c| c.last_undo_at);
        let candidate = find_candidate(&txn, &member, last_undo_at, now).await?;
        txn.commit().await?;
        Ok(candidate)
    }
}

async fn lock_cursor(txn: &DatabaseTransaction, staff_id: i64) -> AppResult<undo_cursors::Model> {
    undo_cursors::Entity::insert(undo_cursors::ActiveModel {
        staff_id: Set(staff_id),
        last_undo_at: Set(None),
        updated_at: Set(None),
    })
    .on_conflict(
        OnConflict::column(undo_cursors::Column::StaffId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    undo_cursors::Entity::find_by_id(staff_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("Undo cursor for staff {staff_id} missing")))
}

/// 查找员工当前唯一可撤销的流水：窗口内、晚于上次撤销水位、两类各取最新一条后比较
pub(crate) async fn find_candidate<C: ConnectionTrait>(
    conn: &C,
    member: &staff::Model,
    last_undo_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AppResult<Option<LedgerEntry>> {
    let window_start = now - undo_window();

    let mut earn_query = purchases::Entity::find()
        .filter(purchases::Column::CreatedByStaff.eq(member.id))
        .filter(purchases::Column::BusinessId.eq(member.business_id))
        .filter(purchases::Column::CreatedAt.gte(window_start));
    if let Some(mark) = last_undo_at {
        earn_query = earn_query.filter(purchases::Column::CreatedAt.gt(mark));
    }
    let earn = earn_query
        .order_by_desc(purchases::Column::CreatedAt)
        .order_by_desc(purchases::Column::Id)
        .one(conn)
        .await?;

    let mut spend_query = usages::Entity::find()
        .filter(usages::Column::CreatedByStaff.eq(member.id))
        .filter(usages::Column::BusinessId.eq(member.business_id))
        .filter(usages::Column::CreatedAt.gte(window_start));
    if let Some(mark) = last_undo_at {
        spend_query = spend_query.filter(usages::Column::CreatedAt.gt(mark));
    }
    let spend = spend_query
        .order_by_desc(usages::Column::CreatedAt)
        .order_by_desc(usages::Column::Id)
        .one(conn)
        .await?;

    Ok(select_most_recent(earn, spend))
}

/// 两类候选取较新者；时间完全相同时取赚取
fn select_most_recent(
    earn: Option<purchases::Model>,
    spend: Option<usages::Model>,
) -> Option<LedgerEntry> {
    match (earn, spend) {
        (Some(e), Some(s)) if s.created_at > e.created_at => Some(LedgerEntry::Spend(s)),
        (Some(e), _) => Some(LedgerEntry::Earn(e)),
        (None, Some(s)) => Some(LedgerEntry::Spend(s)),
        (None, None) => None,
    }
}
