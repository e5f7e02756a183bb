use crate::entities::{purchase_entity as purchases, undo_cursor_entity as undo_cursors, usage_entity as usages};
use crate::error::{AppError, AppResult};
use crate::models::{ActivityDay, ActivityFeed, ActivityItem, EntryKind, EntryRef, LedgerEntry};
use crate::services::ledger_service::{LedgerService, resolve_active_staff};
use crate::services::undo_service::find_candidate;
use chrono::Duration;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

/// 每类流水最多返回条数
pub const MAX_ITEMS_PER_KIND: u64 = 500;

/// 商家流水动态，按 UTC 自然日分组
#[derive(Clone)]
pub struct ActivityService {
    ledger: LedgerService,
    item_limit: u64,
}

impl ActivityService {
    pub fn new(ledger: LedgerService) -> Self {
        Self {
            ledger,
            item_limit: MAX_ITEMS_PER_KIND,
        }
    }

    pub fn with_item_limit(mut self, item_limit: u64) -> Self {
        self.item_limit = item_limit.max(1);
        self
    }

    pub async fn activity_feed(
        &self,
        business_id: i64,
        viewer_staff: Option<i64>,
        days: u32,
    ) -> AppResult<ActivityFeed> {
        let txn = self.ledger.begin().await?;
        let now = self.ledger.clock().now(&txn).await?;
        let since = now - Duration::days(i64::from(days));

        let earns = purchases::Entity::find()
            .filter(purchases::Column::BusinessId.eq(business_id))
            .filter(purchases::Column::CreatedAt.gte(since))
            .order_by_desc(purchases::Column::CreatedAt)
            .order_by_desc(purchases::Column::Id)
            .limit(self.item_limit + 1)
            .all(&txn)
            .await?;
        let spends = usages::Entity::find()
            .filter(usages::Column::BusinessId.eq(business_id))
            .filter(usages::Column::CreatedAt.gte(since))
            .order_by_desc(usages::Column::CreatedAt)
            .order_by_desc(usages::Column::Id)
            .limit(self.item_limit + 1)
            .all(&txn)
            .await?;

        let reversible = match viewer_staff {
            Some(staff_id) => {
                let member = resolve_active_staff(&txn, staff_id).await?;
                if member.business_id != business_id {
                    return Err(AppError::Unauthorized(format!(
                        "Staff {staff_id} does not belong to business {business_id}"
                    )));
                }
                let last_undo_at = undo_cursors::Entity::find_by_id(staff_id)
                    .one(&txn)
                    .await?
                    .and_then(|c| c.last_undo_at);
                find_candidate(&txn, &member, last_undo_at, now)
                    .await?
                    .map(|e| e.entry_ref())
            }
            None => None,
        };
        txn.commit().await?;

        let limit = self.item_limit as usize;
        let (earns, earn_cut) = keep_newest(earns, limit);
        let (spends, spend_cut) = keep_newest(spends, limit);
        // 超限类别中最新的截断点；更早的另一类流水也一并丢弃，保证结果是连续的时间段
        let cutoff = earns
            .last()
            .filter(|_| earn_cut)
            .map(|p| p.created_at)
            .into_iter()
            .chain(spends.last().filter(|_| spend_cut).map(|u| u.created_at))
            .max();

        let mut entries: Vec<LedgerEntry> = earns
            .into_iter()
            .map(LedgerEntry::Earn)
            .chain(spends.into_iter().map(LedgerEntry::Spend))
            .filter(|e| cutoff.is_none_or(|c| e.created_at() >= c))
            .collect();
        entries.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        let items = entries
            .iter()
            .map(|e| to_item(e, reversible))
            .collect::<Vec<_>>();
        if cutoff.is_some() {
            log::warn!(
                "Activity feed for business {business_id} truncated at {} items per kind",
                self.item_limit
            );
        }
        Ok(ActivityFeed {
            days: group_by_day(items),
            truncated: cutoff.is_some(),
        })
    }
}

/// 多取一条用于判断是否超限
fn keep_newest<T>(mut rows: Vec<T>, limit: usize) -> (Vec<T>, bool) {
    let overflow = rows.len() > limit;
    rows.truncate(limit);
    (rows, overflow)
}

fn to_item(entry: &LedgerEntry, reversible: Option<EntryRef>) -> ActivityItem {
    let is_reversible = reversible == Some(entry.entry_ref());
    match entry {
        LedgerEntry::Earn(p) => ActivityItem {
            kind: EntryKind::Earn,
            entry_id: p.id,
            customer_id: p.customer_id,
            points: p.points_earned,
            amount: p.gross_amount,
            quantity: p.quantity,
            product_id: p.product_id,
            created_by_staff: p.created_by_staff,
            created_at: p.created_at,
            reversible: is_reversible,
        },
        LedgerEntry::Spend(u) => ActivityItem {
            kind: EntryKind::Spend,
            entry_id: u.id,
            customer_id: u.customer_id,
            points: u.points_spent,
            amount: u.unit_price.saturating_mul(i64::from(u.quantity)),
            quantity: u.quantity,
            product_id: u.product_id,
            created_by_staff: u.created_by_staff,
            created_at: u.created_at,
            reversible: is_reversible,
        },
    }
}

/// 按 UTC 日期分组；输入需已按时间倒序
fn group_by_day(items: Vec<ActivityItem>) -> Vec<ActivityDay> {
    let mut days: Vec<ActivityDay> = Vec::new();
    for item in items {
        let date = item.created_at.date_naive();
        if days.last().map(|d| d.date) != Some(date) {
            days.push(ActivityDay {
                date,
                points_earned: 0,
                points_spent: 0,
                items: Vec::new(),
            });
        }
        if let Some(day) = days.last_mut() {
            match item.kind {
                EntryKind::Earn => day.points_earned += item.points,
                EntryKind::Spend => day.points_spent += item.points,
            }
            day.items.push(item);
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EarnItem, SpendContext};
    use crate::test_support::fixture;

    fn item(points: i64) -> EarnItem {
        EarnItem {
            product_id: None,
            quantity: 2,
            gross_amount: points * 10,
            points_earned: points,
        }
    }

    #[tokio::test]
    async fn test_feed_groups_by_day_newest_first() {
        let fx = fixture().await;
        let svc = ActivityService::new(fx.ledger.clone());
        let (c, b) = (fx.customer.id, fx.business.id);

        fx.ledger.record_earn(c, b, &[item(100)], Some(fx.staff.id), None).await.unwrap();
        fx.clock.advance(Duration::days(1));
        fx.ledger.record_earn(c, b, &[item(20)], Some(fx.colleague.id), None).await.unwrap();
        fx.clock.advance(Duration::hours(1));
        let ctx = SpendContext {
            product_id: Some(4),
            quantity: Some(3),
            unit_price: Some(250),
        };
        fx.ledger.record_spend(c, b, 30, Some(&ctx), Some(fx.staff.id), None).await.unwrap();
        // 其他商家的流水不出现
        fx.ledger.record_earn(c, fx.other_business.id, &[item(5)], None, None).await.unwrap();

        let feed = svc.activity_feed(b, None, 7).await.unwrap();
        assert!(!feed.truncated);
        let feed = feed.days;
        assert_eq!(feed.len(), 2);
        assert!(feed[0].date > feed[1].date);
        assert_eq!(feed[0].items.len(), 2);
        assert_eq!(feed[0].items[0].kind, EntryKind::Spend);
        assert_eq!(feed[0].items[0].amount, 750);
        assert_eq!(feed[0].points_earned, 20);
        assert_eq!(feed[0].points_spent, 30);
        assert_eq!(feed[1].points_earned, 100);
        assert!(feed.iter().flat_map(|d| &d.items).all(|i| !i.reversible));
    }

    #[tokio::test]
    async fn test_feed_respects_lookback() {
        let fx = fixture().await;
        let svc = ActivityService::new(fx.ledger.clone());
        fx.ledger
            .record_earn(fx.customer.id, fx.business.id, &[item(10)], None, None)
            .await
            .unwrap();
        fx.clock.advance(Duration::days(3));

        assert_eq!(svc.activity_feed(fx.business.id, None, 7).await.unwrap().days.len(), 1);
        assert!(svc.activity_feed(fx.business.id, None, 2).await.unwrap().days.is_empty());
    }

    #[tokio::test]
    async fn test_only_viewers_candidate_is_reversible() {
        let fx = fixture().await;
        let svc = ActivityService::new(fx.ledger.clone());
        let (c, b) = (fx.customer.id, fx.business.id);

        fx.ledger.record_earn(c, b, &[item(10)], Some(fx.staff.id), None).await.unwrap();
        fx.clock.advance(Duration::seconds(1));
        let latest = fx
            .ledger
            .record_earn(c, b, &[item(20)], Some(fx.staff.id), None)
            .await
            .unwrap();
        fx.clock.advance(Duration::seconds(1));
        fx.ledger.record_earn(c, b, &[item(30)], Some(fx.colleague.id), None).await.unwrap();

        let feed = svc.activity_feed(b, Some(fx.staff.id), 7).await.unwrap();
        let flagged: Vec<_> = feed
            .days
            .iter()
            .flat_map(|d| &d.items)
            .filter(|i| i.reversible)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].entry_id, latest.entry_ids[0]);

        // 窗口过后不再有可撤销项
        fx.clock.advance(Duration::minutes(5));
        let feed = svc.activity_feed(b, Some(fx.staff.id), 7).await.unwrap();
        assert!(feed.days.iter().flat_map(|d| &d.items).all(|i| !i.reversible));
    }

    #[tokio::test]
    async fn test_foreign_viewer_is_unauthorized() {
        let fx = fixture().await;
        let svc = ActivityService::new(fx.ledger.clone());
        let err = svc
            .activity_feed(fx.business.id, Some(fx.foreign_staff.id), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_overflowing_feed_keeps_newest_span_and_flags_it() {
        let fx = fixture().await;
        let svc = ActivityService::new(fx.ledger.clone()).with_item_limit(2);
        let (c, b) = (fx.customer.id, fx.business.id);

        fx.ledger.record_earn(c, b, &[item(100)], None, None).await.unwrap();
        fx.clock.advance(Duration::hours(1));
        fx.ledger.record_spend(c, b, 10, None, None, None).await.unwrap();
        let mut recent = Vec::new();
        for points in [1, 2, 3] {
            fx.clock.advance(Duration::hours(1));
            let r = fx.ledger.record_earn(c, b, &[item(points)], None, None).await.unwrap();
            recent.push(r.entry_ids[0]);
        }

        let feed = svc.activity_feed(b, None, 7).await.unwrap();
        assert!(feed.truncated);
        let items: Vec<_> = feed.days.iter().flat_map(|d| &d.items).collect();
        // 消费早于截断点，不能只留下它而缺少同时段的赚取
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.kind == EntryKind::Earn));
        assert_eq!(items[0].entry_id, recent[2]);
        assert_eq!(items[1].entry_id, recent[1]);
        let earned: i64 = feed.days.iter().map(|d| d.points_earned).sum();
        let spent: i64 = feed.days.iter().map(|d| d.points_spent).sum();
        assert_eq!((earned, spent), (5, 0));

        // 恰好等于上限时不算截断
        let svc = ActivityService::new(fx.ledger.clone()).with_item_limit(4);
        let feed = svc.activity_feed(b, None, 7).await.unwrap();
        assert!(!feed.truncated);
        assert_eq!(feed.days.iter().map(|d| d.items.len()).sum::<usize>(), 5);
    }
}
