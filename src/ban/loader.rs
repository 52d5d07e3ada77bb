use super::store::BanStore;
use super::{BanRecord, NO_EXPIRY};
use crate::clock::Clock;
use crate::fetcher::InfoFetcher;
use crate::{debug, info};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// 启动基线加载：返回 (仍在禁言中, 已解除待播报)
#[async_trait]
pub trait BanLoader: Send + Sync {
    async fn load_persisted_bans(&self) -> Result<(Vec<BanRecord>, Vec<BanRecord>)>;
}

/// 读取持久化记录，并向上游核对每条记录的实际状态
pub struct ReconcilingLoader {
    store: Arc<dyn BanStore>,
    fetcher: Arc<dyn InfoFetcher>,
    clock: Arc<dyn Clock>,
}

impl ReconcilingLoader {
    pub fn new(
        store: Arc<dyn BanStore>,
        fetcher: Arc<dyn InfoFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            fetcher,
            clock,
        }
    }

    /// 核对单条记录：Some(record) 表示仍在禁言中，None 表示已解除
    async fn reconcile(&self, record: BanRecord, now: i64) -> Option<BanRecord> {
        if record.is_whole_group() {
            return match self.fetcher.group_info(record.group_id).await {
                Some(group) => match group.group_all_shut {
                    Some(0) => None,
                    _ => Some(record),
                },
                None => Some(record),
            };
        }

        match self
            .fetcher
            .member_info(record.group_id, record.user_id)
            .await
            .and_then(|m| m.shut_up_timestamp)
        {
            Some(ts) if ts > now => Some(BanRecord {
                lift_time: ts,
                ..record
            }),
            Some(_) => None,
            // 无法查询时按记录自身的到期时间判断
            None if record.is_due(now) => None,
            None => Some(record),
        }
    }
}

#[async_trait]
impl BanLoader for ReconcilingLoader {
    async fn load_persisted_bans(&self) -> Result<(Vec<BanRecord>, Vec<BanRecord>)> {
        let records = self.store.list_ban_records().await?;
        let now = self.clock.timestamp();

        let mut active = Vec::new();
        let mut lifted = Vec::new();
        for record in records {
            match self.reconcile(record, now).await {
                Some(still_banned) => {
                    if still_banned.lift_time != record.lift_time {
                        // 上游时间为准，顺便刷新存储
                        self.store.create_ban_record(&still_banned).await?;
                    }
                    active.push(still_banned);
                }
                None => {
                    debug!(
                        target: "BanTracker",
                        "群 {} 用户 {} 的禁言在离线期间已解除",
                        record.group_id,
                        record.user_id
                    );
                    lifted.push(BanRecord {
                        lift_time: NO_EXPIRY,
                        ..record
                    });
                }
            }
        }

        info!(
            target: "BanTracker",
            "禁言记录核对完成 (禁言中 {}, 已解除 {})",
            active.len(),
            lifted.len()
        );
        Ok((active, lifted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fetcher::{GroupInfo, MemberInfo};
    use crate::testing::{FakeFetcher, MemoryStore};

    #[tokio::test]
    async fn splits_records_by_upstream_state() {
        let store = Arc::new(MemoryStore::default());
        store.seed(&[
            BanRecord::new(1, 10, 5_000),
            BanRecord::new(1, 11, 5_000),
            BanRecord::new(1, 12, 500),
            BanRecord::whole_group(2),
            BanRecord::whole_group(3),
        ]);

        let mut fetcher = FakeFetcher::default();
        fetcher.members.insert(
            (1, 10),
            MemberInfo {
                user_id: 10,
                shut_up_timestamp: Some(0),
                ..Default::default()
            },
        );
        fetcher.members.insert(
            (1, 11),
            MemberInfo {
                user_id: 11,
                shut_up_timestamp: Some(8_000),
                ..Default::default()
            },
        );
        fetcher.groups.insert(
            2,
            GroupInfo {
                group_id: 2,
                group_all_shut: Some(0),
                ..Default::default()
            },
        );

        let loader = ReconcilingLoader::new(
            store.clone(),
            Arc::new(fetcher),
            Arc::new(ManualClock::new(1_000)),
        );
        let (active, lifted) = loader.load_persisted_bans().await.unwrap();

        // 11 仍在禁言 (时间已刷新)，3 的全体禁言无法核实则保留
        assert_eq!(
            active,
            vec![BanRecord::new(1, 11, 8_000), BanRecord::whole_group(3)]
        );
        // 10 上游已解除，12 查询失败但已过期，2 全体禁言已关闭
        assert_eq!(
            lifted,
            vec![
                BanRecord::new(1, 10, NO_EXPIRY),
                BanRecord::new(1, 12, NO_EXPIRY),
                BanRecord::whole_group(2),
            ]
        );
        assert!(store.records().contains(&BanRecord::new(1, 11, 8_000)));
    }
}
