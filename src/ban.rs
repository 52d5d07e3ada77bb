//! 禁言状态跟踪：当前禁言集合 (active) 与待播报解禁集合 (lifted)

use crate::{error, info};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

pub mod announcer;
pub mod detector;
pub mod loader;
pub mod store;

use loader::BanLoader;
use store::BanStore;

/// user_id 为 0 表示全体禁言
pub const WHOLE_GROUP: i64 = 0;
/// lift_time 为 -1 表示没有预定的解除时间
pub const NO_EXPIRY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub user_id: i64,
    pub group_id: i64,
    pub lift_time: i64,
}

impl BanRecord {
    pub fn new(group_id: i64, user_id: i64, lift_time: i64) -> Self {
        // 全体禁言没有自动到期
        let lift_time = if user_id == WHOLE_GROUP {
            NO_EXPIRY
        } else {
            lift_time
        };
        Self {
            user_id,
            group_id,
            lift_time,
        }
    }

    pub fn whole_group(group_id: i64) -> Self {
        Self::new(group_id, WHOLE_GROUP, NO_EXPIRY)
    }

    pub fn same_identity(&self, other: &BanRecord) -> bool {
        self.user_id == other.user_id && self.group_id == other.group_id
    }

    pub fn is_whole_group(&self) -> bool {
        self.user_id == WHOLE_GROUP
    }

    /// 是否已自然到期 (全体禁言与无期限禁言永不自然到期)
    pub fn is_due(&self, now: i64) -> bool {
        !self.is_whole_group() && self.lift_time != NO_EXPIRY && self.lift_time <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftKind {
    /// 本地检测到的自然到期
    Natural,
    /// 上游推送的解除禁言通知
    Explicit,
}

/// 从 lifted 集合取出的记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftedEntry {
    pub record: BanRecord,
    /// 集合中仍有同一身份的记录待处理
    pub duplicate_pending: bool,
}

#[derive(Debug, Default)]
struct BanState {
    active: Vec<BanRecord>,
    lifted: Vec<BanRecord>,
}

impl BanState {
    fn lift(&mut self, record: &BanRecord, kind: LiftKind) {
        self.active.retain(|r| !r.same_identity(record));
        match kind {
            LiftKind::Natural => {
                if !self.lifted.iter().any(|r| r.same_identity(record)) {
                    self.lifted.push(BanRecord {
                        lift_time: NO_EXPIRY,
                        ..*record
                    });
                }
            }
            LiftKind::Explicit => self.lifted.retain(|r| !r.same_identity(record)),
        }
    }
}

/// 禁言跟踪器，持有两组集合并与持久化存储同步
///
/// 集合锁只在同步的集合操作期间持有，存储调用在释放锁之后进行。
/// 存储写入由 `persist` 串行化，删除前会确认该身份没有重新被禁言。
pub struct BanTracker {
    state: AsyncMutex<BanState>,
    persist: AsyncMutex<()>,
    store: Arc<dyn BanStore>,
}

impl BanTracker {
    pub fn new(store: Arc<dyn BanStore>) -> Self {
        Self {
            state: AsyncMutex::new(BanState::default()),
            persist: AsyncMutex::new(()),
            store,
        }
    }

    /// 启动时从存储加载基线，失败时调用方应终止启动
    pub async fn load_from_store(&self, loader: &dyn BanLoader) -> Result<()> {
        let (active, lifted) = loader
            .load_persisted_bans()
            .await
            .context("加载禁言记录失败")?;

        let mut state = self.state.lock().await;
        // 连接就绪前已收到的事件优先
        for record in active {
            if !state.active.iter().any(|r| r.same_identity(&record)) {
                state.active.push(record);
            }
        }
        for record in lifted {
            if !state.lifted.iter().any(|r| r.same_identity(&record)) {
                state.lifted.push(record);
            }
        }

        info!(
            target: "BanTracker",
            "已加载禁言记录: 禁言中 {} 条, 待播报解禁 {} 条",
            state.active.len(),
            state.lifted.len()
        );
        Ok(())
    }

    /// 记录一次禁言 (同一身份覆盖旧记录)
    pub async fn register_ban(&self, group_id: i64, user_id: i64, lift_time: i64) -> BanRecord {
        let record = BanRecord::new(group_id, user_id, lift_time);
        let _persist = self.persist.lock().await;
        {
            let mut state = self.state.lock().await;
            match state.active.iter().position(|r| r.same_identity(&record)) {
                Some(idx) => {
                    state.active.remove(idx);
                    state.active.push(record);
                }
                None => state.active.push(record),
            }
            // 新的禁言取消尚未播报的自然解禁
            state.lifted.retain(|r| !r.same_identity(&record));
        }

        if let Err(e) = self.store.create_ban_record(&record).await {
            error!(target: "BanTracker", "保存禁言记录失败: {:#}", e);
        }
        record
    }

    /// 记录一次解禁
    ///
    /// 自然解禁进入 lifted 集合等待播报；显式解禁已有通知，
    /// 因此从两个集合中清除该身份，避免重复播报。
    pub async fn register_lift(&self, group_id: i64, user_id: i64, kind: LiftKind) {
        let record = BanRecord::new(group_id, user_id, NO_EXPIRY);
        self.state.lock().await.lift(&record, kind);
        self.forget(&record).await;
    }

    /// 将到期的禁言按自然解禁处理，返回到期的记录
    pub async fn expire_due(&self, now: i64) -> Vec<BanRecord> {
        let due: Vec<BanRecord> = {
            let mut state = self.state.lock().await;
            let due: Vec<BanRecord> =
                state.active.iter().filter(|r| r.is_due(now)).copied().collect();
            for record in &due {
                state.lift(record, LiftKind::Natural);
            }
            due
        };

        for record in &due {
            self.forget(record).await;
        }
        due
    }

    /// 取出最近一条待播报的解禁记录
    pub async fn take_lifted(&self) -> Option<LiftedEntry> {
        let mut state = self.state.lock().await;
        let record = state.lifted.pop()?;
        let duplicate_pending = state.lifted.iter().any(|r| r.same_identity(&record));
        Some(LiftedEntry {
            record,
            duplicate_pending,
        })
    }

    /// 从持久化存储中删除记录 (该身份仍在禁言中时保留)
    pub async fn forget(&self, record: &BanRecord) {
        let _persist = self.persist.lock().await;
        if self
            .state
            .lock()
            .await
            .active
            .iter()
            .any(|r| r.same_identity(record))
        {
            return;
        }

        if let Err(e) = self.store.delete_ban_record(record).await {
            error!(target: "BanTracker", "删除禁言记录失败: {:#}", e);
        }
    }

    pub async fn active(&self) -> Vec<BanRecord> {
        self.state.lock().await.active.clone()
    }

    pub async fn lifted(&self) -> Vec<BanRecord> {
        self.state.lock().await.lifted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, StaticLoader};

    fn tracker() -> (BanTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (BanTracker::new(store.clone()), store)
    }

    #[tokio::test]
    async fn reban_replaces_instead_of_duplicating() {
        let (t, store) = tracker();
        t.register_ban(999, 12345, 1_000).await;
        t.register_ban(999, 12345, 2_000).await;

        assert_eq!(t.active().await, vec![BanRecord::new(999, 12345, 2_000)]);
        assert_eq!(store.records(), vec![BanRecord::new(999, 12345, 2_000)]);
    }

    #[tokio::test]
    async fn whole_group_ban_never_expires() {
        let (t, _) = tracker();
        let rec = t.register_ban(999, WHOLE_GROUP, 5).await;
        assert_eq!(rec.lift_time, NO_EXPIRY);
        assert!(t.expire_due(i64::MAX).await.is_empty());
    }

    #[tokio::test]
    async fn expire_due_moves_only_past_records() {
        let (t, _) = tracker();
        t.register_ban(1, 10, 100).await;
        t.register_ban(1, 11, 300).await;
        t.register_ban(1, 12, NO_EXPIRY).await;

        let moved = t.expire_due(200).await;
        assert_eq!(moved, vec![BanRecord::new(1, 10, 100)]);
        assert_eq!(t.active().await.len(), 2);
        assert_eq!(t.lifted().await, vec![BanRecord::new(1, 10, NO_EXPIRY)]);
    }

    #[tokio::test]
    async fn expired_record_is_removed_from_store() {
        let (t, store) = tracker();
        t.register_ban(1, 10, 100).await;
        t.register_ban(1, 11, 300).await;

        t.expire_due(200).await;

        assert_eq!(store.records(), vec![BanRecord::new(1, 11, 300)]);
    }

    #[tokio::test]
    async fn reban_cancels_pending_natural_lift() {
        let (t, store) = tracker();
        t.register_ban(999, 12345, 900).await;
        t.expire_due(1_000).await;
        t.register_ban(999, 12345, 5_000).await;

        assert!(t.lifted().await.is_empty());
        assert_eq!(t.active().await, vec![BanRecord::new(999, 12345, 5_000)]);
        assert_eq!(store.records(), vec![BanRecord::new(999, 12345, 5_000)]);
    }

    #[tokio::test]
    async fn forget_keeps_record_of_active_ban() {
        let (t, store) = tracker();
        t.register_ban(999, 12345, 5_000).await;

        t.forget(&BanRecord::new(999, 12345, NO_EXPIRY)).await;

        assert_eq!(store.records(), vec![BanRecord::new(999, 12345, 5_000)]);
    }

    #[tokio::test]
    async fn explicit_lift_purges_both_sets() {
        let (t, store) = tracker();
        t.register_ban(1, 10, 100).await;
        t.expire_due(200).await;
        t.register_ban(1, 10, 900).await;

        t.register_lift(1, 10, LiftKind::Explicit).await;

        assert!(t.active().await.is_empty());
        assert!(t.lifted().await.is_empty());
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn natural_lift_is_staged_once_per_identity() {
        let (t, _) = tracker();
        t.register_lift(1, 10, LiftKind::Natural).await;
        t.register_lift(1, 10, LiftKind::Natural).await;

        assert_eq!(t.lifted().await, vec![BanRecord::new(1, 10, NO_EXPIRY)]);
    }

    #[tokio::test]
    async fn take_lifted_is_lifo_and_flags_duplicates() {
        let (t, _) = tracker();
        t.register_lift(1, 10, LiftKind::Natural).await;
        t.register_lift(1, 20, LiftKind::Natural).await;
        t.state
            .lock()
            .await
            .lifted
            .push(BanRecord::new(1, 10, NO_EXPIRY));

        // lifted: [10, 20, 10]
        let first = t.take_lifted().await.unwrap();
        assert_eq!(first.record, BanRecord::new(1, 10, NO_EXPIRY));
        assert!(first.duplicate_pending);

        let second = t.take_lifted().await.unwrap();
        assert_eq!(second.record.user_id, 20);
        assert!(!second.duplicate_pending);
    }

    #[tokio::test]
    async fn load_keeps_records_registered_before_baseline() {
        let (t, _) = tracker();
        t.register_ban(1, 10, 500).await;

        let loader = StaticLoader::new(
            vec![BanRecord::new(1, 10, 100), BanRecord::new(2, 20, 100)],
            vec![BanRecord::new(3, 30, NO_EXPIRY)],
        );
        t.load_from_store(&loader).await.unwrap();

        let active = t.active().await;
        assert_eq!(active.len(), 2);
        assert!(active.contains(&BanRecord::new(1, 10, 500)));
        assert_eq!(t.lifted().await.len(), 1);
    }

    #[tokio::test]
    async fn load_failure_is_reported() {
        let (t, _) = tracker();
        let loader = StaticLoader::failing();
        assert!(t.load_from_store(&loader).await.is_err());
    }
}
