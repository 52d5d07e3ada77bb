use super::{BanRecord, BanTracker, LiftedEntry};
use crate::clock::Clock;
use crate::delivery::DeliveryQueue;
use crate::envelope::{Envelope, EnvelopeBuilder, EnvelopeKind, NotifyData, NotifyKind, Seg, UserInfo};
use crate::fetcher::InfoFetcher;
use crate::{error, info, warn};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 每播报一条后的间隔
pub const EMIT_INTERVAL: Duration = Duration::from_millis(500);
/// 集合为空时的轮询间隔
pub const IDLE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Emitted,
    Skipped,
    Idle,
}

/// 将自然解禁记录转换为通知并放入投递队列
pub struct Announcer {
    platform: String,
    tracker: Arc<BanTracker>,
    fetcher: Arc<dyn InfoFetcher>,
    queue: DeliveryQueue,
    clock: Arc<dyn Clock>,
}

impl Announcer {
    pub fn new(
        platform: &str,
        tracker: Arc<BanTracker>,
        fetcher: Arc<dyn InfoFetcher>,
        queue: DeliveryQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform: platform.to_string(),
            tracker,
            fetcher,
            queue,
            clock,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            let pause = match self.step().await {
                Step::Emitted => EMIT_INTERVAL,
                Step::Skipped => Duration::ZERO,
                Step::Idle => IDLE_INTERVAL,
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// 处理 lifted 集合中最新的一条记录
    pub async fn step(&self) -> Step {
        let Some(LiftedEntry {
            record,
            duplicate_pending,
        }) = self.tracker.take_lifted().await
        else {
            return Step::Idle;
        };

        if duplicate_pending {
            info!(
                target: "BanAnnouncer",
                "群 {} 用户 {} 仍有重复的解禁记录待处理，跳过本条",
                record.group_id,
                record.user_id
            );
            return Step::Skipped;
        }

        self.tracker.forget(&record).await;

        match self.build_envelope(&record).await {
            Ok(envelope) => {
                self.queue.put_notice(envelope);
                Step::Emitted
            }
            Err(e) => {
                error!(target: "BanAnnouncer", "构建自然解禁通知失败: {:#}", e);
                Step::Skipped
            }
        }
    }

    async fn build_envelope(&self, record: &BanRecord) -> Result<Envelope> {
        let notify = if record.is_whole_group() {
            NotifyData::new(NotifyKind::WholeLiftBan)
        } else {
            let member = self
                .fetcher
                .member_info(record.group_id, record.user_id)
                .await;
            let nickname = member
                .as_ref()
                .and_then(|m| m.nickname())
                .unwrap_or("QQ用户")
                .to_string();
            let card = member.as_ref().and_then(|m| m.card()).map(str::to_string);

            let mut data = NotifyData::new(NotifyKind::LiftBan);
            data.lifted_user_info =
                Some(UserInfo::new(&self.platform, record.user_id, nickname).with_card(card));
            data
        };

        let text = match &notify.lifted_user_info {
            Some(user) => format!("{} 的禁言已到期自动解除", user.user_nickname),
            None => "全体禁言已解除".to_string(),
        };

        let group_name = match self.fetcher.group_info(record.group_id).await {
            Some(g) => g.group_name,
            None => {
                warn!(target: "BanAnnouncer", "无法获取notice消息所在群的名称");
                None
            }
        };

        let raw = simd_json::json!({
            "post_type": "notice",
            "notice_type": "group_ban",
            "sub_type": "lift_ban",
            "group_id": record.group_id,
            "user_id": record.user_id,
            "operator_id": null
        });

        EnvelopeBuilder::new(
            &self.platform,
            EnvelopeKind::Notice,
            self.clock.timestamp_f64(),
        )
        .user(UserInfo::system(&self.platform))
        .group(record.group_id, group_name)
        .format(&["text", "notify"])
        .segment(Seg::Seglist(vec![Seg::Notify(notify), Seg::text(text)]))
        .raw(&raw)
        .build()
    }
}
