use super::BanTracker;
use crate::clock::Clock;
use crate::info;
use std::time::Duration;

/// 自然解禁检测周期
pub const DETECT_INTERVAL: Duration = Duration::from_secs(5);

/// 执行一次检测，返回本次移入 lifted 集合的数量
pub async fn tick(tracker: &BanTracker, clock: &dyn Clock) -> usize {
    let moved = tracker.expire_due(clock.timestamp()).await;
    for record in &moved {
        info!(
            target: "BanDetector",
            "检测到用户 {} 在群 {} 的禁言已解除",
            record.user_id,
            record.group_id
        );
    }
    moved.len()
}
