use super::{Draft, NoticeHandler};
use crate::ban::{LiftKind, NO_EXPIRY, WHOLE_GROUP};
use crate::envelope::{NotifyData, NotifyKind, Seg};
use crate::event::BanAction;
use crate::{error, info};

impl NoticeHandler {
    pub(super) async fn group_ban(
        &self,
        action: BanAction,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: i64,
        duration: Option<i64>,
    ) -> Option<Draft> {
        if !self
            .gate
            .check_allowed_to_chat(user_id, group_id, true, false)
            .await
        {
            return None;
        }

        let Some(group_id) = group_id else {
            error!(target: "Notice", "群ID不能为空，无法处理禁言通知");
            return None;
        };

        let (notify, text, missing_operator) = match action {
            BanAction::Ban => {
                info!(target: "Notice", "处理群禁言");
                let Some(duration) = duration else {
                    error!(target: "Notice", "禁言时长不能为空，无法处理禁言通知");
                    return None;
                };
                let (notify, text) = self.ban(group_id, user_id, duration).await?;
                (notify, text, "无法获取禁言执行者的昵称，消息可能会无效")
            }
            BanAction::LiftBan => {
                info!(target: "Notice", "处理解除群禁言");
                let (notify, text) = self.lift_ban(group_id, user_id).await;
                (notify, text, "无法获取解除禁言执行者的昵称，消息可能会无效")
            }
        };

        let operator = self
            .member_user_info(group_id, operator_id, missing_operator)
            .await;

        Some(Draft::system(
            operator,
            Seg::Seglist(vec![Seg::Notify(notify), Seg::text(text)]),
        ))
    }

    async fn ban(&self, group_id: i64, user_id: i64, duration: i64) -> Option<(NotifyData, String)> {
        if duration < 0 {
            error!(target: "Notice", "禁言时长无效: {}，无法处理禁言通知", duration);
            return None;
        }

        if user_id == WHOLE_GROUP {
            self.tracker
                .register_ban(group_id, WHOLE_GROUP, NO_EXPIRY)
                .await;

            let mut notify = NotifyData::new(NotifyKind::WholeBan);
            notify.duration = Some(duration);
            return Some((notify, "开启了全体禁言".to_string()));
        }

        let Some(lift_time) = self.clock.timestamp().checked_add(duration) else {
            error!(target: "Notice", "禁言时长超出范围: {}，无法处理禁言通知", duration);
            return None;
        };

        let banned = self
            .member_user_info(group_id, user_id, "无法获取被禁言用户的昵称")
            .await;
        self.tracker.register_ban(group_id, user_id, lift_time).await;

        let text = format!(
            "禁言了 {} {}",
            banned.user_nickname,
            format_duration(duration)
        );
        let mut notify = NotifyData::new(NotifyKind::Ban);
        notify.duration = Some(duration);
        notify.banned_user_info = Some(banned);
        Some((notify, text))
    }

    async fn lift_ban(&self, group_id: i64, user_id: i64) -> (NotifyData, String) {
        // 上游已推送解除通知，不再等待自然解禁播报
        self.tracker
            .register_lift(group_id, user_id, LiftKind::Explicit)
            .await;

        if user_id == WHOLE_GROUP {
            return (
                NotifyData::new(NotifyKind::WholeLiftBan),
                "解除了全体禁言".to_string(),
            );
        }

        let lifted = self
            .member_user_info(
                group_id,
                user_id,
                "无法获取解除禁言消息发送者的昵称，消息可能会无效",
            )
            .await;
        let text = format!("解除了 {} 的禁言", lifted.user_nickname);
        let mut notify = NotifyData::new(NotifyKind::LiftBan);
        notify.lifted_user_info = Some(lifted);
        (notify, text)
    }
}

/// 将秒数格式化为 "1天2小时3分钟4秒"，省略为零的单位
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    let units = [
        (secs / 86_400, "天"),
        (secs % 86_400 / 3_600, "小时"),
        (secs % 3_600 / 60, "分钟"),
        (secs % 60, "秒"),
    ];

    let text: String = units
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{}{}", n, unit))
        .collect();

    if text.is_empty() {
        "0秒".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_omits_zero_units() {
        assert_eq!(format_duration(0), "0秒");
        assert_eq!(format_duration(-5), "0秒");
        assert_eq!(format_duration(600), "10分钟");
        assert_eq!(format_duration(3_605), "1小时5秒");
        assert_eq!(format_duration(2_592_000), "30天");
        assert_eq!(format_duration(90_061), "1天1小时1分钟1秒");
    }
}
