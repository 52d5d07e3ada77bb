use super::{Draft, NoticeHandler, Route};
use crate::envelope::{EnvelopeKind, Seg, UserInfo};
use crate::fetcher::stranger_nickname;
use crate::{debug, error, info, warn};
use regex::Regex;
use std::sync::OnceLock;

/// 未能识别动作时的默认说法
pub const DEFAULT_ACTION: &str = "拍了拍";

static ACTION_REGEX: OnceLock<Regex> = OnceLock::new();

// 开头的 "X了Y"，X 与 Y 相同时才算作动作 (拍了拍、戳了戳)
fn action_regex() -> &'static Regex {
    ACTION_REGEX.get_or_init(|| {
        Regex::new(r"^\s*([\x{4e00}-\x{9fa5}])了([\x{4e00}-\x{9fa5}])").unwrap()
    })
}

/// 拆分出开头的叠字动作，返回 (动作, 剩余描述)
///
/// 只识别 "X了X" 形式，"用了它" 之类不会被当作动作。
pub fn split_action(annotation: &str) -> (&str, &str) {
    if let Some(caps) = action_regex().captures(annotation)
        && let (Some(all), Some(first), Some(second)) = (caps.get(0), caps.get(1), caps.get(2))
        && first.as_str() == second.as_str()
    {
        return (all.as_str().trim_start(), &annotation[all.end()..]);
    }
    (DEFAULT_ACTION, annotation)
}

/// 生成 "{动作} {对象} {后缀}"，合并多余空白
pub fn poke_text(annotation: &str, target_name: &str) -> String {
    let (action, suffix) = split_action(annotation.trim());
    format!("{} {} {}", action, target_name, suffix)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl NoticeHandler {
    pub(super) async fn poke(
        &self,
        group_id: Option<i64>,
        sender_id: i64,
        target_id: i64,
        self_id: Option<i64>,
        annotation: &str,
    ) -> Option<Draft> {
        if !self.enable_poke
            || !self
                .gate
                .check_allowed_to_chat(sender_id, group_id, false, false)
                .await
        {
            warn!(target: "Notice", "戳一戳消息被禁用，取消戳一戳处理");
            return None;
        }
        info!(target: "Notice", "处理戳一戳消息");

        let me = match (self.fetcher.self_info().await, self_id) {
            (Some(info), _) => info.user_id,
            (None, Some(id)) => {
                warn!(target: "Notice", "自身信息获取失败，使用事件中的 self_id");
                id
            }
            (None, None) => {
                error!(target: "Notice", "自身信息获取失败");
                return None;
            }
        };

        // Bot 戳别人、别人戳别人都不转发
        if target_id != me {
            debug!(target: "Notice", "戳一戳对象 {} 不是自己，忽略", target_id);
            return None;
        }

        let (subject, target_name) = match group_id {
            Some(gid) => {
                let sender = self.fetcher.member_info(gid, sender_id).await;
                let target = self.fetcher.member_info(gid, target_id).await;
                let nickname = sender
                    .as_ref()
                    .and_then(|m| m.nickname())
                    .unwrap_or("QQ用户")
                    .to_string();
                let card = sender.as_ref().and_then(|m| m.card()).map(str::to_string);
                (
                    UserInfo::new(&self.platform, sender_id, nickname).with_card(card),
                    target
                        .as_ref()
                        .and_then(|m| m.nickname())
                        .unwrap_or("未知目标")
                        .to_string(),
                )
            }
            None => {
                let nickname = stranger_nickname(self.fetcher.as_ref(), sender_id, "QQ用户").await;
                (
                    UserInfo::new(&self.platform, sender_id, nickname),
                    stranger_nickname(self.fetcher.as_ref(), target_id, "未知目标").await,
                )
            }
        };

        Some(Draft {
            kind: EnvelopeKind::Poke,
            route: Route::Direct,
            subject,
            segment: Seg::text(poke_text(annotation, &target_name)),
            content_format: &["text"],
        })
    }
}
