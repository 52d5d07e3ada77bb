use super::{Draft, NoticeHandler};
use crate::envelope::{Seg, UserInfo};
use crate::fetcher::{member_nickname, stranger_nickname};
use crate::{error, info};

/// 默认群名片的占位
const DEFAULT_CARD: &str = "(默认)";

fn require_group(group_id: Option<i64>, what: &str) -> Option<i64> {
    if group_id.is_none() {
        error!(target: "Notice", "群ID不能为空，无法处理{}通知", what);
    }
    group_id
}

impl NoticeHandler {
    /// 操作者名称：昵称，取不到时为 ID，没有操作者时为 "系统"
    async fn operator_name(&self, group_id: i64, operator_id: Option<i64>) -> String {
        match operator_id {
            Some(op) => member_nickname(self.fetcher.as_ref(), group_id, op, &op.to_string()).await,
            None => "系统".to_string(),
        }
    }

    pub(super) async fn group_admin(
        &self,
        sub_type: &str,
        group_id: Option<i64>,
        user_id: i64,
        self_id: Option<i64>,
    ) -> Option<Draft> {
        let group_id = require_group(group_id, "管理员变更")?;

        let nickname = if user_id != 0 {
            member_nickname(self.fetcher.as_ref(), group_id, user_id, "QQ用户").await
        } else {
            "系统".to_string()
        };

        let text = if user_id == 0 {
            // 群主转让
            let owner = self
                .fetcher
                .member_list(group_id)
                .await
                .and_then(|list| list.into_iter().find(|m| m.role.as_deref() == Some("owner")));
            match owner {
                Some(owner) => {
                    info!(target: "Notice", "群 {} 群主变更为 {}", group_id, owner.user_id);
                    format!("群主变更为 {}", owner.display_name())
                }
                None => {
                    error!(target: "Notice", "群 {} 群主变更（未找到新群主）", group_id);
                    "群主变更".to_string()
                }
            }
        } else {
            let is_self = Some(user_id) == self_id;
            let action = match sub_type {
                "set" => "被设置为管理员".to_string(),
                "unset" => "被取消管理员".to_string(),
                other => format!("管理员状态变更: {}", other),
            };
            if is_self {
                info!(target: "Notice", "群 {} Bot{}", group_id, action);
                format!("（你）{}", action)
            } else {
                info!(target: "Notice", "群 {} 用户 {} {}", group_id, user_id, action);
                action
            }
        };

        Some(Draft::system(
            UserInfo::new(&self.platform, user_id, nickname),
            Seg::text(text),
        ))
    }

    pub(super) async fn group_increase(
        &self,
        sub_type: &str,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: Option<i64>,
        self_id: Option<i64>,
    ) -> Option<Draft> {
        let group_id = require_group(group_id, "入群")?;

        let nickname = member_nickname(self.fetcher.as_ref(), group_id, user_id, "QQ用户").await;
        let operator_name = self.operator_name(group_id, operator_id).await;

        let text = match sub_type {
            "invite" => format!("被 {} 邀请加入", operator_name),
            "approve" => format!("通过 {} 审批加入", operator_name),
            other => format!("加入群（方式: {}）", other),
        };
        let text = if Some(user_id) == self_id {
            info!(target: "Notice", "群 {} Bot{}", group_id, text);
            format!("（你）{}", text)
        } else {
            info!(target: "Notice", "群 {} 用户 {} {}", group_id, user_id, text);
            text
        };

        Some(Draft::system(
            UserInfo::new(&self.platform, user_id, nickname),
            Seg::text(text),
        ))
    }

    pub(super) async fn group_decrease(
        &self,
        sub_type: &str,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: Option<i64>,
        self_id: Option<i64>,
    ) -> Option<Draft> {
        let group_id = require_group(group_id, "退群")?;

        // 已离开的成员查不到群成员信息
        let nickname = stranger_nickname(self.fetcher.as_ref(), user_id, "QQ用户").await;
        let operator_name = self.operator_name(group_id, operator_id).await;

        if sub_type == "disband" {
            info!(target: "Notice", "群 {} 已被 {:?} 解散", group_id, operator_id);
            return Some(Draft::system(
                UserInfo::new(&self.platform, user_id, operator_name),
                Seg::text("群已被解散"),
            ));
        }

        let text = match sub_type {
            "leave" => "退出了群".to_string(),
            "kick" => format!("被 {} 移出", operator_name),
            other => format!("离开群（方式: {}）", other),
        };
        let text = if Some(user_id) == self_id {
            info!(target: "Notice", "群 {} Bot{}", group_id, text);
            format!("（你）{}", text)
        } else {
            info!(target: "Notice", "群 {} 用户 {} {}", group_id, user_id, text);
            text
        };

        Some(Draft::system(
            UserInfo::new(&self.platform, user_id, nickname),
            Seg::text(text),
        ))
    }

    pub(super) async fn essence(
        &self,
        sub_type: &str,
        group_id: Option<i64>,
        message_id: i64,
        operator_id: Option<i64>,
        sender_id: i64,
        self_id: Option<i64>,
    ) -> Option<Draft> {
        let group_id = require_group(group_id, "精华消息")?;

        let operator_name = match operator_id {
            Some(op) => match self.fetcher.member_info(group_id, op).await {
                Some(member) => member.display_name(),
                None => op.to_string(),
            },
            None => "系统".to_string(),
        };

        let text = match sub_type {
            "add" if sender_id == 0 => format!("将 一条消息（ID: {}）设为精华", message_id),
            "add" => {
                let sender_name = match self.fetcher.member_info(group_id, sender_id).await {
                    Some(member) => member.display_name(),
                    None => "QQ用户".to_string(),
                };
                if Some(sender_id) == self_id {
                    format!("将 {}（你）的消息设为精华", sender_name)
                } else {
                    format!("将 {} 的消息设为精华", sender_name)
                }
            }
            other => format!("精华消息事件：{}", other),
        };
        info!(
            target: "Notice",
            "群 {} 消息（ID: {}）精华事件 {} 由 {:?} 触发",
            group_id,
            message_id,
            sub_type,
            operator_id
        );

        Some(Draft::system(
            UserInfo::new(&self.platform, operator_id.unwrap_or(0), operator_name),
            Seg::text(text),
        ))
    }

    pub(super) async fn group_card(
        &self,
        group_id: Option<i64>,
        user_id: i64,
        self_id: Option<i64>,
        card_old: Option<&str>,
        card_new: Option<&str>,
    ) -> Option<Draft> {
        let group_id = require_group(group_id, "群名片")?;

        let nickname = member_nickname(
            self.fetcher.as_ref(),
            group_id,
            user_id,
            &user_id.to_string(),
        )
        .await;
        let old_card = card_old.unwrap_or(&nickname).to_string();
        let new_card = card_new.unwrap_or(DEFAULT_CARD).to_string();

        // 改回默认名片或名片未实际变化时不转发
        if new_card == DEFAULT_CARD || new_card == old_card {
            return None;
        }

        let change = format!("群卡片被修改为：{} → {}", old_card, new_card);
        let text = if Some(user_id) == self_id {
            info!(target: "Notice", "群 {} Bot的{}", group_id, change);
            format!("（你）{}", change)
        } else {
            info!(target: "Notice", "群 {} 用户 {} 的{}", group_id, user_id, change);
            change
        };

        Some(Draft::system(
            UserInfo::new(&self.platform, user_id, nickname).with_card(Some(new_card)),
            Seg::text(text),
        ))
    }
}
