use crate::config::{ChatConfig, ListType};
use crate::debug;
use async_trait::async_trait;

/// 聊天准入检查
#[async_trait]
pub trait AccessGate: Send + Sync {
    async fn check_allowed_to_chat(
        &self,
        user_id: i64,
        group_id: Option<i64>,
        is_group_event: bool,
        is_command: bool,
    ) -> bool;
}

/// 基于配置文件黑白名单的准入策略
pub struct ListGate {
    chat: ChatConfig,
}

impl ListGate {
    pub fn new(chat: ChatConfig) -> Self {
        Self { chat }
    }
}

fn passes(list_type: ListType, list: &[i64], id: i64) -> bool {
    match list_type {
        ListType::Whitelist => list.contains(&id),
        ListType::Blacklist => !list.contains(&id),
    }
}

#[async_trait]
impl AccessGate for ListGate {
    async fn check_allowed_to_chat(
        &self,
        user_id: i64,
        group_id: Option<i64>,
        is_group_event: bool,
        is_command: bool,
    ) -> bool {
        match group_id.filter(|&g| g != 0) {
            Some(gid) => {
                if !passes(self.chat.group_list_type, &self.chat.group_list, gid) {
                    debug!(target: "Access", "群 {} 不在允许列表中", gid);
                    return false;
                }
            }
            None => {
                if !passes(self.chat.private_list_type, &self.chat.private_list, user_id) {
                    debug!(target: "Access", "用户 {} 不在私聊允许列表中", user_id);
                    return false;
                }
            }
        }

        // 全局屏蔽只作用于用户主动发起的事件
        if !is_group_event && !is_command && self.chat.ban_user_id.contains(&user_id) {
            debug!(target: "Access", "用户 {} 在全局屏蔽列表中", user_id);
            return false;
        }

        true
    }
}
