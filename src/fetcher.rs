//! 身份信息查询接口 (群 / 成员 / 自身 / 陌生人)

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupInfo {
    #[serde(default)]
    pub group_id: i64,
    #[serde(default)]
    pub group_name: Option<String>,
    /// 全体禁言状态 (0 表示未开启)
    #[serde(default)]
    pub group_all_shut: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberInfo {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// 禁言到期时间戳，0 表示未被禁言
    #[serde(default)]
    pub shut_up_timestamp: Option<i64>,
}

impl MemberInfo {
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref().filter(|s| !s.is_empty())
    }

    pub fn card(&self) -> Option<&str> {
        self.card.as_deref().filter(|s| !s.is_empty())
    }

    /// 显示名称 (昵称 > 名片 > ID)
    pub fn display_name(&self) -> String {
        self.nickname()
            .or_else(|| self.card())
            .map(str::to_string)
            .unwrap_or_else(|| self.user_id.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelfInfo {
    pub user_id: i64,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrangerInfo {
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// 查询失败统一返回 None，由调用方降级为占位名称
#[async_trait]
pub trait InfoFetcher: Send + Sync {
    async fn group_info(&self, group_id: i64) -> Option<GroupInfo>;

    async fn member_info(&self, group_id: i64, user_id: i64) -> Option<MemberInfo>;

    async fn member_list(&self, group_id: i64) -> Option<Vec<MemberInfo>>;

    async fn self_info(&self) -> Option<SelfInfo>;

    async fn stranger_info(&self, user_id: i64) -> Option<StrangerInfo>;
}

/// 成员昵称，取不到时使用给定占位
pub async fn member_nickname(
    fetcher: &dyn InfoFetcher,
    group_id: i64,
    user_id: i64,
    fallback: &str,
) -> String {
    fetcher
        .member_info(group_id, user_id)
        .await
        .and_then(|m| m.nickname().map(str::to_string))
        .unwrap_or_else(|| fallback.to_string())
}

pub async fn stranger_nickname(fetcher: &dyn InfoFetcher, user_id: i64, fallback: &str) -> String {
    fetcher
        .stranger_info(user_id)
        .await
        .and_then(|s| s.nickname.filter(|n| !n.is_empty()))
        .unwrap_or_else(|| fallback.to_string())
}
