//! 发往 MaiBot 的标准消息封装 (maim_message 兼容格式)

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::prelude::Writable;

/// MaiBot 侧可接受的消息格式
pub const ACCEPT_FORMAT: &[&str] = &[
    "text", "image", "emoji", "reply", "voice", "command", "voiceurl", "music", "videourl", "file",
];

// ================== 身份信息 ==================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub platform: String,
    pub user_id: i64,
    pub user_nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_cardname: Option<String>,
}

impl UserInfo {
    pub fn new(platform: &str, user_id: i64, nickname: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            user_id,
            user_nickname: nickname.into(),
            user_cardname: None,
        }
    }

    pub fn with_card(mut self, card: Option<String>) -> Self {
        self.user_cardname = card.filter(|c| !c.is_empty());
        self
    }

    /// 自然解禁等无操作者事件使用的系统身份
    pub fn system(platform: &str) -> Self {
        Self::new(platform, 0, "system")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub platform: String,
    pub group_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub content_format: Vec<String>,
    pub accept_format: Vec<String>,
}

impl FormatInfo {
    pub fn new(content_format: &[&str]) -> Self {
        Self {
            content_format: content_format.iter().map(|s| s.to_string()).collect(),
            accept_format: ACCEPT_FORMAT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdditionalConfig {
    // 戳一戳等事件中被作用的对象
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
}

// ================== 消息段 ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Ban,
    WholeBan,
    LiftBan,
    WholeLiftBan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyData {
    pub sub_type: NotifyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_user_info: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifted_user_info: Option<UserInfo>,
}

impl NotifyData {
    pub fn new(sub_type: NotifyKind) -> Self {
        Self {
            sub_type,
            duration: None,
            banned_user_info: None,
            lifted_user_info: None,
        }
    }
}

/// 消息段：纯文本 / 结构化通知 / 有序组合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Seg {
    Text(String),
    Notify(NotifyData),
    Seglist(Vec<Seg>),
}

impl Seg {
    pub fn text(s: impl Into<String>) -> Self {
        Seg::Text(s.into())
    }

    /// 是否不含任何有效内容
    pub fn is_empty(&self) -> bool {
        match self {
            Seg::Text(t) => t.trim().is_empty(),
            Seg::Notify(_) => false,
            Seg::Seglist(list) => list.iter().all(Seg::is_empty),
        }
    }

    /// 查找第一个结构化通知段
    pub fn notify(&self) -> Option<&NotifyData> {
        match self {
            Seg::Notify(data) => Some(data),
            Seg::Seglist(list) => list.iter().find_map(Seg::notify),
            Seg::Text(_) => None,
        }
    }

    /// 拼接所有文本段
    pub fn plain_text(&self) -> String {
        match self {
            Seg::Text(t) => t.clone(),
            Seg::Notify(_) => String::new(),
            Seg::Seglist(list) => list.iter().map(Seg::plain_text).collect(),
        }
    }
}

// ================== 封装 ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Notice,
    Poke,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub platform: String,
    pub message_id: EnvelopeKind,
    pub time: f64,
    pub user_info: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_info: Option<GroupInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_info: Option<FormatInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_config: Option<AdditionalConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_info: MessageInfo,
    pub message_segment: Seg,
    /// 原始上游事件 (JSON 文本)，用于审计
    pub raw_message: String,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String> {
        Ok(simd_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let mut bytes = s.as_bytes().to_vec();
        Ok(simd_json::serde::from_slice(&mut bytes)?)
    }

    pub fn subject(&self) -> &UserInfo {
        &self.message_info.user_info
    }

    pub fn group_id(&self) -> Option<i64> {
        self.message_info.group_info.as_ref().map(|g| g.group_id)
    }
}

/// 逐步构建 Envelope，`build` 时校验必需字段
pub struct EnvelopeBuilder {
    platform: String,
    kind: EnvelopeKind,
    time: f64,
    user_info: Option<UserInfo>,
    group_info: Option<GroupInfo>,
    format_info: Option<FormatInfo>,
    additional_config: Option<AdditionalConfig>,
    segment: Option<Seg>,
    raw_message: String,
}

impl EnvelopeBuilder {
    pub fn new(platform: &str, kind: EnvelopeKind, time: f64) -> Self {
        Self {
            platform: platform.to_string(),
            kind,
            time,
            user_info: None,
            group_info: None,
            format_info: None,
            additional_config: None,
            segment: None,
            raw_message: String::new(),
        }
    }

    pub fn user(mut self, user: UserInfo) -> Self {
        self.user_info = Some(user);
        self
    }

    pub fn group(mut self, group_id: i64, group_name: Option<String>) -> Self {
        self.group_info = Some(GroupInfo {
            platform: self.platform.clone(),
            group_id,
            group_name,
        });
        self
    }

    pub fn format(mut self, content_format: &[&str]) -> Self {
        self.format_info = Some(FormatInfo::new(content_format));
        self
    }

    pub fn target_id(mut self, target_id: Option<i64>) -> Self {
        if target_id.is_some() {
            self.additional_config = Some(AdditionalConfig { target_id });
        }
        self
    }

    pub fn segment(mut self, seg: Seg) -> Self {
        self.segment = Some(seg);
        self
    }

    /// 保留原始事件文本
    pub fn raw(mut self, raw: &OwnedValue) -> Self {
        self.raw_message = raw.encode();
        self
    }

    pub fn build(self) -> Result<Envelope> {
        let Some(user_info) = self.user_info else {
            bail!("缺少事件主体身份 (user_info)");
        };
        let segment = match self.segment {
            Some(seg) if !seg.is_empty() => seg,
            _ => bail!("缺少有效的消息段"),
        };

        Ok(Envelope {
            message_info: MessageInfo {
                platform: self.platform,
                message_id: self.kind,
                time: self.time,
                user_info,
                group_info: self.group_info,
                format_info: self.format_info,
                additional_config: self.additional_config,
            },
            message_segment: segment,
            raw_message: self.raw_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        let mut notify = NotifyData::new(NotifyKind::Ban);
        notify.duration = Some(600);
        notify.banned_user_info = Some(UserInfo::new("qq", 12345, "小明").with_card(Some("阿明".into())));

        EnvelopeBuilder::new("qq", EnvelopeKind::Notice, 1_700_000_000.5)
            .user(UserInfo::new("qq", 10001, "管理员"))
            .group(999, Some("测试群".into()))
            .format(&["text", "notify"])
            .target_id(Some(12345))
            .segment(Seg::Seglist(vec![Seg::Notify(notify), Seg::text("禁言了 小明 10分钟")]))
            .raw(&simd_json::json!({"post_type": "notice", "notice_type": "group_ban"}))
            .build()
            .unwrap()
    }

    #[test]
    fn wire_format_is_lossless_and_keeps_raw_payload() {
        let env = sample();
        let json = env.to_json().unwrap();
        assert!(json.contains(r#""type":"seglist""#));
        assert!(json.contains(r#""sub_type":"ban""#));
        assert!(json.contains(r#""message_id":"notice""#));

        let back = Envelope::from_json(&json).unwrap();
        assert_eq!(back, env);
        assert!(back.raw_message.contains("group_ban"));
    }

    #[test]
    fn build_rejects_missing_subject_or_payload() {
        let no_user = EnvelopeBuilder::new("qq", EnvelopeKind::Notice, 0.0)
            .segment(Seg::text("hello"))
            .build();
        assert!(no_user.is_err());

        let empty = EnvelopeBuilder::new("qq", EnvelopeKind::Notice, 0.0)
            .user(UserInfo::system("qq"))
            .segment(Seg::Seglist(vec![Seg::text("  ")]))
            .build();
        assert!(empty.is_err());
    }

    #[test]
    fn raw_payload_is_kept_verbatim() {
        let raw = simd_json::json!({
            "post_type": "notice",
            "notice_type": "notify",
            "sub_type": "poke",
            "user_id": 12345,
            "raw_info": [{"type": "nor", "txt": "戳了戳"}]
        });
        let env = EnvelopeBuilder::new("qq", EnvelopeKind::Poke, 0.0)
            .user(UserInfo::new("qq", 12345, "小明"))
            .segment(Seg::text("戳了戳 麦麦"))
            .raw(&raw)
            .build()
            .unwrap();

        let mut bytes = env.raw_message.into_bytes();
        let back = simd_json::to_owned_value(&mut bytes).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn notify_lookup_descends_into_lists() {
        let env = sample();
        let notify = env.message_segment.notify().unwrap();
        assert_eq!(notify.sub_type, NotifyKind::Ban);
        assert_eq!(env.message_segment.plain_text(), "禁言了 小明 10分钟");
    }
}
