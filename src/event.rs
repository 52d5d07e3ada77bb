use simd_json::OwnedValue;
use simd_json::base::{ValueAsArray, ValueAsScalar};
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};

pub type Event = OwnedValue;

// ================== 事件字段访问 ==================

/// 通用事件视图，兼容 i64 / u64 两种数字表示
pub struct EventView<'a>(pub &'a Event);

impl<'a> EventView<'a> {
    /// 超出 i64 范围的数值视为缺失
    pub fn id(&self, key: &str) -> Option<i64> {
        self.0
            .get_i64(key)
            .or_else(|| self.0.get_u64(key).and_then(|v| i64::try_from(v).ok()))
    }

    /// 缺省为 0 的 ID 字段
    pub fn id_or_zero(&self, key: &str) -> i64 {
        self.id(key).unwrap_or(0)
    }

    /// 非零 ID (0 视为缺失)
    pub fn nonzero_id(&self, key: &str) -> Option<i64> {
        self.id(key).filter(|&v| v != 0)
    }

    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.0.get_str(key)
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.str(key).map(str::to_string)
    }

    pub fn post_type(&self) -> Option<&'a str> {
        self.str("post_type")
    }

    pub fn echo(&self) -> Option<String> {
        match self.0.get("echo") {
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .or_else(|| v.as_i64().map(|n| n.to_string())),
            None => None,
        }
    }
}

// ================== Notice 事件 ==================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanAction {
    Ban,
    LiftBan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmojiLike {
    pub emoji_id: String,
    pub count: i64,
}

/// 解码后的 notice 事件 (按 notice_type / sub_type 区分)
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    FriendRecall {
        operator_id: i64,
        message_id: i64,
        time: Option<i64>,
    },
    GroupRecall {
        group_id: Option<i64>,
        operator_id: i64,
        message_id: i64,
        time: Option<i64>,
    },
    InputStatus {
        user_id: i64,
        group_id: Option<i64>,
        event_type: Option<i64>,
        status_text: Option<String>,
    },
    Poke {
        group_id: Option<i64>,
        sender_id: i64,
        target_id: i64,
        self_id: Option<i64>,
        annotation: String,
    },
    GroupBan {
        action: BanAction,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: i64,
        duration: Option<i64>,
    },
    GroupAdmin {
        sub_type: String,
        group_id: Option<i64>,
        user_id: i64,
        self_id: Option<i64>,
    },
    GroupIncrease {
        sub_type: String,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: Option<i64>,
        self_id: Option<i64>,
    },
    GroupDecrease {
        sub_type: String,
        group_id: Option<i64>,
        user_id: i64,
        operator_id: Option<i64>,
        self_id: Option<i64>,
    },
    Essence {
        sub_type: String,
        group_id: Option<i64>,
        message_id: i64,
        operator_id: Option<i64>,
        sender_id: i64,
        self_id: Option<i64>,
    },
    GroupCard {
        group_id: Option<i64>,
        user_id: i64,
        self_id: Option<i64>,
        card_old: Option<String>,
        card_new: Option<String>,
    },
    EmojiLike {
        group_id: Option<i64>,
        user_id: i64,
        message_id: i64,
        likes: Vec<EmojiLike>,
    },
    /// 不支持的类型，保留原始类型名以便记录
    Unsupported {
        notice_type: String,
        sub_type: Option<String>,
    },
}

/// 解码后的事件，同时保留原始载荷
#[derive(Debug, Clone)]
pub struct NoticeEvent {
    pub notice: Notice,
    pub raw: Event,
}

impl NoticeEvent {
    pub fn decode(raw: Event) -> Self {
        let notice = decode_notice(&raw);
        Self { notice, raw }
    }

    pub fn group_id(&self) -> Option<i64> {
        EventView(&self.raw).nonzero_id("group_id")
    }

    pub fn target_id(&self) -> Option<i64> {
        EventView(&self.raw).id("target_id")
    }
}

fn decode_notice(raw: &Event) -> Notice {
    let v = EventView(raw);
    let notice_type = v.str("notice_type").unwrap_or("");
    let sub_type = v.string("sub_type");
    let sub = sub_type.clone().unwrap_or_default();

    let group_id = v.nonzero_id("group_id");
    let user_id = v.id_or_zero("user_id");
    let self_id = v.id("self_id");

    match (notice_type, sub.as_str()) {
        ("friend_recall", _) => Notice::FriendRecall {
            operator_id: v.id("operator_id").unwrap_or(user_id),
            message_id: v.id_or_zero("message_id"),
            time: v.id("time"),
        },
        ("group_recall", _) => Notice::GroupRecall {
            group_id,
            operator_id: v.id_or_zero("operator_id"),
            message_id: v.id_or_zero("message_id"),
            time: v.id("time"),
        },
        ("notify", "input_status") => Notice::InputStatus {
            user_id,
            group_id,
            event_type: v.id("event_type"),
            status_text: v.string("status_text").filter(|s| !s.is_empty()),
        },
        ("notify", "poke") => Notice::Poke {
            group_id,
            sender_id: v.nonzero_id("sender_id").unwrap_or(user_id),
            target_id: v.id_or_zero("target_id"),
            self_id,
            annotation: poke_annotation(raw),
        },
        ("group_ban", "ban") | ("group_ban", "lift_ban") => Notice::GroupBan {
            action: if sub == "ban" {
                BanAction::Ban
            } else {
                BanAction::LiftBan
            },
            group_id,
            user_id,
            operator_id: v.id_or_zero("operator_id"),
            duration: v.id("duration"),
        },
        ("group_admin", _) => Notice::GroupAdmin {
            sub_type: sub,
            group_id,
            user_id,
            self_id,
        },
        ("group_increase", _) => Notice::GroupIncrease {
            sub_type: sub,
            group_id,
            user_id,
            operator_id: v.nonzero_id("operator_id"),
            self_id,
        },
        ("group_decrease", _) => Notice::GroupDecrease {
            sub_type: sub,
            group_id,
            user_id,
            operator_id: v.nonzero_id("operator_id"),
            self_id,
        },
        ("essence", _) => Notice::Essence {
            sub_type: sub,
            group_id,
            message_id: v.id_or_zero("message_id"),
            operator_id: v.nonzero_id("operator_id"),
            sender_id: v.id_or_zero("sender_id"),
            self_id,
        },
        ("group_card", _) => Notice::GroupCard {
            group_id,
            user_id,
            self_id,
            card_old: v.string("card_old").filter(|s| !s.is_empty()),
            card_new: v.string("card_new").filter(|s| !s.is_empty()),
        },
        ("group_msg_emoji_like", _) => Notice::EmojiLike {
            group_id,
            user_id,
            message_id: v.id_or_zero("message_id"),
            likes: emoji_likes(raw),
        },
        _ => Notice::Unsupported {
            notice_type: notice_type.to_string(),
            sub_type,
        },
    }
}

/// 拼接戳一戳 raw_info 中的可读文本 (txt 或 name)
fn poke_annotation(raw: &Event) -> String {
    let Some(items) = raw.get("raw_info").and_then(|v| v.as_array()) else {
        return String::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let txt = item.get_str("txt").filter(|s| !s.trim().is_empty());
            let name = item.get_str("name").filter(|s| !s.trim().is_empty());
            txt.or(name).map(str::trim)
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn emoji_likes(raw: &Event) -> Vec<EmojiLike> {
    let Some(items) = raw.get("likes").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get("emoji_id")?;
            let emoji_id = id
                .as_str()
                .map(str::to_string)
                .or_else(|| id.as_i64().map(|n| n.to_string()))
                .or_else(|| id.as_u64().map(|n| n.to_string()))?;
            let view = EventView(item);
            Some(EmojiLike {
                emoji_id,
                count: view.id("count").unwrap_or(1),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_json::json;

    #[test]
    fn decodes_ban_with_unsigned_ids() {
        let ev = NoticeEvent::decode(json!({
            "post_type": "notice",
            "notice_type": "group_ban",
            "sub_type": "ban",
            "group_id": 999u64,
            "user_id": 12345u64,
            "operator_id": 10001,
            "duration": 600
        }));

        assert_eq!(
            ev.notice,
            Notice::GroupBan {
                action: BanAction::Ban,
                group_id: Some(999),
                user_id: 12345,
                operator_id: 10001,
                duration: Some(600),
            }
        );
        assert_eq!(ev.group_id(), Some(999));
    }

    #[test]
    fn oversized_unsigned_id_is_missing() {
        let raw = json!({"user_id": u64::MAX, "group_id": 999u64});
        let view = EventView(&raw);

        assert_eq!(view.id("user_id"), None);
        assert_eq!(view.nonzero_id("user_id"), None);
        assert_eq!(view.id("group_id"), Some(999));
    }

    #[test]
    fn poke_annotation_skips_blank_items() {
        let ev = NoticeEvent::decode(json!({
            "notice_type": "notify",
            "sub_type": "poke",
            "user_id": 1,
            "target_id": 2,
            "raw_info": [
                {"type": "qq", "uid": "u_1"},
                {"type": "nor", "txt": "戳了戳"},
                {"type": "qq", "name": "  "},
                {"type": "nor", "txt": "的脸"}
            ]
        }));

        match ev.notice {
            Notice::Poke {
                sender_id,
                target_id,
                annotation,
                ..
            } => {
                assert_eq!(sender_id, 1);
                assert_eq!(target_id, 2);
                assert_eq!(annotation, "戳了戳的脸");
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn emoji_ids_accept_strings_and_numbers() {
        let ev = NoticeEvent::decode(json!({
            "notice_type": "group_msg_emoji_like",
            "group_id": 1,
            "user_id": 2,
            "likes": [{"emoji_id": "76", "count": 2}, {"emoji_id": 128077}]
        }));

        match ev.notice {
            Notice::EmojiLike { likes, .. } => {
                assert_eq!(likes[0], EmojiLike { emoji_id: "76".into(), count: 2 });
                assert_eq!(likes[1], EmojiLike { emoji_id: "128077".into(), count: 1 });
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn unknown_types_are_preserved() {
        let ev = NoticeEvent::decode(json!({"notice_type": "bot_offline", "sub_type": "x"}));
        assert_eq!(
            ev.notice,
            Notice::Unsupported {
                notice_type: "bot_offline".into(),
                sub_type: Some("x".into()),
            }
        );
    }
}
