//! Notice 事件规范化：将上游原始事件转换为 MaiBot 消息封装

use crate::access::AccessGate;
use crate::ban::BanTracker;
use crate::clock::Clock;
use crate::delivery::{DeliveryQueue, EnvelopeSender};
use crate::envelope::{Envelope, EnvelopeBuilder, EnvelopeKind, Seg, UserInfo};
use crate::event::{Event, Notice, NoticeEvent};
use crate::fetcher::InfoFetcher;
use crate::{error, info, warn};
use chrono::{Local, TimeZone};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

mod ban;
mod emoji;
mod group;
mod poke;

pub use ban::format_duration;
pub use poke::{poke_text, split_action};

/// 规范化后的投递方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// 进入通知队列，由重试泵发送
    System,
    /// 立即直接发送
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Queued,
    Direct,
    Declined,
}

/// 各类事件处理后得到的中间结果，由 `finish` 补齐群信息等公共字段
struct Draft {
    kind: EnvelopeKind,
    route: Route,
    subject: UserInfo,
    segment: Seg,
    content_format: &'static [&'static str],
}

impl Draft {
    fn system(subject: UserInfo, segment: Seg) -> Self {
        Self {
            kind: EnvelopeKind::Notice,
            route: Route::System,
            subject,
            segment,
            content_format: &["text", "notify"],
        }
    }
}

pub struct NoticeHandler {
    platform: String,
    enable_poke: bool,
    fetcher: Arc<dyn InfoFetcher>,
    gate: Arc<dyn AccessGate>,
    tracker: Arc<BanTracker>,
    queue: DeliveryQueue,
    sender: Arc<dyn EnvelopeSender>,
    clock: Arc<dyn Clock>,
}

impl NoticeHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: &str,
        enable_poke: bool,
        fetcher: Arc<dyn InfoFetcher>,
        gate: Arc<dyn AccessGate>,
        tracker: Arc<BanTracker>,
        queue: DeliveryQueue,
        sender: Arc<dyn EnvelopeSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform: platform.to_string(),
            enable_poke,
            fetcher,
            gate,
            tracker,
            queue,
            sender,
            clock,
        }
    }

    /// 处理一条原始 notice 事件，任何失败都只记录日志
    pub async fn handle_notice(&self, raw: Event) -> Outcome {
        let event = NoticeEvent::decode(raw);

        let Some((envelope, route)) = self.normalize(&event).await else {
            return Outcome::Declined;
        };

        match route {
            Route::System => {
                if self.queue.put_notice(envelope) {
                    Outcome::Queued
                } else {
                    Outcome::Declined
                }
            }
            Route::Direct => {
                info!(target: "Notice", "发送到Maibot处理通知信息");
                match self.sender.send(&envelope).await {
                    Ok(true) => {}
                    Ok(false) => error!(target: "Notice", "直接发送通知失败"),
                    Err(e) => error!(target: "Notice", "直接发送通知失败: {:#}", e),
                }
                Outcome::Direct
            }
        }
    }

    /// 按到达顺序逐条处理上游推送的 notice，直到通道关闭或收到关闭信号
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<Event>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(raw) => {
                        let handled = AssertUnwindSafe(self.handle_notice(raw))
                            .catch_unwind()
                            .await;
                        if handled.is_err() {
                            error!(target: "Notice", "处理notice时发生异常，事件丢弃");
                        }
                    }
                    None => break,
                },
            }
        }
    }

    /// 将事件转换为封装及投递方式；不需要转发的事件返回 None
    pub async fn normalize(&self, event: &NoticeEvent) -> Option<(Envelope, Route)> {
        let draft = match &event.notice {
            Notice::FriendRecall {
                operator_id,
                message_id,
                time,
            } => {
                info!(target: "Notice", "好友 {} 撤回一条消息", operator_id);
                info!(target: "Notice", "撤回消息ID：{}, 撤回时间：{}", message_id, local_time(*time));
                None
            }
            Notice::GroupRecall {
                operator_id,
                message_id,
                time,
                ..
            } => {
                info!(target: "Notice", "群内用户 {} 撤回一条消息", operator_id);
                info!(target: "Notice", "撤回消息ID：{}, 撤回时间：{}", message_id, local_time(*time));
                None
            }
            Notice::InputStatus {
                user_id,
                group_id,
                event_type,
                status_text,
            } => {
                // 仅私聊有效
                if group_id.is_none() {
                    let status = match (status_text, event_type) {
                        (Some(text), _) => text.as_str(),
                        (None, Some(1)) => "正在输入中",
                        (None, Some(2)) => "已刷新聊天页面",
                        _ => "输入状态变更",
                    };
                    info!(target: "Notice", "用户 {} {}", user_id, status);
                }
                None
            }
            Notice::Poke {
                group_id,
                sender_id,
                target_id,
                self_id,
                annotation,
            } => {
                self.poke(*group_id, *sender_id, *target_id, *self_id, annotation)
                    .await
            }
            Notice::GroupBan {
                action,
                group_id,
                user_id,
                operator_id,
                duration,
            } => {
                self.group_ban(*action, *group_id, *user_id, *operator_id, *duration)
                    .await
            }
            Notice::GroupAdmin {
                sub_type,
                group_id,
                user_id,
                self_id,
            } => self.group_admin(sub_type, *group_id, *user_id, *self_id).await,
            Notice::GroupIncrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
                self_id,
            } => {
                self.group_increase(sub_type, *group_id, *user_id, *operator_id, *self_id)
                    .await
            }
            Notice::GroupDecrease {
                sub_type,
                group_id,
                user_id,
                operator_id,
                self_id,
            } => {
                self.group_decrease(sub_type, *group_id, *user_id, *operator_id, *self_id)
                    .await
            }
            Notice::Essence {
                sub_type,
                group_id,
                message_id,
                operator_id,
                sender_id,
                self_id,
            } => {
                self.essence(
                    sub_type,
                    *group_id,
                    *message_id,
                    *operator_id,
                    *sender_id,
                    *self_id,
                )
                .await
            }
            Notice::GroupCard {
                group_id,
                user_id,
                self_id,
                card_old,
                card_new,
            } => {
                self.group_card(
                    *group_id,
                    *user_id,
                    *self_id,
                    card_old.as_deref(),
                    card_new.as_deref(),
                )
                .await
            }
            Notice::EmojiLike {
                group_id,
                user_id,
                likes,
                ..
            } => self.emoji_like(*group_id, *user_id, likes).await,
            Notice::Unsupported {
                notice_type,
                sub_type,
            } => {
                match sub_type {
                    Some(sub) => warn!(target: "Notice", "不支持的notice类型: {}.{}", notice_type, sub),
                    None => warn!(target: "Notice", "不支持的notice类型: {}", notice_type),
                }
                None
            }
        }?;

        self.finish(event, draft).await
    }

    async fn finish(&self, event: &NoticeEvent, draft: Draft) -> Option<(Envelope, Route)> {
        let mut builder =
            EnvelopeBuilder::new(&self.platform, draft.kind, self.clock.timestamp_f64())
                .user(draft.subject)
                .format(draft.content_format)
                .target_id(event.target_id())
                .segment(draft.segment)
                .raw(&event.raw);

        if let Some(group_id) = event.group_id() {
            let group_name = match self.fetcher.group_info(group_id).await {
                Some(g) => g.group_name,
                None => {
                    warn!(target: "Notice", "无法获取notice消息所在群的名称");
                    None
                }
            };
            builder = builder.group(group_id, group_name);
        }

        match builder.build() {
            Ok(envelope) => Some((envelope, draft.route)),
            Err(e) => {
                warn!(target: "Notice", "notice处理失败或不支持: {:#}", e);
                None
            }
        }
    }

    /// 群成员身份 (昵称 + 名片)，取不到时昵称为 "QQ用户" 并记录 `missing`
    async fn member_user_info(&self, group_id: i64, user_id: i64, missing: &str) -> UserInfo {
        let member = self.fetcher.member_info(group_id, user_id).await;
        if member.is_none() {
            warn!(target: "Notice", "{}", missing);
        }

        let nickname = member
            .as_ref()
            .and_then(|m| m.nickname())
            .unwrap_or("QQ用户")
            .to_string();
        let card = member.as_ref().and_then(|m| m.card()).map(str::to_string);
        UserInfo::new(&self.platform, user_id, nickname).with_card(card)
    }
}

fn local_time(ts: Option<i64>) -> String {
    ts.and_then(|t| Local.timestamp_opt(t, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "未知时间".to_string())
}
