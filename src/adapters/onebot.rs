//! NapCat (OneBot v11) 正向 WebSocket 连接

use super::{LockedWriter, ws_request};
use crate::config::NapcatServerConfig;
use crate::event::{Event, EventView};
use crate::matcher::Matcher;
use crate::{debug, error, info, warn};
use anyhow::{Result, bail};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

pub mod api;

/// 重连间隔
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// 就绪状态轮询间隔
const READY_POLL: Duration = Duration::from_millis(500);
/// 等待处理的 notice 上限，超出时丢弃
pub const NOTICE_BACKLOG: usize = 100;

/// 上游连接句柄，可在各任务间克隆
#[derive(Clone)]
pub struct OneBotConnection {
    writer: LockedWriter,
    matcher: Arc<Matcher>,
    ready: Arc<AtomicBool>,
}

impl Default for OneBotConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OneBotConnection {
    pub fn new() -> Self {
        Self {
            writer: Arc::new(AsyncMutex::new(None)),
            matcher: Arc::new(Matcher::new()),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// 等待连接进入就绪状态
    pub async fn wait_until_ready(&self) {
        while !self.is_ready() {
            tokio::time::sleep(READY_POLL).await;
        }
    }

    pub async fn send_frame(&self, json_str: String) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            bail!("NapCat 未连接");
        };
        sink.send(WsMessage::Text(json_str.into())).await?;
        Ok(())
    }

    async fn attach(&self, sink: super::TraitSink) {
        *self.writer.lock().await = Some(sink);
        self.ready.store(true, Ordering::SeqCst);
    }

    async fn detach(&self) {
        self.ready.store(false, Ordering::SeqCst);
        *self.writer.lock().await = None;
    }
}

/// 连接主循环：断线后自动重连，直到收到关闭信号
///
/// notice 事件按到达顺序送入 `notices`，API 响应交给匹配器。
pub async fn run(
    config: NapcatServerConfig,
    conn: OneBotConnection,
    notices: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match connect_and_listen(&config, &conn, &notices, &mut shutdown).await {
            Ok(()) => warn!(target: "OneBot", "NapCat [{}] 连接断开", config.url),
            Err(e) => error!(
                target: "OneBot",
                "NapCat [{}] 连接失败: {:#}。3秒后重试...",
                config.url,
                e
            ),
        }
        conn.detach().await;

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
    conn.detach().await;
}

async fn connect_and_listen(
    config: &NapcatServerConfig,
    conn: &OneBotConnection,
    notices: &mpsc::Sender<Event>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let token = config
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| format!("Bearer {}", t))
        .unwrap_or_default();
    let request = ws_request(&config.url, &[("Authorization", token)])?;

    let (ws_stream, _) = connect_async(request).await?;
    info!(target: "OneBot", "NapCat [{}] 连接成功！", config.url);

    let (write_half, mut read_half) = ws_stream.split();
    conn.attach(Box::new(write_half)).await;

    loop {
        let message = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
            message = read_half.next() => message,
        };

        match message {
            Some(Ok(WsMessage::Text(text))) => {
                let mut data = text.as_bytes().to_vec();
                let event: Event = match simd_json::to_owned_value(&mut data) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(target: "OneBot", "无法解析的消息帧: {}", e);
                        continue;
                    }
                };
                route_event(conn, notices, event).await;
            }
            Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => {}
        }
    }
}

/// API 响应交给匹配器，notice 进入处理队列，其余事件忽略
async fn route_event(conn: &OneBotConnection, notices: &mpsc::Sender<Event>, event: Event) {
    let Some(event) = conn.matcher.dispatch(event).await else {
        return;
    };

    match EventView(&event).post_type() {
        Some("notice") => {
            match notices.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(target: "OneBot", "notice 积压过多，事件丢弃");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(target: "OneBot", "notice 处理任务已退出，事件丢弃");
                }
            }
        }
        Some("meta_event") => {}
        other => debug!(target: "OneBot", "忽略事件类型: {:?}", other),
    }
}
