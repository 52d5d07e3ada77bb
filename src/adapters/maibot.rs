//! 到 MaiBot 消息总线的 WebSocket 连接

use super::{LockedWriter, TraitSink, ws_request};
use crate::config::MaibotServerConfig;
use crate::delivery::EnvelopeSender;
use crate::envelope::Envelope;
use crate::{debug, error, info, warn};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// 总线发送端：持有当前连接，未连接时发送直接返回 false
pub struct BusSender {
    url: String,
    platform: String,
    writer: LockedWriter,
}

impl BusSender {
    pub fn new(config: &MaibotServerConfig) -> Self {
        Self {
            url: config.url.clone(),
            platform: config.platform_name.clone(),
            writer: Arc::new(AsyncMutex::new(None)),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    async fn attach(&self, sink: TraitSink) {
        *self.writer.lock().await = Some(sink);
    }

    async fn detach(&self) {
        *self.writer.lock().await = None;
    }

    /// 连接维护循环：断线后自动重连，直到收到关闭信号
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            match self.connect_and_listen(&mut shutdown).await {
                Ok(()) => warn!(target: "MaiBot", "MaiBot [{}] 连接断开", self.url),
                Err(e) => error!(
                    target: "MaiBot",
                    "MaiBot [{}] 连接失败: {:#}。3秒后重试...",
                    self.url,
                    e
                ),
            }
            self.detach().await;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        self.detach().await;
    }

    async fn connect_and_listen(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let request = ws_request(&self.url, &[("platform", self.platform.clone())])?;
        let (ws_stream, _) = connect_async(request).await?;
        info!(target: "MaiBot", "MaiBot [{}] 连接成功！", self.url);

        let (write_half, mut read_half) = ws_stream.split();
        self.attach(Box::new(write_half)).await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
                message = read_half.next() => match message {
                    // 回复消息的处理不在本适配器的 notice 范围内
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(target: "MaiBot", "收到 MaiBot 消息 ({} 字节)，忽略", text.len());
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

#[async_trait]
impl EnvelopeSender for BusSender {
    async fn send(&self, envelope: &Envelope) -> Result<bool> {
        let payload = envelope.to_json()?;

        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            warn!(target: "MaiBot", "MaiBot 未连接，消息暂不发送");
            return Ok(false);
        };

        if let Err(e) = sink.send(WsMessage::Text(payload.into())).await {
            // 连接已失效，等待重连
            *guard = None;
            return Err(e.into());
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::envelope_with_text;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Error as WsError;

    /// 写入 tokio 通道的假连接
    fn channel_sink(tx: mpsc::UnboundedSender<WsMessage>) -> TraitSink {
        Box::new(Box::pin(futures_util::sink::unfold(
            tx,
            |tx, msg: WsMessage| async move {
                tx.send(msg).map_err(|_| WsError::ConnectionClosed)?;
                Ok::<_, WsError>(tx)
            },
        )))
    }

    #[tokio::test]
    async fn send_without_connection_reports_failure() {
        let bus = BusSender::new(&MaibotServerConfig::default());
        assert!(!bus.send(&envelope_with_text("hi")).await.unwrap());
    }

    #[tokio::test]
    async fn envelope_is_written_as_json_text() {
        let bus = BusSender::new(&MaibotServerConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.attach(channel_sink(tx)).await;

        assert!(bus.send(&envelope_with_text("hi")).await.unwrap());

        let Some(WsMessage::Text(text)) = rx.recv().await else {
            panic!("expected a text frame");
        };
        let env = Envelope::from_json(text.as_str()).unwrap();
        assert_eq!(env.message_segment.plain_text(), "hi");
    }

    #[tokio::test]
    async fn broken_connection_is_dropped() {
        let bus = BusSender::new(&MaibotServerConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        bus.attach(channel_sink(tx)).await;

        assert!(bus.send(&envelope_with_text("hi")).await.is_err());
        assert!(!bus.is_connected().await);
    }
}
