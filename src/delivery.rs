//! 通知投递队列与重试泵
//!
//! 两个有界队列：主队列 (新通知) 与重试队列 (发送失败的通知)。
//! 生产者永不阻塞，队列满时直接丢弃并记录。

use crate::envelope::Envelope;
use crate::{error, warn};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const PRIMARY_CAPACITY: usize = 100;
pub const RETRY_CAPACITY: usize = 3;

/// 每次投递后的间隔
pub const SEND_INTERVAL: Duration = Duration::from_secs(1);
/// 投递过程异常后的退避时间
pub const ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// 下游消息总线的发送原语；`Ok(false)` 与 `Err` 均视为发送失败
#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<bool>;
}

/// 队列的生产端，可随意克隆
#[derive(Clone)]
pub struct DeliveryQueue {
    primary: mpsc::Sender<Envelope>,
    retry: mpsc::Sender<Envelope>,
}

impl DeliveryQueue {
    /// 放入一条通知；任一队列已满时丢弃并返回 false
    pub fn put_notice(&self, envelope: Envelope) -> bool {
        if self.primary.capacity() == 0 || self.retry.capacity() == 0 {
            warn!(target: "Delivery", "通知队列已满，可能是多次发送失败，消息丢弃");
            return false;
        }

        match self.primary.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "Delivery", "通知入队失败，消息丢弃: {}", e);
                false
            }
        }
    }

    /// 将发送失败的通知放回重试队列
    fn requeue(&self, envelope: Envelope) {
        if let Err(e) = self.retry.try_send(envelope) {
            error!(target: "Delivery", "重试队列已满，通知丢弃: {}", e);
        }
    }

    pub fn primary_len(&self) -> usize {
        PRIMARY_CAPACITY - self.primary.capacity()
    }

    pub fn retry_len(&self) -> usize {
        RETRY_CAPACITY - self.retry.capacity()
    }
}

/// 唯一的消费者，顺序发送
pub struct RetryPump {
    queue: DeliveryQueue,
    primary_rx: mpsc::Receiver<Envelope>,
    retry_rx: mpsc::Receiver<Envelope>,
    sender: Arc<dyn EnvelopeSender>,
}

/// 创建投递队列及其消费泵
pub fn channel(sender: Arc<dyn EnvelopeSender>) -> (DeliveryQueue, RetryPump) {
    let (primary, primary_rx) = mpsc::channel(PRIMARY_CAPACITY);
    let (retry, retry_rx) = mpsc::channel(RETRY_CAPACITY);
    let queue = DeliveryQueue { primary, retry };
    let pump = RetryPump {
        queue: queue.clone(),
        primary_rx,
        retry_rx,
        sender,
    };
    (queue, pump)
}

enum Delivery {
    Sent,
    Failed,
    Panicked,
}

impl RetryPump {
    /// 持续投递，直到收到关闭信号
    ///
    /// 关闭信号只在等待与休眠时响应，正在发送的通知要么送达要么回到重试队列。
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            // 优先处理重试队列
            let envelope = match self.retry_rx.try_recv() {
                Ok(env) => env,
                Err(_) => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                        env = self.primary_rx.recv() => match env {
                            Some(env) => env,
                            None => break,
                        },
                    }
                }
            };

            let pause = match self.deliver(envelope).await {
                Delivery::Sent | Delivery::Failed => SEND_INTERVAL,
                Delivery::Panicked => ERROR_BACKOFF,
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }

        warn!(
            target: "Delivery",
            "投递循环已停止 (主队列剩余 {}, 重试队列剩余 {})",
            self.queue.primary_len(),
            self.queue.retry_len()
        );
    }

    async fn deliver(&self, envelope: Envelope) -> Delivery {
        let result = AssertUnwindSafe(self.sender.send(&envelope))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(true)) => Delivery::Sent,
            Ok(Ok(false)) => {
                error!(target: "Delivery", "发送通知消息失败");
                self.queue.requeue(envelope);
                Delivery::Failed
            }
            Ok(Err(e)) => {
                error!(target: "Delivery", "发送通知消息失败: {:#}", e);
                self.queue.requeue(envelope);
                Delivery::Failed
            }
            Err(_) => {
                error!(target: "Delivery", "投递过程发生异常，3秒后继续");
                self.queue.requeue(envelope);
                Delivery::Panicked
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSender, envelope_with_text};

    #[tokio::test]
    async fn put_notice_drops_when_primary_full() {
        let (queue, _pump) = channel(Arc::new(RecordingSender::default()));
        for i in 0..PRIMARY_CAPACITY {
            assert!(queue.put_notice(envelope_with_text(&i.to_string())));
        }
        assert!(!queue.put_notice(envelope_with_text("overflow")));
        assert_eq!(queue.primary_len(), PRIMARY_CAPACITY);
    }

    #[tokio::test]
    async fn put_notice_drops_when_retry_full() {
        let (queue, _pump) = channel(Arc::new(RecordingSender::default()));
        for _ in 0..RETRY_CAPACITY {
            queue.requeue(envelope_with_text("failed"));
        }
        assert!(!queue.put_notice(envelope_with_text("fresh")));
        assert_eq!(queue.primary_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_is_retried_before_new_notices() {
        let sender = Arc::new(RecordingSender::default());
        sender.fail_next(1);
        let (queue, pump) = channel(sender.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        queue.put_notice(envelope_with_text("a"));
        queue.put_notice(envelope_with_text("b"));
        let handle = tokio::spawn(pump.run(stop_rx));

        tokio::time::sleep(Duration::from_secs(10)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        // a 第一次失败，进入重试队列后先于 b 发出
        assert_eq!(sender.attempted_texts(), vec!["a", "a", "b"]);
        assert_eq!(sender.delivered_texts(), vec!["a", "b"]);
        assert_eq!(queue.retry_len(), 0);
    }

    #[tokio::test]
    async fn failure_with_full_retry_queue_drops_envelope() {
        let sender = Arc::new(RecordingSender::default());
        sender.fail_next(usize::MAX);
        let (queue, pump) = channel(sender.clone());
        for _ in 0..RETRY_CAPACITY {
            queue.requeue(envelope_with_text("old"));
        }

        pump.deliver(envelope_with_text("new")).await;

        assert_eq!(queue.retry_len(), RETRY_CAPACITY);
        assert_eq!(sender.attempted_texts(), vec!["new"]);
        assert!(sender.delivered_texts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_idle_exits_cleanly() {
        let (queue, pump) = channel(Arc::new(RecordingSender::default()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(pump.run(stop_rx));

        tokio::time::sleep(Duration::from_secs(2)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        // 消费端退出后，生产端调用只会丢弃而不会阻塞
        assert!(!queue.put_notice(envelope_with_text("late")));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sender_backs_off_and_keeps_envelope() {
        let sender = Arc::new(RecordingSender::default());
        sender.panic_next(1);
        let (queue, pump) = channel(sender.clone());
        let (stop_tx, stop_rx) = watch::channel(false);

        queue.put_notice(envelope_with_text("boom"));
        let handle = tokio::spawn(pump.run(stop_rx));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sender.delivered_texts().is_empty());
        assert_eq!(queue.retry_len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(sender.delivered_texts(), vec!["boom"]);
    }
}
