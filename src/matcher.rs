use crate::event::{Event, EventView};
use std::collections::HashMap;
use tokio::sync::{Mutex as AsyncMutex, oneshot};

/// API 响应匹配器：按 echo 将响应交给发起请求的一方
pub struct Matcher {
    waiters: AsyncMutex<HashMap<String, oneshot::Sender<Event>>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            waiters: AsyncMutex::new(HashMap::new()),
        }
    }

    /// 注册一个响应等待者，必须在发送请求之前调用
    pub async fn register(&self, echo: String) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(echo, tx);
        rx
    }

    /// 放弃等待 (超时或发送失败)
    pub async fn cancel(&self, echo: &str) {
        self.waiters.lock().await.remove(echo);
    }

    /// 尝试分发事件给等待者。如果事件被消费（匹配成功），返回 None；否则返回原事件。
    pub async fn dispatch(&self, event: Event) -> Option<Event> {
        let Some(echo) = EventView(&event).echo() else {
            return Some(event);
        };

        let waiter = self.waiters.lock().await.remove(&echo);
        match waiter {
            Some(tx) => {
                // 忽略错误（如等待者已超时）
                let _ = tx.send(event);
                None
            }
            // 无人等待的响应直接丢弃
            None => None,
        }
    }

    pub async fn pending(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simd_json::json;

    #[tokio::test]
    async fn response_reaches_registered_waiter() {
        let m = Matcher::new();
        let rx = m.register("api-req-1".into()).await;

        assert!(m.dispatch(json!({"echo": "api-req-1", "retcode": 0})).await.is_none());
        let resp = rx.await.unwrap();
        assert_eq!(EventView(&resp).id("retcode"), Some(0));
        assert_eq!(m.pending().await, 0);
    }

    #[tokio::test]
    async fn events_without_echo_pass_through() {
        let m = Matcher::new();
        let _rx = m.register("api-req-2".into()).await;

        let ev = m.dispatch(json!({"post_type": "notice"})).await;
        assert!(ev.is_some());
        assert_eq!(m.pending().await, 1);

        m.cancel("api-req-2").await;
        assert_eq!(m.pending().await, 0);
    }
}
