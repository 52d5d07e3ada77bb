use crate::{info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 后台任务管理器，统一发放关闭信号
pub struct Scheduler {
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        // 任务表只做插入和取出，中毒后的数据仍然可用
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 订阅关闭信号 (值变为 true 时任务应尽快退出)
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// 启动一个自行监听关闭信号的任务
    pub fn spawn<F>(&self, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(task);
        self.tasks().insert(id, handle);
        id
    }

    /// 固定间隔执行，首次立即执行
    pub fn add_interval<F, Fut>(&self, period: Duration, mut task_gen: F) -> u64
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.subscribe();
        self.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => task_gen().await,
                }
            }
        })
    }

    /// 发出关闭信号，等待任务退出，超过 `grace` 仍未退出的任务被强制中止
    pub async fn shutdown(&self, grace: Duration) {
        info!(target: "Scheduler", "正在清理后台任务...");
        self.shutdown.send_replace(true);

        let handles: Vec<(u64, JoinHandle<()>)> = self.tasks().drain().collect();
        for (id, handle) in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!(target: "Scheduler", "任务 {} 异常退出: {}", id, e),
                Err(_) => {
                    warn!(target: "Scheduler", "任务 {} 未在规定时间内退出，强制中止", id);
                    abort.abort();
                }
            }
        }
    }
}
