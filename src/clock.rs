use chrono::Utc;

/// 时间来源，便于在测试中模拟时间流逝
pub trait Clock: Send + Sync {
    /// 当前 Unix 时间戳（秒）
    fn timestamp(&self) -> i64;

    /// 当前 Unix 时间戳（秒，含小数部分）
    fn timestamp_f64(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> i64 {
        Utc::now().timestamp()
    }

    fn timestamp_f64(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

#[cfg(test)]
pub use manual::ManualClock;
