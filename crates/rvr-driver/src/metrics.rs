//! 驱动性能指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use rvr_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::new();
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 成功写出的帧数
    pub tx_frames_total: AtomicU64,
    /// 收到的原始字节数
    pub rx_bytes_total: AtomicU64,
    /// 解码成功的帧数
    pub rx_frames_total: AtomicU64,
    /// 丢弃的畸形帧 / 截断帧 / 缓冲溢出次数
    pub framing_faults: AtomicU64,
    /// 匹配到未完成请求的响应数
    pub responses_matched: AtomicU64,
    /// 没有对应请求的响应数（超时或取消之后到达）
    pub late_responses: AtomicU64,
    /// 至少有一个监听者的通知帧数
    pub notifications_dispatched: AtomicU64,
    /// 监听者返回错误或 panic 的次数
    pub handler_failures: AtomicU64,
    /// 请求超时次数
    pub command_timeouts: AtomicU64,
    /// 传输层读写错误次数（含非致命）
    pub transport_errors: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    ///
    /// 各计数器分别读取，彼此之间可能有微小的时间差。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            rx_bytes_total: self.rx_bytes_total.load(Ordering::Relaxed),
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            framing_faults: self.framing_faults.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
            notifications_dispatched: self.notifications_dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            command_timeouts: self.command_timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.tx_frames_total.store(0, Ordering::Relaxed);
        self.rx_bytes_total.store(0, Ordering::Relaxed);
        self.rx_frames_total.store(0, Ordering::Relaxed);
        self.framing_faults.store(0, Ordering::Relaxed);
        self.responses_matched.store(0, Ordering::Relaxed);
        self.late_responses.store(0, Ordering::Relaxed);
        self.notifications_dispatched.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        self.command_timeouts.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub tx_frames_total: u64,
    pub rx_bytes_total: u64,
    pub rx_frames_total: u64,
    pub framing_faults: u64,
    pub responses_matched: u64,
    pub late_responses: u64,
    pub notifications_dispatched: u64,
    pub handler_failures: u64,
    pub command_timeouts: u64,
    pub transport_errors: u64,
}

impl MetricsSnapshot {
    /// 畸形帧占比（百分比）
    ///
    /// 没有收到任何帧时返回 0.0。
    pub fn framing_fault_rate(&self) -> f64 {
        let total = self.rx_frames_total + self.framing_faults;
        if total == 0 {
            return 0.0;
        }
        (self.framing_faults as f64 / total as f64) * 100.0
    }
}
