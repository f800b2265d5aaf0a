//! 未完成请求句柄

use crate::dispatcher::{Dispatcher, Outcome};
use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use rvr_protocol::{Frame, ResponseCode};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::debug;

/// 已发出、等待响应的请求
///
/// 由 [`Rvr::submit`](crate::Rvr::submit) 返回。结果只会投递一次：
/// 响应、超时、取消或连接失败，先到者生效。
///
/// 丢弃一个尚未结束的句柄等同于 [`cancel`](Self::cancel)，序列号立即释放；
/// 之后到达的响应会被分发器当作迟到响应丢弃。
#[must_use = "dropping a PendingResponse cancels the request"]
pub struct PendingResponse {
    sequence: u8,
    slot: Receiver<Outcome>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<DriverMetrics>,
    default_timeout: Duration,
    finished: bool,
}

impl PendingResponse {
    pub(crate) fn new(
        sequence: u8,
        slot: Receiver<Outcome>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<DriverMetrics>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            sequence,
            slot,
            dispatcher,
            metrics,
            default_timeout,
            finished: false,
        }
    }

    /// 请求使用的序列号
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// 阻塞等待结果（使用驱动配置的响应超时）
    pub fn wait(self) -> Result<Frame, DriverError> {
        let timeout = self.default_timeout;
        self.wait_timeout(timeout)
    }

    /// 阻塞等待结果，最多 `timeout`
    ///
    /// 超时后请求从未完成表中移除，返回 `CommandTimeout`，不会重试。
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<Frame, DriverError> {
        let outcome = match self.slot.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                if self.dispatcher.remove_pending(self.sequence) {
                    self.finished = true;
                    self.metrics.command_timeouts.fetch_add(1, Ordering::Relaxed);
                    debug!("Request seq={} timed out after {:?}", self.sequence, timeout);
                    return Err(DriverError::CommandTimeout {
                        seq: self.sequence,
                        timeout,
                    });
                }
                // 条目已被其他路径取走，对方必定投递结果或丢弃发送端
                match self.slot.recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Cancelled,
                }
            },
            Err(RecvTimeoutError::Disconnected) => Outcome::Cancelled,
        };
        self.finished = true;
        into_result(outcome)
    }

    /// 非阻塞查询
    ///
    /// 尚未结束时返回 `None`；返回 `Some` 之后句柄不再持有请求。
    pub fn try_result(&mut self) -> Option<Result<Frame, DriverError>> {
        if self.finished {
            return Some(Err(DriverError::Cancelled));
        }
        match self.slot.try_recv() {
            Ok(outcome) => {
                self.finished = true;
                Some(into_result(outcome))
            },
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                Some(Err(DriverError::Cancelled))
            },
        }
    }

    /// 取消请求，立即释放序列号
    ///
    /// 已经在路上的响应不会被丢回给调用方，它到达时按迟到响应处理。
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.finished {
            self.finished = true;
            if self.dispatcher.remove_pending(self.sequence) {
                debug!("Request seq={} cancelled", self.sequence);
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("sequence", &self.sequence)
            .field("finished", &self.finished)
            .finish()
    }
}

/// 非成功状态码转换为 `CommandFailed`
fn into_result(outcome: Outcome) -> Result<Frame, DriverError> {
    match outcome {
        Outcome::Response(frame) => {
            let code = ResponseCode::from(frame.response_code);
            if code.is_success() {
                Ok(frame)
            } else {
                Err(DriverError::CommandFailed {
                    code,
                    raw: frame.response_code,
                })
            }
        },
        Outcome::TransportFailure(reason) => Err(DriverError::TransportFailure(reason)),
        Outcome::Cancelled => Err(DriverError::Cancelled),
    }
}
