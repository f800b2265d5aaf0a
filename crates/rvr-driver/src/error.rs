//! 驱动层错误类型定义

use rvr_protocol::{ProtocolError, ResponseCode};
use rvr_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 调用方参数违反协议约束（发送任何字节之前拒绝）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 在截止时间内没有收到响应
    #[error("Command timeout (seq={seq}, after {timeout:?})")]
    CommandTimeout { seq: u8, timeout: Duration },

    /// 所有序列号都被未完成的请求占用
    ///
    /// 任一未完成请求结束后可以重试。
    #[error("No free sequence number (all in flight)")]
    AllocationExhausted,

    /// 连接已丢失，所有未完成请求都以此错误结束
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// 传输层错误（非致命，连接仍可用）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 设备返回非成功状态码
    #[error("Command failed: {code:?} (0x{raw:02X})")]
    CommandFailed { code: ResponseCode, raw: u8 },

    /// 请求被取消（调用方取消或断开连接）
    #[error("Request cancelled")]
    Cancelled,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    /// 批量命令中部分失败（索引 + 错误）
    #[error("{} command(s) in batch failed", failures.len())]
    Batch { failures: Vec<(usize, DriverError)> },

    /// 配置无效或无法读取
    #[error("Config error: {0}")]
    Config(String),

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,
}

impl DriverError {
    /// 是否可以原样重试
    ///
    /// 超时、序列号耗尽和非致命传输错误可以重试；
    /// 参数错误、连接丢失等需要调用方先处理。
    pub fn is_retryable(&self) -> bool {
        match self {
            DriverError::CommandTimeout { .. } | DriverError::AllocationExhausted => true,
            DriverError::Transport(e) => !e.is_fatal(),
            DriverError::CommandFailed { code, .. } => *code == ResponseCode::Busy,
            _ => false,
        }
    }

    /// 协议值越界转换为参数错误（API 边界使用）
    pub(crate) fn invalid_argument(err: ProtocolError) -> Self {
        DriverError::InvalidArgument(err.to_string())
    }
}
