//! # RVR Protocol
//!
//! RVR 串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 帧标记、转义规则和长度常量
//! - `ids`: 目标处理器 / 设备 / 命令 ID 定义
//! - `frame`: 帧结构与编码（转义 + 校验和）
//! - `decoder`: 增量解码器（跨多次投递重组帧）
//! - `commands`: 类型安全的命令负载构建与通知解析
//!
//! ## 帧格式
//!
//! ```text
//! SOP | FLAGS | TID | DID | CID | SEQ | [ERR] | LEN | PAYLOAD[LEN] | CHK | EOP
//! ```
//!
//! SOP 与 EOP 之间的所有字节都经过转义，标记字节不会以原值出现在帧内部。

pub mod commands;
pub mod constants;
pub mod decoder;
pub mod frame;
pub mod ids;

// 重新导出常用类型
pub use commands::*;
pub use constants::*;
pub use decoder::{DecodeEvent, FrameDecoder, FramingFault};
pub use frame::{Frame, FrameFlags, checksum, encode};
pub use ids::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Invalid payload length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u32 },

    #[error("Unexpected frame: expected {expected}, got DID=0x{device:02X} CID=0x{command:02X}")]
    UnexpectedFrame {
        expected: &'static str,
        device: u8,
        command: u8,
    },
}
