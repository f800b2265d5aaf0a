//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use rvr_sdk::prelude::*;
//! ```

// 驱动
pub use rvr_driver::{
    DriverConfig, HandlerResult, ListenerId, MetricsSnapshot, PendingResponse, Rvr,
};
#[cfg(feature = "serial")]
pub use rvr_driver::RvrBuilder;

// 辅助控制
pub use crate::controls::{BatchPolicy, InfraredControl};

// 协议类型
pub use rvr_protocol::{
    CommandRoute, DriveFlags, EventId, Frame, InfraredCode, RawMotorMode, ResponseCode,
};

// 传输（常用 Trait）
pub use rvr_transport::SplittableTransport;
#[cfg(feature = "serial")]
pub use rvr_transport::SerialTransport;

// 错误类型
pub use rvr_driver::DriverError;
pub use rvr_protocol::ProtocolError;
pub use rvr_transport::TransportError;
