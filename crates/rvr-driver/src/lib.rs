//! 驱动层模块
//!
//! 本模块提供 RVR 的命令驱动功能，包括：
//! - 序列号分配与请求/响应匹配
//! - 后台分发线程（逐帧串行处理）
//! - 通知监听者注册与分发
//! - 设备命令（驱动、电源、红外）
//!
//! # 使用场景
//!
//! 直接使用 [`Rvr`] 发送命令；自定义传输通过 [`Rvr::connect`] 接入，
//! 串口连接可以使用 [`RvrBuilder`]（`serial` feature）。

#[cfg(feature = "serial")]
mod builder;
pub mod config;
mod device;
pub mod dispatcher;
mod error;
pub mod metrics;
mod pending;
mod pipeline;
mod rvr;

#[cfg(feature = "serial")]
pub use builder::RvrBuilder;
pub use config::DriverConfig;
pub use dispatcher::{Dispatcher, HandlerResult, ListenerId, NotificationHandler};
pub use error::DriverError;
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pending::PendingResponse;
pub use rvr::Rvr;
