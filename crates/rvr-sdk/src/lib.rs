//! RVR SDK - Sphero RVR 串口 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **传输层** (`transport`): 串口字节收发，读写两半可并发
//! - **协议层** (`protocol`): 帧编码、转义、校验和、增量解码
//! - **驱动层** (`driver`): 序列号分配、请求/响应匹配、通知分发、设备命令
//! - **辅助控制** (`controls`): 红外等功能的组合调用
//!
//! # 快速开始
//!
//! ```no_run
//! use rvr_sdk::prelude::*;
//!
//! rvr_sdk::init_logger().ok();
//! let rvr = RvrBuilder::new().port("/dev/ttyS0").build()?;
//! rvr.wake()?;
//! rvr.reset_yaw()?;
//! rvr.drive_with_heading(128, 90, DriveFlags::forward())?;
//! # Ok::<(), DriverError>(())
//! ```

pub mod controls;
pub mod logging;
pub mod prelude;

pub use rvr_driver as driver;
pub use rvr_protocol as protocol;
pub use rvr_transport as transport;

pub use controls::{BatchPolicy, InfraredControl};
pub use logging::{init_logger, init_logger_with_filter};
pub use rvr_driver::{DriverConfig, DriverError, Rvr};
#[cfg(feature = "serial")]
pub use rvr_driver::RvrBuilder;
pub use rvr_protocol::ProtocolError;
pub use rvr_transport::TransportError;
