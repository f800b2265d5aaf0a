//! Builder 模式实现
//!
//! 提供链式构造已连接 `Rvr` 实例的便捷方式（串口后端）。

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::rvr::Rvr;
use rvr_transport::SerialTransport;
use rvr_transport::serial::DEFAULT_BAUD_RATE;
use tracing::info;

/// Rvr Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use rvr_driver::{DriverConfig, RvrBuilder};
///
/// // 默认 115200 波特率和默认配置
/// let rvr = RvrBuilder::new().port("/dev/ttyS0").build().unwrap();
///
/// // 自定义配置
/// let config = DriverConfig {
///     response_timeout_ms: 2000,
///     ..DriverConfig::default()
/// };
/// let rvr = RvrBuilder::new()
///     .port("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .config(config)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RvrBuilder {
    /// 串口路径（如 "/dev/ttyS0"、"COM3"）
    port: Option<String>,
    /// 波特率（默认 115200）
    baud_rate: Option<u32>,
    config: Option<DriverConfig>,
}

impl RvrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置串口路径（必需）
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 设置波特率（可选，默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// 设置驱动配置（可选）
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 打开串口并连接
    ///
    /// # Errors
    /// - `DriverError::InvalidArgument`: 未设置串口路径
    /// - `DriverError::Config`: 配置取值无效
    /// - `DriverError::Transport`: 串口打开失败
    pub fn build(self) -> Result<Rvr, DriverError> {
        let port = self
            .port
            .ok_or_else(|| DriverError::InvalidArgument("serial port not set".to_string()))?;
        let baud_rate = self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = SerialTransport::open(&port, baud_rate)?;
        let rvr = Rvr::new(config);
        rvr.connect(transport)?;
        info!("RVR ready on {} at {} baud", port, baud_rate);
        Ok(rvr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_port() {
        let err = RvrBuilder::new().baud_rate(9600).build().unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = DriverConfig {
            response_timeout_ms: 0,
            ..DriverConfig::default()
        };
        let err = RvrBuilder::new()
            .port("/dev/does-not-exist")
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_build_missing_device() {
        let err = RvrBuilder::new()
            .port("/dev/rvr-does-not-exist")
            .build()
            .unwrap_err();
        assert!(matches!(err, DriverError::Transport(_)));
    }
}
