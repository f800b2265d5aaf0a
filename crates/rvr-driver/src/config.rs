//! 驱动配置
//!
//! 纯数据配置（POD），可以从 TOML 加载；缺失的字段使用默认值。
//!
//! ```toml
//! response_timeout_ms = 1500
//! receive_timeout_ms = 5
//! ```

use crate::error::DriverError;
use rvr_protocol::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 一帧编码后的最小长度（空负载命令帧，无转义）
const MIN_FRAME_LEN: usize = 10;

/// 驱动配置
///
/// # Example
///
/// ```
/// use rvr_driver::DriverConfig;
///
/// // 默认配置（1s 响应超时，10ms 接收超时）
/// let config = DriverConfig::default();
/// assert_eq!(config.response_timeout_ms, 1000);
///
/// // 从 TOML 加载，未写出的字段保持默认
/// let config = DriverConfig::from_toml_str("response_timeout_ms = 250").unwrap();
/// assert_eq!(config.response_timeout_ms, 250);
/// assert_eq!(config.receive_timeout_ms, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 请求/响应命令的默认超时（毫秒）
    pub response_timeout_ms: u64,
    /// 传输读超时（毫秒），决定分发线程检查停止标志的间隔
    pub receive_timeout_ms: u64,
    /// 解码缓冲上限（字节），超过后丢弃并上报 framing fault
    pub max_frame_len: usize,
    /// 断开连接时等待分发线程退出的时间（毫秒）
    pub stop_join_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1000,
            receive_timeout_ms: 10,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            stop_join_timeout_ms: 500,
        }
    }
}

impl DriverConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let config: DriverConfig =
            toml::from_str(content).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), DriverError> {
        for (name, value) in [
            ("response_timeout_ms", self.response_timeout_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("stop_join_timeout_ms", self.stop_join_timeout_ms),
        ] {
            if value == 0 {
                return Err(DriverError::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(DriverError::Config(format!(
                "max_frame_len must be at least {} bytes, got {}",
                MIN_FRAME_LEN, self.max_frame_len
            )));
        }
        Ok(())
    }
}
