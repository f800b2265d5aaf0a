//! # RVR Transport Layer
//!
//! 串口传输抽象层，只负责原始字节的收发。
//! 波特率、校验位等端口配置属于连接层（[`SerialTransport::open`]），驱动层不感知。
//!
//! 传输被拆分为独立的 RX / TX 两半：读路径由驱动的分发线程独占，
//! 写路径由调用方共享，两者可以并发进行。

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialRx, SerialTransport, SerialTx};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockHandle, MockRx, MockTransport, MockTx, MockWrite};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Connection lost")]
    Disconnected,
}

impl TransportError {
    /// 是否为致命错误（连接已不可用）
    ///
    /// 超时和偶发 IO 错误可以重试；断开、设备消失等错误需要重新连接。
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Timeout => false,
            TransportError::Disconnected => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
            ),
            #[cfg(feature = "serial")]
            TransportError::Serial(e) => matches!(e.kind(), serialport::ErrorKind::NoDevice),
        }
    }
}

/// 读半部
pub trait RxTransport: Send {
    /// 读取可用字节
    ///
    /// 在接收超时内没有数据时返回 `TransportError::Timeout`，成功时返回值总是大于 0。
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// 设置接收超时（默认实现忽略）
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
}

/// 写半部
pub trait TxTransport: Send {
    /// 写入完整字节序列
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// 可拆分为独立读写两半的传输
///
/// 驱动只通过拆分后的两半访问传输，端口配置在拆分之前完成。
pub trait SplittableTransport: Send {
    type Rx: RxTransport + 'static;
    type Tx: TxTransport + 'static;
    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(TransportError::Timeout.to_string(), "Read timeout");
        assert_eq!(TransportError::Disconnected.to_string(), "Connection lost");

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: TransportError = io.into();
        assert!(err.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::Disconnected.is_fatal());

        let broken = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "x");
        assert!(TransportError::Io(broken).is_fatal());

        let transient = std::io::Error::other("glitch");
        assert!(!TransportError::Io(transient).is_fatal());
    }
}
