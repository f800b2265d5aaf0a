//! 串口传输实现（serialport 后端）

use crate::{RxTransport, SplittableTransport, TransportError, TxTransport};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认读超时
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// RVR 串口默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 串口传输
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// 打开串口（8N1，无流控）
    ///
    /// # 参数
    /// - `path`: 串口路径（如 "/dev/ttyS0"、"/dev/ttyUSB0"、"COM3"）
    /// - `baud_rate`: 波特率（RVR 默认 115200）
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(DEFAULT_READ_TIMEOUT)
            .open()?;

        info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

fn read_port(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, TransportError> {
    match port.read(buf) {
        Ok(0) => Err(TransportError::Timeout),
        Ok(n) => Ok(n),
        Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            Err(TransportError::Timeout)
        },
        Err(e) => Err(e.into()),
    }
}

fn apply_timeout(port: &mut dyn SerialPort, timeout: Duration) {
    // serialport 不接受 0 超时，使用 1ms 近似非阻塞读
    let timeout = timeout.max(Duration::from_millis(1));
    if let Err(e) = port.set_timeout(timeout) {
        warn!("Failed to set serial read timeout to {:?}: {}", timeout, e);
    }
}

impl SplittableTransport for SerialTransport {
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn split(self) -> Result<(SerialRx, SerialTx), TransportError> {
        let tx_port = self.port.try_clone()?;
        debug!("Serial port split into RX/TX halves");
        Ok((SerialRx { port: self.port }, SerialTx { port: tx_port }))
    }
}

/// 串口读半部
pub struct SerialRx {
    port: Box<dyn SerialPort>,
}

impl RxTransport for SerialRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        read_port(&mut *self.port, buf)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        apply_timeout(&mut *self.port, timeout);
    }
}

/// 串口写半部
pub struct SerialTx {
    port: Box<dyn SerialPort>,
}

impl TxTransport for SerialTx {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }
}
