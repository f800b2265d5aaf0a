//! Mock 传输（无硬件依赖）
//!
//! 内存中的双向字节管道，测试通过 [`MockHandle`] 注入入站字节、检查出站写入、
//! 模拟断线或写失败。可选的应答器在每次写入后解码出站帧并生成入站应答帧，
//! 用于模拟设备行为。

use crate::{RxTransport, SplittableTransport, TransportError, TxTransport};
use rvr_protocol::{DecodeEvent, Frame, FrameDecoder};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::trace;

/// 设备应答器：输入主机发出的帧，返回设备应回复的帧
type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// 一次出站写入记录
#[derive(Debug, Clone)]
pub struct MockWrite {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

struct MockState {
    inbound: VecDeque<u8>,
    writes: Vec<MockWrite>,
    connected: bool,
    fail_writes: bool,
    responder: Option<Responder>,
    /// 应答器专用解码器（出站方向）
    decoder: FrameDecoder,
}

struct Shared {
    state: Mutex<MockState>,
    readable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        // 测试线程 panic 不应连带阻塞其他线程
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if !state.connected {
                return Err(TransportError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout);
            }
            state = self
                .readable
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        if state.fail_writes {
            return Err(TransportError::Io(std::io::Error::other(
                "injected write failure",
            )));
        }
        state.writes.push(MockWrite {
            at: Instant::now(),
            bytes: data.to_vec(),
        });
        trace!("Mock transport: {} bytes written", data.len());

        let state = &mut *state;
        if let Some(responder) = state.responder.as_mut() {
            for event in state.decoder.feed(data) {
                if let DecodeEvent::Frame(frame) = event {
                    for reply in responder(&frame) {
                        if let Ok(bytes) = reply.encode() {
                            state.inbound.extend(bytes.iter().copied());
                        }
                    }
                }
            }
            self.readable.notify_all();
        }
        Ok(())
    }
}

/// Mock 传输
pub struct MockTransport {
    shared: Arc<Shared>,
    read_timeout: Duration,
}

impl MockTransport {
    /// 创建 Mock 传输及其控制句柄
    pub fn new() -> (Self, MockHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(MockState {
                inbound: VecDeque::new(),
                writes: Vec::new(),
                connected: true,
                fail_writes: false,
                responder: None,
                decoder: FrameDecoder::new(),
            }),
            readable: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
                read_timeout: Duration::from_millis(10),
            },
            MockHandle { shared },
        )
    }
}

impl SplittableTransport for MockTransport {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(MockRx, MockTx), TransportError> {
        Ok((
            MockRx {
                shared: self.shared.clone(),
                read_timeout: self.read_timeout,
            },
            MockTx {
                shared: self.shared,
            },
        ))
    }
}

/// Mock 读半部
pub struct MockRx {
    shared: Arc<Shared>,
    read_timeout: Duration,
}

impl RxTransport for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.shared.read(buf, self.read_timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

/// Mock 写半部
pub struct MockTx {
    shared: Arc<Shared>,
}

impl TxTransport for MockTx {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.shared.write(data)
    }
}

/// Mock 控制句柄（测试侧）
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// 注入入站字节
    pub fn inject(&self, bytes: &[u8]) {
        self.shared.lock().inbound.extend(bytes.iter().copied());
        self.shared.readable.notify_all();
    }

    /// 注入一条入站帧
    pub fn inject_frame(&self, frame: &Frame) {
        if let Ok(bytes) = frame.encode() {
            self.inject(&bytes);
        }
    }

    /// 设置设备应答器
    ///
    /// 应答器在传输锁内调用，不能再访问本句柄。
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Frame) -> Vec<Frame> + Send + 'static,
    {
        let mut state = self.shared.lock();
        state.responder = Some(Box::new(responder));
        state.decoder.reset();
    }

    pub fn clear_responder(&self) {
        self.shared.lock().responder = None;
    }

    /// 所有出站写入
    pub fn writes(&self) -> Vec<MockWrite> {
        self.shared.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.shared.lock().writes.len()
    }

    pub fn clear_writes(&self) {
        self.shared.lock().writes.clear();
    }

    /// 解码所有出站写入得到的帧
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent_frames_with_time()
            .into_iter()
            .map(|(_, frame)| frame)
            .collect()
    }

    /// 解码所有出站写入，附带写入时间
    pub fn sent_frames_with_time(&self) -> Vec<(Instant, Frame)> {
        let writes = self.writes();
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for write in writes {
            for event in decoder.feed(&write.bytes) {
                if let DecodeEvent::Frame(frame) = event {
                    frames.push((write.at, frame));
                }
            }
        }
        frames
    }

    /// 模拟连接断开（读写都返回 `Disconnected`）
    pub fn disconnect(&self) {
        self.shared.lock().connected = false;
        self.shared.readable.notify_all();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// 让后续写入失败（非致命 IO 错误）
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.lock().fail_writes = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_read() {
        let (transport, handle) = MockTransport::new();
        let (mut rx, _tx) = transport.split().unwrap();
        handle.inject(&[1, 2, 3]);

        let mut buf = [0u8; 2];
        assert_eq!(rx.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(rx.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert!(matches!(rx.read(&mut buf), Err(TransportError::Timeout)));
    }

    #[test]
    fn test_writes_recorded_and_decoded() {
        let (transport, handle) = MockTransport::new();
        let (_rx, mut tx) = transport.split().unwrap();

        let frame = Frame::command(0x12, 0x16, 0x06, 3, false, &[]);
        tx.write_all(&frame.encode().unwrap()).unwrap();

        assert_eq!(handle.write_count(), 1);
        assert_eq!(handle.sent_frames(), vec![frame]);
        handle.clear_writes();
        assert_eq!(handle.write_count(), 0);
    }

    #[test]
    fn test_responder_generates_inbound_frames() {
        let (transport, handle) = MockTransport::new();
        handle.set_responder(|frame| {
            vec![Frame::response(
                frame.target_id,
                frame.device_id,
                frame.command_id,
                frame.sequence,
                0,
                &[0x2A],
            )]
        });
        let (mut rx, mut tx) = transport.split().unwrap();

        let request = Frame::command(0x11, 0x13, 0x10, 7, true, &[]);
        tx.write_all(&request.encode().unwrap()).unwrap();

        let mut buf = [0u8; 64];
        let n = rx.read(&mut buf).unwrap();
        let events = FrameDecoder::new().feed(&buf[..n]);
        match events.as_slice() {
            [DecodeEvent::Frame(reply)] => {
                assert!(reply.is_response());
                assert_eq!(reply.sequence, 7);
                assert_eq!(&reply.payload[..], &[0x2A]);
            },
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_disconnect() {
        let (transport, handle) = MockTransport::new();
        let (mut rx, mut tx) = transport.split().unwrap();
        handle.disconnect();

        assert!(!handle.is_connected());
        let mut buf = [0u8; 4];
        assert!(matches!(rx.read(&mut buf), Err(TransportError::Disconnected)));
        assert!(matches!(tx.write_all(&[1]), Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_disconnect_wakes_blocked_reader() {
        let (transport, handle) = MockTransport::new();
        let (mut rx, _tx) = transport.split().unwrap();
        rx.set_receive_timeout(Duration::from_secs(5));

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            rx.read(&mut buf)
        });
        std::thread::sleep(Duration::from_millis(20));
        handle.disconnect();

        let result = reader.join().unwrap();
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_fail_writes() {
        let (transport, handle) = MockTransport::new();
        let (_rx, mut tx) = transport.split().unwrap();
        handle.set_fail_writes(true);
        let err = tx.write_all(&[1, 2]).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(handle.write_count(), 0);

        handle.set_fail_writes(false);
        tx.write_all(&[1, 2]).unwrap();
        assert_eq!(handle.write_count(), 1);
    }
}
