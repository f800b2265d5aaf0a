//! 分发循环
//!
//! 后台线程独占传输读半部：读取字节、增量解码、逐帧交给 [`Dispatcher`]。
//! 所有帧都在这一个线程上串行处理，响应匹配与监听者调用之间没有并发。

use crate::dispatcher::{Dispatcher, Outcome};
use crate::metrics::DriverMetrics;
use rvr_protocol::{DecodeEvent, FrameDecoder};
use rvr_transport::{RxTransport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, trace, warn};

/// 单次读取的缓冲区大小
const READ_CHUNK: usize = 256;

/// 分发循环的共享状态
pub(crate) struct RxContext {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<DriverMetrics>,
    /// 由 `disconnect` 清除，通知线程退出
    pub is_running: Arc<AtomicBool>,
    /// 连接是否可用，致命错误时由本线程清除
    pub connected: Arc<AtomicBool>,
    pub max_frame_len: usize,
}

/// RX 线程主循环
///
/// 读超时是正常情况，只用于定期检查运行标志。
/// 致命传输错误会以 `TransportFailure` 结束所有未完成请求，然后退出。
pub(crate) fn rx_loop(mut rx: impl RxTransport, ctx: RxContext) {
    let mut decoder = FrameDecoder::with_max_frame_len(ctx.max_frame_len);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        // Acquire: 看到 false 时，disconnect 之前的写入都已可见
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let n = match rx.read(&mut buf) {
            Ok(n) => n,
            Err(TransportError::Timeout) => continue,
            Err(e) => {
                ctx.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                if e.is_fatal() {
                    error!("RX thread: fatal transport error: {}", e);
                    ctx.connected.store(false, Ordering::Release);
                    ctx.is_running.store(false, Ordering::Release);
                    let reason = e.to_string();
                    let failed = ctx
                        .dispatcher
                        .fail_all(|| Outcome::TransportFailure(reason.clone()));
                    if failed > 0 {
                        error!("RX thread: {} pending request(s) failed", failed);
                    }
                    break;
                }
                warn!("RX thread: transient transport error: {}", e);
                continue;
            },
        };

        ctx.metrics.rx_bytes_total.fetch_add(n as u64, Ordering::Relaxed);
        for event in decoder.feed(&buf[..n]) {
            match event {
                DecodeEvent::Frame(frame) => {
                    ctx.metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                    trace!(
                        "RX frame: seq={} DID=0x{:02X} CID=0x{:02X} len={}",
                        frame.sequence,
                        frame.device_id,
                        frame.command_id,
                        frame.payload.len()
                    );
                    ctx.dispatcher.on_frame_received(frame);
                },
                DecodeEvent::Fault(fault) => {
                    ctx.metrics.framing_faults.fetch_add(1, Ordering::Relaxed);
                    warn!("RX thread: framing fault, resynchronizing: {}", fault);
                },
            }
        }
    }
}
