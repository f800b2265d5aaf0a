//! Robot API 模块
//!
//! 提供对外的 `Rvr` 结构体：连接生命周期、命令发送、响应等待、通知订阅。

use crate::config::DriverConfig;
use crate::dispatcher::{Dispatcher, ListenerId, NotificationHandler, Outcome};
use crate::error::DriverError;
use crate::metrics::{DriverMetrics, MetricsSnapshot};
use crate::pending::PendingResponse;
use crate::pipeline::{RxContext, rx_loop};
use rvr_protocol::{CommandRoute, EventId, Frame};
use rvr_transport::{RxTransport, SplittableTransport, TxTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<(), DriverError>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), DriverError> {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join，超时后任其自行结束
        std::thread::spawn(move || {
            let _ = done_tx.send(self.join().is_ok());
        });

        match done_rx.recv_timeout(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DriverError::IoThread("RX thread panicked".to_string())),
            Err(_) => Err(DriverError::IoThread(format!(
                "RX thread did not stop within {:?}",
                timeout
            ))),
        }
    }
}

/// 一次连接的 RX 线程
struct RxWorker {
    handle: JoinHandle<()>,
    is_running: Arc<AtomicBool>,
}

/// RVR 驱动
///
/// 所有方法都只需要 `&self`，可以包在 `Arc` 中由多个线程并发调用：
/// 写路径共享一把锁，读路径由后台 RX 线程独占。
///
/// # Example
///
/// ```no_run
/// use rvr_driver::{DriverConfig, Rvr};
/// use rvr_transport::SerialTransport;
///
/// let rvr = Rvr::new(DriverConfig::default());
/// rvr.connect(SerialTransport::open("/dev/ttyS0", 115_200)?)?;
/// rvr.wake()?;
/// println!("battery: {}%", rvr.get_battery_percentage()?);
/// rvr.disconnect();
/// # Ok::<(), rvr_driver::DriverError>(())
/// ```
pub struct Rvr {
    config: DriverConfig,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<DriverMetrics>,
    /// 写半部（`None` 表示未连接）
    tx: Mutex<Option<Box<dyn TxTransport>>>,
    /// RX 线程；同时串行化 connect / disconnect
    worker: Mutex<Option<RxWorker>>,
    connected: Arc<AtomicBool>,
}

impl Rvr {
    /// 创建未连接的驱动
    pub fn new(config: DriverConfig) -> Self {
        let metrics = Arc::new(DriverMetrics::new());
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(metrics.clone())),
            metrics,
            tx: Mutex::new(None),
            worker: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 接管传输并启动 RX 线程
    ///
    /// # 注意
    /// - 传输被拆分为读写两半，原传输不再可用
    /// - 配置无效时返回 `Config`，不启动线程
    /// - 已连接时返回 `AlreadyConnected`；上一次连接因致命错误断开时，先清理再连接
    pub fn connect<T>(&self, transport: T) -> Result<(), DriverError>
    where
        T: SplittableTransport,
    {
        self.config.validate()?;
        let mut worker = self.worker.lock().map_err(|_| DriverError::PoisonedLock)?;
        if self.connected.load(Ordering::Acquire) {
            return Err(DriverError::AlreadyConnected);
        }
        if let Some(stale) = worker.take() {
            self.stop_worker(stale);
        }

        let (mut rx, tx) = transport.split()?;
        rx.set_receive_timeout(self.config.receive_timeout());

        let is_running = Arc::new(AtomicBool::new(true));
        let ctx = RxContext {
            dispatcher: self.dispatcher.clone(),
            metrics: self.metrics.clone(),
            is_running: is_running.clone(),
            connected: self.connected.clone(),
            max_frame_len: self.config.max_frame_len,
        };

        *self.lock_tx()? = Some(Box::new(tx));
        // 先置位，RX 线程遇到致命错误时才能清除
        self.connected.store(true, Ordering::Release);

        let handle = match spawn_rx_thread(rx, ctx) {
            Ok(handle) => handle,
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                *self.lock_tx()? = None;
                return Err(e);
            },
        };
        *worker = Some(RxWorker { handle, is_running });

        info!("RVR connected");
        Ok(())
    }

    /// 断开连接
    ///
    /// 停止 RX 线程（带超时），以 `Cancelled` 结束所有未完成请求，释放传输。
    /// 可重复调用；已注册的监听者和序列号计数器保留，可以再次 `connect`。
    pub fn disconnect(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        if let Some(stale) = worker.take() {
            self.stop_worker(stale);
        }
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let cancelled = self.dispatcher.fail_all(|| Outcome::Cancelled);
        if cancelled > 0 {
            warn!("{} pending request(s) cancelled by disconnect", cancelled);
        }
        if was_connected {
            info!("RVR disconnected");
        }
    }

    fn stop_worker(&self, worker: RxWorker) {
        // Release: 之前的写入对看到 false 的 RX 线程可见
        worker.is_running.store(false, Ordering::Release);
        if let Err(e) = worker.handle.join_timeout(self.config.stop_join_timeout()) {
            error!("{}", e);
        }
    }

    /// 连接是否可用
    ///
    /// 致命传输错误后变为 `false`，需要重新 `connect`。
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 获取指标快照
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// 当前未完成请求数
    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    fn lock_tx(&self) -> Result<MutexGuard<'_, Option<Box<dyn TxTransport>>>, DriverError> {
        self.tx.lock().map_err(|_| DriverError::PoisonedLock)
    }

    /// 写出一帧
    ///
    /// 致命写错误与 RX 线程的致命读错误处理一致：连接标记为断开，
    /// 所有未完成请求以 `TransportFailure` 结束。
    fn write_frame(&self, frame: &Frame) -> Result<(), DriverError> {
        let bytes = frame.encode()?;
        let mut guard = self.lock_tx()?;
        let tx = match guard.as_mut() {
            Some(tx) if self.connected.load(Ordering::Acquire) => tx,
            _ => return Err(DriverError::NotConnected),
        };

        match tx.write_all(&bytes).and_then(|_| tx.flush()) {
            Ok(()) => {
                self.metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "TX frame: seq={} DID=0x{:02X} CID=0x{:02X} len={}",
                    frame.sequence,
                    frame.device_id,
                    frame.command_id,
                    frame.payload.len()
                );
                Ok(())
            },
            Err(e) if e.is_fatal() => {
                self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                error!("TX: fatal transport error: {}", e);
                drop(guard);
                self.connected.store(false, Ordering::Release);
                let reason = e.to_string();
                self.dispatcher
                    .fail_all(|| Outcome::TransportFailure(reason.clone()));
                Err(DriverError::TransportFailure(reason))
            },
            Err(e) => {
                self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                warn!("TX: transport error: {}", e);
                Err(e.into())
            },
        }
    }

    /// 发送不等待响应的命令（fire-and-forget）
    ///
    /// 字节交给传输后立即返回。
    pub fn send(&self, route: CommandRoute, payload: &[u8]) -> Result<(), DriverError> {
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }
        let sequence = self.dispatcher.next_sequence()?;
        let frame = Frame::command(
            route.target,
            route.device,
            route.command,
            sequence,
            false,
            payload,
        );
        self.write_frame(&frame)
    }

    /// 发送请求并返回等待句柄（不阻塞）
    ///
    /// 写失败时序列号立即释放。
    pub fn submit(&self, route: CommandRoute, payload: &[u8]) -> Result<PendingResponse, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }
        let (sequence, slot) = self.dispatcher.register_pending(route.event_id())?;
        let pending = PendingResponse::new(
            sequence,
            slot,
            self.dispatcher.clone(),
            self.metrics.clone(),
            self.config.response_timeout(),
        );

        let frame = Frame::command(
            route.target,
            route.device,
            route.command,
            sequence,
            true,
            payload,
        );
        // 失败时 pending 被丢弃，序列号随之释放
        self.write_frame(&frame)?;
        Ok(pending)
    }

    /// 发送请求并阻塞等待响应（使用配置的响应超时）
    ///
    /// 超时返回 `CommandTimeout`，不重试。
    pub fn request(&self, route: CommandRoute, payload: &[u8]) -> Result<Frame, DriverError> {
        self.submit(route, payload)?.wait()
    }

    /// 发送请求并阻塞等待响应，最多 `timeout`
    pub fn request_timeout(
        &self,
        route: CommandRoute,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Frame, DriverError> {
        self.submit(route, payload)?.wait_timeout(timeout)
    }

    /// 注册通知监听者
    ///
    /// 监听者在 RX 线程中调用，对之后每一条匹配 `event` 的通知帧都会调用，直到移除。
    pub fn register_notification_handler<H>(&self, event: EventId, handler: H) -> ListenerId
    where
        H: NotificationHandler + 'static,
    {
        self.dispatcher.register_listener(event, Arc::new(handler))
    }

    /// 注册已共享的监听者
    pub fn register_shared_notification_handler(
        &self,
        event: EventId,
        handler: Arc<dyn NotificationHandler>,
    ) -> ListenerId {
        self.dispatcher.register_listener(event, handler)
    }

    /// 移除通知监听者，返回是否找到
    pub fn remove_notification_handler(&self, event: EventId, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(event, id)
    }

    pub fn notification_handler_count(&self, event: EventId) -> usize {
        self.dispatcher.listener_count(event)
    }
}

fn spawn_rx_thread<R>(rx: R, ctx: RxContext) -> Result<JoinHandle<()>, DriverError>
where
    R: RxTransport + 'static,
{
    std::thread::Builder::new()
        .name("rvr-rx".to_string())
        .spawn(move || rx_loop(rx, ctx))
        .map_err(|e| DriverError::IoThread(e.to_string()))
}

impl Drop for Rvr {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Rvr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rvr")
            .field("connected", &self.is_connected())
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish()
    }
}
