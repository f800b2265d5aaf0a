//! 请求/响应匹配与通知分发
//!
//! [`Dispatcher`] 持有三样共享状态：
//!
//! - 序列号分配器与未完成请求表（同一把 `Mutex`，分配与登记是一个原子步骤）
//! - 通知监听者注册表（`RwLock`，分发时只读）
//! - 驱动指标
//!
//! 帧处理只在分发线程中进行，一次一帧；监听者在锁外按注册顺序调用，
//! 单个监听者失败（返回错误或 panic）只记录日志和指标，不影响其他监听者。

use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crossbeam_channel::{Receiver, Sender};
use rvr_protocol::{EventId, Frame};
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// 监听者返回值
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// 通知监听者
///
/// 在分发线程中调用，应尽快返回；耗时工作请转交给其他线程（如 channel）。
///
/// 闭包 `Fn(&Frame) -> HandlerResult` 自动实现本 trait：
///
/// ```rust
/// use rvr_driver::{HandlerResult, NotificationHandler};
/// use rvr_protocol::Frame;
///
/// fn assert_handler<H: NotificationHandler>(_: H) {}
/// assert_handler(|frame: &Frame| -> HandlerResult {
///     println!("notification: {:?}", frame.payload);
///     Ok(())
/// });
/// ```
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, frame: &Frame) -> HandlerResult;
}

impl<F> NotificationHandler for F
where
    F: Fn(&Frame) -> HandlerResult + Send + Sync,
{
    fn on_notification(&self, frame: &Frame) -> HandlerResult {
        self(frame)
    }
}

/// 监听者注册句柄（用于移除）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// 未完成请求的结局（单次投递）
#[derive(Debug)]
pub(crate) enum Outcome {
    Response(Frame),
    TransportFailure(String),
    Cancelled,
}

struct PendingEntry {
    event: EventId,
    created: Instant,
    slot: Sender<Outcome>,
}

/// 序列号分配器 + 未完成请求表
struct PendingTable {
    next_sequence: u8,
    entries: HashMap<u8, PendingEntry>,
}

impl PendingTable {
    /// 从计数器当前值开始，跳过占用中的序列号
    fn next_free(&mut self) -> Result<u8, DriverError> {
        for _ in 0..=u8::MAX as usize {
            let candidate = self.next_sequence;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            if !self.entries.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(DriverError::AllocationExhausted)
    }
}

type ListenerList = SmallVec<[(ListenerId, Arc<dyn NotificationHandler>); 2]>;

/// 分发器
pub struct Dispatcher {
    pending: Mutex<PendingTable>,
    listeners: RwLock<HashMap<EventId, ListenerList>>,
    next_listener_id: AtomicU64,
    metrics: Arc<DriverMetrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<DriverMetrics>) -> Self {
        Self {
            pending: Mutex::new(PendingTable {
                next_sequence: 0,
                entries: HashMap::new(),
            }),
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            metrics,
        }
    }

    fn lock_pending(&self) -> Result<MutexGuard<'_, PendingTable>, DriverError> {
        self.pending.lock().map_err(|_| DriverError::PoisonedLock)
    }

    /// 分发线程和清理路径不能因毒化而放弃（否则等待者永远挂起）
    fn lock_pending_recover(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 分配序列号并登记未完成请求
    ///
    /// 返回序列号和单次投递的结果槽。`event` 为请求的 `(DID, CID)`，
    /// 只有 `(DID, CID)` 一致的响应帧才会结束该请求。
    pub(crate) fn register_pending(
        &self,
        event: EventId,
    ) -> Result<(u8, Receiver<Outcome>), DriverError> {
        let mut table = self.lock_pending()?;
        let sequence = table.next_free()?;
        let (slot, receiver) = crossbeam_channel::bounded(1);
        table.entries.insert(
            sequence,
            PendingEntry {
                event,
                created: Instant::now(),
                slot,
            },
        );
        debug!("Pending request registered: seq={} {}", sequence, event);
        Ok((sequence, receiver))
    }

    /// 为不等待响应的命令分配序列号（不登记）
    ///
    /// 仍然跳过占用中的序列号，避免设备回复与未完成请求混淆。
    pub(crate) fn next_sequence(&self) -> Result<u8, DriverError> {
        self.lock_pending()?.next_free()
    }

    /// 移除未完成请求（取消或超时）
    ///
    /// 返回 `true` 表示请求确实由本次调用结束；`false` 表示请求已经被
    /// 响应或其他路径结束，结果可能已在结果槽中。
    pub(crate) fn remove_pending(&self, sequence: u8) -> bool {
        let removed = self.lock_pending_recover().entries.remove(&sequence);
        match removed {
            Some(entry) => {
                debug!(
                    "Pending request removed: seq={} after {:?}",
                    sequence,
                    entry.created.elapsed()
                );
                true
            },
            None => false,
        }
    }

    /// 以同一结局结束所有未完成请求
    pub(crate) fn fail_all(&self, outcome: impl Fn() -> Outcome) -> usize {
        let drained: Vec<(u8, PendingEntry)> =
            self.lock_pending_recover().entries.drain().collect();
        for (sequence, entry) in &drained {
            trace!("Resolving pending seq={} on shutdown/failure", sequence);
            let _ = entry.slot.try_send(outcome());
        }
        if !drained.is_empty() {
            debug!("{} pending request(s) resolved without response", drained.len());
        }
        drained.len()
    }

    /// 取走条目但不投递结果（测试用，模拟分发线程处理到一半）
    #[cfg(test)]
    pub(crate) fn take_pending(&self, sequence: u8) -> Option<Sender<Outcome>> {
        self.lock_pending_recover()
            .entries
            .remove(&sequence)
            .map(|entry| entry.slot)
    }

    /// 当前未完成请求数
    pub fn pending_count(&self) -> usize {
        self.lock_pending_recover().entries.len()
    }

    /// 序列号是否被未完成请求占用
    pub fn is_pending(&self, sequence: u8) -> bool {
        self.lock_pending_recover().entries.contains_key(&sequence)
    }

    /// 处理一条完整的入站帧
    ///
    /// - 响应帧：按序列号结束对应的未完成请求；没有对应请求时按迟到响应丢弃
    /// - 其他帧：按 `(DID, CID)` 交给通知监听者
    pub fn on_frame_received(&self, frame: Frame) {
        if frame.is_response() {
            self.resolve_response(frame);
        } else {
            self.dispatch_notification(&frame);
        }
    }

    fn resolve_response(&self, frame: Frame) {
        let event = EventId::of(&frame);
        let entry = {
            let mut table = self.lock_pending_recover();
            match table.entries.get(&frame.sequence) {
                Some(entry) if entry.event == event => table.entries.remove(&frame.sequence),
                Some(entry) => {
                    warn!(
                        "Response seq={} is for {} but pending request expects {}, dropping",
                        frame.sequence, event, entry.event
                    );
                    None
                },
                None => None,
            }
        };

        match entry {
            Some(entry) => {
                self.metrics.responses_matched.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Response matched: seq={} {} in {:?}",
                    frame.sequence,
                    event,
                    entry.created.elapsed()
                );
                let _ = entry.slot.try_send(Outcome::Response(frame));
            },
            None => {
                self.metrics.late_responses.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Dropping unmatched response: seq={} {} (late or cancelled)",
                    frame.sequence, event
                );
            },
        }
    }

    fn dispatch_notification(&self, frame: &Frame) {
        let event = EventId::of(frame);
        // 复制一份句柄后释放读锁，监听者内部可以再注册/移除监听者
        let handlers: SmallVec<[(ListenerId, Arc<dyn NotificationHandler>); 4]> = {
            let registry = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            match registry.get(&event) {
                Some(list) => list.iter().cloned().collect(),
                None => SmallVec::new(),
            }
        };

        if handlers.is_empty() {
            trace!("Notification {} has no listener, ignored", event);
            return;
        }
        self.metrics.notifications_dispatched.fetch_add(1, Ordering::Relaxed);

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler.on_notification(frame))) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    self.metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Listener {:?} for {} failed: {}", id, event, e);
                },
                Err(panic) => {
                    self.metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Listener {:?} for {} panicked: {}",
                        id,
                        event,
                        panic_message(panic.as_ref())
                    );
                },
            }
        }
    }

    /// 注册通知监听者
    ///
    /// 同一事件的多个监听者按注册顺序调用。
    pub fn register_listener(
        &self,
        event: EventId,
        handler: Arc<dyn NotificationHandler>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event)
            .or_default()
            .push((id, handler));
        debug!("Listener {:?} registered for {}", id, event);
        id
    }

    /// 移除通知监听者，返回是否找到
    pub fn remove_listener(&self, event: EventId, id: ListenerId) -> bool {
        let mut registry = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = registry.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.remove(&event);
        }
        if removed {
            debug!("Listener {:?} removed from {}", id, event);
        }
        removed
    }

    /// 某事件当前的监听者数量
    pub fn listener_count(&self, event: EventId) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event)
            .map_or(0, |list| list.len())
    }

    /// 移除所有监听者
    pub fn clear_listeners(&self) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    const BATTERY: EventId = EventId::new(0x13, 0x10);
    const ECHO: EventId = EventId::new(0x10, 0x00);
    const IR_NOTIFY: EventId = EventId::new(0x18, 0x2C);

    fn dispatcher() -> (Dispatcher, Arc<DriverMetrics>) {
        let metrics = Arc::new(DriverMetrics::new());
        (Dispatcher::new(metrics.clone()), metrics)
    }

    fn response(event: EventId, seq: u8, payload: &[u8]) -> Frame {
        Frame::response(0x11, event.device, event.command, seq, 0, payload)
    }

    #[test]
    fn test_sequence_allocation_is_monotonic() {
        let (d, _) = dispatcher();
        let (a, _ra) = d.register_pending(BATTERY).unwrap();
        let (b, _rb) = d.register_pending(BATTERY).unwrap();
        let c = d.next_sequence().unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(d.pending_count(), 2);
    }

    #[test]
    fn test_allocation_skips_in_use_and_wraps() {
        let (d, _) = dispatcher();
        let mut receivers = Vec::new();
        for _ in 0..=255 {
            receivers.push(d.register_pending(BATTERY).unwrap());
        }
        assert!(matches!(
            d.register_pending(BATTERY),
            Err(DriverError::AllocationExhausted)
        ));
        assert!(matches!(d.next_sequence(), Err(DriverError::AllocationExhausted)));

        // 释放 seq=42 后，下一次分配只能拿到它
        assert!(d.remove_pending(42));
        let (seq, _rx) = d.register_pending(BATTERY).unwrap();
        assert_eq!(seq, 42);
    }

    #[test]
    fn test_response_resolves_only_matching_sequence() {
        let (d, metrics) = dispatcher();
        let (seq_a, rx_a) = d.register_pending(BATTERY).unwrap();
        let (seq_b, rx_b) = d.register_pending(ECHO).unwrap();

        d.on_frame_received(response(ECHO, seq_b, &[0xEE]));
        assert!(rx_a.try_recv().is_err());
        match rx_b.try_recv().unwrap() {
            Outcome::Response(frame) => assert_eq!(&frame.payload[..], &[0xEE]),
            other => panic!("unexpected outcome: {:?}", other),
        }

        d.on_frame_received(response(BATTERY, seq_a, &[80]));
        assert!(matches!(rx_a.try_recv().unwrap(), Outcome::Response(_)));
        assert_eq!(d.pending_count(), 0);
        assert_eq!(metrics.snapshot().responses_matched, 2);
    }

    #[test]
    fn test_response_with_wrong_route_is_not_matched() {
        let (d, metrics) = dispatcher();
        let (seq, rx) = d.register_pending(BATTERY).unwrap();

        d.on_frame_received(response(ECHO, seq, &[]));
        assert!(rx.try_recv().is_err());
        assert!(d.is_pending(seq));
        assert_eq!(metrics.snapshot().late_responses, 1);
    }

    #[test]
    fn test_late_response_dropped() {
        let (d, metrics) = dispatcher();
        let (seq, rx) = d.register_pending(BATTERY).unwrap();
        assert!(d.remove_pending(seq));
        assert!(!d.remove_pending(seq));

        d.on_frame_received(response(BATTERY, seq, &[50]));
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.snapshot().late_responses, 1);
        assert_eq!(metrics.snapshot().responses_matched, 0);
    }

    #[test]
    fn test_fail_all_resolves_every_pending() {
        let (d, _) = dispatcher();
        let (_, rx_a) = d.register_pending(BATTERY).unwrap();
        let (_, rx_b) = d.register_pending(ECHO).unwrap();

        let failed = d.fail_all(|| Outcome::TransportFailure("port closed".into()));
        assert_eq!(failed, 2);
        assert_eq!(d.pending_count(), 0);
        for rx in [rx_a, rx_b] {
            assert!(matches!(rx.try_recv().unwrap(), Outcome::TransportFailure(_)));
        }
    }

    #[test]
    fn test_listeners_invoked_in_registration_order() {
        let (d, metrics) = dispatcher();
        let calls = Arc::new(StdMutex::new(Vec::new()));

        for name in ["first", "second"] {
            let calls = calls.clone();
            d.register_listener(
                IR_NOTIFY,
                Arc::new(move |_: &Frame| -> HandlerResult {
                    calls.lock().unwrap().push(name);
                    Ok(())
                }),
            );
        }

        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 0, &[3]));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(metrics.snapshot().notifications_dispatched, 1);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let (d, metrics) = dispatcher();
        let hits = Arc::new(AtomicU64::new(0));

        d.register_listener(
            IR_NOTIFY,
            Arc::new(|_: &Frame| -> HandlerResult { panic!("listener bug") }),
        );
        d.register_listener(
            IR_NOTIFY,
            Arc::new(|_: &Frame| -> HandlerResult { Err("bad payload".into()) }),
        );
        let counter = hits.clone();
        d.register_listener(
            IR_NOTIFY,
            Arc::new(move |_: &Frame| -> HandlerResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 0, &[1]));
        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 1, &[2]));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.snapshot().handler_failures, 4);
    }

    #[test]
    fn test_remove_listener() {
        let (d, _) = dispatcher();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let id = d.register_listener(
            IR_NOTIFY,
            Arc::new(move |_: &Frame| -> HandlerResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        assert_eq!(d.listener_count(IR_NOTIFY), 1);

        assert!(d.remove_listener(IR_NOTIFY, id));
        assert!(!d.remove_listener(IR_NOTIFY, id));
        assert_eq!(d.listener_count(IR_NOTIFY), 0);

        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 0, &[1]));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unmatched_notification_ignored() {
        let (d, metrics) = dispatcher();
        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 0, &[1]));
        assert_eq!(metrics.snapshot().notifications_dispatched, 0);
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let (d, _) = dispatcher();
        let d = Arc::new(d);
        let inner = d.clone();
        d.register_listener(
            IR_NOTIFY,
            Arc::new(move |_: &Frame| -> HandlerResult {
                inner.register_listener(ECHO, Arc::new(|_: &Frame| -> HandlerResult { Ok(()) }));
                Ok(())
            }),
        );

        d.on_frame_received(Frame::notification(0x12, 0x18, 0x2C, 0, &[1]));
        assert_eq!(d.listener_count(ECHO), 1);
    }
}
