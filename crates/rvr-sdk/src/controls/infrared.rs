//! 红外辅助控制
//!
//! 把机器人间红外功能的常用组合封装成一步调用：
//! 成对的远/近编码列表逐对下发，列表消息逐条发送，订阅前自动打开设备端通知。

use rvr_driver::{DriverError, ListenerId, Rvr};
use rvr_protocol::{InfraredCode, MAX_INFRARED_STRENGTH};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 相邻两次编码对下发之间的默认间隔（设备处理时间）
pub const DEFAULT_INTER_COMMAND_DELAY: Duration = Duration::from_millis(500);

/// 批量下发时的失败处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// 继续下发剩余命令，最后以 `DriverError::Batch` 汇总所有失败
    #[default]
    ContinueOnError,
    /// 第一次失败立即返回该错误，剩余命令不再下发
    StopOnError,
}

/// 红外辅助控制
///
/// # Example
///
/// ```no_run
/// use rvr_sdk::prelude::*;
/// use std::sync::Arc;
///
/// let rvr = Arc::new(RvrBuilder::new().port("/dev/ttyS0").build()?);
/// let infrared = InfraredControl::new(rvr.clone());
///
/// infrared.start_infrared_broadcasting(
///     &[InfraredCode::Code0, InfraredCode::Code1],
///     &[InfraredCode::Code2, InfraredCode::Code3],
/// )?;
/// infrared.stop_infrared_broadcasting()?;
/// # Ok::<(), DriverError>(())
/// ```
#[derive(Clone)]
pub struct InfraredControl {
    rvr: Arc<Rvr>,
    inter_command_delay: Duration,
    policy: BatchPolicy,
}

impl InfraredControl {
    pub fn new(rvr: Arc<Rvr>) -> Self {
        Self {
            rvr,
            inter_command_delay: DEFAULT_INTER_COMMAND_DELAY,
            policy: BatchPolicy::default(),
        }
    }

    /// 设置相邻编码对之间的间隔
    pub fn with_inter_command_delay(mut self, delay: Duration) -> Self {
        self.inter_command_delay = delay;
        self
    }

    /// 设置批量失败策略
    pub fn with_batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn inter_command_delay(&self) -> Duration {
        self.inter_command_delay
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.policy
    }

    pub fn rvr(&self) -> &Arc<Rvr> {
        &self.rvr
    }

    /// 逐对广播红外编码
    ///
    /// 按列表顺序每对下发一条命令，相邻两条之间等待 `inter_command_delay`。
    /// 两个列表必须非空且等长，否则在发送任何字节之前返回 `InvalidArgument`。
    pub fn start_infrared_broadcasting(
        &self,
        far_codes: &[InfraredCode],
        near_codes: &[InfraredCode],
    ) -> Result<(), DriverError> {
        validate_pairs(far_codes, near_codes)?;
        let pairs: Vec<(InfraredCode, InfraredCode)> =
            far_codes.iter().copied().zip(near_codes.iter().copied()).collect();
        self.run_batch(&pairs, self.inter_command_delay, |&(far, near)| {
            self.rvr.start_robot_to_robot_infrared_broadcasting(far, near)
        })
    }

    pub fn stop_infrared_broadcasting(&self) -> Result<(), DriverError> {
        self.rvr.stop_robot_to_robot_infrared_broadcasting()
    }

    /// 逐对下发跟随编码（规则同 [`start_infrared_broadcasting`](Self::start_infrared_broadcasting)）
    pub fn start_infrared_following(
        &self,
        far_codes: &[InfraredCode],
        near_codes: &[InfraredCode],
    ) -> Result<(), DriverError> {
        validate_pairs(far_codes, near_codes)?;
        let pairs: Vec<(InfraredCode, InfraredCode)> =
            far_codes.iter().copied().zip(near_codes.iter().copied()).collect();
        self.run_batch(&pairs, self.inter_command_delay, |&(far, near)| {
            self.rvr.start_robot_to_robot_infrared_following(far, near)
        })
    }

    pub fn stop_infrared_following(&self) -> Result<(), DriverError> {
        self.rvr.stop_robot_to_robot_infrared_following()
    }

    /// 逐条发送红外消息，四个发射器使用同一强度（0-64）
    ///
    /// 消息之间不插入间隔。
    pub fn send_infrared_messages(
        &self,
        messages: &[InfraredCode],
        strength: u8,
    ) -> Result<(), DriverError> {
        if messages.is_empty() {
            return Err(DriverError::InvalidArgument(
                "messages must have at least one element".to_string(),
            ));
        }
        if strength > MAX_INFRARED_STRENGTH {
            return Err(DriverError::InvalidArgument(format!(
                "strength must be between 0 and {}, got {}",
                MAX_INFRARED_STRENGTH, strength
            )));
        }
        self.run_batch(messages, Duration::ZERO, |&code| {
            self.rvr
                .send_infrared_message(code, strength, strength, strength, strength)
        })
    }

    /// 监听收到的红外消息
    ///
    /// 先打开设备端通知，成功后再注册 `handler`。返回的 ID 可用于
    /// [`Rvr::remove_infrared_message_handler`]。
    pub fn listen_for_infrared_message<F>(&self, handler: F) -> Result<ListenerId, DriverError>
    where
        F: Fn(InfraredCode) + Send + Sync + 'static,
    {
        self.rvr.enable_robot_infrared_message_notify(true)?;
        Ok(self.rvr.on_robot_to_robot_infrared_message_received(handler))
    }

    /// 按策略依次执行，`delay` 只插入在相邻两条之间
    fn run_batch<T>(
        &self,
        items: &[T],
        delay: Duration,
        mut op: impl FnMut(&T) -> Result<(), DriverError>,
    ) -> Result<(), DriverError> {
        let mut failures = Vec::new();
        for (index, item) in items.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                spin_sleep::sleep(delay);
            }
            match op(item) {
                Ok(()) => debug!("Batch command {}/{} sent", index + 1, items.len()),
                Err(e) => match self.policy {
                    BatchPolicy::StopOnError => {
                        warn!(
                            "Batch command {}/{} failed, stopping: {}",
                            index + 1,
                            items.len(),
                            e
                        );
                        return Err(e);
                    },
                    BatchPolicy::ContinueOnError => {
                        warn!("Batch command {}/{} failed: {}", index + 1, items.len(), e);
                        failures.push((index, e));
                    },
                },
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DriverError::Batch { failures })
        }
    }
}

fn validate_pairs(far_codes: &[InfraredCode], near_codes: &[InfraredCode]) -> Result<(), DriverError> {
    if far_codes.is_empty() || near_codes.is_empty() {
        return Err(DriverError::InvalidArgument(
            "far_codes and near_codes must have at least one element".to_string(),
        ));
    }
    if far_codes.len() != near_codes.len() {
        return Err(DriverError::InvalidArgument(format!(
            "far_codes and near_codes must have the same number of elements ({} vs {})",
            far_codes.len(),
            near_codes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvr_driver::DriverConfig;

    fn control() -> InfraredControl {
        InfraredControl::new(Arc::new(Rvr::new(DriverConfig::default())))
    }

    #[test]
    fn test_defaults() {
        let ir = control();
        assert_eq!(ir.inter_command_delay(), Duration::from_millis(500));
        assert_eq!(ir.batch_policy(), BatchPolicy::ContinueOnError);

        let ir = ir
            .with_inter_command_delay(Duration::from_millis(5))
            .with_batch_policy(BatchPolicy::StopOnError);
        assert_eq!(ir.inter_command_delay(), Duration::from_millis(5));
        assert_eq!(ir.batch_policy(), BatchPolicy::StopOnError);
    }

    #[test]
    fn test_validate_pairs() {
        use InfraredCode::*;
        assert!(validate_pairs(&[Code0], &[Code1]).is_ok());
        assert!(matches!(
            validate_pairs(&[], &[Code1]),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_pairs(&[Code0, Code1], &[Code2]),
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_continue_on_error_collects_failures() {
        let ir = control().with_inter_command_delay(Duration::ZERO);
        let mut attempted = Vec::new();
        let result = ir.run_batch(&[1, 2, 3, 4], Duration::ZERO, |&n| {
            attempted.push(n);
            if n % 2 == 0 {
                Err(DriverError::NotConnected)
            } else {
                Ok(())
            }
        });

        assert_eq!(attempted, vec![1, 2, 3, 4]);
        match result {
            Err(DriverError::Batch { failures }) => {
                let indices: Vec<usize> = failures.iter().map(|(i, _)| *i).collect();
                assert_eq!(indices, vec![1, 3]);
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_stop_on_error_aborts() {
        let ir = control().with_batch_policy(BatchPolicy::StopOnError);
        let mut attempted = Vec::new();
        let result = ir.run_batch(&[1, 2, 3], Duration::ZERO, |&n| {
            attempted.push(n);
            if n == 2 {
                Err(DriverError::Cancelled)
            } else {
                Ok(())
            }
        });

        assert_eq!(attempted, vec![1, 2]);
        assert!(matches!(result, Err(DriverError::Cancelled)));
    }

    #[test]
    fn test_validation_before_connection_check() {
        // 未连接也先报参数错误
        let ir = control();
        assert!(matches!(
            ir.send_infrared_messages(&[InfraredCode::Code1], 65),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            ir.send_infrared_messages(&[], 10),
            Err(DriverError::InvalidArgument(_))
        ));
        assert!(matches!(
            ir.send_infrared_messages(&[InfraredCode::Code1], 64),
            Err(DriverError::Batch { .. })
        ));
    }
}
