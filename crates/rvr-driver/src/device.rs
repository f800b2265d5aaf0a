//! 设备命令
//!
//! 每条设备命令一个方法，分三类：
//!
//! - 不等待响应：`wake` / `sleep` / `reset_yaw` / `drive_with_heading` / `raw_motors` / `drive_stop`
//! - 请求/响应：电量、回显、红外广播/跟随/发送、红外通知开关
//! - 通知订阅：`on_robot_to_robot_infrared_message_received`
//!
//! 参数在发送任何字节之前校验，越界返回 `DriverError::InvalidArgument`。

use crate::dispatcher::{HandlerResult, ListenerId};
use crate::error::DriverError;
use crate::rvr::Rvr;
use bytes::Bytes;
use rvr_protocol::*;

impl Rvr {
    // ========================================================================
    // 电源
    // ========================================================================

    /// 唤醒机器人
    pub fn wake(&self) -> Result<(), DriverError> {
        self.send(WAKE, &[])
    }

    /// 让机器人进入休眠
    pub fn sleep(&self) -> Result<(), DriverError> {
        self.send(SNOOZE, &[])
    }

    /// 查询电池电量（0-100）
    pub fn get_battery_percentage(&self) -> Result<u8, DriverError> {
        let frame = self.request(GET_BATTERY_PERCENTAGE, &[])?;
        Ok(parse_battery_percentage(&frame)?)
    }

    /// 回显：设备原样返回负载，用于链路检查
    pub fn echo(&self, payload: &[u8]) -> Result<Bytes, DriverError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(DriverError::InvalidArgument(format!(
                "echo payload is {} bytes (max {})",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        Ok(self.request(ECHO, payload)?.payload)
    }

    // ========================================================================
    // 驱动
    // ========================================================================

    /// 把当前朝向设为 0°
    pub fn reset_yaw(&self) -> Result<(), DriverError> {
        self.send(RESET_YAW, &[])
    }

    /// 按航向行驶
    ///
    /// # 参数
    /// - `speed`: 0-255
    /// - `heading`: 0-359（度，相对 `reset_yaw` 时的朝向）
    pub fn drive_with_heading(
        &self,
        speed: u8,
        heading: u16,
        flags: DriveFlags,
    ) -> Result<(), DriverError> {
        let command = DriveWithHeadingCommand::new(speed, heading, flags)
            .map_err(DriverError::invalid_argument)?;
        self.send(DRIVE_WITH_HEADING, &command.to_payload())
    }

    /// 直接设置左右电机
    pub fn raw_motors(
        &self,
        left_mode: RawMotorMode,
        left_speed: u8,
        right_mode: RawMotorMode,
        right_speed: u8,
    ) -> Result<(), DriverError> {
        let command = RawMotorsCommand::new(left_mode, left_speed, right_mode, right_speed);
        self.send(RAW_MOTORS, &command.to_payload())
    }

    /// 停车（两侧电机关闭）
    pub fn drive_stop(&self) -> Result<(), DriverError> {
        self.send(RAW_MOTORS, &RawMotorsCommand::stop().to_payload())
    }

    // ========================================================================
    // 机器人间红外
    // ========================================================================

    /// 开始广播一对红外编码（远距离 / 近距离）
    pub fn start_robot_to_robot_infrared_broadcasting(
        &self,
        far: InfraredCode,
        near: InfraredCode,
    ) -> Result<(), DriverError> {
        let command = InfraredPairCommand::new(far, near);
        self.request(START_INFRARED_BROADCASTING, &command.to_payload())?;
        Ok(())
    }

    pub fn stop_robot_to_robot_infrared_broadcasting(&self) -> Result<(), DriverError> {
        self.request(STOP_INFRARED_BROADCASTING, &[])?;
        Ok(())
    }

    /// 开始跟随广播指定红外编码对的机器人
    pub fn start_robot_to_robot_infrared_following(
        &self,
        far: InfraredCode,
        near: InfraredCode,
    ) -> Result<(), DriverError> {
        let command = InfraredPairCommand::new(far, near);
        self.request(START_INFRARED_FOLLOWING, &command.to_payload())?;
        Ok(())
    }

    pub fn stop_robot_to_robot_infrared_following(&self) -> Result<(), DriverError> {
        self.request(STOP_INFRARED_FOLLOWING, &[])?;
        Ok(())
    }

    /// 发送一条红外消息
    ///
    /// 四个发射器的强度均为 0-64。
    pub fn send_infrared_message(
        &self,
        code: InfraredCode,
        front_strength: u8,
        left_strength: u8,
        right_strength: u8,
        rear_strength: u8,
    ) -> Result<(), DriverError> {
        let command = SendInfraredMessageCommand::new(
            code,
            front_strength,
            left_strength,
            right_strength,
            rear_strength,
        )
        .map_err(DriverError::invalid_argument)?;
        self.request(SEND_INFRARED_MESSAGE, &command.to_payload())?;
        Ok(())
    }

    /// 打开/关闭设备端的红外消息通知
    pub fn enable_robot_infrared_message_notify(&self, enable: bool) -> Result<(), DriverError> {
        self.request(ENABLE_INFRARED_MESSAGE_NOTIFY, &[enable as u8])?;
        Ok(())
    }

    /// 订阅收到的机器人间红外消息
    ///
    /// 只注册监听者，不会打开设备端通知；需要先调用
    /// [`enable_robot_infrared_message_notify`](Self::enable_robot_infrared_message_notify)。
    /// 负载中的编码不在 0-7 范围内时不调用 `handler`，记为一次监听者失败。
    pub fn on_robot_to_robot_infrared_message_received<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(InfraredCode) + Send + Sync + 'static,
    {
        self.register_notification_handler(
            INFRARED_MESSAGE_RECEIVED_NOTIFY.event_id(),
            move |frame: &Frame| -> HandlerResult {
                let message = InfraredMessageNotify::try_from(frame)?;
                handler(message.code);
                Ok(())
            },
        )
    }

    /// 取消红外消息订阅
    pub fn remove_infrared_message_handler(&self, id: ListenerId) -> bool {
        self.remove_notification_handler(INFRARED_MESSAGE_RECEIVED_NOTIFY.event_id(), id)
    }
}
