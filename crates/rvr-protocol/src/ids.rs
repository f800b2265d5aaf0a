//! 目标 / 设备 / 命令 ID 常量定义
//!
//! RVR 有两颗处理器（Nordic 与 ST），每条命令由 `(TID, DID, CID)` 三元组路由。
//! 异步通知没有序列号关联，按 `(DID, CID)` 组成的 [`EventId`] 分发给监听器。

use crate::frame::Frame;

// ============================================================================
// 目标处理器 ID
// ============================================================================

/// Nordic 处理器（电源、连接、API 外壳）
pub const TARGET_NORDIC: u8 = 0x11;

/// ST 处理器（驱动、传感器、红外）
pub const TARGET_ST: u8 = 0x12;

// ============================================================================
// 设备 ID（命令类别）
// ============================================================================

pub const DID_API_AND_SHELL: u8 = 0x10;
pub const DID_POWER: u8 = 0x13;
pub const DID_DRIVE: u8 = 0x16;
pub const DID_SENSOR: u8 = 0x18;

// ============================================================================
// 命令 ID
// ============================================================================

/// API & Shell
pub const CID_ECHO: u8 = 0x00;

/// 电源
pub const CID_SNOOZE: u8 = 0x01;
pub const CID_WAKE: u8 = 0x0D;
pub const CID_GET_BATTERY_PERCENTAGE: u8 = 0x10;

/// 驱动
pub const CID_RAW_MOTORS: u8 = 0x01;
pub const CID_RESET_YAW: u8 = 0x06;
pub const CID_DRIVE_WITH_HEADING: u8 = 0x07;

/// 红外（传感器设备）
pub const CID_START_INFRARED_BROADCASTING: u8 = 0x27;
pub const CID_STOP_INFRARED_BROADCASTING: u8 = 0x28;
pub const CID_START_INFRARED_FOLLOWING: u8 = 0x29;
pub const CID_INFRARED_MESSAGE_RECEIVED_NOTIFY: u8 = 0x2C;
pub const CID_STOP_INFRARED_FOLLOWING: u8 = 0x32;
pub const CID_ENABLE_INFRARED_MESSAGE_NOTIFY: u8 = 0x3E;
pub const CID_SEND_INFRARED_MESSAGE: u8 = 0x3F;

/// 命令路由
///
/// 描述一条命令发往哪个处理器、哪个设备的哪个命令号。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandRoute {
    pub target: u8,
    pub device: u8,
    pub command: u8,
}

impl CommandRoute {
    pub const fn new(target: u8, device: u8, command: u8) -> Self {
        Self {
            target,
            device,
            command,
        }
    }

    /// 该路由对应的事件 ID（用于通知订阅）
    pub const fn event_id(&self) -> EventId {
        EventId::new(self.device, self.command)
    }
}

pub const ECHO: CommandRoute = CommandRoute::new(TARGET_NORDIC, DID_API_AND_SHELL, CID_ECHO);
pub const SNOOZE: CommandRoute = CommandRoute::new(TARGET_NORDIC, DID_POWER, CID_SNOOZE);
pub const WAKE: CommandRoute = CommandRoute::new(TARGET_NORDIC, DID_POWER, CID_WAKE);
pub const GET_BATTERY_PERCENTAGE: CommandRoute =
    CommandRoute::new(TARGET_NORDIC, DID_POWER, CID_GET_BATTERY_PERCENTAGE);
pub const RAW_MOTORS: CommandRoute = CommandRoute::new(TARGET_ST, DID_DRIVE, CID_RAW_MOTORS);
pub const RESET_YAW: CommandRoute = CommandRoute::new(TARGET_ST, DID_DRIVE, CID_RESET_YAW);
pub const DRIVE_WITH_HEADING: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_DRIVE, CID_DRIVE_WITH_HEADING);
pub const START_INFRARED_BROADCASTING: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_START_INFRARED_BROADCASTING);
pub const STOP_INFRARED_BROADCASTING: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_STOP_INFRARED_BROADCASTING);
pub const START_INFRARED_FOLLOWING: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_START_INFRARED_FOLLOWING);
pub const STOP_INFRARED_FOLLOWING: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_STOP_INFRARED_FOLLOWING);
pub const SEND_INFRARED_MESSAGE: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_SEND_INFRARED_MESSAGE);
pub const ENABLE_INFRARED_MESSAGE_NOTIFY: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_ENABLE_INFRARED_MESSAGE_NOTIFY);
pub const INFRARED_MESSAGE_RECEIVED_NOTIFY: CommandRoute =
    CommandRoute::new(TARGET_ST, DID_SENSOR, CID_INFRARED_MESSAGE_RECEIVED_NOTIFY);

/// 事件 ID（通知分类）
///
/// 通知帧不与请求关联，`(DID, CID)` 唯一确定一种事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    pub device: u8,
    pub command: u8,
}

impl EventId {
    pub const fn new(device: u8, command: u8) -> Self {
        Self { device, command }
    }

    /// 从帧中提取事件 ID
    pub fn of(frame: &Frame) -> Self {
        Self::new(frame.device_id, frame.command_id)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DID=0x{:02X}/CID=0x{:02X}", self.device, self.command)
    }
}
