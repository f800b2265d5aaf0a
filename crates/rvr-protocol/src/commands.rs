//! 命令负载构建与通知解析
//!
//! 所有取值范围在这里检查，越界时返回 `ProtocolError::InvalidValue`，
//! 保证非法参数不会被编码到线上。

use crate::ProtocolError;
use crate::constants::{MAX_HEADING_DEG, MAX_INFRARED_STRENGTH};
use crate::frame::Frame;
use crate::ids::INFRARED_MESSAGE_RECEIVED_NOTIFY;
use bilge::prelude::*;

// ============================================================================
// 枚举类型定义
// ============================================================================

/// 红外编码（机器人间通信通道）
///
/// 封闭集合：线上取值 0-7，其余值在边界处被拒绝。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum InfraredCode {
    Code0 = 0,
    Code1 = 1,
    Code2 = 2,
    Code3 = 3,
    Code4 = 4,
    Code5 = 5,
    Code6 = 6,
    Code7 = 7,
}

impl InfraredCode {
    /// 全部编码（按线上取值排序）
    pub const ALL: [InfraredCode; 8] = [
        InfraredCode::Code0,
        InfraredCode::Code1,
        InfraredCode::Code2,
        InfraredCode::Code3,
        InfraredCode::Code4,
        InfraredCode::Code5,
        InfraredCode::Code6,
        InfraredCode::Code7,
    ];

    /// 从线上取值解析
    pub fn from_wire(value: u8) -> Result<Self, ProtocolError> {
        Self::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: "infrared_code",
            value: value as u32,
        })
    }

    /// 线上取值
    pub fn wire_value(self) -> u8 {
        self.into()
    }
}

/// 原始电机模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum RawMotorMode {
    #[default]
    Off = 0x00,
    Forward = 0x01,
    Reverse = 0x02,
}

/// 响应状态码（响应帧 ERR 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0x00,
    BadDeviceId = 0x01,
    BadCommandId = 0x02,
    NotYetImplemented = 0x03,
    CommandIsRestricted = 0x04,
    BadDataLength = 0x05,
    CommandFailed = 0x06,
    BadParameterValue = 0x07,
    Busy = 0x08,
    BadTargetId = 0x09,
    TargetUnavailable = 0x0A,
    /// 协议未定义的状态码
    #[default]
    Unknown = 0xFF,
}

impl ResponseCode {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// 驱动标志位域（drive_with_heading Byte 3）
///
/// 协议定义：
/// - Bit 0: 倒车
/// - Bit 1: 加速
/// - Bit 2: 快速转向
/// - Bit 3: 左轮反向
/// - Bit 4: 右轮反向
/// - Bit 5: 漂移
/// - Bit 6-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct DriveFlags {
    pub reverse: bool,         // Bit 0
    pub boost: bool,           // Bit 1
    pub fast_turn: bool,       // Bit 2
    pub left_direction: bool,  // Bit 3
    pub right_direction: bool, // Bit 4
    pub enable_drift: bool,    // Bit 5
    pub reserved: u2,          // Bit 6-7
}

impl DriveFlags {
    /// 前进（无标志）
    pub fn forward() -> Self {
        Self::from(u8::new(0))
    }

    /// 倒车
    pub fn backward() -> Self {
        let mut flags = Self::forward();
        flags.set_reverse(true);
        flags
    }
}

// ============================================================================
// 驱动命令
// ============================================================================

/// 按航向行驶指令
///
/// - `speed`: 0-255
/// - `heading`: 0-359 度（相对于上次 reset_yaw 的朝向）
#[derive(Debug, Clone, Copy)]
pub struct DriveWithHeadingCommand {
    pub speed: u8,
    pub heading: u16,
    pub flags: DriveFlags,
}

impl DriveWithHeadingCommand {
    pub fn new(speed: u8, heading: u16, flags: DriveFlags) -> Result<Self, ProtocolError> {
        if heading > MAX_HEADING_DEG {
            return Err(ProtocolError::InvalidValue {
                field: "heading",
                value: heading as u32,
            });
        }
        Ok(Self {
            speed,
            heading,
            flags,
        })
    }

    pub fn to_payload(&self) -> [u8; 4] {
        let [hi, lo] = self.heading.to_be_bytes();
        [self.speed, hi, lo, u8::from(self.flags)]
    }
}

/// 原始电机指令
#[derive(Debug, Clone, Copy)]
pub struct RawMotorsCommand {
    pub left_mode: RawMotorMode,
    pub left_speed: u8,
    pub right_mode: RawMotorMode,
    pub right_speed: u8,
}

impl RawMotorsCommand {
    pub fn new(
        left_mode: RawMotorMode,
        left_speed: u8,
        right_mode: RawMotorMode,
        right_speed: u8,
    ) -> Self {
        Self {
            left_mode,
            left_speed,
            right_mode,
            right_speed,
        }
    }

    /// 两轮停止
    pub fn stop() -> Self {
        Self::new(RawMotorMode::Off, 0, RawMotorMode::Off, 0)
    }

    pub fn to_payload(&self) -> [u8; 4] {
        [
            self.left_mode as u8,
            self.left_speed,
            self.right_mode as u8,
            self.right_speed,
        ]
    }
}

// ============================================================================
// 红外命令
// ============================================================================

/// 红外远/近编码对（广播与跟随共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfraredPairCommand {
    pub far: InfraredCode,
    pub near: InfraredCode,
}

impl InfraredPairCommand {
    pub fn new(far: InfraredCode, near: InfraredCode) -> Self {
        Self { far, near }
    }

    pub fn to_payload(&self) -> [u8; 2] {
        [self.far.wire_value(), self.near.wire_value()]
    }
}

/// 发送单条红外消息指令
///
/// 四个发射器强度均为 0-64。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendInfraredMessageCommand {
    pub code: InfraredCode,
    pub front_strength: u8,
    pub left_strength: u8,
    pub right_strength: u8,
    pub rear_strength: u8,
}

impl SendInfraredMessageCommand {
    pub fn new(
        code: InfraredCode,
        front_strength: u8,
        left_strength: u8,
        right_strength: u8,
        rear_strength: u8,
    ) -> Result<Self, ProtocolError> {
        for strength in [front_strength, left_strength, right_strength, rear_strength] {
            validate_strength(strength)?;
        }
        Ok(Self {
            code,
            front_strength,
            left_strength,
            right_strength,
            rear_strength,
        })
    }

    /// 四个方向使用相同强度
    pub fn uniform(code: InfraredCode, strength: u8) -> Result<Self, ProtocolError> {
        Self::new(code, strength, strength, strength, strength)
    }

    pub fn to_payload(&self) -> [u8; 5] {
        [
            self.code.wire_value(),
            self.front_strength,
            self.left_strength,
            self.right_strength,
            self.rear_strength,
        ]
    }
}

/// 检查红外发射强度（0-64）
pub fn validate_strength(strength: u8) -> Result<(), ProtocolError> {
    if strength > MAX_INFRARED_STRENGTH {
        return Err(ProtocolError::InvalidValue {
            field: "strength",
            value: strength as u32,
        });
    }
    Ok(())
}

// ============================================================================
// 响应 / 通知解析
// ============================================================================

/// 收到的机器人间红外消息（通知）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfraredMessageNotify {
    pub code: InfraredCode,
}

impl TryFrom<&Frame> for InfraredMessageNotify {
    type Error = ProtocolError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        let route = INFRARED_MESSAGE_RECEIVED_NOTIFY;
        if frame.device_id != route.device || frame.command_id != route.command {
            return Err(ProtocolError::UnexpectedFrame {
                expected: "infrared message notify",
                device: frame.device_id,
                command: frame.command_id,
            });
        }
        let Some(&raw) = frame.payload.first() else {
            return Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0,
            });
        };
        Ok(Self {
            code: InfraredCode::from_wire(raw)?,
        })
    }
}

/// 电池电量响应（0-100）
pub fn parse_battery_percentage(frame: &Frame) -> Result<u8, ProtocolError> {
    match frame.payload.first() {
        Some(&pct) if pct <= 100 => Ok(pct),
        Some(&pct) => Err(ProtocolError::InvalidValue {
            field: "battery_percentage",
            value: pct as u32,
        }),
        None => Err(ProtocolError::InvalidLength {
            expected: 1,
            actual: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::*;

    #[test]
    fn test_infrared_code_wire_mapping() {
        for (i, code) in InfraredCode::ALL.iter().enumerate() {
            assert_eq!(code.wire_value(), i as u8);
            assert_eq!(InfraredCode::from_wire(i as u8).unwrap(), *code);
        }
        assert_eq!(
            InfraredCode::from_wire(8),
            Err(ProtocolError::InvalidValue {
                field: "infrared_code",
                value: 8
            })
        );
    }

    #[test]
    fn test_response_code_from_u8() {
        assert_eq!(ResponseCode::from(0x00), ResponseCode::Success);
        assert_eq!(ResponseCode::from(0x08), ResponseCode::Busy);
        assert_eq!(ResponseCode::from(0x42), ResponseCode::Unknown);
        assert!(ResponseCode::Success.is_success());
        assert!(!ResponseCode::Busy.is_success());
    }

    #[test]
    fn test_drive_with_heading_payload() {
        let cmd = DriveWithHeadingCommand::new(128, 270, DriveFlags::forward()).unwrap();
        assert_eq!(cmd.to_payload(), [128, 0x01, 0x0E, 0x00]);

        let cmd = DriveWithHeadingCommand::new(128, 0, DriveFlags::backward()).unwrap();
        assert_eq!(cmd.to_payload(), [128, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_drive_with_heading_rejects_out_of_range() {
        assert!(DriveWithHeadingCommand::new(0, 359, DriveFlags::forward()).is_ok());
        assert_eq!(
            DriveWithHeadingCommand::new(0, 360, DriveFlags::forward()).unwrap_err(),
            ProtocolError::InvalidValue {
                field: "heading",
                value: 360
            }
        );
    }

    #[test]
    fn test_drive_flags_bits() {
        let mut flags = DriveFlags::forward();
        flags.set_boost(true);
        flags.set_fast_turn(true);
        assert_eq!(u8::from(flags), 0b0000_0110);
    }

    #[test]
    fn test_raw_motors_payload() {
        let cmd = RawMotorsCommand::new(RawMotorMode::Forward, 100, RawMotorMode::Reverse, 50);
        assert_eq!(cmd.to_payload(), [0x01, 100, 0x02, 50]);
        assert_eq!(RawMotorsCommand::stop().to_payload(), [0, 0, 0, 0]);
        assert_eq!(RawMotorMode::from(0x07), RawMotorMode::Off);
    }

    #[test]
    fn test_infrared_pair_payload() {
        let cmd = InfraredPairCommand::new(InfraredCode::Code3, InfraredCode::Code4);
        assert_eq!(cmd.to_payload(), [3, 4]);
    }

    #[test]
    fn test_send_infrared_message_strength_bounds() {
        let ok = SendInfraredMessageCommand::uniform(InfraredCode::Code1, 64).unwrap();
        assert_eq!(ok.to_payload(), [1, 64, 64, 64, 64]);

        let err = SendInfraredMessageCommand::new(InfraredCode::Code1, 0, 0, 65, 0).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidValue {
                field: "strength",
                value: 65
            }
        );
    }

    #[test]
    fn test_parse_infrared_notify() {
        let frame = Frame::notification(TARGET_ST, DID_SENSOR, CID_INFRARED_MESSAGE_RECEIVED_NOTIFY, 0xFF, &[5]);
        let notify = InfraredMessageNotify::try_from(&frame).unwrap();
        assert_eq!(notify.code, InfraredCode::Code5);

        let bad_code = Frame::notification(TARGET_ST, DID_SENSOR, CID_INFRARED_MESSAGE_RECEIVED_NOTIFY, 0xFF, &[9]);
        assert!(InfraredMessageNotify::try_from(&bad_code).is_err());

        let empty = Frame::notification(TARGET_ST, DID_SENSOR, CID_INFRARED_MESSAGE_RECEIVED_NOTIFY, 0xFF, &[]);
        assert_eq!(
            InfraredMessageNotify::try_from(&empty),
            Err(ProtocolError::InvalidLength {
                expected: 1,
                actual: 0
            })
        );

        let other = Frame::notification(TARGET_ST, DID_DRIVE, 0x01, 0xFF, &[1]);
        assert!(matches!(
            InfraredMessageNotify::try_from(&other),
            Err(ProtocolError::UnexpectedFrame { .. })
        ));
    }

    #[test]
    fn test_parse_battery_percentage() {
        let frame = Frame::response(TARGET_NORDIC, DID_POWER, CID_GET_BATTERY_PERCENTAGE, 1, 0, &[87]);
        assert_eq!(parse_battery_percentage(&frame), Ok(87));

        let frame = Frame::response(TARGET_NORDIC, DID_POWER, CID_GET_BATTERY_PERCENTAGE, 1, 0, &[101]);
        assert!(parse_battery_percentage(&frame).is_err());
    }
}
