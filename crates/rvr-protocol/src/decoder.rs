//! 增量帧解码器
//!
//! 串口字节可能被拆分到任意多次投递中，解码器在多次 `feed()` 之间保持缓冲区：
//! - 收到 SOP：开始累积（如果上一帧未结束，上报 `Truncated` 并丢弃）
//! - 收到 EOP：反转义后的帧体经长度和校验和验证，合法则产出 `Frame`
//! - 帧外字节：静默丢弃，等待下一个 SOP 重新同步
//!
//! 所有故障都是非致命的，解码器自行恢复，由上层决定如何记录。

use crate::constants::*;
use crate::frame::{Frame, FrameFlags, checksum};
use bilge::prelude::*;
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// 帧级故障（非致命）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingFault {
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadChecksum { expected: u8, actual: u8 },

    #[error("Length mismatch: header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Frame too short: {len} bytes")]
    TooShort { len: usize },

    #[error("Truncated frame: {discarded} bytes discarded before next start marker")]
    Truncated { discarded: usize },

    #[error("Invalid escape sequence: 0xAB 0x{byte:02X}")]
    InvalidEscape { byte: u8 },

    #[error("Frame buffer overflow: exceeded {max} bytes without end marker")]
    Overflow { max: usize },
}

/// 解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// 一条合法帧
    Frame(Frame),
    /// 一条被丢弃的畸形帧
    Fault(FramingFault),
}

/// 增量帧解码器
///
/// # Example
///
/// ```
/// use rvr_protocol::{DecodeEvent, Frame, FrameDecoder};
///
/// let bytes = Frame::command(0x12, 0x16, 0x06, 1, false, &[]).encode().unwrap();
/// let mut decoder = FrameDecoder::new();
///
/// // 分两次投递
/// assert!(decoder.feed(&bytes[..3]).is_empty());
/// let events = decoder.feed(&bytes[3..]);
/// assert!(matches!(events.as_slice(), [DecodeEvent::Frame(f)] if f.command_id == 0x06));
/// ```
pub struct FrameDecoder {
    /// 已反转义的帧体字节
    buffer: BytesMut,
    /// 是否处于 SOP..EOP 之间
    in_frame: bool,
    /// 上一个字节是否为 ESC
    escape_pending: bool,
    /// 缓冲区上限
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_frame_len.min(DEFAULT_MAX_FRAME_LEN)),
            in_frame: false,
            escape_pending: false,
            max_frame_len,
        }
    }

    /// 投递一批字节，返回本次完成的所有帧和故障（按出现顺序）
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        for &byte in data {
            if let Some(event) = self.push_byte(byte) {
                events.push(event);
            }
        }
        events
    }

    /// 丢弃缓冲区中尚未完成的帧
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
        self.escape_pending = false;
    }

    /// 当前缓冲的（已反转义）字节数
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// 是否正在累积一条未完成的帧
    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    fn push_byte(&mut self, byte: u8) -> Option<DecodeEvent> {
        match byte {
            SOP => {
                let truncated = self.in_frame;
                let discarded = self.buffer.len();
                self.reset();
                self.in_frame = true;
                truncated.then_some(DecodeEvent::Fault(FramingFault::Truncated { discarded }))
            },
            _ if !self.in_frame => None, // 帧外噪声
            EOP => {
                if self.escape_pending {
                    self.reset();
                    return Some(DecodeEvent::Fault(FramingFault::InvalidEscape { byte: EOP }));
                }
                let body = self.buffer.split().freeze();
                self.reset();
                Some(match parse_body(body) {
                    Ok(frame) => DecodeEvent::Frame(frame),
                    Err(fault) => DecodeEvent::Fault(fault),
                })
            },
            ESC if !self.escape_pending => {
                self.escape_pending = true;
                None
            },
            _ => {
                let value = if self.escape_pending {
                    self.escape_pending = false;
                    let original = byte | ESC_MASK;
                    // 只接受编码器产生的形式，保证线上表示唯一
                    if !is_reserved(original) || byte != original & !ESC_MASK {
                        self.reset();
                        return Some(DecodeEvent::Fault(FramingFault::InvalidEscape { byte }));
                    }
                    original
                } else {
                    byte
                };

                if self.buffer.len() >= self.max_frame_len {
                    let max = self.max_frame_len;
                    self.reset();
                    return Some(DecodeEvent::Fault(FramingFault::Overflow { max }));
                }
                self.buffer.extend_from_slice(&[value]);
                None
            },
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析已反转义的帧体（FLAGS..CHK）
fn parse_body(body: Bytes) -> Result<Frame, FramingFault> {
    let Some(&flags_byte) = body.first() else {
        return Err(FramingFault::TooShort { len: 0 });
    };
    let flags = FrameFlags::from(u8::new(flags_byte));
    let header_len = if flags.is_response() {
        RESPONSE_HEADER_LEN
    } else {
        COMMAND_HEADER_LEN
    };

    if body.len() < header_len + CHECKSUM_LEN {
        return Err(FramingFault::TooShort { len: body.len() });
    }

    let declared = body[header_len - 1] as usize;
    let actual = body.len() - header_len - CHECKSUM_LEN;
    if declared != actual {
        return Err(FramingFault::LengthMismatch { declared, actual });
    }

    let (content, chk) = body.split_at(body.len() - CHECKSUM_LEN);
    let expected = checksum(content);
    if expected != chk[0] {
        return Err(FramingFault::BadChecksum {
            expected,
            actual: chk[0],
        });
    }

    Ok(Frame {
        flags,
        target_id: body[1],
        device_id: body[2],
        command_id: body[3],
        sequence: body[4],
        response_code: if flags.is_response() { body[5] } else { 0 },
        payload: body.slice(header_len..header_len + declared),
    })
}
