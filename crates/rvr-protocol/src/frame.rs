//! 帧结构与编码
//!
//! 编码流程：
//! 1. 组装未转义的帧体（FLAGS..PAYLOAD）
//! 2. 计算校验和 `!(sum) & 0xFF` 并追加到帧体
//! 3. 写入 SOP，逐字节转义帧体，写入 EOP

use crate::ProtocolError;
use crate::constants::*;
use bilge::prelude::*;
use bytes::{BufMut, Bytes, BytesMut};

/// 帧标志位域（FLAGS 字节）
///
/// 协议定义：
/// - Bit 0: 响应帧
/// - Bit 1: 请求设备回复响应
/// - Bit 2: 仅在出错时回复响应
/// - Bit 3: 用户活动（重置设备休眠计时）
/// - Bit 4-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq)]
pub struct FrameFlags {
    pub is_response: bool,             // Bit 0
    pub requests_response: bool,       // Bit 1
    pub requests_error_response: bool, // Bit 2
    pub is_activity: bool,             // Bit 3
    pub reserved: u4,                  // Bit 4-7
}

impl FrameFlags {
    /// 命令帧标志
    ///
    /// 不需要应答的命令仍请求错误响应，便于设备报告非法参数。
    pub fn command(requests_response: bool) -> Self {
        let mut flags = Self::from(u8::new(0));
        flags.set_requests_response(requests_response);
        flags.set_requests_error_response(!requests_response);
        flags.set_is_activity(true);
        flags
    }

    /// 响应帧标志
    pub fn response() -> Self {
        let mut flags = Self::from(u8::new(0));
        flags.set_is_response(true);
        flags
    }

    /// 通知帧标志（全部为 0）
    pub fn notification() -> Self {
        Self::from(u8::new(0))
    }

    /// 原始字节值
    pub fn bits(self) -> u8 {
        u8::from(self)
    }
}

/// 一条完整的协议帧（未转义的逻辑视图）
///
/// `response_code` 仅在 `flags.is_response()` 为真时出现在线上，
/// 其他帧编码时忽略该字段，解码时置 0。
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub flags: FrameFlags,
    pub target_id: u8,
    pub device_id: u8,
    pub command_id: u8,
    pub sequence: u8,
    pub response_code: u8,
    pub payload: Bytes,
}

impl Frame {
    /// 创建命令帧
    pub fn command(
        target_id: u8,
        device_id: u8,
        command_id: u8,
        sequence: u8,
        requests_response: bool,
        payload: &[u8],
    ) -> Self {
        Self {
            flags: FrameFlags::command(requests_response),
            target_id,
            device_id,
            command_id,
            sequence,
            response_code: 0,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// 创建响应帧（通常由设备发出，主机侧用于测试和模拟）
    pub fn response(
        target_id: u8,
        device_id: u8,
        command_id: u8,
        sequence: u8,
        response_code: u8,
        payload: &[u8],
    ) -> Self {
        Self {
            flags: FrameFlags::response(),
            target_id,
            device_id,
            command_id,
            sequence,
            response_code,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// 创建异步通知帧
    pub fn notification(
        target_id: u8,
        device_id: u8,
        command_id: u8,
        sequence: u8,
        payload: &[u8],
    ) -> Self {
        Self {
            flags: FrameFlags::notification(),
            target_id,
            device_id,
            command_id,
            sequence,
            response_code: 0,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// 是否为响应帧
    pub fn is_response(&self) -> bool {
        self.flags.is_response()
    }

    /// 是否要求设备回复
    pub fn requests_response(&self) -> bool {
        self.flags.requests_response()
    }

    /// 编码为线上字节
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// 编码并追加到 `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let header_len = if self.is_response() {
            RESPONSE_HEADER_LEN
        } else {
            COMMAND_HEADER_LEN
        };

        let mut body = BytesMut::with_capacity(header_len + self.payload.len() + CHECKSUM_LEN);
        body.put_u8(self.flags.bits());
        body.put_u8(self.target_id);
        body.put_u8(self.device_id);
        body.put_u8(self.command_id);
        body.put_u8(self.sequence);
        if self.is_response() {
            body.put_u8(self.response_code);
        }
        body.put_u8(self.payload.len() as u8);
        body.put_slice(&self.payload);
        let chk = checksum(&body);
        body.put_u8(chk);

        // 最坏情况每个字节都需要转义
        buf.reserve(body.len() * 2 + 2);
        buf.put_u8(SOP);
        for &byte in body.iter() {
            put_escaped(buf, byte);
        }
        buf.put_u8(EOP);

        Ok(())
    }
}

/// 编码一条命令帧（不请求应答）
///
/// 便捷函数，等价于 `Frame::command(..).encode()`。
pub fn encode(
    target_id: u8,
    device_id: u8,
    command_id: u8,
    payload: &[u8],
    sequence: u8,
) -> Result<Bytes, ProtocolError> {
    Frame::command(target_id, device_id, command_id, sequence, false, payload).encode()
}

/// 校验和：未转义帧体字节和取反
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[inline]
fn put_escaped(buf: &mut BytesMut, byte: u8) {
    if is_reserved(byte) {
        buf.put_u8(ESC);
        buf.put_u8(byte & !ESC_MASK);
    } else {
        buf.put_u8(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_bits() {
        assert_eq!(FrameFlags::notification().bits(), 0x00);
        assert_eq!(FrameFlags::response().bits(), 0x01);
        // requests_response | is_activity
        assert_eq!(FrameFlags::command(true).bits(), 0b0000_1010);
        // requests_error_response | is_activity
        assert_eq!(FrameFlags::command(false).bits(), 0b0000_1100);
    }

    #[test]
    fn test_flags_from_byte() {
        let flags = FrameFlags::from(u8::new(0x01));
        assert!(flags.is_response());
        assert!(!flags.requests_response());
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0xFF);
        assert_eq!(checksum(&[0x01, 0x02]), !0x03);
        // 溢出回绕
        assert_eq!(checksum(&[0xFF, 0x02]), !0x01);
    }

    #[test]
    fn test_encode_command_layout() {
        let frame = Frame::command(0x12, 0x16, 0x07, 0x05, false, &[0x80, 0x00, 0x5A, 0x00]);
        let bytes = frame.encode().unwrap();

        let body = [0x0C, 0x12, 0x16, 0x07, 0x05, 0x04, 0x80, 0x00, 0x5A, 0x00];
        let mut expected = vec![SOP];
        expected.extend_from_slice(&body);
        expected.push(checksum(&body));
        expected.push(EOP);
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_encode_response_contains_code() {
        let frame = Frame::response(0x11, 0x13, 0x10, 0x02, 0x00, &[87]);
        let bytes = frame.encode().unwrap();
        // SOP FLAGS TID DID CID SEQ ERR LEN PAYLOAD CHK EOP
        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[6], 0x00);
        assert_eq!(bytes[7], 0x01);
        assert_eq!(bytes[8], 87);
    }

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        let frame = Frame::command(0x12, 0x10, 0x00, SOP, true, &[EOP, ESC, 0x01]);
        let bytes = frame.encode().unwrap();

        // 标记字节只允许出现在首尾
        assert_eq!(bytes[0], SOP);
        assert_eq!(bytes[bytes.len() - 1], EOP);
        for &b in &bytes[1..bytes.len() - 1] {
            assert_ne!(b, SOP);
            assert_ne!(b, EOP);
        }

        // 序列号 0x8D 被转义为 0xAB 0x05
        let seq_pos = 5;
        assert_eq!(bytes[seq_pos], ESC);
        assert_eq!(bytes[seq_pos + 1], 0x05);
    }

    #[test]
    fn test_encode_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let frame = Frame::command(0x12, 0x10, 0x00, 1, true, &payload);
        assert_eq!(
            frame.encode(),
            Err(ProtocolError::PayloadTooLarge {
                len: 256,
                max: 255
            })
        );
    }

    #[test]
    fn test_encode_free_function() {
        let a = encode(0x12, 0x16, 0x06, &[], 9).unwrap();
        let b = Frame::command(0x12, 0x16, 0x06, 9, false, &[]).encode().unwrap();
        assert_eq!(a, b);
    }
}
