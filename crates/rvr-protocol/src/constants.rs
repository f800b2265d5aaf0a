//! 协议常量定义

/// 帧起始标记（Start Of Packet）
pub const SOP: u8 = 0x8D;

/// 帧结束标记（End Of Packet）
pub const EOP: u8 = 0xD8;

/// 转义前缀
pub const ESC: u8 = 0xAB;

/// 转义掩码
///
/// 标记字节在帧内以 `ESC, byte & !ESC_MASK` 形式出现：
/// - 0x8D -> 0xAB 0x05
/// - 0xD8 -> 0xAB 0x50
/// - 0xAB -> 0xAB 0x23
pub const ESC_MASK: u8 = 0x88;

/// 负载最大长度（LEN 字段为单字节）
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// 命令/通知帧头长度：FLAGS TID DID CID SEQ LEN
pub const COMMAND_HEADER_LEN: usize = 6;

/// 响应帧头长度：FLAGS TID DID CID SEQ ERR LEN
pub const RESPONSE_HEADER_LEN: usize = 7;

/// 校验和长度
pub const CHECKSUM_LEN: usize = 1;

/// 解码缓冲区默认上限（未转义字节数）
///
/// 超过此长度仍未收到 EOP 时，缓冲区被重置并上报 `FramingFault::Overflow`。
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024;

/// 红外发射强度上限（含）
pub const MAX_INFRARED_STRENGTH: u8 = 64;

/// 航向角上限（含，单位：度）
pub const MAX_HEADING_DEG: u16 = 359;

/// 判断字节是否需要转义
#[inline]
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, SOP | EOP | ESC)
}
