//! 编解码器的属性测试
//!
//! 使用 proptest 验证：任意负载往返一致；任意切分点投递结果与整体投递一致。

use proptest::prelude::*;
use rvr_protocol::{DecodeEvent, Frame, FrameDecoder};

fn arb_frame() -> impl Strategy<Value = Frame> {
    (
        any::<bool>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        any::<u8>(),
        prop::collection::vec(any::<u8>(), 0..=255),
    )
        .prop_map(|(is_response, tid, did, cid, seq, code, payload)| {
            if is_response {
                Frame::response(tid, did, cid, seq, code, &payload)
            } else {
                Frame::command(tid, did, cid, seq, true, &payload)
            }
        })
}

fn decode_all(decoder: &mut FrameDecoder, chunks: &[&[u8]]) -> Vec<DecodeEvent> {
    chunks.iter().flat_map(|c| decoder.feed(c)).collect()
}

proptest! {
    /// 测试任意帧编码后再解码得到原帧
    #[test]
    fn frame_roundtrip(frame in arb_frame()) {
        let bytes = frame.encode().unwrap();
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(&bytes);
        prop_assert_eq!(events, vec![DecodeEvent::Frame(frame)]);
    }

    /// 测试任意切分点投递与整体投递结果一致
    #[test]
    fn split_delivery_matches_whole(
        frames in prop::collection::vec(arb_frame(), 1..4),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let mut stream = Vec::new();
        for frame in &frames {
            stream.extend_from_slice(&frame.encode().unwrap());
        }

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
        points.sort_unstable();
        points.dedup();

        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut start = 0;
        for p in points {
            chunks.push(&stream[start..p]);
            start = p;
        }
        chunks.push(&stream[start..]);

        let whole = FrameDecoder::new().feed(&stream);
        let split = decode_all(&mut FrameDecoder::new(), &chunks);

        prop_assert_eq!(&whole, &split);
        let expected: Vec<DecodeEvent> = frames.into_iter().map(DecodeEvent::Frame).collect();
        prop_assert_eq!(whole, expected);
    }

    /// 测试编码结果中标记字节只出现在首尾
    #[test]
    fn markers_never_appear_inside(frame in arb_frame()) {
        let bytes = frame.encode().unwrap();
        prop_assert_eq!(bytes[0], rvr_protocol::SOP);
        prop_assert_eq!(bytes[bytes.len() - 1], rvr_protocol::EOP);
        for &b in &bytes[1..bytes.len() - 1] {
            prop_assert!(b != rvr_protocol::SOP && b != rvr_protocol::EOP);
        }
    }
}
