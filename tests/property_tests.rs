//! Property-based tests using proptest
//!
//! These tests check framing and message invariants across randomly generated
//! inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};
use wirecall::core::codec::FrameCodec;
use wirecall::core::serialization::{SerializationFormat, Serializer};
use wirecall::core::value::Value;
use wirecall::protocol::message::{Request, Response, Status};

const FORMATS: [SerializationFormat; 3] = [
    SerializationFormat::Bincode,
    SerializationFormat::Json,
    SerializationFormat::MessagePack,
];

// Floats are left out: JSON does not promise bit-exact round-trips.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        "[a-zA-Z0-9 _]{0,24}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec(("[a-z]{1,8}".prop_map(Value::Str), inner), 0..4)
                .prop_map(Value::Map),
        ]
    })
}

// Property: the wire form is always `<decimal length>\0<payload>`
proptest! {
    #[test]
    fn prop_frame_layout(payload in prop::collection::vec(any::<u8>(), 0..10000)) {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from(payload.clone()), &mut buf).expect("encode");

        let prefix = payload.len().to_string();
        prop_assert_eq!(&buf[..prefix.len()], prefix.as_bytes());
        prop_assert_eq!(buf[prefix.len()], 0u8);
        prop_assert_eq!(&buf[prefix.len() + 1..], &payload[..]);
    }
}

// Property: a frame decodes the same no matter how the bytes are chunked
proptest! {
    #[test]
    fn prop_frame_survives_any_chunking(
        payload in prop::collection::vec(any::<u8>(), 1..4096),
        chunk in 1usize..64,
    ) {
        let mut wire = BytesMut::new();
        FrameCodec::new().encode(Bytes::from(payload.clone()), &mut wire).expect("encode");

        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = None;
        for piece in wire.chunks(chunk) {
            prop_assert!(decoded.is_none(), "frame completed before all bytes arrived");
            buf.extend_from_slice(piece);
            decoded = codec.decode(&mut buf).expect("decode");
        }

        let frame = decoded.expect("frame after final chunk");
        prop_assert_eq!(&frame[..], &payload[..]);
        prop_assert!(buf.is_empty());
    }
}

// Property: back-to-back frames decode in order
proptest! {
    #[test]
    fn prop_consecutive_frames_keep_order(
        frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..256), 1..16)
    ) {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for frame in &frames {
            codec.encode(Bytes::from(frame.clone()), &mut buf).expect("encode");
        }

        for frame in &frames {
            let decoded = codec.decode(&mut buf).expect("decode").expect("complete frame");
            prop_assert_eq!(&decoded[..], &frame[..]);
        }
        prop_assert!(codec.decode(&mut buf).expect("decode").is_none());
    }
}

// Property: arbitrary input never panics the decoder
proptest! {
    #[test]
    fn prop_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = FrameCodec::new().with_max_frame_size(1024);
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
        let _ = codec.decode_eof(&mut buf);
    }
}

// Property: a length above the limit is always refused
proptest! {
    #[test]
    fn prop_oversized_length_rejected(limit in 1usize..4096, extra in 1usize..4096) {
        let mut codec = FrameCodec::new().with_max_frame_size(limit);
        let mut buf = BytesMut::from(format!("{}\0", limit + extra).as_bytes());
        prop_assert!(codec.decode(&mut buf).is_err());
    }
}

// Property: every stock serializer round-trips every value
proptest! {
    #[test]
    fn prop_serializers_roundtrip(value in arb_value()) {
        for format in FORMATS {
            let bytes = format.dump(&value).expect("dump");
            let back = format.load(&bytes).expect("load");
            prop_assert_eq!(&back, &value, "{}", format);
        }
    }
}

// Property: requests survive encode, serialize and decode unchanged
proptest! {
    #[test]
    fn prop_request_roundtrip(
        method in "[a-z_]{1,16}",
        args in prop::collection::vec(arb_value(), 0..4),
        callback in any::<bool>(),
        keep_alive in any::<bool>(),
    ) {
        let request = Request::new(method, args)
            .with_callback(callback)
            .with_keep_alive(keep_alive);

        for format in FORMATS {
            let bytes = format.dump(&request.to_value()).expect("dump");
            let back = Request::from_value(format.load(&bytes).expect("load")).expect("decode");
            prop_assert_eq!(&back, &request);
        }
    }
}

// Property: yield responses carry their arguments through unchanged
proptest! {
    #[test]
    fn prop_yield_response_roundtrip(args in prop::collection::vec(arb_value(), 0..4)) {
        let response = Response::yielded(args.clone());
        let back = Response::from_value(response.to_value()).expect("decode");
        prop_assert_eq!(back.status, Status::Yield);
        prop_assert_eq!(back.yield_args(), args);
    }
}
