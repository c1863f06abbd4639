#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;
use wirecall::core::codec::FrameCodec;

fuzz_target!(|data: &[u8]| {
    // Feed the stream in two pieces so the pending-length path is exercised too
    let split = data.first().map_or(0, |b| *b as usize % (data.len() + 1));
    let mut codec = FrameCodec::new().with_max_frame_size(64 * 1024);
    let mut buf = BytesMut::from(&data[..split]);

    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    buf.extend_from_slice(&data[split..]);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
    let _ = codec.decode_eof(&mut buf);
});
