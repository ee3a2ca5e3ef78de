#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use sdr_link::core::codec::LineCodec;
use sdr_link::protocol::message::InboundMessage;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(line)) = codec.decode(&mut buf) {
        let _ = InboundMessage::parse(&line);
    }
});
