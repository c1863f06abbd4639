#![no_main]

use libfuzzer_sys::fuzz_target;
use wirecall::core::serialization::{SerializationFormat, Serializer};
use wirecall::protocol::message::{Request, Response};

fuzz_target!(|data: &[u8]| {
    for format in [
        SerializationFormat::Bincode,
        SerializationFormat::Json,
        SerializationFormat::MessagePack,
    ] {
        let Ok(value) = format.load(data) else {
            continue;
        };

        if let Ok(request) = Request::from_value(value.clone()) {
            let again = Request::from_value(request.to_value()).expect("request roundtrip");
            assert_eq!(again, request);
        }
        let _ = Response::from_value(value);
    }
});
