#![no_main]

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

use gridwire_core::protocol::{Message, MessageCodec, MessageFactoryRegistry};
use gridwire_core::{BinaryMarshaller, Value};
use gridwire_derive::Message;

#[derive(Debug, Default, Message)]
#[message(direct_type = 1)]
struct Leaf {
    name: Option<String>,
    data: Vec<i64>,
    id: Option<uuid::Uuid>,
}

#[derive(Debug, Default, Message)]
#[message(direct_type = 2)]
struct Tree {
    #[message(nested)]
    leaves: Vec<Leaf>,
    #[message(nested)]
    index: HashMap<String, Leaf>,
    extra: Value,
    any: Option<Box<dyn Message>>,
}

fuzz_target!(|data: &[u8]| {
    let mut factories = MessageFactoryRegistry::new();
    let _ = factories.register_message::<Leaf>();
    let _ = factories.register_message::<Tree>();
    let mut codec = MessageCodec::new(Arc::new(BinaryMarshaller::default()), Arc::new(factories));

    // feed in small slices so every suspension point is exercised
    let mut buf = BytesMut::new();
    for chunk in data.chunks(7) {
        buf.extend_from_slice(chunk);
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(message)) => {
                    let _ = message.direct_type();
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
});
