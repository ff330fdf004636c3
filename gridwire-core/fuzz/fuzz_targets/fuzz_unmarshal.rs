#![no_main]

use libfuzzer_sys::fuzz_target;

use gridwire_core::protocol::ReadCursor;
use gridwire_core::serialization::{BinaryMarshaller, EnumValue};
use gridwire_core::Value;

fuzz_target!(|data: &[u8]| {
    let marshaller = BinaryMarshaller::default();

    if let Ok(value) = marshaller.unmarshal_value(data) {
        let _ = value.kind();
        let _ = value.wire_tag();
        let _ = value.into_elements();
    }

    let _ = marshaller.unmarshal::<Vec<u32>>(data);
    let _ = marshaller.unmarshal::<Vec<Option<String>>>(data);
    let _ = marshaller.unmarshal::<EnumValue>(data);

    let mut cursor = ReadCursor::new(data);
    while let Ok(Some(_)) = marshaller.decode_value::<Value>(&mut cursor) {
        if cursor.remaining() == 0 {
            break;
        }
    }
});
