#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use volna::{builtin, registry::TypeRegistry};

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    /// Произвольные байты как есть
    Raw(Vec<u8>),
    /// Конверт известного типа со случайными полями
    Shaped {
        known_type: u8,
        id: String,
        timestamp: i64,
        from: String,
        payload: Vec<u8>,
    },
}

fuzz_target!(|input: FuzzInput| {
    let registry = TypeRegistry::new();
    registry.register_pack(builtin::core_pack());

    let raw = match input {
        FuzzInput::Raw(bytes) => bytes,
        FuzzInput::Shaped {
            known_type,
            id,
            timestamp,
            from,
            payload,
        } => {
            let types = registry.payload_types();
            let payload_type = &types[known_type as usize % types.len()];
            let payload: serde_json::Value =
                serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null);
            serde_json::to_vec(&serde_json::json!({
                "id": id,
                "timestamp": timestamp,
                "from": from,
                "type": payload_type,
                "payload": payload,
            }))
            .unwrap()
        }
    };

    // Разбор не должен паниковать; успешный результат кодируется обратно
    if let Ok(envelope) = registry.create_from_bytes(&raw) {
        let bytes = registry.to_bytes(&envelope).unwrap();
        assert!(registry.create_from_bytes(&bytes).is_ok());
    }
});
