//! Decoder trait - `Object` を具体的な Payload 型に復元する
//!
//! # 学習ポイント
//! - ジェネリック trait (Decoder<P>)
//! - Object-safe trait (DynDecoder)
//! - Type erasure パターン (TypedDecoder<P, D> → DynDecoder)

use super::payload::{DynPayload, Payload, PayloadKind};
use std::marker::PhantomData;

/// Decoder は `Object` の JSON を P に変換する
///
/// 通常は `SerdeDecoder` で十分です。旧フォーマットの癖を吸収したい場合だけ
/// 独自の Decoder を registry に登録します。
pub trait Decoder<P: Payload>: Send + Sync {
    fn decode(&self, object: serde_json::Value) -> Result<P, serde_json::Error>;
}

/// serde の Deserialize 実装をそのまま使う Decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeDecoder;

impl<P: Payload> Decoder<P> for SerdeDecoder {
    fn decode(&self, object: serde_json::Value) -> Result<P, serde_json::Error> {
        serde_json::from_value(object)
    }
}

/// DynDecoder は object-safe な Decoder の抽象化
///
/// HashMap<TypeTag, Arc<dyn DynDecoder>> に格納するために使います。
pub trait DynDecoder: Send + Sync {
    fn decode_dyn(&self, object: serde_json::Value) -> Result<DynPayload, serde_json::Error>;
    fn kind(&self) -> PayloadKind;
}

pub struct TypedDecoder<P: Payload, D: Decoder<P>> {
    decoder: D,
    _marker: PhantomData<fn() -> P>,
}

impl<P: Payload, D: Decoder<P>> TypedDecoder<P, D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            _marker: PhantomData,
        }
    }
}

impl<P: Payload, D: Decoder<P>> DynDecoder for TypedDecoder<P, D> {
    fn decode_dyn(&self, object: serde_json::Value) -> Result<DynPayload, serde_json::Error> {
        self.decoder.decode(object).map(DynPayload::new)
    }

    fn kind(&self) -> PayloadKind {
        PayloadKind::of::<P>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::payload::fixtures::TestPayload;
    use serde_json::json;

    #[test]
    fn typed_decoder_produces_dyn_payload() {
        let decoder = TypedDecoder::<TestPayload, _>::new(SerdeDecoder);
        let payload = decoder.decode_dyn(json!({ "value": 100 })).unwrap();
        assert_eq!(payload.downcast_ref::<TestPayload>(), Some(&TestPayload { value: 100 }));
        assert!(decoder.kind().is::<TestPayload>());
    }

    #[test]
    fn typed_decoder_reports_structural_errors() {
        let decoder = TypedDecoder::<TestPayload, _>::new(SerdeDecoder);
        assert!(decoder.decode_dyn(json!({ "value": "not a number" })).is_err());
    }

    struct ClampingDecoder;

    impl Decoder<TestPayload> for ClampingDecoder {
        fn decode(&self, object: serde_json::Value) -> Result<TestPayload, serde_json::Error> {
            let mut payload: TestPayload = serde_json::from_value(object)?;
            payload.value = payload.value.clamp(0, 10);
            Ok(payload)
        }
    }

    #[test]
    fn custom_decoder_is_used() {
        let decoder = TypedDecoder::<TestPayload, _>::new(ClampingDecoder);
        let payload = decoder.decode_dyn(json!({ "value": 99 })).unwrap();
        assert_eq!(payload.downcast_ref::<TestPayload>().unwrap().value, 10);
    }
}
