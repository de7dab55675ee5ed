//! EnvelopeCodec - envelope の decode / encode
//!
//! # decode フロー
//! 1. 外側 (`Type`, `Description`, `Enabled`, `Object`) だけを読む。`Object` はまだ解釈しない
//! 2. `Type` を TypeRegistry で解決する。解決できなければ `UnknownTypeTag` で終了
//! 3. 解決した Decoder で `Object` を復元する
//! 4. タグ・メタデータ・payload から Envelope を組み立てる
//!
//! encode は registry でタグを確認した後、payload 自身の serde 表現をそのまま出力します。
//! 副作用はなく、部分的に成功した Envelope を返すこともありません。

use super::payload::{DynPayload, Payload};
use super::registry::{RegistryError, TypeRegistry};
use crate::domain::{Envelope, EnvelopeDetails, TagError, TypeTag};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const TYPE_FIELD: &str = "Type";
pub const DESCRIPTION_FIELD: &str = "Description";
pub const ENABLED_FIELD: &str = "Enabled";
pub const OBJECT_FIELD: &str = "Object";

/// CodecError は decode / encode のエラー
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(String),

    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("envelope must be a JSON object")]
    NotAnObject,

    #[error("envelope is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("envelope field '{field}' must be {expected}")]
    WrongFieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid type tag: {0}")]
    InvalidTag(#[from] TagError),

    #[error("payload for type tag '{tag}' is malformed: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("type tag '{found}' does not decode to {expected}")]
    TagMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("payload type {0} is not registered")]
    UnregisteredKind(&'static str),

    #[error("failed to encode payload for type tag '{tag}': {source}")]
    Encode {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for CodecError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownTypeTag(tag) => Self::UnknownTypeTag(tag),
            RegistryError::UnregisteredKind(name) => Self::UnregisteredKind(name),
            other => Self::Registry(other),
        }
    }
}

/// `Object` を解釈する前の外側の構造
///
/// `tag` はまだ registry で解決していない生の文字列です。
struct Outer {
    tag: String,
    details: Option<EnvelopeDetails>,
    object: Value,
}

impl Outer {
    fn split(value: Value) -> Result<Self, CodecError> {
        let Value::Object(mut map) = value else {
            return Err(CodecError::NotAnObject);
        };
        let tag = read_tag(&map)?;
        let details = read_details(&mut map)?;
        let object = map
            .remove(OBJECT_FIELD)
            .ok_or(CodecError::MissingField(OBJECT_FIELD))?;

        Ok(Self {
            tag,
            details,
            object,
        })
    }
}

fn assemble<P>(tag: TypeTag, details: Option<EnvelopeDetails>, payload: P) -> Envelope<P> {
    match details {
        Some(details) => Envelope::described(tag, details, payload),
        None => Envelope::plain(tag, payload),
    }
}

/// 空文字列だけを構造エラーにする
///
/// 空白を含むタグは登録できないので、registry 側で `UnknownTypeTag` になります。
fn read_tag(map: &Map<String, Value>) -> Result<String, CodecError> {
    match map.get(TYPE_FIELD) {
        None | Some(Value::Null) => Err(CodecError::MissingField(TYPE_FIELD)),
        Some(Value::String(s)) if s.is_empty() => Err(CodecError::InvalidTag(TagError::Empty)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(CodecError::WrongFieldType {
            field: TYPE_FIELD,
            expected: "a string",
        }),
    }
}

/// どちらかのキーがあれば (null でも) described variant
fn read_details(map: &mut Map<String, Value>) -> Result<Option<EnvelopeDetails>, CodecError> {
    let description = match map.remove(DESCRIPTION_FIELD) {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s)),
        Some(_) => {
            return Err(CodecError::WrongFieldType {
                field: DESCRIPTION_FIELD,
                expected: "a string",
            });
        }
    };
    let enabled = match map.remove(ENABLED_FIELD) {
        None => None,
        Some(Value::Null) => Some(true),
        Some(Value::Bool(b)) => Some(b),
        Some(_) => {
            return Err(CodecError::WrongFieldType {
                field: ENABLED_FIELD,
                expected: "a boolean",
            });
        }
    };
    if description.is_none() && enabled.is_none() {
        return Ok(None);
    }
    Ok(Some(EnvelopeDetails::new(
        description.flatten(),
        enabled.unwrap_or(true),
    )))
}

fn split_raw(raw: &[u8]) -> Result<Outer, CodecError> {
    let value: Value = serde_json::from_slice(raw).map_err(CodecError::Malformed)?;
    Outer::split(value)
}

/// `Object` を読まずに型タグだけを取り出す
///
/// registry を必要としないため、移行スクリプトなどで未知のタグを含む行を扱うときに使います。
/// registry を通らないので、空白を含むタグはここで `InvalidTag` になります。
pub fn peek_type_tag(raw: &[u8]) -> Result<TypeTag, CodecError> {
    let value: Value = serde_json::from_slice(raw).map_err(CodecError::Malformed)?;
    let Value::Object(map) = value else {
        return Err(CodecError::NotAnObject);
    };
    Ok(TypeTag::new(read_tag(&map)?)?)
}

/// `Object` を解釈せずにタグとメタデータを取り出す
///
/// 外側の検証規則は decode と同じです。plain envelope なら details は `None`。
pub fn peek_envelope(raw: &[u8]) -> Result<(TypeTag, Option<EnvelopeDetails>), CodecError> {
    let outer = split_raw(raw)?;
    Ok((TypeTag::new(outer.tag)?, outer.details))
}

/// described envelope は常に `Enabled` を書き出す
///
/// decode 時に `Enabled` が省略されていても、再 encode すると `"Enabled":true` が付きます。
/// これが正規形で、値としての意味は変わりません。
#[derive(Serialize)]
struct WireEnvelope<'a, O: Serialize> {
    #[serde(rename = "Type")]
    type_tag: &'a str,
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "Enabled", skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(rename = "Object")]
    object: &'a O,
}

impl<'a, O: Serialize> WireEnvelope<'a, O> {
    fn new(type_tag: &'a TypeTag, details: Option<&'a EnvelopeDetails>, object: &'a O) -> Self {
        Self {
            type_tag: type_tag.as_str(),
            description: details.and_then(|d| d.description.as_deref()),
            enabled: details.map(|d| d.enabled),
            object,
        }
    }
}

fn encode_error(tag: &TypeTag) -> impl FnOnce(serde_json::Error) -> CodecError + '_ {
    move |source| CodecError::Encode {
        tag: tag.to_string(),
        source,
    }
}

/// WireEnvelope を組み立てて `write` で書き出す
fn write_wire<O, T>(
    tag: &TypeTag,
    details: Option<&EnvelopeDetails>,
    object: &O,
    write: impl FnOnce(&WireEnvelope<'_, O>) -> serde_json::Result<T>,
) -> Result<T, CodecError>
where
    O: Serialize,
{
    write(&WireEnvelope::new(tag, details, object)).map_err(encode_error(tag))
}

/// EnvelopeCodec は凍結済み TypeRegistry を共有して envelope を変換する
///
/// # 使用例
/// ```ignore
/// let codec = EnvelopeCodec::new(Arc::new(registry));
/// let env = codec.decode(br#"{"Type":"CombinePages","Object":{...}}"#)?;
/// let bytes = codec.encode_dyn(&env)?;
/// ```
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    registry: Arc<TypeRegistry>,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Envelope<DynPayload>, CodecError> {
        self.decode_outer(split_raw(raw)?)
    }

    pub fn decode_str(&self, raw: &str) -> Result<Envelope<DynPayload>, CodecError> {
        self.decode(raw.as_bytes())
    }

    pub fn decode_value(&self, value: Value) -> Result<Envelope<DynPayload>, CodecError> {
        self.decode_outer(Outer::split(value)?)
    }

    fn decode_outer(&self, outer: Outer) -> Result<Envelope<DynPayload>, CodecError> {
        let tag = self.registry.registered_tag(&outer.tag)?.clone();
        let payload = self
            .registry
            .decode_object(tag.as_str(), outer.object)?
            .map_err(|source| CodecError::Payload {
                tag: outer.tag,
                source,
            })?;
        Ok(assemble(tag, outer.details, payload))
    }

    /// 静的に分かっている型として decode する
    ///
    /// タグは registry で解決でき、かつ `P` に解決されなければなりません。
    pub fn decode_as<P: Payload>(&self, raw: &[u8]) -> Result<Envelope<P>, CodecError> {
        downcast_envelope(self.decode(raw)?)
    }

    pub fn decode_value_as<P: Payload>(&self, value: Value) -> Result<Envelope<P>, CodecError> {
        downcast_envelope(self.decode_value(value)?)
    }

    pub fn encode<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, CodecError> {
        let tag = self.checked_tag::<P>(envelope)?;
        write_wire(tag, envelope.details(), envelope.payload(), |w| serde_json::to_vec(w))
    }

    pub fn encode_string<P: Payload>(&self, envelope: &Envelope<P>) -> Result<String, CodecError> {
        let tag = self.checked_tag::<P>(envelope)?;
        write_wire(tag, envelope.details(), envelope.payload(), |w| serde_json::to_string(w))
    }

    pub fn encode_value<P: Payload>(&self, envelope: &Envelope<P>) -> Result<Value, CodecError> {
        let tag = self.checked_tag::<P>(envelope)?;
        write_wire(tag, envelope.details(), envelope.payload(), |w| serde_json::to_value(w))
    }

    /// `Type`, `Description`, `Enabled`, `Object` の順で書き出す
    pub fn encode_dyn(&self, envelope: &Envelope<DynPayload>) -> Result<Vec<u8>, CodecError> {
        let (tag, object) = self.dyn_object(envelope)?;
        write_wire(tag, envelope.details(), &object, |w| serde_json::to_vec(w))
    }

    pub fn encode_dyn_string(&self, envelope: &Envelope<DynPayload>) -> Result<String, CodecError> {
        let (tag, object) = self.dyn_object(envelope)?;
        write_wire(tag, envelope.details(), &object, |w| serde_json::to_string(w))
    }

    pub fn encode_dyn_value(&self, envelope: &Envelope<DynPayload>) -> Result<Value, CodecError> {
        let (tag, object) = self.dyn_object(envelope)?;
        write_wire(tag, envelope.details(), &object, |w| serde_json::to_value(w))
    }

    fn dyn_object(&self, envelope: &Envelope<DynPayload>) -> Result<(&TypeTag, Value), CodecError> {
        let payload = envelope.payload();
        let tag = self.registry.tag_for_kind(payload.kind())?;
        ensure_same_tag(tag, envelope.type_tag())?;
        let object = payload.to_value().map_err(encode_error(tag))?;
        Ok((tag, object))
    }

    fn checked_tag<P: Payload>(&self, envelope: &Envelope<P>) -> Result<&TypeTag, CodecError> {
        let tag = self.registry.tag_for::<P>()?;
        ensure_same_tag(tag, envelope.type_tag())?;
        Ok(tag)
    }
}

fn downcast_envelope<P: Payload>(envelope: Envelope<DynPayload>) -> Result<Envelope<P>, CodecError> {
    let (tag, details, payload) = envelope.into_parts();
    match payload.downcast::<P>() {
        Ok(payload) => Ok(assemble(tag, details, payload)),
        Err(_) => Err(CodecError::TagMismatch {
            expected: std::any::type_name::<P>(),
            found: tag.into_string(),
        }),
    }
}

/// Envelope に載っているタグが registry のタグと食い違っていれば書き出さない
fn ensure_same_tag(registered: &TypeTag, carried: &TypeTag) -> Result<(), CodecError> {
    if registered != carried {
        return Err(CodecError::TagMismatch {
            expected: "the registered type tag",
            found: carried.to_string(),
        });
    }
    Ok(())
}
