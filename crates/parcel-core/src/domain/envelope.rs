//! Envelope - 型タグ付きの運搬用ラッパー
//!
//! wire 上の形は次の 2 種類です。
//! - plain: `{"Type": "...", "Object": {...}}`
//! - described: `{"Type": "...", "Description": "..."?, "Enabled": true?, "Object": {...}}`
//!
//! どちらも同じ `Envelope<P>` で表し、described かどうかは `details` の有無で区別します。

use super::TypeTag;
use crate::typed::Payload;

/// described variant だけが持つメタデータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeDetails {
    /// 自由記述。不変条件なし
    pub description: Option<String>,
    /// 省略時は true
    pub enabled: bool,
}

impl EnvelopeDetails {
    pub fn new(description: Option<String>, enabled: bool) -> Self {
        Self {
            description,
            enabled,
        }
    }
}

impl Default for EnvelopeDetails {
    fn default() -> Self {
        Self {
            description: None,
            enabled: true,
        }
    }
}

/// Envelope は型タグ + (任意の) メタデータ + payload
///
/// decode 済みの Envelope は必ず registry で解決できたタグを持ちます。
/// 未解決タグの Envelope が作られることはありません。
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    type_tag: TypeTag,
    details: Option<EnvelopeDetails>,
    payload: P,
}

impl<P> Envelope<P> {
    /// `Description` / `Enabled` を持たない envelope
    pub fn plain(type_tag: TypeTag, payload: P) -> Self {
        Self {
            type_tag,
            details: None,
            payload,
        }
    }

    /// `Description` / `Enabled` を持つ envelope
    pub fn described(type_tag: TypeTag, details: EnvelopeDetails, payload: P) -> Self {
        Self {
            type_tag,
            details: Some(details),
            payload,
        }
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn details(&self) -> Option<&EnvelopeDetails> {
        self.details.as_ref()
    }

    pub fn is_described(&self) -> bool {
        self.details.is_some()
    }

    pub fn description(&self) -> Option<&str> {
        self.details.as_ref().and_then(|d| d.description.as_deref())
    }

    /// plain envelope は常に有効扱い
    pub fn is_enabled(&self) -> bool {
        self.details.as_ref().is_none_or(|d| d.enabled)
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn into_parts(self) -> (TypeTag, Option<EnvelopeDetails>, P) {
        (self.type_tag, self.details, self.payload)
    }

    /// described variant に切り替えて description を設定する
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.details
            .get_or_insert_with(EnvelopeDetails::default)
            .description = Some(description.into());
        self
    }

    /// described variant に切り替えて enabled を設定する
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.details
            .get_or_insert_with(EnvelopeDetails::default)
            .enabled = enabled;
        self
    }

    /// タグとメタデータを保ったまま payload を差し替える
    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> Envelope<Q> {
        Envelope {
            type_tag: self.type_tag,
            details: self.details,
            payload: f(self.payload),
        }
    }
}

impl<P: Payload> Envelope<P> {
    /// `P::TAG` をタグに使う plain envelope
    pub fn of(payload: P) -> Self {
        Self::plain(P::type_tag(), payload)
    }
}
