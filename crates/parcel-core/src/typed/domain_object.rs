//! DomainObject - DTO と実行可能なドメインオブジェクトの往復
//!
//! DTO はバージョンごとに固定されたフィールドを持つ不活性なレコードで、
//! ドメインオブジェクトは「現在の」フィールドを持ち、実際に処理を実行します。
//!
//! # 旧バージョンの受け入れ
//! 1 つのドメイン型が複数の DTO バージョンを受け付けます。バージョン間の差分ごとに
//! `From<旧> for 新` を実装してデフォルト値を埋め、`DtoVersions::accept` で列挙します。
//!
//! ```ignore
//! impl From<QueueDepthMeasureV1> for QueueDepthMeasureV2 { ... } // SampleLimit = 無制限
//!
//! fn dto_versions() -> DtoVersions<Self> {
//!     DtoVersions::current().accept::<QueueDepthMeasureV1>()
//! }
//! ```

use super::payload::{DynPayload, Payload};
use crate::domain::{Envelope, EnvelopeDetails};

/// ReconstructionError は DTO からドメインオブジェクトを組み立てられないことを示す
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructionError {
    #[error("{kind}: required field '{field}' is missing")]
    MissingField { kind: &'static str, field: String },

    #[error("{kind}: field '{field}' is invalid: {reason}")]
    InvalidField {
        kind: &'static str,
        field: String,
        reason: String,
    },

    #[error("{kind} cannot be reconstructed from type tag '{tag}'")]
    Unsupported { kind: &'static str, tag: String },
}

impl ReconstructionError {
    pub fn missing(kind: &'static str, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind,
            field: field.into(),
        }
    }

    pub fn invalid(kind: &'static str, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            kind,
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 問題のあったフィールド名
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => Some(field),
            Self::Unsupported { .. } => None,
        }
    }
}

/// DomainObject は DTO との往復を定義する
///
/// # 不変条件
/// - `to_dto` は常に現行バージョンの DTO を返す
/// - `from_dto(to_dto(d))` は永続化されるすべてのフィールドで `d` と等しい
/// - 実行時だけの状態（接続、キャッシュ）は往復の対象外。各実装で明記する
pub trait DomainObject: Sized + Send {
    /// エラーメッセージやログに使う種別名
    const KIND: &'static str;

    /// 現行バージョンの DTO
    type Dto: Payload;

    fn to_dto(&self) -> Self::Dto;

    fn from_dto(dto: Self::Dto) -> Result<Self, ReconstructionError>;

    /// 受け付ける DTO バージョンの一覧。既定は現行 DTO のみ
    fn dto_versions() -> DtoVersions<Self> {
        DtoVersions::current()
    }
}

type Lift<D> = fn(DynPayload) -> Result<<D as DomainObject>::Dto, DynPayload>;

fn lift_from<P, D>(payload: DynPayload) -> Result<D::Dto, DynPayload>
where
    D: DomainObject,
    P: Payload + Into<D::Dto>,
{
    payload.downcast::<P>().map(Into::into)
}

fn lift_via<P, Q, D>(payload: DynPayload) -> Result<D::Dto, DynPayload>
where
    D: DomainObject,
    P: Payload + Into<Q>,
    Q: Into<D::Dto>,
{
    payload.downcast::<P>().map(|p| Into::<Q>::into(p).into())
}

/// DtoVersions はドメイン型が受け付ける DTO バージョンと、現行 DTO への変換の一覧
pub struct DtoVersions<D: DomainObject> {
    lifts: Vec<(&'static str, Lift<D>)>,
}

impl<D: DomainObject> DtoVersions<D> {
    /// 現行 DTO だけを受け付ける
    pub fn current() -> Self {
        Self { lifts: Vec::new() }.accept::<D::Dto>()
    }

    /// 旧バージョン P を追加で受け付ける
    pub fn accept<P: Payload + Into<D::Dto>>(mut self) -> Self {
        if !self.lifts.iter().any(|(tag, _)| *tag == P::TAG) {
            self.lifts.push((P::TAG, lift_from::<P, D>));
        }
        self
    }

    /// 中間バージョン Q を経由して P を受け付ける（P → Q → 現行）
    pub fn accept_via<P, Q>(mut self) -> Self
    where
        P: Payload + Into<Q>,
        Q: Into<D::Dto>,
    {
        if !self.lifts.iter().any(|(tag, _)| *tag == P::TAG) {
            self.lifts.push((P::TAG, lift_via::<P, Q, D>));
        }
        self
    }

    pub fn tags(&self) -> Vec<&'static str> {
        self.lifts.iter().map(|(tag, _)| *tag).collect()
    }

    pub fn accepts(&self, tag: &str) -> bool {
        self.lifts.iter().any(|(t, _)| *t == tag)
    }

    /// payload を現行 DTO に引き上げる
    pub fn lift(&self, payload: DynPayload) -> Result<D::Dto, ReconstructionError> {
        let mut payload = payload;
        for (_, lift) in &self.lifts {
            match lift(payload) {
                Ok(dto) => return Ok(dto),
                Err(back) => payload = back,
            }
        }
        Err(ReconstructionError::Unsupported {
            kind: D::KIND,
            tag: payload.tag().to_string(),
        })
    }

    pub fn reconstruct(&self, payload: DynPayload) -> Result<D, ReconstructionError> {
        D::from_dto(self.lift(payload)?)
    }
}

/// Described は described envelope 由来のメタデータへのアクセサ
pub trait Described {
    fn describe(&self) -> Option<&str>;
    fn is_enabled(&self) -> bool;
}

impl<P> Described for Envelope<P> {
    fn describe(&self) -> Option<&str> {
        self.description()
    }

    fn is_enabled(&self) -> bool {
        Envelope::is_enabled(self)
    }
}

/// Configured は envelope のメタデータ付きのドメインオブジェクト
///
/// 呼び出し側はこれを受け取り、`is_enabled()` を見て実行するかを決めます。
#[derive(Debug, Clone, PartialEq)]
pub struct Configured<D> {
    pub description: Option<String>,
    pub enabled: bool,
    pub object: D,
}

impl<D> Configured<D> {
    pub fn new(object: D) -> Self {
        Self {
            description: None,
            enabled: true,
            object,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn object(&self) -> &D {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut D {
        &mut self.object
    }

    pub fn into_object(self) -> D {
        self.object
    }
}

impl<D> Described for Configured<D> {
    fn describe(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<D: DomainObject> Configured<D> {
    /// decode 済み envelope からドメインオブジェクトを組み立てる
    pub fn from_envelope(envelope: Envelope<DynPayload>) -> Result<Self, ReconstructionError> {
        let description = envelope.description().map(str::to_string);
        let enabled = envelope.is_enabled();
        let object = D::dto_versions().reconstruct(envelope.into_payload())?;
        Ok(Self {
            description,
            enabled,
            object,
        })
    }

    /// 現行 DTO の described envelope に変換する
    pub fn to_envelope(&self) -> Envelope<D::Dto> {
        Envelope::described(
            <D::Dto as Payload>::type_tag(),
            EnvelopeDetails::new(self.description.clone(), self.enabled),
            self.object.to_dto(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterV1 {
        start: i64,
    }

    impl Payload for CounterV1 {
        const TAG: &'static str = "test.counter.v1";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterV2 {
        start: i64,
        step: Option<i64>,
    }

    impl Payload for CounterV2 {
        const TAG: &'static str = "test.counter.v2";
    }

    /// V1 より前の形式。`start` が文字列だった
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CounterV0 {
        start: String,
    }

    impl Payload for CounterV0 {
        const TAG: &'static str = "test.counter.v0";
    }

    impl From<CounterV0> for CounterV1 {
        fn from(v0: CounterV0) -> Self {
            Self {
                start: v0.start.parse().unwrap_or_default(),
            }
        }
    }

    impl From<CounterV1> for CounterV2 {
        fn from(v1: CounterV1) -> Self {
            Self {
                start: v1.start,
                step: Some(1),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        start: i64,
        step: i64,
        // runtime only
        ticks: u32,
    }

    impl DomainObject for Counter {
        const KIND: &'static str = "Counter";
        type Dto = CounterV2;

        fn to_dto(&self) -> CounterV2 {
            CounterV2 {
                start: self.start,
                step: Some(self.step),
            }
        }

        fn from_dto(dto: CounterV2) -> Result<Self, ReconstructionError> {
            let step = dto.step.ok_or_else(|| ReconstructionError::missing(Self::KIND, "step"))?;
            if step == 0 {
                return Err(ReconstructionError::invalid(Self::KIND, "step", "must not be zero"));
            }
            Ok(Self {
                start: dto.start,
                step,
                ticks: 0,
            })
        }

        fn dto_versions() -> DtoVersions<Self> {
            DtoVersions::current()
                .accept::<CounterV1>()
                .accept_via::<CounterV0, CounterV1>()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Unrelated;

    impl Payload for Unrelated {
        const TAG: &'static str = "test.unrelated.v1";
    }

    #[test]
    fn current_version_round_trips() {
        let counter = Counter {
            start: 5,
            step: 3,
            ticks: 9,
        };
        let back = Counter::from_dto(counter.to_dto()).unwrap();
        assert_eq!(back.start, counter.start);
        assert_eq!(back.step, counter.step);
        assert_eq!(back.ticks, 0);
    }

    #[test]
    fn old_version_gets_defaults() {
        let counter = Counter::dto_versions()
            .reconstruct(DynPayload::new(CounterV1 { start: 2 }))
            .unwrap();
        assert_eq!(counter.step, 1);
    }

    #[test]
    fn oldest_version_is_lifted_through_each_gap() {
        let counter = Counter::dto_versions()
            .reconstruct(DynPayload::new(CounterV0 { start: "7".into() }))
            .unwrap();
        assert_eq!(counter.start, 7);
        assert_eq!(counter.step, 1);
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = Counter::dto_versions()
            .reconstruct(DynPayload::new(CounterV2 {
                start: 2,
                step: None,
            }))
            .unwrap_err();
        assert_eq!(err.field(), Some("step"));
        assert!(err.to_string().contains("Counter"));
    }

    #[test]
    fn unrelated_payload_is_unsupported() {
        let err = Counter::dto_versions()
            .reconstruct(DynPayload::new(Unrelated))
            .unwrap_err();
        assert_eq!(
            err,
            ReconstructionError::Unsupported {
                kind: "Counter",
                tag: Unrelated::TAG.to_string()
            }
        );
    }

    #[test]
    fn versions_are_listed_current_first() {
        let versions = Counter::dto_versions();
        assert_eq!(
            versions.tags(),
            vec![CounterV2::TAG, CounterV1::TAG, CounterV0::TAG]
        );
        assert!(versions.accepts(CounterV1::TAG));
        assert!(!versions.accepts(Unrelated::TAG));
    }

    #[test]
    fn configured_carries_envelope_metadata() {
        let envelope = Envelope::plain(CounterV1::type_tag(), DynPayload::new(CounterV1 { start: 1 }))
            .with_description("legacy counter")
            .with_enabled(false);
        let configured = Configured::<Counter>::from_envelope(envelope).unwrap();
        assert_eq!(configured.describe(), Some("legacy counter"));
        assert!(!configured.is_enabled());

        let saved = configured.to_envelope();
        assert_eq!(saved.type_tag(), CounterV2::TAG);
        assert_eq!(saved.payload().step, Some(1));
        assert!(!saved.is_enabled());
    }
}
