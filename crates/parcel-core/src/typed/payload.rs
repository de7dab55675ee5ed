//! Payload trait - 型タグと DTO 型の対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const TAG`)
//! - `Any` による型消去と downcast (`DynPayload`)

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{Any, TypeId};
use std::fmt;

use crate::domain::TypeTag;

/// Payload は envelope の `Object` に入る DTO 型
///
/// # 使用例
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct QueueDepthMeasureV1 {
///     queue_path: String,
///     warning_threshold: u64,
/// }
///
/// impl Payload for QueueDepthMeasureV1 {
///     const TAG: &'static str = "QueueDepthMeasureV1";
/// }
/// ```
///
/// # タグの命名
/// - 永続化済みデータとの互換のため、一度使ったタグは変更しない
/// - DTO のバージョンごとに別タグ（`...V1`, `...V2`）を割り当てる
pub trait Payload:
    Serialize + DeserializeOwned + fmt::Debug + Clone + Send + Sync + 'static
{
    const TAG: &'static str;

    fn type_tag() -> TypeTag {
        TypeTag::from_static(Self::TAG)
    }
}

/// PayloadKind は registry 上の「型」を表す識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadKind {
    type_id: TypeId,
    type_name: &'static str,
}

impl PayloadKind {
    pub fn of<P: Payload>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<P: Payload>(&self) -> bool {
        self.type_id == TypeId::of::<P>()
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// ErasedPayload は object-safe な Payload の抽象化
///
/// `Payload` は `DeserializeOwned` や `Clone` を要求するため trait object にできません。
/// blanket impl でこちらに変換し、`Box<dyn ErasedPayload>` として扱います。
pub trait ErasedPayload: Any + Send + Sync + fmt::Debug {
    fn tag(&self) -> &'static str;
    fn kind(&self) -> PayloadKind;
    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn clone_box(&self) -> Box<dyn ErasedPayload>;
    fn as_any(&self) -> &dyn Any;
}

impl<P: Payload> ErasedPayload for P {
    fn tag(&self) -> &'static str {
        P::TAG
    }

    fn kind(&self) -> PayloadKind {
        PayloadKind::of::<P>()
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn clone_box(&self) -> Box<dyn ErasedPayload> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// DynPayload は実行時にタグから解決された payload
///
/// 具体型は `downcast_ref` / `downcast` で取り出します。
#[derive(Debug)]
pub struct DynPayload(Box<dyn ErasedPayload>);

impl DynPayload {
    pub fn new<P: Payload>(payload: P) -> Self {
        Self(Box::new(payload))
    }

    pub fn tag(&self) -> &'static str {
        self.0.tag()
    }

    pub fn kind(&self) -> PayloadKind {
        self.0.kind()
    }

    pub fn is<P: Payload>(&self) -> bool {
        self.0.as_any().is::<P>()
    }

    pub fn downcast_ref<P: Payload>(&self) -> Option<&P> {
        self.0.as_any().downcast_ref::<P>()
    }

    /// 型が一致しなければ元の DynPayload を返す
    pub fn downcast<P: Payload>(self) -> Result<P, Self> {
        if let Some(payload) = self.downcast_ref::<P>() {
            return Ok(payload.clone());
        }
        Err(self)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.0.to_value()
    }
}

impl Clone for DynPayload {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

impl<P: Payload> From<P> for DynPayload {
    fn from(payload: P) -> Self {
        Self::new(payload)
    }
}
