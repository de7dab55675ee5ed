//! TypeRegistry - 型タグと Payload 型の対応表
//!
//! # ライフサイクル
//! - 起動時に `RegistryBuilder` で全 Payload 型を宣言的に登録する
//! - `build()` で凍結し、以後は読み取り専用の `TypeRegistry` を `Arc` で共有する
//!
//! 凍結後の registry には登録 API が存在しないため、実行時の登録競合は起こりえません。
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - `TypeId` による逆引き (payload 型 → タグ)

use super::decoder::{Decoder, DynDecoder, SerdeDecoder, TypedDecoder};
use super::payload::{DynPayload, Payload, PayloadKind};
use crate::domain::{TagError, TypeTag};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// RegistryError は TypeRegistry の構築・参照エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("type tag '{0}' is already registered")]
    DuplicateTag(String),

    #[error("payload type {type_name} is already registered under tag '{tag}'")]
    DuplicateKind {
        type_name: &'static str,
        tag: String,
    },

    #[error("invalid type tag: {0}")]
    InvalidTag(#[from] TagError),

    #[error("unknown type tag '{0}'")]
    UnknownTypeTag(String),

    #[error("payload type {0} is not registered")]
    UnregisteredKind(&'static str),

    #[error("Missing type tags: {0:?}. These tags were expected but not registered.")]
    MissingTags(Vec<String>),
}

struct RegistryEntry {
    kind: PayloadKind,
    decoder: Arc<dyn DynDecoder>,
}

/// RegistryBuilder は起動時に Payload 型を登録する
///
/// # 使用例
/// ```ignore
/// let registry = RegistryBuilder::new()
///     .register::<CombinePagesTaskSettingsV1>()?
///     .register::<QueueDepthMeasureV2>()?
///     .expect_tags(&["CombinePages", "QueueDepthMeasureV2"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 同じタグ / 同じ型の二重登録はその場でエラー
/// - `expect_tags()` で期待したタグが `build()` 時に揃っていなければエラー
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<TypeTag, RegistryEntry>,
    tags_by_type: HashMap<TypeId, TypeTag>,
    expected_tags: Option<Vec<String>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// serde の Deserialize で decode する Payload を登録
    pub fn register<P: Payload>(self) -> Result<Self, RegistryError> {
        self.register_with::<P, _>(SerdeDecoder)
    }

    /// 独自 Decoder 付きで Payload を登録
    pub fn register_with<P: Payload, D: Decoder<P> + 'static>(
        mut self,
        decoder: D,
    ) -> Result<Self, RegistryError> {
        let tag = TypeTag::new(P::TAG)?;
        if self.entries.contains_key(&tag) {
            return Err(RegistryError::DuplicateTag(tag.into_string()));
        }
        let kind = PayloadKind::of::<P>();
        if let Some(existing) = self.tags_by_type.get(&kind.type_id()) {
            return Err(RegistryError::DuplicateKind {
                type_name: kind.type_name(),
                tag: existing.to_string(),
            });
        }
        tracing::debug!(tag = %tag, payload = kind.type_name(), "registering payload kind");
        self.tags_by_type.insert(kind.type_id(), tag.clone());
        self.entries.insert(
            tag,
            RegistryEntry {
                kind,
                decoder: Arc::new(TypedDecoder::<P, D>::new(decoder)),
            },
        );
        Ok(self)
    }

    /// build() 時に登録済みであるべきタグを設定
    pub fn expect_tags(mut self, tags: &[&str]) -> Self {
        let expected = self.expected_tags.get_or_insert_with(Vec::new);
        expected.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn build(self) -> Result<TypeRegistry, RegistryError> {
        if let Some(expected) = &self.expected_tags {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.entries.contains_key(t.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(RegistryError::MissingTags(missing));
            }
        }
        Ok(TypeRegistry {
            entries: self.entries,
            tags_by_type: self.tags_by_type,
        })
    }
}

/// TypeRegistry は凍結済みの対応表
///
/// `Send + Sync` で、`Arc<TypeRegistry>` として複数スレッドから同時に読めます。
pub struct TypeRegistry {
    entries: HashMap<TypeTag, RegistryEntry>,
    tags_by_type: HashMap<TypeId, TypeTag>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// タグから Payload 型を解決する（大文字小文字を区別する完全一致）
    pub fn resolve(&self, tag: &str) -> Result<PayloadKind, RegistryError> {
        self.entry(tag).map(|e| e.kind)
    }

    /// 生の文字列から登録済みの TypeTag を引く
    pub fn registered_tag(&self, tag: &str) -> Result<&TypeTag, RegistryError> {
        self.entries.get_key_value(tag).map(|(t, _)| t).ok_or_else(|| {
            tracing::debug!(tag, "type tag did not resolve");
            RegistryError::UnknownTypeTag(tag.to_string())
        })
    }

    /// Payload 型からタグを引く
    pub fn tag_for<P: Payload>(&self) -> Result<&TypeTag, RegistryError> {
        self.tags_by_type
            .get(&TypeId::of::<P>())
            .ok_or_else(|| RegistryError::UnknownTypeTag(P::TAG.to_string()))
    }

    pub fn tag_for_kind(&self, kind: PayloadKind) -> Result<&TypeTag, RegistryError> {
        self.tags_by_type
            .get(&kind.type_id())
            .ok_or(RegistryError::UnregisteredKind(kind.type_name()))
    }

    /// タグに対応する Decoder で `Object` を復元する
    pub fn decode_object(
        &self,
        tag: &str,
        object: serde_json::Value,
    ) -> Result<Result<DynPayload, serde_json::Error>, RegistryError> {
        let entry = self.entry(tag)?;
        Ok(entry.decoder.decode_dyn(object))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// 登録済みタグの一覧（ソート済み）
    pub fn registered_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.entries.keys().map(|t| t.to_string()).collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, tag: &str) -> Result<&RegistryEntry, RegistryError> {
        self.entries.get(tag).ok_or_else(|| {
            tracing::debug!(tag, "type tag did not resolve");
            RegistryError::UnknownTypeTag(tag.to_string())
        })
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.registered_tags())
            .finish()
    }
}
