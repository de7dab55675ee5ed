//! CatalogBuilder - 登録する型の組み立てと起動時検証
//!
//! # 学習ポイント
//! - Builder パターン（所有権を渡しながらメソッドチェーン）
//! - 起動時検証（Fail-fast 設計）
//! - ドメイン型が受け付ける DTO バージョンがすべて登録されているかを build() で確認

use super::catalog::Catalog;
use crate::kinds;
use crate::typed::{Decoder, DomainObject, EnvelopeCodec, Payload, RegistryBuilder, RegistryError};
use std::sync::Arc;

/// CatalogBuilder は Catalog を構築
///
/// # 使用例
/// ```ignore
/// let catalog = CatalogBuilder::new()
///     .with_builtin()?
///     .register::<MyTaskSettingsV1>()?
///     .expect_domain::<MyTask>()
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_tags() / expect_domain() で期待される type tag を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば RegistryError::MissingTags を返す
pub struct CatalogBuilder {
    registry: RegistryBuilder,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self {
            registry: RegistryBuilder::new(),
        }
    }

    /// 組み込みの kinds をすべて登録
    pub fn with_builtin(mut self) -> Result<Self, RegistryError> {
        self.registry = kinds::register_builtin(self.registry)?;
        Ok(self)
    }

    /// Payload を登録
    pub fn register<P: Payload>(mut self) -> Result<Self, RegistryError> {
        self.registry = self.registry.register::<P>()?;
        Ok(self)
    }

    /// 独自 Decoder 付きで Payload を登録
    pub fn register_with<P: Payload, D: Decoder<P> + 'static>(
        mut self,
        decoder: D,
    ) -> Result<Self, RegistryError> {
        self.registry = self.registry.register_with::<P, D>(decoder)?;
        Ok(self)
    }

    /// 期待される type tag を追加
    pub fn expect_tags(mut self, tags: &[&str]) -> Self {
        self.registry = self.registry.expect_tags(tags);
        self
    }

    /// D が受け付けるすべての DTO バージョンを期待集合に追加
    pub fn expect_domain<D: DomainObject>(self) -> Self {
        let tags = D::dto_versions().tags();
        self.expect_tags(&tags)
    }

    pub fn build(self) -> Result<Catalog, RegistryError> {
        let registry = Arc::new(self.registry.build()?);
        tracing::debug!(tags = ?registry.registered_tags(), "catalog built");
        Ok(Catalog::new(EnvelopeCodec::new(registry)))
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{CombinePagesSettings, QueueDepthMeasure, QueueDepthMeasureV1, QueueDepthMeasureV2};

    #[test]
    fn test_build_success() {
        let catalog = CatalogBuilder::new()
            .with_builtin()
            .unwrap()
            .expect_domain::<CombinePagesSettings>()
            .expect_domain::<QueueDepthMeasure>()
            .build();
        assert!(catalog.is_ok());
    }

    #[test]
    fn test_build_missing_old_dto_version() {
        let catalog = CatalogBuilder::new()
            .register::<QueueDepthMeasureV2>()
            .unwrap()
            .expect_domain::<QueueDepthMeasure>()
            .build();
        assert!(matches!(
            catalog,
            Err(RegistryError::MissingTags(missing)) if missing == vec![QueueDepthMeasureV1::TAG.to_string()]
        ));
    }

    #[test]
    fn test_build_no_expectations() {
        let catalog = CatalogBuilder::new().build().unwrap();
        assert!(catalog.registry().is_empty());
    }

    #[test]
    fn test_builtin_twice_is_rejected() {
        let result = CatalogBuilder::new().with_builtin().unwrap().with_builtin();
        assert!(matches!(result, Err(RegistryError::DuplicateTag(_))));
    }
}
