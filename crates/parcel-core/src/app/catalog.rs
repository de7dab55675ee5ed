//! Catalog - decode → バージョン引き上げ → ドメインオブジェクト、とその逆
//!
//! 凍結済みの TypeRegistry を共有するので、Clone して複数タスクから同時に使えます。

use crate::domain::{Envelope, ParcelError};
use crate::schema::{StoreConfig, TaskSettingsRepository};
use crate::typed::{CodecError, Configured, DomainObject, DynPayload, EnvelopeCodec, TypeRegistry};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Catalog {
    codec: EnvelopeCodec,
}

impl Catalog {
    pub(crate) fn new(codec: EnvelopeCodec) -> Self {
        Self { codec }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.codec.registry()
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Envelope<DynPayload>, CodecError> {
        self.codec.decode(raw)
    }

    pub fn encode(&self, envelope: &Envelope<DynPayload>) -> Result<Vec<u8>, CodecError> {
        self.codec.encode_dyn(envelope)
    }

    /// 保存された envelope から実行可能なドメインオブジェクトを組み立てる
    pub fn load<D: DomainObject>(&self, raw: &[u8]) -> Result<Configured<D>, ParcelError> {
        let envelope = self.codec.decode(raw)?;
        let tag = envelope.type_tag().clone();
        let configured = Configured::from_envelope(envelope)?;
        tracing::debug!(tag = %tag, kind = D::KIND, "loaded domain object");
        Ok(configured)
    }

    pub fn load_str<D: DomainObject>(&self, raw: &str) -> Result<Configured<D>, ParcelError> {
        self.load(raw.as_bytes())
    }

    /// 現行 DTO の described envelope として書き出す
    pub fn store<D: DomainObject>(&self, configured: &Configured<D>) -> Result<Vec<u8>, ParcelError> {
        Ok(self.codec.encode(&configured.to_envelope())?)
    }

    pub fn store_string<D: DomainObject>(&self, configured: &Configured<D>) -> Result<String, ParcelError> {
        Ok(self.codec.encode_string(&configured.to_envelope())?)
    }

    /// この Catalog の codec を使う TaskSettings ストアを開く
    pub fn open_task_settings(&self, config: &StoreConfig) -> Result<TaskSettingsRepository, ParcelError> {
        TaskSettingsRepository::open(config, self.codec.clone())
    }

    pub fn open_task_settings_in_memory(&self) -> Result<TaskSettingsRepository, ParcelError> {
        TaskSettingsRepository::open_in_memory(self.codec.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::CatalogBuilder;
    use super::*;
    use crate::kinds::{QueueDepthMeasure, RequiredFieldRule, SampleLimit};
    use crate::typed::ReconstructionError;

    fn catalog() -> Catalog {
        CatalogBuilder::new().with_builtin().unwrap().build().unwrap()
    }

    #[test]
    fn load_lifts_old_versions() {
        let raw = r#"{"Type":"RequiredFieldRuleV1","Object":{"FieldName":"Invoice"}}"#;
        let rule = catalog().load_str::<RequiredFieldRule>(raw).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.object.message, "Invoice is required");
    }

    #[test]
    fn store_writes_current_version_described() {
        let catalog = catalog();
        let raw = r#"{"Type":"QueueDepthMeasureV1","Object":{"QueuePath":"orders","WarningThreshold":3}}"#;
        let measure = catalog.load_str::<QueueDepthMeasure>(raw).unwrap();
        let stored = catalog.store_string(&measure).unwrap();
        assert_eq!(
            stored,
            r#"{"Type":"QueueDepthMeasureV2","Enabled":true,"Object":{"QueuePath":"orders","WarningThreshold":3,"SampleLimit":null}}"#
        );
    }

    #[test]
    fn load_rejects_other_kinds() {
        let raw = r#"{"Type":"RequiredFieldRuleV1","Object":{"FieldName":"Invoice"}}"#;
        let err = catalog().load_str::<QueueDepthMeasure>(raw).unwrap_err();
        assert!(matches!(
            err,
            ParcelError::Reconstruction(ReconstructionError::Unsupported { tag, .. }) if tag == "RequiredFieldRuleV1"
        ));
    }

    #[test]
    fn load_surfaces_missing_fields() {
        let raw = r#"{"Type":"QueueDepthMeasureV2","Object":{"QueuePath":"orders"}}"#;
        let err = catalog().load_str::<QueueDepthMeasure>(raw).unwrap_err();
        assert!(matches!(
            err,
            ParcelError::Reconstruction(ReconstructionError::MissingField { field, .. }) if field == "WarningThreshold"
        ));
    }

    #[test]
    fn store_then_load_preserves_metadata() {
        let catalog = catalog();
        let configured = Configured::new(QueueDepthMeasure::new("orders", 7, SampleLimit::Limited(2)))
            .with_description("orders backlog")
            .with_enabled(false);
        let raw = catalog.store(&configured).unwrap();
        assert_eq!(catalog.load::<QueueDepthMeasure>(&raw).unwrap(), configured);
    }

    #[test]
    fn padded_builtin_tag_is_unknown() {
        let err = catalog()
            .decode(br#"{"Type":"CombinePages ","Object":{}}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnknownTypeTag(tag) if tag == "CombinePages "));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let err = catalog()
            .load_str::<QueueDepthMeasure>(r#"{"Type":"Nope","Object":{}}"#)
            .unwrap_err();
        assert!(matches!(err, ParcelError::Codec(CodecError::UnknownTypeTag(tag)) if tag == "Nope"));
    }
}
