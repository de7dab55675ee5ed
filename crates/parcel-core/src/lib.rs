//! parcel-core
//!
//! 型タグ付き envelope で設定オブジェクトを保存・復元するためのフレームワーク。
//!
//! # モジュール構成
//! - **domain**: TypeTag, Envelope, ストアのスキーマ状態, エラー
//! - **typed**: Payload trait, TypeRegistry, EnvelopeCodec, DomainObject（DTO との往復）
//! - **ports**: 再構築したオブジェクトが実行時に使う協調者の trait
//! - **impls**: ports の開発用実装
//! - **kinds**: 組み込みの設定オブジェクト（CombinePages, QueueDepthMeasure, RequiredFieldRule）
//! - **schema**: SQLite ストアのスキーマバージョン管理と TaskSettings ストア
//! - **app**: CatalogBuilder / Catalog
//!
//! ```ignore
//! let catalog = CatalogBuilder::new().with_builtin()?.build()?;
//! let settings = catalog.load::<CombinePagesSettings>(raw)?;
//! if settings.enabled {
//!     settings.object.execute(&imaging).await?;
//! }
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod kinds;
pub mod ports;
pub mod schema;
pub mod typed;

pub use app::{Catalog, CatalogBuilder};
pub use domain::{Envelope, EnvelopeDetails, ErrorKind, ParcelError, TypeTag};
pub use schema::{SchemaError, SchemaLadder, StoreConfig, StoreHandle};
pub use typed::{
    CodecError, Configured, DomainObject, DynPayload, EnvelopeCodec, Payload, ReconstructionError,
    RegistryError, TypeRegistry,
};
