//! Typed - 型タグ付き payload の API
//!
//! このモジュールは型タグの解決を起動時に宣言した registry に閉じ込め、
//! 未知のタグを境界で拒否します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Payload` trait, `Decoder<P>` trait, `DomainObject` trait - 型安全
//! - **内部（Dyn）**: `DynDecoder`, `DynPayload` - object-safe, type erasure

pub mod payload;
pub mod decoder;
pub mod registry;
pub mod codec;
pub mod domain_object;

// 主要な trait/型 を再エクスポート
pub use self::payload::{DynPayload, ErasedPayload, Payload, PayloadKind};
pub use self::decoder::{Decoder, DynDecoder, SerdeDecoder};
pub use self::registry::{RegistryBuilder, RegistryError, TypeRegistry};
pub use self::codec::{CodecError, EnvelopeCodec, peek_envelope, peek_type_tag};
pub use self::domain_object::{Configured, Described, DomainObject, DtoVersions, ReconstructionError};
