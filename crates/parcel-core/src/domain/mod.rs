//! ドメインモデル (型タグ、envelope、ストアのスキーマ状態、エラー)

pub mod envelope;
pub mod errors;
pub mod schema;
pub mod type_tag;

pub use self::envelope::{Envelope, EnvelopeDetails};
pub use self::errors::{ErrorKind, ParcelError};
pub use self::schema::{LadderState, OpenReport, StoreSchemaState};
pub use self::type_tag::{TagError, TypeTag};
