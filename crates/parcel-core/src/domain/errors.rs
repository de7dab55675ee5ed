//! Errors - クレート全体のエラー型と分類
//!
//! 各コンポーネントは自分のエラー型（RegistryError, CodecError, ...）を返します。
//! 複数のコンポーネントをまたぐ処理（Catalog, TaskSettingsRepository）は ParcelError を返します。

use crate::ports::ExecutionError;
use crate::schema::SchemaError;
use crate::typed::{CodecError, ReconstructionError, RegistryError};

/// ErrorKind はエラーの運用上の分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（データか設定を直さない限り再発する）
/// - Infrastructure: ストアや協調者の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum ParcelError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl From<rusqlite::Error> for ParcelError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Schema(SchemaError::from(err))
    }
}

impl ParcelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registry(_) | Self::Codec(_) | Self::Reconstruction(_) => ErrorKind::Permanent,
            Self::Schema(SchemaError::StoreBusy) => ErrorKind::Transient,
            Self::Schema(SchemaError::Sqlite(_) | SchemaError::OpenTask(_)) => {
                ErrorKind::Infrastructure
            }
            Self::Schema(_) => ErrorKind::Permanent,
            Self::Execution(ExecutionError::Rejected(_)) => ErrorKind::Permanent,
            Self::Execution(ExecutionError::Unavailable { .. }) => ErrorKind::Transient,
            Self::Execution(ExecutionError::Collaborator(_)) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::unknown_tag(ParcelError::from(CodecError::UnknownTypeTag("X".into())), ErrorKind::Permanent)]
    #[case::busy(ParcelError::from(SchemaError::StoreBusy), ErrorKind::Transient)]
    #[case::future(
        ParcelError::from(SchemaError::UnsupportedFutureVersion { found: 9, latest: 3 }),
        ErrorKind::Permanent
    )]
    #[case::unavailable(
        ParcelError::from(ExecutionError::unavailable("a.tif", "offline")),
        ErrorKind::Transient
    )]
    #[case::missing_field(
        ParcelError::from(ReconstructionError::missing("CombinePages", "OutputPath")),
        ErrorKind::Permanent
    )]
    fn classifies_errors(#[case] err: ParcelError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn messages_pass_through() {
        let err = ParcelError::from(CodecError::UnknownTypeTag("Nope".into()));
        assert_eq!(err.to_string(), "unknown type tag 'Nope'");
    }
}
