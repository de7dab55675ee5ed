//! TypeTag - envelope の `Type` フィールドに入る型識別子
//!
//! 言語レベルの型名ではなく、バージョンをまたいで安定した文字列を使います。
//! 比較は大文字小文字を区別する完全一致のみです。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// TypeTag は空でない文字列であることを保証する newtype
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeTag(String);

/// TypeTag の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("type tag must not be empty")]
    Empty,

    #[error("type tag '{0}' contains whitespace or control characters")]
    InvalidCharacter(String),
}

impl TypeTag {
    pub fn new(value: impl Into<String>) -> Result<Self, TagError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    /// `Payload::TAG` など、registry 登録時に検証される静的タグ用
    pub(crate) fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    /// 空文字列と空白・制御文字を拒否する
    pub fn validate(value: &str) -> Result<(), TagError> {
        if value.is_empty() {
            return Err(TagError::Empty);
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TagError::InvalidCharacter(value.to_string()));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for TypeTag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for TypeTag {
    type Error = TagError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        tag.0
    }
}

impl AsRef<str> for TypeTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// derive(Hash) は中身の String と同じハッシュになるので str で引ける
impl Borrow<str> for TypeTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TypeTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TypeTag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
