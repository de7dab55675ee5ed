//! App - アプリケーション層
//!
//! registry / codec / ドメイン型の往復を組み合わせ、呼び出し側が使う入口をまとめます。
//!
//! # 主要コンポーネント
//! - **CatalogBuilder**: 登録する型の組み立てと起動時検証
//! - **Catalog**: envelope の load / store と TaskSettings ストアの入口

pub mod builder;
pub mod catalog;

pub use self::builder::CatalogBuilder;
pub use self::catalog::Catalog;
