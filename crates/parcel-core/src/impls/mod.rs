//! Impls - ports の開発用・テスト用実装
//!
//! # 含まれる実装
//! - **InMemoryImaging**: ページ数だけを持つ画像処理パイプライン
//! - **StaticQueueProbe**: テストから深さを差し替えられるキュー
//!
//! 本番用の実装は協調者側（画像処理サービス、メッセージキュー）が提供します。

pub mod inmem_imaging;
pub mod static_probe;

// 主要な型を再エクスポート
pub use self::inmem_imaging::{CombineCall, InMemoryImaging};
pub use self::static_probe::StaticQueueProbe;
