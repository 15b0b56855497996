//! forge-core
//!
//! Hot-patching engine: lets a running host process adopt a patch
//! artifact's code, resources and native libraries, including components
//! the host never declared.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（versions, components, manifests, dispatch, state, errors）
//! - **ports**: 抽象化レイヤー（StateStore, PlatformHooks, Loaders, ComponentFactory, など）
//! - **artifact**: bundle 形式、検証、インストール、ディスク上のレイアウト
//! - **registry**: ホスト宣言 / パッチ専用コンポーネントの索引
//! - **intercept**: broker の差し替えとリダイレクト
//! - **placeholder**: パッチ専用コンポーネントの代理
//! - **app**: release パイプライン、activation、ランタイム
//! - **impls**: 実装（FileStateStore, FsLoader など）

pub mod app;
pub mod artifact;
pub mod domain;
pub mod impls;
pub mod intercept;
pub mod placeholder;
pub mod ports;
pub mod registry;

#[cfg(test)]
mod testing;
