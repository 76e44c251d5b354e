//! App - アプリケーション層
//!
//! ports を組み合わせて、owner スレッド固定のタスクプロトコルを実装します。
//!
//! # 主要コンポーネント
//! - **Task**: ステートマシン + ユニットオブワークの結合
//! - **ValueSlot**: ワーカー→owner の単一スロットハンドオフ
//! - **Async**: ワーク提出と fluent なコールバック登録
//! - **dispatch**: 終端結果のハンドラ呼び出し（順序・ちょうど一回・例外集約）
//! - **config**: プロセス全体のエグゼキュータ設定

pub mod config;
pub mod dispatch;
pub mod handoff;
pub mod submit;
pub mod task;

// 主要な型を再エクスポート
pub use self::dispatch::{
    DispatchError, Handlers, SuccessHandler, clear_uncaught_handler, set_uncaught_handler,
};
pub use self::handoff::ValueSlot;
pub use self::submit::Async;
pub use self::task::{CancelToken, Task, WorkContext};
