//! spindle-core
//!
//! owner スレッド固定のバックグラウンドタスク基盤。
//!
//! ワークはワーカースレッドプールで実行されますが、状態遷移・結果・
//! コールバックはすべて単一の owner スレッドだけで観測・変更されます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, errors, worker, snapshot）
//! - **ports**: 抽象化レイヤー（MainThread, Executor, ResultTransport）
//! - **app**: アプリケーションロジック（task, handoff, submit, dispatch, config）
//! - **impls**: 実装（EventLoop, CachedPool, InMemoryResultBoard）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

// 主要な型を再エクスポート
pub use app::config;
pub use app::dispatch::{
    DispatchError, Handlers, SuccessHandler, clear_uncaught_handler, set_uncaught_handler,
};
pub use app::submit::Async;
pub use app::task::{CancelToken, Task, WorkContext};
pub use domain::{
    BoxError, FailureCause, Fault, RequestKey, Worker, WorkerId, WorkerLost, WorkerResult,
    WorkerState,
};
pub use impls::{CachedPool, DefaultThreadFactory, EventLoop, InMemoryResultBoard, LoopHandle};
pub use ports::{Executor, MainThread, ResultTransport, ThreadFactory};
