//! Ports - 抽象化レイヤー
//!
//! このモジュールはコアが外部コラボレーターに要求するインターフェースを
//! 定義します。各 trait はホスト環境（イベントループ、スレッドプール、
//! 結果転送）への境界を提供し、実装の詳細を隠蔽します。

pub mod executor;
pub mod main_thread;
pub mod result_transport;

// 主要な trait を再エクスポート
pub use self::executor::{Executor, Job, ThreadFactory};
pub use self::main_thread::{Callback, MainThread};
pub use self::result_transport::{ResultListener, ResultTransport};
