//! Executor port - ワーカースレッドプールの抽象化
//!
//! 「引数なしのユニットオブワークを受け取り、いずれどこかのスレッドで実行する」
//! だけを要求します。プールの構成はプロセス全体の設定（app::config）で
//! 丸ごと差し替えます。部分的な再構成はできません。

use std::io;

/// A zero-argument unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted jobs on some worker thread, eventually, possibly
/// concurrently with other submissions.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// スレッド生成のカスタマイズポイント
///
/// プールは新しいワーカースレッドが必要になるたびにここを通します。
/// factory を差し替えると、構築済みのプールは無効化されます。
pub trait ThreadFactory: Send + Sync {
    /// Spawn a new thread running `job`.
    fn spawn(&self, job: Job) -> io::Result<()>;
}
