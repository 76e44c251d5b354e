//! Worker - 読み取り契約
//!
//! バックグラウンドワークの状態・結果を owner スレッドから読むための trait です。
//! accessor は対応する終端状態に達するまで意味のある値を返しません。

use super::errors::Fault;
use super::state::WorkerState;

/// Read contract of a background worker.
///
/// All accessors are confined to the owner thread once the worker has
/// started; calling them from another thread is a programmer error and
/// panics. `cancel` is the exception and may be called from any thread.
pub trait Worker<V: Clone> {
    /// Current state.
    fn state(&self) -> WorkerState;

    /// The computed value. Present only once the state became `Succeeded`.
    fn value(&self) -> Option<V>;

    /// The captured failure. Present only once the state became `Failed`.
    fn fault(&self) -> Option<Fault>;

    /// True while the state is `Scheduled` or `Running`.
    fn is_running(&self) -> bool;

    /// Attempt to cancel the underlying unit of work. Returns false when
    /// the worker already reached a terminal state.
    fn cancel(&self) -> bool;
}
