//! ResultTransport port - 終端スナップショットの転送
//!
//! RequestKey ごとに終端スナップショットを保持し、同じキーで登録された
//! リスナーへ配送します。リスナー登録ごとに配送はちょうど一回。
//! スナップショットは不変なので、後から登録されたリスナーへの再配送
//! （replay）は何度でも安全です。生成元タスクの破棄後も有効です。

use crate::domain::ids::RequestKey;
use crate::domain::snapshot::WorkerResult;

/// Listener invoked on the owner thread with the delivered snapshot.
pub type ResultListener<V> = Box<dyn FnOnce(WorkerResult<V>) + Send + 'static>;

/// Stores terminal snapshots by key and redelivers them to listeners.
pub trait ResultTransport<V: Clone>: Send + Sync {
    /// Publish a terminal snapshot under `key`. Waiting listeners are
    /// delivered to; later listeners replay the stored snapshot.
    fn publish(&self, key: RequestKey, result: WorkerResult<V>);

    /// Register a listener for `key`. Delivered at most once.
    fn listen(&self, key: RequestKey, listener: ResultListener<V>);
}
