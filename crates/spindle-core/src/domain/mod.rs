//! Domain model (IDs, states, faults, snapshots).
//!
//! 純粋なデータモデルのみを置きます。スレッドや実行の仕組みは app / impls 側です。

pub mod errors;
pub mod ids;
pub mod snapshot;
pub mod state;
pub mod worker;

// 主要な型を再エクスポート
pub use self::errors::{BoxError, FailureCause, Fault, ReplayedFailure, WorkerLost};
pub use self::ids::{RequestKey, WorkerId};
pub use self::snapshot::WorkerResult;
pub use self::state::WorkerState;
pub use self::worker::Worker;
