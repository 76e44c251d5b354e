//! WorkerResult - 終端スナップショット
//!
//! 終端状態に達したワーカーの不変な投影です。state と value または fault を
//! そのまま保持し、別のリスナーへ何度でも再配送（replay）できます。
//! serialize 可能なので、プロセス境界を越える転送にも使えます。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::errors::{Fault, WorkerLost};
use super::state::WorkerState;

/// Immutable record of a worker's final outcome.
///
/// Constructed once a worker reaches a terminal state. Redelivery is safe:
/// the snapshot never changes after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult<V> {
    state: WorkerState,
    value: Option<V>,
    fault: Option<Fault>,
    produced_at: DateTime<Utc>,
}

impl<V> WorkerResult<V> {
    /// 成功スナップショット
    pub fn succeeded(value: V) -> Self {
        Self {
            state: WorkerState::Succeeded,
            value: Some(value),
            fault: None,
            produced_at: Utc::now(),
        }
    }

    /// 失敗スナップショット
    pub fn failed(fault: Fault) -> Self {
        Self {
            state: WorkerState::Failed,
            value: None,
            fault: Some(fault),
            produced_at: Utc::now(),
        }
    }

    /// キャンセルスナップショット
    pub fn cancelled() -> Self {
        Self::of_state(WorkerState::Cancelled)
    }

    /// タスクが終端状態に達する前に消えた場合の合成失敗
    pub fn lost() -> Self {
        Self::failed(Fault::Failure(Arc::new(WorkerLost)))
    }

    /// value も fault も持たないスナップショット
    pub fn of_state(state: WorkerState) -> Self {
        Self {
            state,
            value: None,
            fault: None,
            produced_at: Utc::now(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// スナップショットが作られた時刻
    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }
}
