//! ValueSlot - 単一スロットのスレッド間ハンドオフ
//!
//! # 学習ポイント
//! - swap-and-check-previous による合体（coalescing）
//! - worker 側が速すぎても owner スレッドの callback が無制限に積まれない
//!
//! # 契約
//! - writer はワーカースレッド一つ、reader は owner スレッド一つ（タスクごと）
//! - `offer` が true を返したときだけ drain を一回スケジュールする
//!   （空→非空の遷移ごとにちょうど一回）
//! - 連続して offer された値は合体し、drain は常に最新値だけを観測する

use std::sync::Mutex;

/// Single-slot coalescing handoff cell.
///
/// The owner thread never observes a half-written value: the slot is
/// swapped as a whole, and `take` drains it atomically.
pub struct ValueSlot<V> {
    slot: Mutex<Option<V>>,
}

impl<V> ValueSlot<V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Put `value` into the slot, overwriting any pending value.
    ///
    /// Returns true when the slot was empty, meaning the caller must
    /// schedule exactly one drain on the owner thread. When false, a
    /// drain is already in flight and will pick up this value.
    pub fn offer(&self, value: V) -> bool {
        self.slot.lock().unwrap().replace(value).is_none()
    }

    /// Drain the latest pending value, leaving the slot empty.
    pub fn take(&self) -> Option<V> {
        self.slot.lock().unwrap().take()
    }
}

impl<V> Default for ValueSlot<V> {
    fn default() -> Self {
        Self::new()
    }
}
