//! MainThread port - owner スレッドスケジューラの抽象化
//!
//! コアがホストのイベントループに要求する唯一の能力です:
//! 「callback を後で owner スレッドで実行する」と
//! 「現在のスレッドが owner スレッドかを判定する」。
//!
//! post された callback 同士の FIFO 配送は実装側が保証します。

/// owner スレッドへ post する callback
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler of the single owner thread.
///
/// Posting never blocks. Delivery order between posted callbacks is FIFO.
pub trait MainThread: Send + Sync {
    /// Run `callback` later on the owner thread.
    fn post(&self, callback: Callback);

    /// Is the current thread the owner thread?
    fn is_current(&self) -> bool;
}
