//! EventLoop - owner スレッドのイベントループ
//!
//! # 学習ポイント
//! - unbounded mpsc による非ブロッキング post と FIFO 配送
//! - current-thread ランタイムでの blocking drain
//! - `tokio::time::timeout` による上限付きの待機
//!
//! EventLoop は owner スレッド上で作成し、同じスレッドで回します。
//! `LoopHandle` は clone 可能で、どのスレッドからでも post できます。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::ports::main_thread::{Callback, MainThread};

/// Cooperative single-threaded event loop driving the owner thread.
pub struct EventLoop {
    rt: tokio::runtime::Runtime,
    rx: mpsc::UnboundedReceiver<Callback>,
    handle: Arc<LoopHandle>,
}

/// Cloneable posting handle of an [`EventLoop`].
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<Callback>,
    owner: ThreadId,
    shutdown: AtomicBool,
}

impl MainThread for LoopHandle {
    fn post(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            // ループ終了後の post は握り潰さず記録だけする
            warn!("owner loop is gone; dropping posted callback");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl LoopHandle {
    /// `run` 中のループに停止を要求する
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // 待機中の recv を起こすための空 callback
        let _ = self.tx.send(Box::new(|| {}));
    }
}

impl EventLoop {
    /// Create the loop on the owner thread. `run`/`turn` must be called on
    /// the same thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to build the owner-loop runtime");
        Self {
            rt,
            rx,
            handle: Arc::new(LoopHandle {
                tx,
                owner: thread::current().id(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> Arc<LoopHandle> {
        self.handle.clone()
    }

    /// MainThread port としての handle
    pub fn main_thread(&self) -> Arc<dyn MainThread> {
        self.handle.clone()
    }

    /// いま積まれている callback をすべて実行する（テスト用の決定的ポンプ）
    ///
    /// 実行した callback の数を返します。
    pub fn turn(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            executed += 1;
        }
        executed
    }

    /// 停止が要求されるまで callback を配送し続ける
    pub fn run(&mut self) {
        let Self { rt, rx, handle } = self;
        rt.block_on(async {
            while !handle.shutdown.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Some(callback) => callback(),
                    None => break,
                }
            }
        });
    }

    /// `cond` が真になるまで配送する。`timeout` までに満たされなければ false。
    pub fn run_until(&mut self, timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        if cond() {
            return true;
        }
        let Self { rt, rx, .. } = self;
        rt.block_on(async {
            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Some(callback) => callback(),
                        None => return false,
                    }
                    if cond() {
                        return true;
                    }
                }
            })
            .await
            .unwrap_or(false)
        })
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
