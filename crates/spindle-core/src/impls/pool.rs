//! CachedPool - 動的に伸びるワーカースレッドプール
//!
//! # 実装詳細
//! - Mutex + Condvar による blocking なジョブ受け渡し
//! - アイドルワーカーがいなければ factory 経由で新しいスレッドを起こす
//! - アイドルワーカーは keep-alive（既定 60 秒）まで待ってから終了する
//! - プールのハンドルを drop するとアイドルワーカーは止まる
//!
//! デーモンスレッド相当の性質（プロセス終了を妨げない）は、ワーカーを
//! detach したまま join しないことで得ています。

use std::collections::VecDeque;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::ports::executor::{Executor, Job, ThreadFactory};

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// 観測用のプールカウンタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    /// 生きているワーカースレッド数
    pub live: usize,
    /// そのうちジョブ待ちの数
    pub idle: usize,
    /// まだ取られていないジョブ数
    pub queued: usize,
}

struct PoolState {
    queue: VecDeque<Job>,
    live: usize,
    idle: usize,
    spawned: u64,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Dynamically-sized worker pool with idle keep-alive.
pub struct CachedPool {
    inner: Arc<PoolInner>,
    factory: Arc<dyn ThreadFactory>,
    keep_alive: Duration,
}

impl CachedPool {
    pub fn new(factory: Arc<dyn ThreadFactory>) -> Self {
        Self::with_keep_alive(factory, DEFAULT_KEEP_ALIVE)
    }

    pub fn with_keep_alive(factory: Arc<dyn ThreadFactory>, keep_alive: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    live: 0,
                    idle: 0,
                    spawned: 0,
                    shutdown: false,
                }),
                available: Condvar::new(),
            }),
            factory,
            keep_alive,
        }
    }

    /// 観測用のカウンタを取得
    pub fn counts(&self) -> PoolCounts {
        let state = self.inner.state.lock().unwrap();
        PoolCounts {
            live: state.live,
            idle: state.idle,
            queued: state.queue.len(),
        }
    }
}

impl Executor for CachedPool {
    /// ジョブをキューに積み、アイドルワーカーがいなければ新しく起こす
    fn execute(&self, job: Job) {
        let mut state = self.inner.state.lock().unwrap();
        if state.shutdown {
            warn!("pool is shut down; dropping job");
            return;
        }

        state.queue.push_back(job);
        if state.idle > 0 {
            self.inner.available.notify_one();
            return;
        }

        state.live += 1;
        state.spawned += 1;
        let worker_index = state.spawned;
        drop(state);

        debug!(worker_index, "spawning pool worker");
        let inner = self.inner.clone();
        let keep_alive = self.keep_alive;
        let spawn_result = self
            .factory
            .spawn(Box::new(move || worker_loop(inner, keep_alive)));
        if let Err(spawn_error) = spawn_result {
            error!(%spawn_error, "failed to spawn pool worker");
            let mut state = self.inner.state.lock().unwrap();
            state.live -= 1;
        }
    }
}

impl Drop for CachedPool {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock().unwrap();
        state.shutdown = true;
        drop(state);
        self.inner.available.notify_all();
    }
}

fn worker_loop(inner: Arc<PoolInner>, keep_alive: Duration) {
    let mut state = inner.state.lock().unwrap();
    loop {
        if let Some(job) = state.queue.pop_front() {
            drop(state);
            // ジョブの panic でワーカーを道連れにしない
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!("job panicked on a pool worker");
            }
            state = inner.state.lock().unwrap();
            continue;
        }

        if state.shutdown {
            state.live -= 1;
            return;
        }

        state.idle += 1;
        let (guard, wait_result) = inner.available.wait_timeout(state, keep_alive).unwrap();
        state = guard;
        state.idle -= 1;

        // keep-alive 満了かつ仕事なしなら終了する
        if wait_result.timed_out() && state.queue.is_empty() {
            state.live -= 1;
            debug!("idle pool worker expired");
            return;
        }
    }
}

/// ワーカースレッドを "spindle-worker-N" の名前で起こす既定の factory
pub struct DefaultThreadFactory {
    counter: AtomicU64,
}

impl DefaultThreadFactory {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for DefaultThreadFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(&self, job: Job) -> io::Result<()> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        thread::Builder::new()
            .name(format!("spindle-worker-{n}"))
            .spawn(job)
            .map(|_join_handle| ())
    }
}
