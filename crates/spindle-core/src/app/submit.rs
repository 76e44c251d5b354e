//! Async - ワーク提出と fluent なコールバック登録
//!
//! Task を組み立ててエグゼキュータへ提出し、4 つのコールバックスロットを
//! fluent に登録する表面です。終端遷移でスロットの中身を取り出し、
//! スナップショット経由で共有ディスパッチャを駆動します。
//!
//! # 使用例
//! ```ignore
//! let async_work = Async::execute(main_thread, |_ctx| Ok(6 * 7))
//!     .on_succeeded(|value| {
//!         println!("got {value}");
//!         Ok(())
//!     })
//!     .on_completed(|state| {
//!         println!("finished as {state:?}");
//!         Ok(())
//!     });
//! ```
//!
//! スロットごとにハンドラは最大一つで、新しい登録が前の登録を黙って
//! 置き換えます。値なし成功ハンドラと値受け取り成功ハンドラは排他です。

use std::sync::{Arc, Mutex};

use crate::app::config;
use crate::app::dispatch::{HandlerOutcome, Handlers, SuccessHandler};
use crate::app::task::{Task, WorkContext};
use crate::domain::errors::{BoxError, FailureCause};
use crate::domain::state::WorkerState;
use crate::ports::executor::Executor;
use crate::ports::main_thread::MainThread;

/// One background unit of work plus its callback slots.
pub struct Async<V: Clone + Send + 'static> {
    task: Task<V>,
    slots: Arc<Mutex<Handlers<V>>>,
}

impl<V: Clone + Send + 'static> Async<V> {
    /// Submit `work` to the process-wide executor.
    pub fn execute<F>(main: Arc<dyn MainThread>, work: F) -> Self
    where
        F: FnOnce(&WorkContext<V>) -> Result<V, BoxError> + Send + 'static,
    {
        Self::execute_with(&config::executor(), main, work)
    }

    /// Submit `work` to an explicit executor.
    pub fn execute_with<F>(executor: &Arc<dyn Executor>, main: Arc<dyn MainThread>, work: F) -> Self
    where
        F: FnOnce(&WorkContext<V>) -> Result<V, BoxError> + Send + 'static,
    {
        let task = Task::new(main, work);
        let slots = Arc::new(Mutex::new(Handlers::default()));

        // 終端フック: スナップショットを取り、スロットを空にして一回だけ配送する
        let hook_slots = slots.clone();
        let weak = task.downgrade();
        task.set_state_hook(move |state| {
            if !state.is_terminal() {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let handlers = hook_slots.lock().unwrap().take();
            inner.snapshot().dispatch(handlers);
        });

        executor.execute(task.job());
        Self { task, slots }
    }

    /// 値受け取りの成功ハンドラを登録（値なし変種は消える）
    pub fn on_succeeded<F>(self, handler: F) -> Self
    where
        F: FnOnce(&V) -> HandlerOutcome + Send + 'static,
    {
        self.slots.lock().unwrap().on_succeeded = SuccessHandler::WithValue(Box::new(handler));
        self
    }

    /// 値なしの成功ハンドラを登録（値受け取り変種は消える）
    pub fn on_succeeded_run<F>(self, handler: F) -> Self
    where
        F: FnOnce() -> HandlerOutcome + Send + 'static,
    {
        self.slots.lock().unwrap().on_succeeded = SuccessHandler::Plain(Box::new(handler));
        self
    }

    pub fn on_failed<F>(self, handler: F) -> Self
    where
        F: FnOnce(&FailureCause) -> HandlerOutcome + Send + 'static,
    {
        self.slots.lock().unwrap().on_failed = Some(Box::new(handler));
        self
    }

    pub fn on_cancelled<F>(self, handler: F) -> Self
    where
        F: FnOnce() -> HandlerOutcome + Send + 'static,
    {
        self.slots.lock().unwrap().on_cancelled = Some(Box::new(handler));
        self
    }

    pub fn on_completed<F>(self, handler: F) -> Self
    where
        F: FnOnce(WorkerState) -> HandlerOutcome + Send + 'static,
    {
        self.slots.lock().unwrap().on_completed = Some(Box::new(handler));
        self
    }

    /// Forward to the underlying task's cancel.
    pub fn cancel(&self) {
        use crate::domain::worker::Worker;
        self.task.cancel();
    }

    /// The underlying task (owner-thread-confined accessors).
    pub fn task(&self) -> &Task<V> {
        &self.task
    }
}
