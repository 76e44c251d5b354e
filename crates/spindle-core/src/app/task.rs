//! Task - ステートマシンとユニットオブワークの結合
//!
//! ワークはワーカースレッドで実行されますが、状態・値・失敗のすべての
//! 変化は owner スレッドだけで観測・適用されます。ワーカースレッドが
//! 直接書くのはハンドオフスロット（ValueSlot）だけです。
//!
//! # キャンセルと自然完了の競合
//! 唯一の同期ルールは「最初の終端書き込みが勝つ」です。
//! `phase` (PENDING/DONE/CANCELLED) への claim がその一点で、
//! 負けた側は結果を丸ごと破棄します。owner スレッド側では
//! Cancelled の終端吸収（set_state の no-op）が二重の防壁になります。

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::app::handoff::ValueSlot;
use crate::domain::errors::{BoxError, Fault};
use crate::domain::ids::WorkerId;
use crate::domain::snapshot::WorkerResult;
use crate::domain::state::WorkerState;
use crate::domain::worker::Worker;
use crate::ports::executor::Job;
use crate::ports::main_thread::MainThread;

const PHASE_PENDING: u8 = 0;
const PHASE_DONE: u8 = 1;
const PHASE_CANCELLED: u8 = 2;

/// ワークに渡す協調キャンセルのフラグ
///
/// `cancel()` がセットし、長時間走るワークは `is_cancelled()` をポーリング
/// して早期に抜けます。強制停止はしません。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// ワーク本体がワーカースレッドから使える操作
///
/// キャンセルのポーリングと途中経過の publish だけを公開します。
/// 状態の読み取りは owner スレッド専用なのでここにはありません。
pub struct WorkContext<V> {
    token: CancelToken,
    inner: Weak<TaskInner<V>>,
}

impl<V: Send + 'static> WorkContext<V> {
    /// キャンセルが要求されたか
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 途中経過の値を owner スレッドへ届ける（最新値だけが観測されます）
    pub fn update_value(&self, value: V) {
        if let Some(inner) = self.inner.upgrade() {
            inner.update_value(value);
        }
    }
}

/// ワーク本体。ワーカースレッドで一度だけ呼ばれます。
pub type Work<V> = Box<dyn FnOnce(&WorkContext<V>) -> Result<V, BoxError> + Send + 'static>;

/// 状態エントリーフック。owner スレッドで、遷移ごとに一回呼ばれます。
/// Ready にはエントリーフックがありません。
pub(crate) type StateHook = Box<dyn FnMut(WorkerState) + Send + 'static>;

/// owner スレッド専有の状態。Mutex は越境アクセスの検出を check_thread に
/// 任せた上での内部可変性として使っています（競合はしない前提）。
struct Confined<V> {
    state: WorkerState,
    running: bool,
    value: Option<V>,
    fault: Option<Fault>,
}

pub(crate) struct TaskInner<V> {
    id: WorkerId,
    main: Arc<dyn MainThread>,
    started: AtomicBool,
    phase: AtomicU8,
    token: CancelToken,
    slot: ValueSlot<V>,
    confined: Mutex<Confined<V>>,
    hook: Mutex<Option<StateHook>>,
    work: Mutex<Option<Work<V>>>,
}

/// Owner-thread-confined handle of one background unit of work.
///
/// Cloning is cheap and shares the same underlying worker.
pub struct Task<V> {
    inner: Arc<TaskInner<V>>,
}

impl<V> Clone for Task<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Send + 'static> Task<V> {
    /// Create a task around `work`. Nothing runs until the job returned by
    /// [`Task::job`] is handed to an executor.
    pub fn new<F>(main: Arc<dyn MainThread>, work: F) -> Self
    where
        F: FnOnce(&WorkContext<V>) -> Result<V, BoxError> + Send + 'static,
    {
        Self {
            inner: Arc::new(TaskInner {
                id: WorkerId::generate(),
                main,
                started: AtomicBool::new(false),
                phase: AtomicU8::new(PHASE_PENDING),
                token: CancelToken::default(),
                slot: ValueSlot::new(),
                confined: Mutex::new(Confined {
                    state: WorkerState::Ready,
                    running: false,
                    value: None,
                    fault: None,
                }),
                hook: Mutex::new(None),
                work: Mutex::new(Some(Box::new(work))),
            }),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    /// 状態エントリーフックを設定（最新の登録が勝ち）
    ///
    /// ワークの提出前に設定してください。提出後の設定は遷移を取りこぼします。
    pub fn set_state_hook(&self, hook: impl FnMut(WorkerState) + Send + 'static) {
        *self.inner.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// The executor-submittable job driving this task's lifecycle.
    ///
    /// The first call takes the unit of work; a second job is a no-op.
    pub fn job(&self) -> Job {
        let inner = self.inner.clone();
        Box::new(move || inner.run_work())
    }

    /// 途中経過の値を届ける。owner スレッドから呼ばれた場合は直接適用、
    /// それ以外はスロット経由で合体します。
    pub fn update_value(&self, value: V) {
        self.inner.update_value(value);
    }

    pub(crate) fn downgrade(&self) -> Weak<TaskInner<V>> {
        Arc::downgrade(&self.inner)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<TaskInner<V>> {
        &self.inner
    }
}

impl<V: Clone + Send + 'static> Worker<V> for Task<V> {
    fn state(&self) -> WorkerState {
        self.inner.check_thread();
        self.inner.confined.lock().unwrap().state
    }

    fn value(&self) -> Option<V> {
        self.inner.check_thread();
        self.inner.confined.lock().unwrap().value.clone()
    }

    fn fault(&self) -> Option<Fault> {
        self.inner.check_thread();
        self.inner.confined.lock().unwrap().fault.clone()
    }

    fn is_running(&self) -> bool {
        self.inner.check_thread();
        self.inner.confined.lock().unwrap().running
    }

    fn cancel(&self) -> bool {
        self.inner.cancel()
    }
}

impl<V: Send + 'static> TaskInner<V> {
    /// started 済みタスクへの owner スレッド外アクセスは即座に落とす
    fn check_thread(&self) {
        if self.started.load(Ordering::SeqCst) && !self.main.is_current() {
            panic!("Task must only be used from the owner thread");
        }
    }

    /// Record `next`, recompute the running flag and fire the entry hook.
    /// No-op once the state is Cancelled.
    fn set_state(&self, next: WorkerState) {
        self.check_thread();
        {
            let mut confined = self.confined.lock().unwrap();
            if confined.state == WorkerState::Cancelled {
                trace!(worker = %self.id, ?next, "transition absorbed by Cancelled");
                return;
            }
            confined.state = next;
            confined.running = next.is_running();
        }
        trace!(worker = %self.id, state = ?next, "state entered");
        if next != WorkerState::Ready
            && let Some(hook) = self.hook.lock().unwrap().as_mut()
        {
            hook(next);
        }
    }

    fn set_fault(&self, fault: Fault) {
        self.confined.lock().unwrap().fault = Some(fault);
    }

    /// owner スレッド上で値を直接適用
    fn apply_value(&self, value: V) {
        self.confined.lock().unwrap().value = Some(value);
    }

    fn update_value(self: &Arc<Self>, value: V) {
        if self.main.is_current() {
            self.apply_value(value);
        } else if self.slot.offer(value) {
            // 空→非空の遷移のときだけ drain を一回だけ予約する
            let inner = self.clone();
            self.main.post(Box::new(move || {
                if let Some(latest) = inner.slot.take() {
                    inner.apply_value(latest);
                }
            }));
        }
    }

    fn claim_done(&self) -> bool {
        self.phase
            .compare_exchange(
                PHASE_PENDING,
                PHASE_DONE,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub(crate) fn cancel(self: &Arc<Self>) -> bool {
        let claimed = self
            .phase
            .compare_exchange(
                PHASE_PENDING,
                PHASE_CANCELLED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !claimed {
            return false;
        }

        self.token.set();
        debug!(worker = %self.id, "cancellation requested");
        if self.main.is_current() {
            self.set_state(WorkerState::Cancelled);
        } else {
            let inner = self.clone();
            self.main.post(Box::new(move || {
                inner.set_state(WorkerState::Cancelled);
            }));
        }
        true
    }

    /// Lifecycle driver, run on a worker thread by the executor.
    fn run_work(self: Arc<Self>) {
        let work = self.work.lock().unwrap().take();
        let Some(work) = work else {
            debug!(worker = %self.id, "job invoked twice; ignoring");
            return;
        };

        // 実行前にキャンセル済みならワークごと飛ばす
        if self.phase.load(Ordering::SeqCst) == PHASE_CANCELLED {
            trace!(worker = %self.id, "cancelled before start");
            return;
        }

        self.started.store(true, Ordering::SeqCst);
        let inner = self.clone();
        self.main.post(Box::new(move || {
            // Running が Scheduled より先に観測されることはない
            inner.set_state(WorkerState::Scheduled);
            inner.set_state(WorkerState::Running);
        }));

        let context = WorkContext {
            token: self.token.clone(),
            inner: Arc::downgrade(&self),
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| work(&context)));

        match outcome {
            Ok(Ok(value)) => {
                if self.claim_done() {
                    let inner = self.clone();
                    self.main.post(Box::new(move || {
                        inner.apply_value(value);
                        inner.set_state(WorkerState::Succeeded);
                    }));
                } else {
                    trace!(worker = %self.id, "result suppressed after cancellation");
                }
            }
            Ok(Err(error)) => {
                if self.claim_done() {
                    let fault = Fault::Failure(Arc::from(error));
                    let inner = self.clone();
                    self.main.post(Box::new(move || {
                        inner.set_fault(fault);
                        inner.set_state(WorkerState::Failed);
                    }));
                } else {
                    trace!(worker = %self.id, "failure suppressed after cancellation");
                }
            }
            Err(payload) => {
                if self.claim_done() {
                    let fault = Fault::Panic(panic_message(payload));
                    let inner = self.clone();
                    self.main.post(Box::new(move || {
                        inner.set_fault(fault);
                        inner.set_state(WorkerState::Failed);
                    }));
                }
            }
        }
    }

    /// 終端状態の不変スナップショットを作る（owner スレッド限定）
    pub(crate) fn snapshot(&self) -> WorkerResult<V>
    where
        V: Clone,
    {
        self.check_thread();
        let confined = self.confined.lock().unwrap();
        match confined.state {
            WorkerState::Succeeded => match confined.value.clone() {
                Some(value) => WorkerResult::succeeded(value),
                None => WorkerResult::of_state(WorkerState::Succeeded),
            },
            WorkerState::Failed => match confined.fault.clone() {
                Some(fault) => WorkerResult::failed(fault),
                None => WorkerResult::of_state(WorkerState::Failed),
            },
            other => WorkerResult::of_state(other),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::event_loop::EventLoop;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    fn recorded(task: &Task<i32>) -> Arc<Mutex<Vec<WorkerState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        task.set_state_hook(move |state| sink.lock().unwrap().push(state));
        seen
    }

    #[test]
    fn test_success_path_transitions_in_order() {
        let mut owner = EventLoop::new();
        let task = Task::new(owner.main_thread(), |_ctx| Ok(42));
        let seen = recorded(&task);

        thread::spawn(task.job()).join().unwrap();
        owner.turn();

        assert_eq!(task.state(), WorkerState::Succeeded);
        assert_eq!(task.value(), Some(42));
        assert!(task.fault().is_none());
        assert!(!task.is_running());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                WorkerState::Scheduled,
                WorkerState::Running,
                WorkerState::Succeeded
            ]
        );
    }

    #[test]
    fn test_failure_captures_fault() {
        #[derive(Debug, thiserror::Error)]
        #[error("bad")]
        struct Bad;

        let mut owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |_ctx| Err(Bad.into()));
        let seen = recorded(&task);

        thread::spawn(task.job()).join().unwrap();
        owner.turn();

        assert_eq!(task.state(), WorkerState::Failed);
        assert!(task.value().is_none());
        assert_eq!(task.fault().unwrap().message(), "bad");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                WorkerState::Scheduled,
                WorkerState::Running,
                WorkerState::Failed
            ]
        );
    }

    #[test]
    fn test_panic_becomes_panic_fault() {
        let mut owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |_ctx| panic!("boom"));

        thread::spawn(task.job()).join().unwrap();
        owner.turn();

        assert_eq!(task.state(), WorkerState::Failed);
        let fault = task.fault().unwrap();
        assert!(fault.is_panic());
        assert_eq!(fault.message(), "boom");
    }

    #[test]
    fn test_cancel_before_start_skips_the_work() {
        let mut owner = EventLoop::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task: Task<i32> = Task::new(owner.main_thread(), move |_ctx| {
            flag.store(true, Ordering::SeqCst);
            Ok(1)
        });
        let seen = recorded(&task);

        assert!(task.cancel());
        thread::spawn(task.job()).join().unwrap();
        owner.turn();

        assert_eq!(task.state(), WorkerState::Cancelled);
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(*seen.lock().unwrap(), vec![WorkerState::Cancelled]);
    }

    #[test]
    fn test_cancel_while_running_wins_and_suppresses_the_result() {
        let mut owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |ctx| {
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(7)
        });
        let seen = recorded(&task);

        let worker = thread::spawn(task.job());
        // ワークがトークンを見ている間にキャンセルする
        thread::sleep(Duration::from_millis(30));
        assert!(task.cancel());
        worker.join().unwrap();
        owner.turn();

        assert_eq!(task.state(), WorkerState::Cancelled);
        assert!(task.value().is_none());
        let terminal: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .copied()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![WorkerState::Cancelled]);
    }

    #[test]
    fn test_natural_completion_beats_a_late_cancel() {
        let mut owner = EventLoop::new();
        let task = Task::new(owner.main_thread(), |_ctx| Ok(5));

        thread::spawn(task.job()).join().unwrap();
        assert!(!task.cancel());
        owner.turn();

        assert_eq!(task.state(), WorkerState::Succeeded);
        assert_eq!(task.value(), Some(5));
    }

    #[test]
    fn test_cancelled_absorbs_later_transitions() {
        let owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |_ctx| Ok(1));
        let seen = recorded(&task);

        task.inner().set_state(WorkerState::Cancelled);
        task.inner().set_state(WorkerState::Succeeded);
        task.inner().set_state(WorkerState::Running);

        assert_eq!(task.state(), WorkerState::Cancelled);
        assert_eq!(*seen.lock().unwrap(), vec![WorkerState::Cancelled]);
    }

    #[test]
    fn test_second_cancel_returns_false() {
        let owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |_ctx| Ok(1));

        assert!(task.cancel());
        assert!(!task.cancel());
    }

    #[test]
    fn test_accessor_off_owner_thread_panics_after_start() {
        let mut owner = EventLoop::new();
        let task = Task::new(owner.main_thread(), |_ctx| Ok(1));

        thread::spawn(task.job()).join().unwrap();
        owner.turn();
        assert_eq!(task.state(), WorkerState::Succeeded);

        let foreign = task.clone();
        let result = thread::spawn(move || foreign.state()).join();
        assert!(result.is_err());
    }

    #[test]
    fn test_update_value_coalesces_to_the_latest() {
        let mut owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |_ctx| Ok(0));

        let publisher = task.clone();
        thread::spawn(move || {
            publisher.update_value(1);
            publisher.update_value(2);
        })
        .join()
        .unwrap();

        // drain は一回だけ積まれている
        assert_eq!(owner.turn(), 1);
        assert_eq!(task.value(), Some(2));
    }

    #[test]
    fn test_update_value_from_work_reports_progress() {
        let mut owner = EventLoop::new();
        let task: Task<i32> = Task::new(owner.main_thread(), |ctx| {
            ctx.update_value(50);
            Ok(100)
        });

        thread::spawn(task.job()).join().unwrap();
        owner.turn();

        // 最終値が途中経過を上書きする
        assert_eq!(task.state(), WorkerState::Succeeded);
        assert_eq!(task.value(), Some(100));
    }
}
