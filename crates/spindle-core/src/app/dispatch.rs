//! Completion dispatch - 終端結果のハンドラ呼び出し
//!
//! Async の終端フックとスナップショット replay の両方が同じアルゴリズムを
//! 通ります:
//!
//! 1. 結果に対応するハンドラを呼ぶ（Succeeded は成功ハンドラ、Failed は
//!    失敗ハンドラ。失敗ハンドラ未登録なら fault を pending に積む。
//!    Cancelled のハンドラは任意）
//! 2. ハンドラ自身の失敗は pending exception になる（最初の一つが勝つ）
//! 3. 終端結果なら completion ハンドラを必ず呼ぶ
//! 4. pending が残っていれば呼び出しスレッドの uncaught ハンドラへ渡す。
//!    未設定なら panic する。黙って握り潰すことはない
//!
//! 回復不能フォールト（Fault::Panic）はステップ 1 の前に owner スレッドで
//! 再送出され、completion も含めて何も呼ばれません。

use std::cell::RefCell;
use std::panic::resume_unwind;

use tracing::debug;

use crate::domain::errors::{BoxError, FailureCause, Fault};
use crate::domain::snapshot::WorkerResult;
use crate::domain::state::WorkerState;

/// ハンドラの戻り。Err はステップ 2 の pending exception になります。
pub type HandlerOutcome = Result<(), BoxError>;

/// 成功ハンドラの 2 変種。値なし（Plain）と値受け取り（WithValue）は
/// 排他で、どちらかを設定するともう一方は構造的に消えます。
pub enum SuccessHandler<V> {
    None,
    Plain(Box<dyn FnOnce() -> HandlerOutcome + Send + 'static>),
    WithValue(Box<dyn FnOnce(&V) -> HandlerOutcome + Send + 'static>),
}

impl<V> Default for SuccessHandler<V> {
    fn default() -> Self {
        SuccessHandler::None
    }
}

pub type FailureHandler = Box<dyn FnOnce(&FailureCause) -> HandlerOutcome + Send + 'static>;
pub type CancelHandler = Box<dyn FnOnce() -> HandlerOutcome + Send + 'static>;
pub type CompleteHandler = Box<dyn FnOnce(WorkerState) -> HandlerOutcome + Send + 'static>;

/// The four callback slots. Each slot holds at most one handler.
pub struct Handlers<V> {
    pub on_succeeded: SuccessHandler<V>,
    pub on_failed: Option<FailureHandler>,
    pub on_cancelled: Option<CancelHandler>,
    pub on_completed: Option<CompleteHandler>,
}

impl<V> Default for Handlers<V> {
    fn default() -> Self {
        Self {
            on_succeeded: SuccessHandler::None,
            on_failed: None,
            on_cancelled: None,
            on_completed: None,
        }
    }
}

impl<V> Handlers<V> {
    /// スロットの中身を取り出し、空のスロットを残す（ちょうど一回の配送用）
    pub fn take(&mut self) -> Handlers<V> {
        std::mem::take(self)
    }
}

/// ディスパッチで表面化する失敗の分類
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// 失敗ハンドラが未登録のまま終わったタスクの失敗
    #[error("task failed with no failure handler registered: {0}")]
    Unhandled(FailureCause),

    /// 登録されたハンドラ自身が失敗した
    #[error("callback raised: {0}")]
    Callback(BoxError),
}

impl DispatchError {
    /// 元の失敗原因
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync) {
        match self {
            DispatchError::Unhandled(cause) => cause.as_ref(),
            DispatchError::Callback(error) => error.as_ref(),
        }
    }
}

thread_local! {
    static UNCAUGHT: RefCell<Option<UncaughtHandler>> = const { RefCell::new(None) };
}

pub type UncaughtHandler = Box<dyn FnMut(DispatchError) + 'static>;

/// このスレッドの uncaught ハンドラを設定（スレッドローカル）
pub fn set_uncaught_handler(handler: impl FnMut(DispatchError) + 'static) {
    UNCAUGHT.with(|slot| *slot.borrow_mut() = Some(Box::new(handler)));
}

pub fn clear_uncaught_handler() {
    UNCAUGHT.with(|slot| *slot.borrow_mut() = None);
}

/// pending exception の最終配送。ハンドラがなければ panic します。
fn raise(error: DispatchError) {
    debug!(%error, "dispatch raised");
    let handler = UNCAUGHT.with(|slot| slot.borrow_mut().take());
    match handler {
        Some(mut handler) => {
            handler(error);
            // ハンドラを戻す（呼び出し中に新しく設定されていなければ）
            UNCAUGHT.with(|slot| {
                let mut slot = slot.borrow_mut();
                if slot.is_none() {
                    *slot = Some(handler);
                }
            });
        }
        None => std::panic::panic_any(error),
    }
}

impl<V> WorkerResult<V> {
    /// Invoke `handlers` for this outcome, in order, exactly once each.
    ///
    /// Non-terminal snapshots dispatch nothing, including the completion
    /// handler. An unrecoverable fault is re-raised before any handler runs.
    pub fn dispatch(&self, handlers: Handlers<V>) {
        let Handlers {
            on_succeeded,
            on_failed,
            on_cancelled,
            on_completed,
        } = handlers;

        let state = self.state();
        let mut pending: Option<DispatchError> = None;

        match state {
            WorkerState::Succeeded => match on_succeeded {
                SuccessHandler::Plain(handler) => {
                    if let Err(error) = handler() {
                        pending = Some(DispatchError::Callback(error));
                    }
                }
                SuccessHandler::WithValue(handler) => {
                    if let Some(value) = self.value()
                        && let Err(error) = handler(value)
                    {
                        pending = Some(DispatchError::Callback(error));
                    }
                }
                SuccessHandler::None => {}
            },
            WorkerState::Failed => match self.fault() {
                Some(Fault::Panic(message)) => {
                    // 回復不能フォールトは捕捉しない。completion も飛ばして再送出
                    resume_unwind(Box::new(message.clone()));
                }
                Some(Fault::Failure(cause)) => match on_failed {
                    Some(handler) => {
                        if let Err(error) = handler(cause) {
                            pending = Some(DispatchError::Callback(error));
                        }
                    }
                    None => pending = Some(DispatchError::Unhandled(cause.clone())),
                },
                None => {}
            },
            WorkerState::Cancelled => {
                if let Some(handler) = on_cancelled
                    && let Err(error) = handler()
                {
                    pending = Some(DispatchError::Callback(error));
                }
            }
            // 非終端は何も配送しない
            _ => return,
        }

        if let Some(handler) = on_completed
            && let Err(error) = handler(state)
            && pending.is_none()
        {
            pending = Some(DispatchError::Callback(error));
        }

        if let Some(error) = pending {
            raise(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::Fault;
    use std::cell::RefCell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("bad")]
    struct Bad;

    fn order_log() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let push = move |entry: &str| sink.lock().unwrap().push(entry.to_string());
        (log, push)
    }

    fn collected_uncaught() -> Rc<RefCell<Vec<DispatchError>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        set_uncaught_handler(move |error| sink.borrow_mut().push(error));
        seen
    }

    #[test]
    fn success_then_completion_in_order_exactly_once() {
        let (log, push) = order_log();
        let result = WorkerResult::succeeded(42);

        let on_value = push.clone();
        let on_done = push.clone();
        result.dispatch(Handlers {
            on_succeeded: SuccessHandler::WithValue(Box::new(move |value| {
                on_value(&format!("succeeded({value})"));
                Ok(())
            })),
            on_completed: Some(Box::new(move |state| {
                on_done(&format!("completed({state:?})"));
                Ok(())
            })),
            ..Default::default()
        });

        assert_eq!(
            *log.lock().unwrap(),
            vec!["succeeded(42)", "completed(Succeeded)"]
        );
    }

    #[test]
    fn failing_success_handler_still_runs_completion() {
        let (log, push) = order_log();
        let seen = collected_uncaught();
        let result = WorkerResult::succeeded(1);

        let on_done = push.clone();
        result.dispatch(Handlers {
            on_succeeded: SuccessHandler::Plain(Box::new(|| Err(Bad.into()))),
            on_completed: Some(Box::new(move |state| {
                on_done(&format!("completed({state:?})"));
                Ok(())
            })),
            ..Default::default()
        });
        clear_uncaught_handler();

        assert_eq!(*log.lock().unwrap(), vec!["completed(Succeeded)"]);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], DispatchError::Callback(_)));
        assert_eq!(seen[0].cause().to_string(), "bad");
    }

    #[test]
    fn unhandled_failure_goes_to_the_uncaught_handler() {
        let seen = collected_uncaught();
        let completed = Arc::new(Mutex::new(None));
        let result: WorkerResult<i32> = WorkerResult::failed(Fault::failure(Bad));

        let state_sink = completed.clone();
        result.dispatch(Handlers {
            on_completed: Some(Box::new(move |state| {
                *state_sink.lock().unwrap() = Some(state);
                Ok(())
            })),
            ..Default::default()
        });
        clear_uncaught_handler();

        // completion は通常の失敗では必ず呼ばれる
        assert_eq!(*completed.lock().unwrap(), Some(WorkerState::Failed));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], DispatchError::Unhandled(_)));
        assert_eq!(seen[0].cause().to_string(), "bad");
    }

    #[test]
    fn handled_failure_does_not_reach_the_uncaught_handler() {
        let seen = collected_uncaught();
        let result: WorkerResult<i32> = WorkerResult::failed(Fault::failure(Bad));
        let handled = Arc::new(Mutex::new(String::new()));

        let sink = handled.clone();
        result.dispatch(Handlers {
            on_failed: Some(Box::new(move |cause| {
                *sink.lock().unwrap() = cause.to_string();
                Ok(())
            })),
            ..Default::default()
        });
        clear_uncaught_handler();

        assert_eq!(*handled.lock().unwrap(), "bad");
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn first_pending_exception_wins() {
        let seen = collected_uncaught();
        let result = WorkerResult::succeeded(1);

        #[derive(Debug, thiserror::Error)]
        #[error("second")]
        struct Second;

        result.dispatch(Handlers {
            on_succeeded: SuccessHandler::Plain(Box::new(|| Err(Bad.into()))),
            on_completed: Some(Box::new(|_| Err(Second.into()))),
            ..Default::default()
        });
        clear_uncaught_handler();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].cause().to_string(), "bad");
    }

    #[test]
    fn cancelled_without_handler_fires_completion_only() {
        let (log, push) = order_log();
        let result: WorkerResult<i32> = WorkerResult::cancelled();

        let on_done = push.clone();
        result.dispatch(Handlers {
            on_completed: Some(Box::new(move |state| {
                on_done(&format!("completed({state:?})"));
                Ok(())
            })),
            ..Default::default()
        });

        assert_eq!(*log.lock().unwrap(), vec!["completed(Cancelled)"]);
    }

    #[test]
    fn non_terminal_dispatches_nothing() {
        let (log, push) = order_log();
        let result: WorkerResult<i32> = WorkerResult::of_state(WorkerState::Running);

        let on_done = push.clone();
        result.dispatch(Handlers {
            on_succeeded: SuccessHandler::Plain(Box::new(move || {
                push("succeeded");
                Ok(())
            })),
            on_completed: Some(Box::new(move |_| {
                on_done("completed");
                Ok(())
            })),
            ..Default::default()
        });

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn panic_fault_is_reraised_and_skips_completion() {
        let completed = Arc::new(Mutex::new(false));
        let result: WorkerResult<i32> = WorkerResult::failed(Fault::Panic("boom".to_string()));

        let sink = completed.clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            result.dispatch(Handlers {
                on_failed: Some(Box::new(|_| Ok(()))),
                on_completed: Some(Box::new(move |_| {
                    *sink.lock().unwrap() = true;
                    Ok(())
                })),
                ..Default::default()
            });
        }));

        let payload = outcome.unwrap_err();
        assert_eq!(*payload.downcast::<String>().unwrap(), "boom");
        assert!(!*completed.lock().unwrap());
    }

    #[test]
    fn no_uncaught_handler_panics_with_the_dispatch_error() {
        clear_uncaught_handler();
        let result: WorkerResult<i32> = WorkerResult::failed(Fault::failure(Bad));

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            result.dispatch(Handlers::default());
        }));

        let payload = outcome.unwrap_err();
        let error = payload.downcast::<DispatchError>().unwrap();
        assert!(matches!(*error, DispatchError::Unhandled(_)));
    }

    #[test]
    fn snapshot_replays_identically_to_two_listeners() {
        let observations = Arc::new(Mutex::new(Vec::new()));
        let result: WorkerResult<i32> = WorkerResult::failed(Fault::failure(Bad));

        for _ in 0..2 {
            let sink = observations.clone();
            result.dispatch(Handlers {
                on_failed: Some(Box::new(move |cause| {
                    sink.lock().unwrap().push(cause.to_string());
                    Ok(())
                })),
                ..Default::default()
            });
        }

        assert_eq!(*observations.lock().unwrap(), vec!["bad", "bad"]);
    }
}
