//! InMemoryResultBoard - プロセス内の結果転送
//!
//! RequestKey ごとに終端スナップショットを保持し、リスナーへ owner スレッド
//! 経由で配送します。スナップショットは生成元タスクの破棄後も残るので、
//! 後から登録されたリスナーにも同じ結果を replay できます。
//!
//! # 実装詳細
//! - HashMap で key ごとに確定結果と待機リスナーを管理
//! - 配送は必ず `MainThread::post` 経由（リスナーは owner スレッドで走る）
//! - 配送はリスナー登録ごとにちょうど一回

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::domain::ids::RequestKey;
use crate::domain::snapshot::WorkerResult;
use crate::ports::main_thread::MainThread;
use crate::ports::result_transport::{ResultListener, ResultTransport};

struct BoardState<V> {
    results: HashMap<RequestKey, WorkerResult<V>>,
    waiting: HashMap<RequestKey, Vec<ResultListener<V>>>,
}

/// In-process result board keyed by [`RequestKey`].
pub struct InMemoryResultBoard<V> {
    main: Arc<dyn MainThread>,
    state: Mutex<BoardState<V>>,
}

impl<V: Clone + Send + 'static> InMemoryResultBoard<V> {
    pub fn new(main: Arc<dyn MainThread>) -> Self {
        Self {
            main,
            state: Mutex::new(BoardState {
                results: HashMap::new(),
                waiting: HashMap::new(),
            }),
        }
    }

    /// 生成元タスクが終端に達する前に消えたことを公表する
    pub fn publish_lost(&self, key: RequestKey) {
        self.publish(key, WorkerResult::lost());
    }

    fn deliver(&self, listener: ResultListener<V>, result: WorkerResult<V>) {
        self.main.post(Box::new(move || listener(result)));
    }
}

impl<V: Clone + Send + 'static> ResultTransport<V> for InMemoryResultBoard<V> {
    fn publish(&self, key: RequestKey, result: WorkerResult<V>) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            state.results.insert(key, result.clone());
            state.waiting.remove(&key).unwrap_or_default()
        };
        debug!(%key, listeners = waiters.len(), "result published");
        for listener in waiters {
            self.deliver(listener, result.clone());
        }
    }

    fn listen(&self, key: RequestKey, listener: ResultListener<V>) {
        // 結果の確認と待機登録は同じロックの中で行う
        // （間に publish が割り込むと配送が失われるため）
        let mut state = self.state.lock().unwrap();
        match state.results.get(&key) {
            Some(result) => {
                let result = result.clone();
                drop(state);
                debug!(%key, "replaying stored result");
                self.deliver(listener, result);
            }
            None => {
                state.waiting.entry(key).or_default().push(listener);
            }
        }
    }
}
