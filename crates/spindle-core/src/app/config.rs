//! config - プロセス全体のエグゼキュータ設定
//!
//! エグゼキュータは遅延構築されるプロセス全体の共有状態です。差し替えは
//! 丸ごとのみで、使用中の部分的な再構成はできません。thread factory を
//! 差し替えると、構築済みのプールは無効化され、次の取得で作り直されます。

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::impls::pool::{CachedPool, DefaultThreadFactory};
use crate::ports::executor::{Executor, ThreadFactory};

struct ExecutorConfig {
    factory: Option<Arc<dyn ThreadFactory>>,
    executor: Option<Arc<dyn Executor>>,
}

impl ExecutorConfig {
    const fn new() -> Self {
        Self {
            factory: None,
            executor: None,
        }
    }
}

static CONFIG: Mutex<ExecutorConfig> = Mutex::new(ExecutorConfig::new());

/// 現在の thread factory（設定されていれば）
pub fn default_thread_factory() -> Option<Arc<dyn ThreadFactory>> {
    CONFIG.lock().unwrap().factory.clone()
}

/// thread factory を差し替え、構築済みのプールを無効化する
pub fn set_default_thread_factory(factory: Arc<dyn ThreadFactory>) {
    let mut config = CONFIG.lock().unwrap();
    config.factory = Some(factory);
    config.executor = None;
    debug!("thread factory replaced; pool invalidated");
}

/// プロセス全体のエグゼキュータを取得（なければ構築する）
pub fn executor() -> Arc<dyn Executor> {
    let mut config = CONFIG.lock().unwrap();
    if let Some(executor) = &config.executor {
        return executor.clone();
    }
    let factory = config
        .factory
        .clone()
        .unwrap_or_else(|| Arc::new(DefaultThreadFactory::new()));
    let pool: Arc<dyn Executor> = Arc::new(CachedPool::new(factory));
    config.executor = Some(pool.clone());
    debug!("process-wide pool built");
    pool
}

/// エグゼキュータを丸ごと差し替える
pub fn set_executor(executor: Arc<dyn Executor>) {
    CONFIG.lock().unwrap().executor = Some(executor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::executor::Job;

    struct NoopExecutor;

    impl Executor for NoopExecutor {
        fn execute(&self, _job: Job) {}
    }

    // プロセス全体の状態を触るので、一つのテストで順に検証する
    #[test]
    fn test_replacement_and_invalidation_lifecycle() {
        let first = executor();
        let again = executor();
        assert!(Arc::ptr_eq(&first, &again));

        // factory の差し替えは構築済みプールを無効化する
        set_default_thread_factory(Arc::new(DefaultThreadFactory::new()));
        let rebuilt = executor();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(default_thread_factory().is_some());

        // エグゼキュータの丸ごと差し替え
        let custom: Arc<dyn Executor> = Arc::new(NoopExecutor);
        set_executor(custom.clone());
        assert!(Arc::ptr_eq(&executor(), &custom));
    }
}
