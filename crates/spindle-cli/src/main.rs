use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use spindle_core::{
    Async, EventLoop, InMemoryResultBoard, RequestKey, ResultTransport, Worker, WorkerResult,
    WorkerState,
};

#[derive(Debug, thiserror::Error)]
#[error("checksum mismatch at block {0}")]
struct ChecksumMismatch(usize);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // (A) owner ループはこの main スレッドに作る
    let mut owner = EventLoop::new();
    let main_thread = owner.main_thread();
    let board: Arc<InMemoryResultBoard<u64>> =
        Arc::new(InMemoryResultBoard::new(main_thread.clone()));
    let completed = Arc::new(AtomicUsize::new(0));

    // (B) 途中経過つきの成功するワーク
    let key = RequestKey::generate();
    let tally = completed.clone();
    let summing = Async::execute(main_thread.clone(), |ctx| {
        let mut sum: u64 = 0;
        for i in 1..=100 {
            sum += i;
            if i % 25 == 0 {
                ctx.update_value(sum);
                thread::sleep(Duration::from_millis(20));
            }
        }
        Ok(sum)
    })
    .on_succeeded(move |value| {
        info!(value, "sum finished");
        Ok(())
    })
    .on_completed(move |state| {
        tally.fetch_add(1, Ordering::SeqCst);
        info!(?state, "summing task completed");
        Ok(())
    });

    // (C) 失敗するワーク（失敗ハンドラで受ける）
    let tally = completed.clone();
    let _verifying: Async<u64> = Async::execute(main_thread.clone(), |_ctx| {
        thread::sleep(Duration::from_millis(30));
        Err(ChecksumMismatch(7).into())
    })
    .on_failed(|cause| {
        info!(%cause, "verification failed as expected");
        Ok(())
    })
    .on_completed(move |state| {
        tally.fetch_add(1, Ordering::SeqCst);
        info!(?state, "verifying task completed");
        Ok(())
    });

    // (D) 長時間走るワークをキャンセルする
    let tally = completed.clone();
    let long_runner: Async<u64> = Async::execute(main_thread.clone(), |ctx| {
        while !ctx.is_cancelled() {
            thread::sleep(Duration::from_millis(10));
        }
        Ok(0)
    })
    .on_cancelled(|| {
        info!("long runner acknowledged cancellation");
        Ok(())
    })
    .on_completed(move |state| {
        tally.fetch_add(1, Ordering::SeqCst);
        info!(?state, "long runner completed");
        Ok(())
    });

    // 走り出したのを見届けてからキャンセルする
    owner.run_until(Duration::from_secs(5), || {
        long_runner.task().state() == WorkerState::Running
    });
    long_runner.cancel();

    // (E) 3 つの終端を待つ
    owner.run_until(Duration::from_secs(10), || {
        completed.load(Ordering::SeqCst) == 3
    });

    // (F) 成功結果をボードに publish し、後から来たリスナーへ replay する
    board.publish(key, WorkerResult::succeeded(summing.task().value().unwrap_or(0)));
    board.listen(
        key,
        Box::new(|result| {
            info!(
                state = ?result.state(),
                value = result.value().copied().unwrap_or(0),
                "replayed stored result"
            );
        }),
    );
    owner.turn();

    info!("all tasks settled; shutting down");
}
