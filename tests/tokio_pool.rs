use selfclean_pool::{PoolConfiguration, PoolPhase, SelfCleaningPool, TokioScheduler};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn numbered_pool(idle_timeout: Duration) -> SelfCleaningPool<usize> {
    let next = AtomicUsize::new(1);
    SelfCleaningPool::on_current_runtime(
        move || next.fetch_add(1, Ordering::SeqCst),
        PoolConfiguration::new().with_idle_timeout(idle_timeout),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn sequential_scenario_on_tokio_timer() {
    let pool = numbered_pool(Duration::from_millis(100));

    let one = pool.get();
    let two = pool.get();
    assert_eq!((*one, *two), (1, 2));

    pool.release(&one);
    let reused = pool.get();
    assert!(Arc::ptr_eq(&one, &reused));

    pool.release(&reused);
    pool.release(&two);
    assert_eq!(pool.free_count(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(pool.phase(), PoolPhase::Empty);
    assert_eq!(pool.armed_deadline(), None);
    assert_eq!(*pool.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn timer_rearms_for_younger_entries() {
    let pool = numbered_pool(Duration::from_millis(100));

    let old = pool.get();
    pool.release(&old);
    tokio::time::sleep(Duration::from_millis(60)).await;

    let young = pool.get();
    pool.release(&young);
    assert_eq!(pool.free_count(), 1);

    // The reused entry was touched at 60ms, so it survives the first deadline.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(pool.free_count(), 1);
    assert!(pool.armed_deadline().is_some());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(pool.is_empty_state());
}

#[tokio::test(start_paused = true)]
async fn disabled_timeout_keeps_entries() {
    let pool = numbered_pool(Duration::from_millis(100));
    pool.set_idle_timeout_seconds(-5);

    let item = pool.get();
    pool.release(&item);
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(pool.free_count(), 1);
    assert!(Arc::ptr_eq(&item, &pool.get()));
}

#[tokio::test(start_paused = true)]
async fn checkout_guard_round_trip() {
    let pool = numbered_pool(Duration::from_secs(1));

    {
        let guard = pool.checkout();
        assert_eq!(*guard, 1);
        assert_eq!(pool.in_use_count(), 1);
    }
    assert_eq!(pool.free_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(pool.is_empty_state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_pool() {
    let pool = SelfCleaningPool::new(
        || vec![0u8; 64],
        PoolConfiguration::new().with_idle_timeout(Duration::from_secs(10)),
        TokioScheduler::current(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let buffer = pool.get();
                    assert_eq!(buffer.len(), 64);
                    pool.release(&buffer);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.in_use_entries, 0);
    assert_eq!(metrics.total_released, 1600);
    assert_eq!(metrics.total_created + metrics.total_reused, 1600);
}

#[test]
fn pool_requires_runtime_for_tokio_timer() {
    let result = SelfCleaningPool::on_current_runtime(|| 0u8, PoolConfiguration::default());
    assert!(result.is_err());
}
