//! Walkthrough of reuse, idle eviction and memory-pressure shrinking

use parking_lot::Mutex;
use selfclean_pool::{PoolConfiguration, PoolResult, SelfCleaningPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt().with_env_filter("selfclean_pool=trace").init();

    println!("=== selfclean_pool - Idle Eviction ===\n");

    reuse().await?;
    eviction().await?;
    shrinking().await?;
    buffers().await?;

    Ok(())
}

fn numbered_pool(config: PoolConfiguration) -> PoolResult<SelfCleaningPool<usize>> {
    let next = AtomicUsize::new(1);
    SelfCleaningPool::on_current_runtime(move || next.fetch_add(1, Ordering::Relaxed), config)
}

async fn reuse() -> PoolResult<()> {
    println!("1. Reuse:");
    let pool = numbered_pool(PoolConfiguration::default())?;

    let a = pool.get();
    let b = pool.get();
    pool.release(&a);
    pool.release(&b);
    println!("   Released {} then {}", a, b);
    println!("   Next get returns {}\n", pool.get());
    Ok(())
}

async fn eviction() -> PoolResult<()> {
    println!("2. Idle eviction:");
    let pool = numbered_pool(PoolConfiguration::new().with_idle_timeout(Duration::from_millis(100)))?;

    let one = pool.get();
    let two = pool.get();
    pool.release(&one);
    let again = pool.get();
    println!("   Reused {}", again);
    pool.release(&again);
    pool.release(&two);

    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("   Pool drained after idle timeout: {}", pool.is_empty_state());
    println!("   Next get constructs {}\n", pool.get());
    Ok(())
}

async fn shrinking() -> PoolResult<()> {
    println!("3. Shrinking:");
    let pool = numbered_pool(PoolConfiguration::new().without_idle_timeout())?;

    let items: Vec<_> = (0..4).map(|_| pool.get()).collect();
    for item in &items {
        pool.release(item);
    }
    drop(items);

    println!("   Softened {} entries", pool.shrink_to(1));
    println!("   Reused {}", pool.get());
    println!("   Constructed {}", pool.get());
    println!("   Metrics: {:?}", pool.metrics());
    Ok(())
}

async fn buffers() -> PoolResult<()> {
    println!("\n4. Writable buffers:");
    let pool = SelfCleaningPool::on_current_runtime(
        || Mutex::new(Vec::<u8>::with_capacity(1024)),
        PoolConfiguration::default(),
    )?;

    {
        let buffer = pool.checkout();
        buffer.lock().extend_from_slice(b"request body");
    }

    let buffer = pool.checkout();
    let mut bytes = buffer.lock();
    println!("   Reused buffer still holds {:?}", String::from_utf8_lossy(&bytes));
    bytes.clear();
    Ok(())
}
