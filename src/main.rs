// selfclean_pool demo binary
// The library lives in lib.rs; run the longer walkthrough with:
//   cargo run --example idle_eviction

use parking_lot::Mutex;
use selfclean_pool::{PoolConfiguration, PoolResult, SelfCleaningPool};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> PoolResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    println!("=== selfclean_pool ===");

    let config = PoolConfiguration::new().with_idle_timeout(Duration::from_millis(200));
    let pool = SelfCleaningPool::on_current_runtime(|| Mutex::new(Vec::<u8>::with_capacity(4096)), config)?;

    let buffer = pool.get();
    buffer.lock().extend_from_slice(b"payload");
    println!("  Wrote {} bytes into pooled buffer", buffer.lock().len());
    pool.release(&buffer);
    println!("  Free after release: {}", pool.free_count());

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("  Free after idle timeout: {}", pool.free_count());
    println!("  Pool drained: {}", pool.is_empty_state());

    Ok(())
}
