//! Timer scheduling used by the pool's idle sweep
//!
//! The pool never owns a thread. It asks a [`Scheduler`] for a one-shot
//! timer bound to its sweep callback and re-arms that timer whenever the
//! earliest idle deadline changes.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::errors::{PoolError, PoolResult};

/// Callback invoked when a timer fires.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// A timer that fires its callback at most once per `start`.
pub trait OneShotTimer: Send {
    /// Set the delay used by the next `start`.
    fn set_delay(&mut self, delay: Duration);

    /// Arm the timer, replacing any pending arm.
    fn start(&mut self);

    /// Disarm the timer. No-op when nothing is pending.
    fn stop(&mut self);
}

/// Factory for one-shot timers.
pub trait Scheduler: Send + Sync + 'static {
    type Timer: OneShotTimer + 'static;

    fn create_timer(&self, callback: TimerCallback) -> Self::Timer;
}

/// Scheduler backed by a tokio runtime.
///
/// # Examples
///
/// ```
/// use selfclean_pool::TokioScheduler;
///
/// // Outside a runtime there is nothing to schedule on.
/// assert!(TokioScheduler::try_current().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler for the runtime this call is made from.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn try_current() -> PoolResult<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| PoolError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    type Timer = TokioTimer;

    fn create_timer(&self, callback: TimerCallback) -> TokioTimer {
        TokioTimer {
            handle: self.handle.clone(),
            callback,
            delay: Duration::ZERO,
            task: None,
        }
    }
}

/// One-shot timer that sleeps in a spawned tokio task.
pub struct TokioTimer {
    handle: Handle,
    callback: TimerCallback,
    delay: Duration,
    task: Option<JoinHandle<()>>,
}

impl OneShotTimer for TokioTimer {
    fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    fn start(&mut self) {
        self.stop();
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        self.task = Some(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ManualSlot {
    callback: TimerCallback,
    delay: Duration,
    armed_at: Option<Instant>,
}

impl ManualSlot {
    fn deadline(&self) -> Option<Instant> {
        self.armed_at.map(|at| at + self.delay)
    }
}

/// Scheduler that only fires when told to.
///
/// Deadlines are measured on the tokio clock, so pairing it with a paused
/// runtime (`tokio::time::pause`/`advance`) gives fully deterministic sweeps.
///
/// # Examples
///
/// ```
/// use selfclean_pool::{ManualScheduler, PoolConfiguration, SelfCleaningPool};
///
/// let scheduler = ManualScheduler::new();
/// let pool = SelfCleaningPool::new(|| 0u32, PoolConfiguration::default(), scheduler.clone());
///
/// let item = pool.get();
/// assert_eq!(scheduler.armed_count(), 1);
/// pool.release(&item);
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<Vec<Weak<Mutex<ManualSlot>>>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every armed timer whose deadline has passed. Returns how many fired.
    pub fn fire_due(&self) -> usize {
        let now = Instant::now();
        let due: Vec<TimerCallback> = self
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let mut slot = slot.lock();
                match slot.deadline() {
                    Some(deadline) if deadline <= now => {
                        slot.armed_at = None;
                        Some(Arc::clone(&slot.callback))
                    }
                    _ => None,
                }
            })
            .collect();

        // Callbacks may re-arm timers, so no scheduler lock is held here.
        for callback in &due {
            callback();
        }
        due.len()
    }

    /// Number of timers currently armed.
    pub fn armed_count(&self) -> usize {
        self.slots()
            .iter()
            .filter(|slot| slot.lock().armed_at.is_some())
            .count()
    }

    /// Number of timers that have not been dropped by their owner.
    pub fn live_timers(&self) -> usize {
        self.slots().len()
    }

    /// Earliest deadline across armed timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots()
            .iter()
            .filter_map(|slot| slot.lock().deadline())
            .min()
    }

    fn slots(&self) -> Vec<Arc<Mutex<ManualSlot>>> {
        let mut timers = self.timers.lock();
        timers.retain(|slot| slot.strong_count() > 0);
        timers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Scheduler for ManualScheduler {
    type Timer = ManualTimer;

    fn create_timer(&self, callback: TimerCallback) -> ManualTimer {
        let slot = Arc::new(Mutex::new(ManualSlot {
            callback,
            delay: Duration::ZERO,
            armed_at: None,
        }));
        self.timers.lock().push(Arc::downgrade(&slot));
        ManualTimer { slot }
    }
}

/// Timer handed out by [`ManualScheduler`].
pub struct ManualTimer {
    slot: Arc<Mutex<ManualSlot>>,
}

impl OneShotTimer for ManualTimer {
    fn set_delay(&mut self, delay: Duration) {
        self.slot.lock().delay = delay;
    }

    fn start(&mut self) {
        self.slot.lock().armed_at = Some(Instant::now());
    }

    fn stop(&mut self) {
        self.slot.lock().armed_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (Arc<AtomicUsize>, TimerCallback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let callback: TimerCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (fired, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_timer_fires_once_per_start() {
        let scheduler = ManualScheduler::new();
        let (fired, callback) = counting_callback();
        let mut timer = scheduler.create_timer(callback);

        timer.set_delay(Duration::from_millis(50));
        timer.start();
        assert_eq!(scheduler.fire_due(), 0);

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(scheduler.fire_due(), 1);
        assert_eq!(scheduler.fire_due(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_timer_stop_and_drop() {
        let scheduler = ManualScheduler::new();
        let (fired, callback) = counting_callback();
        let mut timer = scheduler.create_timer(callback);

        timer.set_delay(Duration::from_millis(10));
        timer.start();
        timer.stop();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(scheduler.fire_due(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert_eq!(scheduler.live_timers(), 1);
        drop(timer);
        assert_eq!(scheduler.live_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_after_delay() {
        let scheduler = TokioScheduler::current();
        let (fired, callback) = counting_callback();
        let mut timer = scheduler.create_timer(callback);

        timer.set_delay(Duration::from_millis(100));
        timer.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_stop_cancels() {
        let scheduler = TokioScheduler::current();
        let (fired, callback) = counting_callback();
        let mut timer = scheduler.create_timer(callback);

        timer.set_delay(Duration::from_millis(100));
        timer.start();
        timer.stop();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(matches!(
            TokioScheduler::try_current(),
            Err(PoolError::NoRuntime)
        ));
    }
}
