//! Self-cleaning pool implementation

use crate::config::{PoolConfiguration, normalize_timeout, timeout_from_seconds};
use crate::entry::PooledEntry;
use crate::errors::PoolResult;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::scheduler::{OneShotTimer, Scheduler, TimerCallback, TokioScheduler};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Lifecycle phase of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// No lists and no timer are allocated
    Empty,

    /// At least one entry is tracked, or a timer is armed
    Active,
}

/// A lent resource that goes back to the pool when dropped
pub struct PooledObject<T> {
    resource: Arc<T>,
    detached: bool,
    return_fn: Arc<dyn Fn(&Arc<T>) + Send + Sync>,
}

impl<T> PooledObject<T> {
    /// The shared handle to the resource
    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    /// Take the resource without returning it to the pool
    pub fn into_inner(mut self) -> Arc<T> {
        self.detached = true;
        Arc::clone(&self.resource)
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if !self.detached {
            (self.return_fn)(&self.resource);
        }
    }
}

/// Both lists are ordered oldest first; entries are only appended at the tail.
struct EntryLists<T> {
    free: VecDeque<PooledEntry<T>>,
    in_use: VecDeque<PooledEntry<T>>,
}

impl<T> Default for EntryLists<T> {
    fn default() -> Self {
        Self {
            free: VecDeque::new(),
            in_use: VecDeque::new(),
        }
    }
}

impl<T> EntryLists<T> {
    fn is_empty(&self) -> bool {
        self.free.is_empty() && self.in_use.is_empty()
    }

    fn evict_idle(&mut self, cutoff: Instant) -> usize {
        evict_expired(&mut self.free, cutoff) + evict_expired(&mut self.in_use, cutoff)
    }

    fn next_deadline(&self, idle_timeout: Duration) -> Option<Instant> {
        let free = self.free.front().and_then(|e| e.deadline(idle_timeout));
        let in_use = self.in_use.front().and_then(|e| e.deadline(idle_timeout));
        free.into_iter().chain(in_use).min()
    }

    /// Pops free entries from the newest end until one still resolves.
    /// Returns the resource (if any) and how many dead entries were dropped.
    fn take_free(&mut self, now: Instant) -> (Option<Arc<T>>, usize) {
        let mut stale = 0;
        while let Some(mut entry) = self.free.pop_back() {
            if let Some(resource) = entry.resolve() {
                entry.check_out(now);
                self.in_use.push_back(entry);
                return (Some(resource), stale);
            }
            stale += 1;
        }
        (None, stale)
    }

    /// Moves `item` from in-use to free, pruning dead in-use entries passed on
    /// the way. Returns whether `item` was found and how many were pruned.
    fn check_in(&mut self, item: &Arc<T>, now: Instant) -> (bool, usize) {
        let mut pruned = 0;
        let mut index = self.in_use.len();
        while index > 0 {
            index -= 1;
            if self.in_use[index].points_to(item) {
                if let Some(mut entry) = self.in_use.remove(index) {
                    entry.check_in(Arc::clone(item), now);
                    self.free.push_back(entry);
                }
                return (true, pruned);
            }
            if !self.in_use[index].is_alive() {
                self.in_use.remove(index);
                pruned += 1;
            }
        }
        (false, pruned)
    }

    fn soften_excess(&mut self, retained: usize) -> usize {
        let excess = self.free.len().saturating_sub(retained);
        self.free
            .iter_mut()
            .take(excess)
            .map(PooledEntry::soften)
            .filter(|softened| *softened)
            .count()
    }
}

fn evict_expired<T>(list: &mut VecDeque<PooledEntry<T>>, cutoff: Instant) -> usize {
    let mut evicted = 0;
    while list.front().is_some_and(|e| e.last_used_at() <= cutoff) {
        list.pop_front();
        evicted += 1;
    }
    evicted
}

struct PoolState<T, Tm> {
    idle_timeout: Option<Duration>,
    max_retained_idle: Option<usize>,
    lists: Option<EntryLists<T>>,
    timer: Option<Tm>,
    pending_deadline: Option<Instant>,
}

impl<T, Tm> PoolState<T, Tm> {
    fn phase(&self) -> PoolPhase {
        if self.lists.is_none() && self.timer.is_none() {
            PoolPhase::Empty
        } else {
            PoolPhase::Active
        }
    }

    fn counts(&self) -> (usize, usize) {
        self.lists
            .as_ref()
            .map_or((0, 0), |lists| (lists.free.len(), lists.in_use.len()))
    }
}

struct Shared<T, S: Scheduler> {
    state: Mutex<PoolState<T, S::Timer>>,
    factory: Arc<dyn Fn() -> T + Send + Sync>,
    scheduler: S,
    metrics: MetricsTracker,
    this: Weak<Self>,
}

impl<T: Send + Sync + 'static, S: Scheduler> Shared<T, S> {
    fn get(&self) -> Arc<T> {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.evict_idle(&mut state, now);

        let lists = state.lists.get_or_insert_with(EntryLists::default);
        let (reused, stale) = lists.take_free(now);
        let resource = match reused {
            Some(resource) => {
                MetricsTracker::record(&self.metrics.total_reused, 1);
                trace!("reusing pooled resource");
                resource
            }
            None => {
                let resource = Arc::new((self.factory)());
                lists.in_use.push_back(PooledEntry::checked_out(&resource, now));
                MetricsTracker::record(&self.metrics.total_created, 1);
                debug!("constructed new pooled resource");
                resource
            }
        };

        if stale > 0 {
            MetricsTracker::record(&self.metrics.stale_dropped, stale);
            trace!(stale, "dropped reclaimed free entries");
        }

        self.rearm(&mut state, now);
        resource
    }

    fn release(&self, item: &Arc<T>) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let evicted = self.evict_idle(&mut state, now);

        let (released, pruned) = match state.lists.as_mut() {
            Some(lists) => lists.check_in(item, now),
            None => (false, 0),
        };

        if pruned > 0 {
            MetricsTracker::record(&self.metrics.stale_dropped, pruned);
            trace!(pruned, "pruned reclaimed in-use entries");
        }

        if released {
            MetricsTracker::record(&self.metrics.total_released, 1);
            trace!("resource returned to pool");
            if let (Some(retained), Some(lists)) = (state.max_retained_idle, state.lists.as_mut()) {
                lists.soften_excess(retained);
            }
        }

        if released || pruned > 0 || evicted > 0 {
            self.rearm(&mut state, now);
        }
    }

    fn set_idle_timeout(&self, idle_timeout: Option<Duration>) {
        let mut state = self.state.lock();
        state.idle_timeout = normalize_timeout(idle_timeout);
        debug!(idle_timeout = ?state.idle_timeout, "idle timeout changed");
        self.refresh(&mut state, Instant::now());
    }

    fn shrink_to(&self, retained: usize) -> usize {
        let mut state = self.state.lock();
        let softened = state
            .lists
            .as_mut()
            .map_or(0, |lists| lists.soften_excess(retained));
        if softened > 0 {
            debug!(softened, retained, "released hold on idle resources");
        }
        softened
    }

    /// Timer entry point. The one-shot has fired, so nothing is armed anymore.
    fn on_timer(&self) {
        let mut state = self.state.lock();
        state.pending_deadline = None;
        trace!("idle sweep timer fired");
        self.refresh(&mut state, Instant::now());
    }

    fn refresh(&self, state: &mut PoolState<T, S::Timer>, now: Instant) {
        self.evict_idle(state, now);
        self.rearm(state, now);
    }

    fn evict_idle(&self, state: &mut PoolState<T, S::Timer>, now: Instant) -> usize {
        let (Some(idle_timeout), Some(lists)) = (state.idle_timeout, state.lists.as_mut()) else {
            return 0;
        };
        let Some(cutoff) = now.checked_sub(idle_timeout) else {
            return 0;
        };

        let evicted = lists.evict_idle(cutoff);
        if evicted > 0 {
            MetricsTracker::record(&self.metrics.idle_evictions, evicted);
            debug!(evicted, "evicted idle pool entries");
        }
        evicted
    }

    fn rearm(&self, state: &mut PoolState<T, S::Timer>, now: Instant) {
        let next_deadline = match (state.idle_timeout, state.lists.as_ref()) {
            (Some(idle_timeout), Some(lists)) => lists.next_deadline(idle_timeout),
            _ => None,
        };

        if next_deadline != state.pending_deadline {
            if state.pending_deadline.is_some()
                && let Some(timer) = state.timer.as_mut()
            {
                timer.stop();
            }

            if let Some(deadline) = next_deadline {
                let timer = state
                    .timer
                    .get_or_insert_with(|| self.scheduler.create_timer(self.sweep_callback()));
                let delay = deadline.saturating_duration_since(now);
                trace!(?delay, "arming idle sweep");
                timer.set_delay(delay);
                timer.start();
            }

            state.pending_deadline = next_deadline;
        }

        if state.pending_deadline.is_none()
            && state.lists.as_ref().is_none_or(EntryLists::is_empty)
            && state.phase() == PoolPhase::Active
        {
            debug!("pool drained, releasing lists and timer");
            state.lists = None;
            state.timer = None;
        }
    }

    fn sweep_callback(&self) -> TimerCallback {
        let shared = self.this.clone();
        Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.on_timer();
            }
        })
    }
}

/// A pool that lends out shared resources and drops the ones left idle
///
/// Free entries keep their resource alive; checked-out entries only observe
/// it, so a resource the caller drops without releasing is pruned lazily.
/// A single one-shot timer is armed for the earliest idle deadline across
/// both lists and re-armed after every change.
///
/// Resources are handed out as `Arc<T>` and the pool keeps a weak handle to
/// every checked-out one, so `Arc::get_mut` never succeeds. Resources that
/// callers write into need interior mutability (`Mutex`, atomics, ...).
///
/// # Examples
///
/// ```
/// use parking_lot::Mutex;
/// use selfclean_pool::{ManualScheduler, PoolConfiguration, SelfCleaningPool};
/// use std::sync::Arc;
///
/// let pool = SelfCleaningPool::new(
///     || Mutex::new(Vec::<u8>::with_capacity(4096)),
///     PoolConfiguration::default(),
///     ManualScheduler::new(),
/// );
///
/// let buffer = pool.get();
/// buffer.lock().extend_from_slice(b"hello");
/// pool.release(&buffer);
///
/// let again = pool.get();
/// assert!(Arc::ptr_eq(&buffer, &again));
/// assert_eq!(again.lock().as_slice(), b"hello");
/// ```
pub struct SelfCleaningPool<T, S: Scheduler = TokioScheduler> {
    shared: Arc<Shared<T, S>>,
}

impl<T, S: Scheduler> Clone for SelfCleaningPool<T, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> SelfCleaningPool<T, TokioScheduler> {
    /// Create a pool whose idle timer runs on the current tokio runtime
    pub fn on_current_runtime<F>(factory: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Ok(Self::new(factory, config, TokioScheduler::try_current()?))
    }
}

impl<T: Send + Sync + 'static, S: Scheduler> SelfCleaningPool<T, S> {
    /// Create a new pool with a factory and a timer scheduler
    pub fn new<F>(factory: F, config: PoolConfiguration, scheduler: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let state = PoolState {
            idle_timeout: normalize_timeout(config.idle_timeout),
            max_retained_idle: config.max_retained_idle,
            lists: None,
            timer: None,
            pending_deadline: None,
        };

        let shared = Arc::new_cyclic(|this| Shared {
            state: Mutex::new(state),
            factory: Arc::new(factory),
            scheduler,
            metrics: MetricsTracker::new(),
            this: this.clone(),
        });

        Self { shared }
    }

    /// Get a resource, reusing the most recently released one when possible
    pub fn get(&self) -> Arc<T> {
        self.shared.get()
    }

    /// Return a resource obtained from [`get`](Self::get)
    ///
    /// Items the pool does not track as checked out (already released,
    /// never pooled, or already evicted) are ignored.
    pub fn release(&self, item: &Arc<T>) {
        self.shared.release(item);
    }

    /// Get a resource wrapped in a guard that releases it on drop
    pub fn checkout(&self) -> PooledObject<T> {
        let resource = self.shared.get();
        PooledObject {
            resource,
            detached: false,
            return_fn: self.make_return_fn(),
        }
    }

    /// Change the idle timeout in seconds; `<= 0` disables eviction
    pub fn set_idle_timeout_seconds(&self, seconds: i64) {
        self.shared.set_idle_timeout(timeout_from_seconds(seconds));
    }

    /// Change the idle timeout; `None` or zero disables eviction
    pub fn set_idle_timeout(&self, idle_timeout: Option<Duration>) {
        self.shared.set_idle_timeout(idle_timeout);
    }

    /// Stop keeping all but the newest `retained` free resources alive.
    /// Returns how many entries were released.
    pub fn shrink_to(&self, retained: usize) -> usize {
        self.shared.shrink_to(retained)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.shared.state.lock().idle_timeout
    }

    /// Entries on the free list, including ones whose resource is gone but
    /// has not been discovered yet
    pub fn free_count(&self) -> usize {
        self.shared.state.lock().counts().0
    }

    pub fn in_use_count(&self) -> usize {
        self.shared.state.lock().counts().1
    }

    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase()
    }

    pub fn is_empty_state(&self) -> bool {
        self.phase() == PoolPhase::Empty
    }

    /// Deadline the idle timer is currently armed for
    pub fn armed_deadline(&self) -> Option<Instant> {
        self.shared.state.lock().pending_deadline
    }

    pub fn metrics(&self) -> PoolMetrics {
        let state = self.shared.state.lock();
        let (free, in_use) = state.counts();
        self.shared
            .metrics
            .get_metrics(free, in_use, state.pending_deadline.is_some())
    }

    fn make_return_fn(&self) -> Arc<dyn Fn(&Arc<T>) + Send + Sync> {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |item| {
            if let Some(shared) = shared.upgrade() {
                shared.release(item);
            }
        })
    }
}
