//! Bookkeeping entries for pooled resources

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// A reference to a pooled resource that may stop resolving out-of-band.
pub(crate) enum Reclaimable<T> {
    /// The pool keeps the resource alive.
    Retained(Arc<T>),

    /// The resource lives only while someone else holds it.
    Weak(Weak<T>),
}

impl<T> Reclaimable<T> {
    pub fn resolve(&self) -> Option<Arc<T>> {
        match self {
            Reclaimable::Retained(resource) => Some(Arc::clone(resource)),
            Reclaimable::Weak(weak) => weak.upgrade(),
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            Reclaimable::Retained(_) => true,
            Reclaimable::Weak(weak) => weak.strong_count() > 0,
        }
    }

    /// Identity comparison; never consults `PartialEq` on `T`.
    pub fn points_to(&self, item: &Arc<T>) -> bool {
        match self {
            Reclaimable::Retained(resource) => Arc::ptr_eq(resource, item),
            Reclaimable::Weak(weak) => std::ptr::eq(weak.as_ptr(), Arc::as_ptr(item)),
        }
    }

    fn downgrade(&mut self) {
        if let Reclaimable::Retained(resource) = self {
            *self = Reclaimable::Weak(Arc::downgrade(resource));
        }
    }
}

/// One tracked resource plus the time it last moved between lists.
pub(crate) struct PooledEntry<T> {
    resource: Reclaimable<T>,
    last_used_at: Instant,
}

impl<T> PooledEntry<T> {
    /// Entry for a resource handed to a caller. The caller owns it; the
    /// entry only observes.
    pub fn checked_out(resource: &Arc<T>, now: Instant) -> Self {
        Self {
            resource: Reclaimable::Weak(Arc::downgrade(resource)),
            last_used_at: now,
        }
    }

    pub fn check_out(&mut self, now: Instant) {
        self.resource.downgrade();
        self.touch(now);
    }

    pub fn check_in(&mut self, resource: Arc<T>, now: Instant) {
        self.resource = Reclaimable::Retained(resource);
        self.touch(now);
    }

    /// Stop keeping the resource alive. It survives only if another owner
    /// still holds it.
    pub fn soften(&mut self) -> bool {
        let was_retained = matches!(self.resource, Reclaimable::Retained(_));
        self.resource.downgrade();
        was_retained
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_used_at = now;
    }

    pub fn resolve(&self) -> Option<Arc<T>> {
        self.resource.resolve()
    }

    pub fn is_alive(&self) -> bool {
        self.resource.is_alive()
    }

    pub fn points_to(&self, item: &Arc<T>) -> bool {
        self.resource.points_to(item)
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// `None` when the deadline lies beyond what `Instant` can represent,
    /// which means the entry never expires.
    pub fn deadline(&self, idle_timeout: Duration) -> Option<Instant> {
        self.last_used_at.checked_add(idle_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_out_entry_follows_caller() {
        let resource = Arc::new(String::from("conn"));
        let entry = PooledEntry::checked_out(&resource, Instant::now());

        assert!(entry.is_alive());
        assert!(entry.points_to(&resource));

        drop(resource);
        assert!(!entry.is_alive());
        assert!(entry.resolve().is_none());
    }

    #[test]
    fn test_check_in_retains_resource() {
        let resource = Arc::new(7);
        let mut entry = PooledEntry::checked_out(&resource, Instant::now());
        entry.check_in(Arc::clone(&resource), Instant::now());
        drop(resource);

        assert_eq!(entry.resolve().as_deref(), Some(&7));
    }

    #[test]
    fn test_identity_not_equality() {
        let a = Arc::new(1);
        let b = Arc::new(1);
        let entry = PooledEntry::checked_out(&a, Instant::now());

        assert!(entry.points_to(&a));
        assert!(!entry.points_to(&b));
    }

    #[test]
    fn test_unrepresentable_deadline_is_none() {
        let now = Instant::now();
        let entry = PooledEntry::checked_out(&Arc::new(0), now);

        assert_eq!(entry.deadline(Duration::from_secs(1)), Some(now + Duration::from_secs(1)));
        assert_eq!(entry.deadline(Duration::MAX), None);
    }

    #[test]
    fn test_soften_lets_resource_go() {
        let resource = Arc::new(vec![0u8; 16]);
        let mut entry = PooledEntry::checked_out(&resource, Instant::now());
        entry.check_in(resource, Instant::now());

        assert!(entry.soften());
        assert!(!entry.soften());
        assert!(entry.resolve().is_none());
    }
}
