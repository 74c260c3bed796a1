//! # Resource Lifecycle
//!
//! Scoped acquisition with guaranteed release for everything a session holds:
//! the microphone handle, the capture graph, the playback graph and the remote
//! session.
//!
//! ## Guarantees:
//! - **Idempotent**: releasing twice is a no-op, the inner resource is taken on first release
//! - **Exception-safe**: a failed release is logged and never propagated, so one
//!   failure cannot stop the release of the others
//! - **Scoped**: dropping a [`Guarded`] releases it, which covers resources held
//!   by an in-flight connect that is cancelled

use crate::error::EngineResult;
use tracing::{debug, warn};

/// A resource that must be explicitly released.
pub trait Releasable: Send {
    fn release(&mut self) -> EngineResult<()>;
}

/// Owner of one releasable resource.
pub struct Guarded<T: Releasable + ?Sized> {
    name: &'static str,
    inner: Option<Box<T>>,
}

impl<T: Releasable + ?Sized> Guarded<T> {
    pub fn new(name: &'static str, resource: Box<T>) -> Self {
        Self { name, inner: Some(resource) }
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.inner.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_deref_mut()
    }

    /// Release the resource. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(mut resource) = self.inner.take() {
            match resource.release() {
                Ok(()) => debug!(resource = self.name, "Released"),
                Err(err) => warn!(resource = self.name, error = %err, "Release failed"),
            }
        }
    }
}

impl<T: Releasable + ?Sized> Drop for Guarded<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Releasable + ?Sized> std::fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guarded")
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        releases: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Releasable for Counter {
        fn release(&mut self) -> EngineResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(EngineError::AudioGraph("device busy".into()))
            } else {
                Ok(())
            }
        }
    }

    fn counter(fail: bool) -> (Guarded<Counter>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let guard = Guarded::new("counter", Box::new(Counter { releases: releases.clone(), fail }));
        (guard, releases)
    }

    #[test]
    fn test_release_is_idempotent() {
        let (mut guard, releases) = counter(false);
        guard.release();
        guard.release();
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases() {
        let (guard, releases) = counter(false);
        drop(guard);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_release_still_counts_as_released() {
        let (mut guard, releases) = counter(true);
        guard.release();
        assert!(guard.is_released());
        assert!(guard.get().is_none());
        guard.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
