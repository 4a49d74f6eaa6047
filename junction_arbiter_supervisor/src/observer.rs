//! Ordered observer registries.
//!
//! Observers run in registration order on a snapshot of the registry, so a
//! callback may register or unregister without deadlocking. A failing or
//! panicking observer is logged and counted; the others still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapter::panic_message;

/// Handle returned by `register`, used to unregister.
///
/// Ids are process-wide, so one id never matches in two registries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

pub trait Observer<T>: Send + Sync {
    fn observe(&self, item: &T) -> Result<(), String>;
}

impl<T, F> Observer<T> for F
where
    F: Fn(&T) -> Result<(), String> + Send + Sync,
{
    fn observe(&self, item: &T) -> Result<(), String> {
        self(item)
    }
}

pub struct ObserverRegistry<T> {
    label: &'static str,
    observers: Mutex<Vec<(ObserverId, Arc<dyn Observer<T>>)>>,
}

impl<T> ObserverRegistry<T> {
    /// `label` names the registry in log lines.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn register<O>(&self, observer: O) -> ObserverId
    where
        O: Observer<T> + 'static,
    {
        let id = ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut guard = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|(oid, _)| *oid != id);
        guard.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer<T>>> {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect()
    }

    /// Invoke every observer; returns how many failed.
    pub fn notify(&self, item: &T) -> usize {
        let mut failures = 0;
        for observer in self.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| observer.observe(item))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(registry = self.label, error = %err, "observer failed");
                }
                Err(payload) => {
                    failures += 1;
                    tracing::warn!(
                        registry = self.label,
                        error = %panic_message(payload.as_ref()),
                        "observer panicked"
                    );
                }
            }
        }
        failures
    }
}
