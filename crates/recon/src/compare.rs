//! Per-identifier dual-store comparison.
//!
//! The two counts run on their own threads and report into a two-slot
//! channel. The caller waits against one deadline. On timeout or on the
//! first error the receiver is dropped; counting threads still in flight
//! finish on their own and their late `send` fails harmlessly.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::backoff::{retry, RetryError, RetryPolicy};
use crate::error::{CompareError, StoreError};
use crate::model::{Comparison, StoreSide};
use crate::store::{scope_path, ObjectStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Produces both counts for one identifier, or a failure.
pub trait Comparator: Send + Sync {
    fn compare(&self, identifier: &str) -> Result<Comparison, CompareError>;
}

/// One side of a comparison: a store plus how identifiers map to prefixes.
#[derive(Clone)]
pub struct ScopedStore {
    pub store: Arc<dyn ObjectStore>,
    pub root: String,
    pub suffix: Option<String>,
}

impl ScopedStore {
    pub fn new(store: Arc<dyn ObjectStore>, root: impl Into<String>) -> Self {
        Self {
            store,
            root: root.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn path_for(&self, identifier: &str) -> String {
        scope_path(&self.root, identifier, self.suffix.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Dual-source comparator
// ---------------------------------------------------------------------------

pub struct DualSourceComparator {
    a: ScopedStore,
    b: ScopedStore,
    timeout: Duration,
}

type CountMessage = (StoreSide, Result<u64, StoreError>);

impl DualSourceComparator {
    pub fn new(a: ScopedStore, b: ScopedStore) -> Self {
        Self {
            a,
            b,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn side(&self, side: StoreSide) -> &ScopedStore {
        match side {
            StoreSide::A => &self.a,
            StoreSide::B => &self.b,
        }
    }

    /// Start a detached count. Owns everything it touches.
    fn spawn_count(
        &self,
        side: StoreSide,
        identifier: &str,
        tx: mpsc::SyncSender<CountMessage>,
    ) -> Result<(), CompareError> {
        let scoped = self.side(side);
        let store = Arc::clone(&scoped.store);
        let path = scoped.path_for(identifier);
        thread::Builder::new()
            .name(format!("count-{side}"))
            .spawn(move || {
                let result = store.count(&path);
                // Receiver is gone after a timeout or the other side's error.
                let _ = tx.send((side, result));
            })
            .map(drop)
            .map_err(|e| {
                let source = StoreError::Transport(format!("cannot start count thread: {e}"));
                self.count_error(identifier, side, source)
            })
    }

    fn count_error(&self, identifier: &str, side: StoreSide, source: StoreError) -> CompareError {
        CompareError::Count {
            identifier: identifier.to_string(),
            side,
            store: self.side(side).store.name().to_string(),
            source,
        }
    }
}

impl Comparator for DualSourceComparator {
    fn compare(&self, identifier: &str) -> Result<Comparison, CompareError> {
        // A timeout too large to represent as an instant never expires.
        let deadline = Instant::now().checked_add(self.timeout);
        let (tx, rx) = mpsc::sync_channel::<CountMessage>(2);
        self.spawn_count(StoreSide::A, identifier, tx.clone())?;
        self.spawn_count(StoreSide::B, identifier, tx)?;

        let mut count_a = None;
        let mut count_b = None;
        while count_a.is_none() || count_b.is_none() {
            let timeout = || CompareError::Timeout {
                identifier: identifier.to_string(),
                after: self.timeout,
            };
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        log::warn!("timeout waiting for counts of '{identifier}'");
                        return Err(timeout());
                    }
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            };

            match received {
                Ok((side, Ok(n))) => match side {
                    StoreSide::A => count_a = Some(n),
                    StoreSide::B => count_b = Some(n),
                },
                Ok((side, Err(source))) => {
                    log::warn!(
                        "count failed for '{identifier}' in store '{}': {source}",
                        self.side(side).store.name()
                    );
                    return Err(self.count_error(identifier, side, source));
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::warn!("timeout waiting for counts of '{identifier}'");
                    return Err(timeout());
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // A counting thread died (panicked) without reporting.
                    let side = if count_a.is_none() { StoreSide::A } else { StoreSide::B };
                    return Err(self.count_error(
                        identifier,
                        side,
                        StoreError::Transport("count task exited without a result".into()),
                    ));
                }
            }
        }

        let (count_a, count_b) = (count_a.unwrap_or_default(), count_b.unwrap_or_default());
        log::debug!("'{identifier}': a={count_a} b={count_b}");
        Ok(Comparison {
            identifier: identifier.to_string(),
            count_a,
            count_b,
        })
    }
}

// ---------------------------------------------------------------------------
// Retrying wrapper
// ---------------------------------------------------------------------------

/// Retries transient count failures of the wrapped comparator.
pub struct RetryingComparator<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: Comparator> RetryingComparator<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<C: Comparator> Comparator for RetryingComparator<C> {
    fn compare(&self, identifier: &str) -> Result<Comparison, CompareError> {
        let op_name = format!("compare '{identifier}'");
        retry(&self.policy, &op_name, CompareError::is_transient, || {
            self.inner.compare(identifier)
        })
        .map_err(|e| match e {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { attempts, last_error, .. } => CompareError::RetryExhausted {
                identifier: identifier.to_string(),
                attempts,
                last: Box::new(last_error),
            },
        })
    }
}

impl<C: Comparator + ?Sized> Comparator for Box<C> {
    fn compare(&self, identifier: &str) -> Result<Comparison, CompareError> {
        (**self).compare(identifier)
    }
}
