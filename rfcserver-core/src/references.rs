//! Disposable references owned by a server
//!
//! Registration tokens and user supplied resources are handed to the server
//! as [`Disposable`] values. They accumulate in [`PendingReferences`] over the
//! server's lifetime and are released once, in registration order, when the
//! server is disposed.

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// A resource that must be released exactly once
///
/// Release consumes the value, so a reference cannot be disposed twice.
pub trait Disposable: Send {
    /// Release the underlying resource
    fn dispose(self: Box<Self>);

    /// Short label used in logs
    fn describe(&self) -> String {
        "reference".to_string()
    }
}

/// Registration token handed out by the backend runtime
pub type RegistrationToken = Box<dyn Disposable>;

/// A disposable backed by a closure
pub struct OnDispose<F: FnOnce() + Send> {
    label: String,
    release: F,
}

impl<F: FnOnce() + Send> Disposable for OnDispose<F> {
    fn dispose(self: Box<Self>) {
        (self.release)()
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Wrap a closure as a disposable reference
pub fn on_dispose<F>(label: impl Into<String>, release: F) -> Box<dyn Disposable>
where
    F: FnOnce() + Send + 'static,
{
    Box::new(OnDispose {
        label: label.into(),
        release,
    })
}

struct PendingState {
    items: Vec<Box<dyn Disposable>>,
    released: bool,
}

/// Ordered collection of references released when the server is disposed
///
/// Appends happen from registration code outside the lifecycle actor, so the
/// collection carries its own lock. Draining takes the whole list under the
/// lock and releases outside it; a reference appended after the drain is
/// released on the spot.
pub struct PendingReferences {
    state: Mutex<PendingState>,
}

impl PendingReferences {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PendingState {
                items: Vec::new(),
                released: false,
            }),
        }
    }

    /// Append a reference, taking ownership of it
    pub fn push(&self, reference: Box<dyn Disposable>) {
        self.extend(std::iter::once(reference));
    }

    /// Append several references, keeping their order
    pub fn extend<I>(&self, references: I)
    where
        I: IntoIterator<Item = Box<dyn Disposable>>,
    {
        let late: Vec<_> = {
            let mut state = self.state.lock();
            if !state.released {
                state.items.extend(references);
                return;
            }
            references.into_iter().collect()
        };

        for reference in late {
            debug!(reference = %reference.describe(), "releasing reference added after dispose");
            release_one(reference);
        }
    }

    /// Number of references waiting for release
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collection has been drained
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Release every reference in registration order and clear the collection
    ///
    /// Returns how many references were released. Only the first call drains;
    /// later calls return 0.
    pub fn release_all(&self) -> usize {
        let items = {
            let mut state = self.state.lock();
            if state.released {
                return 0;
            }
            state.released = true;
            std::mem::take(&mut state.items)
        };

        let count = items.len();
        for reference in items {
            release_one(reference);
        }
        count
    }
}

impl Default for PendingReferences {
    fn default() -> Self {
        Self::new()
    }
}

fn release_one(reference: Box<dyn Disposable>) {
    let label = reference.describe();
    if panic::catch_unwind(AssertUnwindSafe(move || reference.dispose())).is_err() {
        error!(reference = %label, "reference release panicked");
    } else {
        debug!(reference = %label, "reference released");
    }
}
