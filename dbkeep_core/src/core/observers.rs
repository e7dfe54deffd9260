use log::{debug, error};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Zero-argument callback run after every successful open / create.
///
/// Identity is the `Arc` allocation: registering a clone of the same `Arc`
/// twice is a no-op, registering two separately built closures is not.
pub type OpenCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `on_open`, used to deregister the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

/// Observers in registration order.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: u64,
    entries: Vec<(ObserverToken, OpenCallback)>,
}

impl ObserverRegistry {
    pub(crate) fn register(&mut self, callback: OpenCallback) -> ObserverToken {
        if let Some((token, _)) = self
            .entries
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &callback))
        {
            debug!("Observer already registered as {:?}", token);
            return *token;
        }
        let token = ObserverToken(self.next_id);
        self.next_id += 1;
        self.entries.push((token, callback));
        token
    }

    pub(crate) fn unregister(&mut self, token: ObserverToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| *t != token);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Cloned so callbacks run without the registry locked and may (de)register freely.
    pub(crate) fn snapshot(&self) -> Vec<OpenCallback> {
        self.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }
}

/// Run every callback in order. A panicking callback is logged and skipped.
/// Returns the number of callbacks that panicked.
pub(crate) fn notify_all(callbacks: &[OpenCallback]) -> usize {
    let mut failed = 0;
    for (index, callback) in callbacks.iter().enumerate() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback())) {
            failed += 1;
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            error!("Open observer #{} panicked: {}", index, msg);
        }
    }
    failed
}
