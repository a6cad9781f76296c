//! Path-scoped change subscriptions.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::handle::Config;
use super::sink::{panic_message, DiagnosticSink};
use super::tree::{self, Tree};

pub(crate) type Callback = Arc<dyn Fn(&Config) + Send + Sync>;

struct Subscription {
    callback: Callback,
    /// Normalized prefixes; empty means every change.
    prefixes: Vec<String>,
}

impl Subscription {
    fn matches(&self, changed: &[String]) -> bool {
        if self.prefixes.is_empty() {
            return !changed.is_empty();
        }
        changed.iter().any(|path| {
            self.prefixes
                .iter()
                .any(|prefix| tree::covers(prefix, path))
        })
    }
}

/// Tracks subscriptions and fans a snapshot swap out to the matching ones.
#[derive(Default)]
pub(crate) struct Dispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Dispatcher {
    pub(crate) fn subscribe(&self, callback: Callback, prefixes: Vec<String>) {
        let prefixes = prefixes
            .iter()
            .map(|prefix| tree::normalize_path(prefix))
            .collect();
        self.subscriptions.lock().push(Subscription { callback, prefixes });
    }

    /// Invokes every subscription whose prefixes cover a changed path, once each.
    ///
    /// The subscription list is not locked while callbacks run, so a callback
    /// may register further subscriptions.
    pub(crate) fn dispatch(
        &self,
        config: &Config,
        old: &Tree,
        new: &Tree,
        sink: &dyn DiagnosticSink,
    ) {
        let changed: Vec<String> = tree::diff(old, new).into_iter().collect();
        if changed.is_empty() {
            return;
        }
        debug!(paths = changed.len(), "configuration changed");

        let matched: Vec<(Callback, Vec<String>)> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|subscription| subscription.matches(&changed))
            .map(|subscription| {
                (
                    Arc::clone(&subscription.callback),
                    subscription.prefixes.clone(),
                )
            })
            .collect();

        for (callback, prefixes) in matched {
            trace!(prefixes = ?prefixes, "notifying subscriber");
            let result = catch_unwind(AssertUnwindSafe(|| callback(config)));
            if let Err(payload) = result {
                sink.callback_panicked(&prefixes, &panic_message(payload.as_ref()));
            }
        }
    }
}
