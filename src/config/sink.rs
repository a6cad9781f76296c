//! Diagnostics for failures the engine cannot return to a caller.

use tracing::warn;

use super::error::ProviderError;
use super::source::Provider;

/// Receives background failures: watch sessions that end in error and
/// change callbacks that panic.
pub trait DiagnosticSink: Send + Sync {
    fn watch_failed(&self, provider: &dyn Provider, error: &ProviderError);

    fn callback_panicked(&self, prefixes: &[String], panic: &str);
}

/// Default sink, reporting through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn watch_failed(&self, provider: &dyn Provider, error: &ProviderError) {
        warn!(provider = ?provider, error = %error, "watch session failed");
    }

    fn callback_panicked(&self, prefixes: &[String], panic: &str) {
        warn!(prefixes = ?prefixes, panic, "change callback panicked");
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
