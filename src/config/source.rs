use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;

/// A provider's flat key/value data, keyed by the provider's native key names.
///
/// Values may themselves be tables; they are merged structurally below
/// the key's path.
pub type Values = toml::Table;

/// A source of configuration data.
///
/// Every provider can be loaded once on demand. Providers that can report
/// upstream changes additionally expose a [`Watcher`] through
/// [`watcher`](Self::watcher).
///
/// The `Debug` rendering identifies the provider and the filters or options
/// it runs with; it is what diagnostics report when a watch session fails.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Fetches the provider's complete current data.
    fn load(&self) -> Result<Values, ProviderError>;

    /// Returns the watch capability, if this provider has one.
    fn watcher(&self) -> Option<&dyn Watcher> {
        None
    }
}

/// Long-lived change reporting for a [`Provider`].
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Runs until `token` is cancelled or the provider fails.
    ///
    /// Each time upstream data changes the implementation calls
    /// [`ChangeNotifier::notify`] with the provider's complete current
    /// data, never a delta. Returning an error before the first suspension
    /// point is treated as a setup failure.
    async fn watch(
        &self,
        token: CancellationToken,
        notifier: ChangeNotifier,
    ) -> Result<(), ProviderError>;
}

/// Handle a [`Watcher`] uses to hand changed data back to its owner.
#[derive(Clone)]
pub struct ChangeNotifier {
    callback: Arc<dyn Fn(Values) + Send + Sync>,
}

impl ChangeNotifier {
    pub fn new(callback: impl Fn(Values) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Delivers the provider's complete current data.
    pub fn notify(&self, values: Values) {
        (self.callback)(values);
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier").finish_non_exhaustive()
    }
}
