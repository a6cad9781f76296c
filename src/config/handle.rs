use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use toml::Value;

use super::builder::ConfigBuilder;
use super::dispatch::Dispatcher;
use super::sink::DiagnosticSink;
use super::source::{Provider, Values};
use super::store::Store;
use super::tree::{self, Splitter, Tree};
use super::watch;
use super::ConfigError;

/// Merged configuration from an ordered set of providers.
///
/// `Config` is a cheap handle; clones share the same snapshot, providers and
/// subscriptions. Reads never block behind a reload.
///
/// ## Example
///
/// ```no_run
/// use strata::Config;
///
/// let config = Config::builder()
///     .with_file("config/default.toml", true)
///     .with_env("MYAPP", "__")
///     .build()?;
///
/// let port: u16 = config.unmarshal("server.port")?;
/// config.on_change(|config| {
///     println!("server changed: {:?}", config.get("server.host"));
/// }, ["server"]);
/// # Ok::<(), strata::ConfigError>(())
/// ```
#[derive(Clone)]
pub struct Config {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    dispatcher: Dispatcher,
    splitter: Splitter,
    sink: Arc<dyn DiagnosticSink>,
}

impl Config {
    /// Creates a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub(crate) fn new(
        providers: Vec<Arc<dyn Provider>>,
        splitter: Splitter,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Store::new(providers),
                dispatcher: Dispatcher::default(),
                splitter,
                sink,
            }),
        }
    }

    /// Returns the leaf value at a dotted, case-insensitive path.
    ///
    /// Paths that are missing or address a nested table return `None`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let snapshot = self.inner.store.current();
        match tree::lookup(&snapshot, path) {
            Some(Value::Table(_)) | None => None,
            Some(value) => Some(value.clone()),
        }
    }

    /// Deserializes the value or sub-tree at `path`.
    ///
    /// An empty path deserializes the whole configuration.
    pub fn unmarshal<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let snapshot = self.inner.store.current();
        let value = if tree::normalize_path(path).is_empty() {
            Value::Table((*snapshot).clone())
        } else {
            tree::lookup(&snapshot, path)
                .cloned()
                .ok_or_else(|| ConfigError::NotFound(path.to_string()))?
        };

        value.try_into().map_err(|source| ConfigError::Unmarshal {
            path: path.to_string(),
            source,
        })
    }

    /// Returns the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<Tree> {
        self.inner.store.current()
    }

    /// Registers `callback` for changes under any of `prefixes`.
    ///
    /// The callback runs at most once per published change, after the new
    /// snapshot is visible. An empty prefix list subscribes to every change.
    /// Callbacks run while reloads and watch changes are serialized, so they
    /// must not call [`reload`](Self::reload) themselves; that call would wait
    /// on the cycle running the callback. Reading the configuration, adding
    /// subscriptions and starting [`watch`](Self::watch) are fine.
    pub fn on_change<F, I, S>(&self, callback: F, prefixes: I)
    where
        F: Fn(&Config) + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = prefixes.into_iter().map(Into::into).collect();
        self.inner.dispatcher.subscribe(Arc::new(callback), prefixes);
    }

    /// Registers `callback` for every change.
    pub fn on_any_change<F>(&self, callback: F)
    where
        F: Fn(&Config) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(Arc::new(callback), Vec::new());
    }

    /// Reloads every provider and publishes the merged result.
    ///
    /// On failure the current snapshot stays in place.
    pub fn reload(&self) -> Result<(), ConfigError> {
        self.inner.store.load(
            |values| tree::build(values, &*self.inner.splitter),
            |old, new| self.dispatch(old, new),
        )
    }

    /// Watches every provider that supports it until `token` is cancelled.
    ///
    /// Fails only if a provider's watch cannot be set up. Failures of an
    /// established watch session go to the diagnostic sink and leave the
    /// other sessions running. No callback fires after this returns.
    pub async fn watch(&self, token: CancellationToken) -> Result<(), ConfigError> {
        watch::run(self, token).await
    }

    pub(crate) fn providers(&self) -> Vec<(usize, Arc<dyn Provider>)> {
        self.inner.store.providers()
    }

    pub(crate) fn sink(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.inner.sink)
    }

    /// Applies a provider's complete current data from its watch session.
    pub(crate) fn apply_change(&self, index: usize, values: &Values) {
        let tree = tree::build(values, &*self.inner.splitter);
        self.inner
            .store
            .replace(index, tree, |old, new| self.dispatch(old, new));
    }

    fn dispatch(&self, old: &Tree, new: &Tree) {
        self.inner
            .dispatcher
            .dispatch(self, old, new, self.inner.sink.as_ref());
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("snapshot", &self.inner.store.current())
            .finish_non_exhaustive()
    }
}
