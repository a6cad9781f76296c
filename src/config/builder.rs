use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::env::EnvProvider;
use super::file::FileProvider;
use super::handle::Config;
use super::sink::{DiagnosticSink, TracingSink};
use super::source::Provider;
use super::tree::{delimiter_splitter, Splitter};
use super::ConfigError;

/// Builder for a [`Config`] assembled from multiple providers.
///
/// Providers are merged in registration order, with later providers
/// overriding earlier ones leaf by leaf. Nested tables are merged
/// recursively; other values (including arrays) are replaced entirely.
///
/// ## Example
///
/// ```no_run
/// use strata::Config;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Database {
///     host: String,
///     port: u16,
/// }
///
/// // defaults -> env overrides -> local file overrides env
/// let config = Config::builder()
///     .with_file("config/default.toml", true)
///     .with_env("MYAPP", "__")
///     .with_file("config/local.toml", false)
///     .build()?;
///
/// let database: Database = config.unmarshal("database")?;
/// # Ok::<(), strata::ConfigError>(())
/// ```
#[must_use = "builders do nothing until .build() is called"]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn Provider>>,
    splitter: Splitter,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            splitter: delimiter_splitter("."),
            sink: Arc::new(TracingSink),
        }
    }
}

impl ConfigBuilder {
    /// Registers a provider.
    ///
    /// Providers are applied in registration order, so later providers
    /// override earlier ones.
    pub fn with_provider(self, provider: impl Provider + 'static) -> Self {
        self.with_shared_provider(Arc::new(provider))
    }

    /// Registers a provider the caller keeps a handle to.
    pub fn with_shared_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds a TOML file to be loaded.
    ///
    /// If `required` is `true`, the build will fail if the file doesn't exist.
    /// Optional files that are missing are loaded as empty.
    pub fn with_file(self, path: impl AsRef<Path>, required: bool) -> Self {
        self.with_provider(FileProvider::new(path, required))
    }

    /// Loads configuration from environment variables with the given prefix.
    ///
    /// See [`EnvProvider`] for how variable names map to paths.
    pub fn with_env(self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.with_provider(EnvProvider::new(prefix, separator))
    }

    /// Splits provider keys on `delimiter`. Defaults to `"."`.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.splitter = delimiter_splitter(delimiter);
        self
    }

    /// Splits provider keys with a custom function.
    ///
    /// Keys for which the function returns no non-empty segment are dropped.
    pub fn with_splitter<F>(mut self, splitter: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        self.splitter = Arc::new(splitter);
        self
    }

    /// Routes background failures to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Loads every provider once and merges the results.
    ///
    /// Fails with the first provider error; no configuration is produced.
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = Config::new(self.providers, self.splitter, self.sink);
        config.reload()?;
        Ok(config)
    }
}

impl fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}
