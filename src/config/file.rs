//! File-based configuration provider.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::source::{ChangeNotifier, Provider, Values, Watcher};

/// A configuration provider that loads from a TOML file.
///
/// Files can be marked as required or optional. Required files that don't exist
/// cause an error; optional files that don't exist load as empty.
///
/// Watching is opt-in through [`with_poll_interval`](Self::with_poll_interval):
/// the file is re-read on every tick and the new contents are reported when
/// they parse to something different. A tick that cannot read or parse the
/// file is logged and skipped; polling carries on.
#[derive(Debug, Clone)]
pub struct FileProvider {
    path: PathBuf,
    required: bool,
    poll_interval: Option<Duration>,
}

impl FileProvider {
    /// Creates a new file provider.
    ///
    /// If `required` is true, loading fails if the file doesn't exist.
    pub fn new(path: impl AsRef<Path>, required: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            required,
            poll_interval: None,
        }
    }

    /// Enables watching by polling the file every `interval`.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

impl Provider for FileProvider {
    fn load(&self) -> Result<Values, ProviderError> {
        load_config_file(&self.path, self.required)
    }

    fn watcher(&self) -> Option<&dyn Watcher> {
        self.poll_interval.map(|_| self as &dyn Watcher)
    }
}

#[async_trait]
impl Watcher for FileProvider {
    async fn watch(
        &self,
        token: CancellationToken,
        notifier: ChangeNotifier,
    ) -> Result<(), ProviderError> {
        let Some(period) = self.poll_interval else {
            return Ok(());
        };

        let mut last = self.load()?;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let current = match self.load() {
                Ok(current) => current,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "failed to reload config file");
                    continue;
                }
            };
            if current != last {
                debug!(path = %self.path.display(), "config file changed");
                notifier.notify(current.clone());
                last = current;
            }
        }
    }
}

/// Reads the file at `path` into provider values.
///
/// A missing optional file reads as empty.
fn load_config_file(path: &Path, required: bool) -> Result<Values, ProviderError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return if required {
                Err(ProviderError::FileNotFound(path.to_path_buf()))
            } else {
                Ok(Values::new())
            };
        }
        Err(source) => {
            return Err(ProviderError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    toml::from_str(&contents).map_err(|source| ProviderError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;
    use tracing::Instrument;
    use tracing_test::traced_test;

    fn replace_contents(file: &NamedTempFile, contents: &str) {
        let mut replacement = NamedTempFile::new_in(file.path().parent().unwrap()).unwrap();
        writeln!(replacement, "{contents}").unwrap();
        replacement.persist(file.path()).unwrap();
    }

    #[test]
    fn test_file_provider_loads_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key = \"value\"").unwrap();

        let provider = FileProvider::new(file.path(), true);
        let values = provider.load().unwrap();

        assert_eq!(values.get("key"), Some(&toml::Value::String("value".into())));
    }

    #[test]
    fn test_file_provider_required_missing() {
        let provider = FileProvider::new("/nonexistent/path/config.toml", true);
        let result = provider.load();

        assert!(matches!(result, Err(ProviderError::FileNotFound(_))));
    }

    #[test]
    fn test_file_provider_optional_missing() {
        let provider = FileProvider::new("/nonexistent/path/config.toml", false);
        let values = provider.load().unwrap();

        assert!(values.is_empty());
    }

    #[test]
    fn test_file_provider_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key = ").unwrap();

        let result = FileProvider::new(file.path(), true).load();

        assert!(matches!(result, Err(ProviderError::ParseError { .. })));
    }

    #[test]
    fn test_watch_capability_requires_poll_interval() {
        let provider = FileProvider::new("config.toml", false);
        assert!(provider.watcher().is_none());

        let provider = provider.with_poll_interval(Duration::from_millis(10));
        assert!(provider.watcher().is_some());
    }

    #[tokio::test]
    async fn test_watch_reports_changed_contents() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key = \"before\"").unwrap();

        let provider = FileProvider::new(file.path(), true)
            .with_poll_interval(Duration::from_millis(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = {
            let seen = Arc::clone(&seen);
            ChangeNotifier::new(move |values| seen.lock().push(values))
        };
        let token = CancellationToken::new();

        let session = tokio::spawn({
            let provider = provider.clone();
            let token = token.clone();
            async move { provider.watch(token, notifier).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());

        replace_contents(&file, r#"key = "after""#);
        tokio::time::sleep(Duration::from_millis(100)).await;

        token.cancel();
        session.await.unwrap().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("key"), Some(&toml::Value::String("after".into())));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_watch_keeps_polling_after_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "key = \"before\"").unwrap();

        let provider = FileProvider::new(file.path(), true)
            .with_poll_interval(Duration::from_millis(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notifier = {
            let seen = Arc::clone(&seen);
            ChangeNotifier::new(move |values| seen.lock().push(values))
        };
        let token = CancellationToken::new();

        let session = tokio::spawn(
            {
                let provider = provider.clone();
                let token = token.clone();
                async move { provider.watch(token, notifier).await }
            }
            .in_current_span(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        replace_contents(&file, "key = ");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!session.is_finished());
        assert!(logs_contain("failed to reload config file"));

        replace_contents(&file, r#"key = "after""#);
        tokio::time::sleep(Duration::from_millis(100)).await;

        token.cancel();
        session.await.unwrap().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("key"), Some(&toml::Value::String("after".into())));
    }

    #[tokio::test]
    async fn test_watch_fails_fast_on_unreadable_file() {
        let provider = FileProvider::new("/nonexistent/path/config.toml", true)
            .with_poll_interval(Duration::from_millis(10));

        let result = provider
            .watch(CancellationToken::new(), ChangeNotifier::new(|_| {}))
            .await;

        assert!(matches!(result, Err(ProviderError::FileNotFound(_))));
    }
}
