use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use strata::{
    CancellationToken, ChangeNotifier, Config, Provider, ProviderError, Values, Watcher,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Serves a fixed map and forwards every map pushed through its channel.
#[derive(Debug)]
struct MapWatcher {
    initial: Values,
    changes: tokio::sync::Mutex<mpsc::UnboundedReceiver<Values>>,
}

impl MapWatcher {
    fn new(initial: &str) -> (Self, mpsc::UnboundedSender<Values>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            initial: toml::from_str(initial).unwrap(),
            changes: tokio::sync::Mutex::new(rx),
        };
        (watcher, tx)
    }
}

impl Provider for MapWatcher {
    fn load(&self) -> Result<Values, ProviderError> {
        Ok(self.initial.clone())
    }

    fn watcher(&self) -> Option<&dyn Watcher> {
        Some(self)
    }
}

#[async_trait]
impl Watcher for MapWatcher {
    async fn watch(
        &self,
        token: CancellationToken,
        notifier: ChangeNotifier,
    ) -> Result<(), ProviderError> {
        let mut changes = self.changes.lock().await;
        loop {
            tokio::select! {
                () = token.cancelled() => return Ok(()),
                values = changes.recv() => match values {
                    Some(values) => notifier.notify(values),
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Refuses to watch at all.
#[derive(Debug)]
struct ErrorWatcher;

impl Provider for ErrorWatcher {
    fn load(&self) -> Result<Values, ProviderError> {
        Ok(Values::new())
    }

    fn watcher(&self) -> Option<&dyn Watcher> {
        Some(self)
    }
}

#[async_trait]
impl Watcher for ErrorWatcher {
    async fn watch(&self, _: CancellationToken, _: ChangeNotifier) -> Result<(), ProviderError> {
        Err(ProviderError::message("watch error"))
    }
}

/// Watches for a while, then fails.
#[derive(Debug)]
struct DroppingWatcher {
    endpoint: &'static str,
}

impl Provider for DroppingWatcher {
    fn load(&self) -> Result<Values, ProviderError> {
        Ok(Values::new())
    }

    fn watcher(&self) -> Option<&dyn Watcher> {
        Some(self)
    }
}

#[async_trait]
impl Watcher for DroppingWatcher {
    async fn watch(&self, _: CancellationToken, _: ChangeNotifier) -> Result<(), ProviderError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(ProviderError::message("connection reset"))
    }
}

#[derive(Default)]
struct RecordingSink {
    failures: Mutex<Vec<String>>,
}

impl strata::DiagnosticSink for RecordingSink {
    fn watch_failed(&self, provider: &dyn Provider, error: &ProviderError) {
        self.failures.lock().push(format!("{provider:?}: {error}"));
    }

    fn callback_panicked(&self, _: &[String], _: &str) {}
}

fn spawn_watch(config: &Config, token: &CancellationToken) -> JoinHandle<Result<(), strata::ConfigError>> {
    let config = config.clone();
    let token = token.clone();
    tokio::spawn(async move { config.watch(token).await })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_watch_delivers_change_to_subscriber() {
    let (watcher, changes) = MapWatcher::new(r#"Config = "string""#);
    let config = Config::builder().with_provider(watcher).build().unwrap();

    let value: String = config.unmarshal("config").unwrap();
    assert_eq!(value, "string");

    let token = CancellationToken::new();
    let watching = spawn_watch(&config, &token);

    let observed = Arc::new(Mutex::new(None));
    config.on_change(
        {
            let observed = Arc::clone(&observed);
            move |config| {
                *observed.lock() = Some(config.unmarshal::<String>("config").unwrap());
            }
        },
        ["config"],
    );

    changes
        .send(toml::from_str(r#"Config = "changed""#).unwrap())
        .unwrap();
    settle().await;

    assert_eq!(observed.lock().as_deref(), Some("changed"));

    token.cancel();
    watching.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_watch_setup_error_fails_watch() {
    let config = Config::builder().with_provider(ErrorWatcher).build().unwrap();

    let err = config.watch(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.to_string(), "watch configuration change: watch error");
}

#[tokio::test]
async fn test_failed_session_does_not_stop_other_providers() {
    let sink = Arc::new(RecordingSink::default());
    let (watcher, changes) = MapWatcher::new(r#""app.mode" = "initial""#);
    let config = Config::builder()
        .with_provider(DroppingWatcher {
            endpoint: "https://config.example",
        })
        .with_provider(watcher)
        .with_sink(sink.clone())
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let watching = spawn_watch(&config, &token);

    let notified = Arc::new(AtomicUsize::new(0));
    config.on_change(
        {
            let notified = Arc::clone(&notified);
            move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            }
        },
        ["app"],
    );

    settle().await;
    assert_eq!(
        *sink.failures.lock(),
        vec![r#"DroppingWatcher { endpoint: "https://config.example" }: connection reset"#.to_string()]
    );

    changes
        .send(toml::from_str(r#""app.mode" = "updated""#).unwrap())
        .unwrap();
    settle().await;

    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(
        config.get("APP.MODE"),
        Some(toml::Value::String("updated".into()))
    );

    token.cancel();
    watching.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_slash_delimited_providers_end_to_end() {
    let (first, changes) = MapWatcher::new(
        r#"
        "p/k" = "v"
        "p/d" = "."
        "#,
    );
    let (second, _unused) = MapWatcher::new(r#""p/k" = "v""#);
    let config = Config::builder()
        .with_provider(first)
        .with_provider(second)
        .with_delimiter("/")
        .build()
        .unwrap();

    assert_eq!(config.get("p.k"), Some(toml::Value::String("v".into())));
    assert_eq!(config.get("p.d"), Some(toml::Value::String(".".into())));

    let token = CancellationToken::new();
    let watching = spawn_watch(&config, &token);

    let observed = Arc::new(Mutex::new(Vec::new()));
    config.on_change(
        {
            let observed = Arc::clone(&observed);
            move |config| observed.lock().push(config.get("config"))
        },
        ["config"],
    );

    changes
        .send(toml::from_str(r#"config = "changed""#).unwrap())
        .unwrap();
    settle().await;

    assert_eq!(
        *observed.lock(),
        vec![Some(toml::Value::String("changed".into()))]
    );
    // The first provider no longer reports p/d; the second still holds p/k.
    assert_eq!(config.get("p.d"), None);
    assert_eq!(config.get("p.k"), Some(toml::Value::String("v".into())));

    token.cancel();
    watching.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unchanged_push_fires_no_callback() {
    let (watcher, changes) = MapWatcher::new(r#""x.y" = 1"#);
    let config = Config::builder().with_provider(watcher).build().unwrap();

    let token = CancellationToken::new();
    let watching = spawn_watch(&config, &token);

    let notified = Arc::new(AtomicUsize::new(0));
    config.on_any_change({
        let notified = Arc::clone(&notified);
        move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        }
    });

    changes.send(toml::from_str(r#""X.Y" = 1"#).unwrap()).unwrap();
    settle().await;
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    changes.send(toml::from_str(r#""z.y" = 2"#).unwrap()).unwrap();
    settle().await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    token.cancel();
    watching.await.unwrap().unwrap();
}
