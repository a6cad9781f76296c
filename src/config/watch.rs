//! Concurrent watch sessions, one per watch-capable provider.

use std::sync::Arc;
use std::task::Poll;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::error::{ConfigError, ProviderError};
use super::handle::Config;
use super::sink::DiagnosticSink;
use super::source::{ChangeNotifier, Provider};

/// Outcome of a session's first poll.
type Setup = Result<(), ProviderError>;

pub(super) async fn run(config: &Config, token: CancellationToken) -> Result<(), ConfigError> {
    let sessions = token.child_token();
    let mut tasks = JoinSet::new();
    let mut setups = Vec::new();

    for (index, provider) in config.providers() {
        if provider.watcher().is_none() {
            continue;
        }

        let (ready, setup) = oneshot::channel();
        setups.push(setup);

        let notifier = notifier(config.clone(), index, sessions.clone());
        let session_token = sessions.clone();
        let sink = config.sink();
        tasks.spawn(
            async move {
                run_session(provider, session_token, notifier, sink, ready).await;
            }
            .in_current_span(),
        );
    }
    info!(sessions = setups.len(), "watching configuration providers");

    for setup in setups {
        if let Ok(Err(err)) = setup.await {
            sessions.cancel();
            drain(&mut tasks).await;
            return Err(ConfigError::Watch(err));
        }
    }

    token.cancelled().await;
    sessions.cancel();
    drain(&mut tasks).await;
    info!("stopped watching configuration providers");

    Ok(())
}

/// Wraps change delivery for one provider so that nothing is applied once
/// its session has been cancelled.
fn notifier(config: Config, index: usize, token: CancellationToken) -> ChangeNotifier {
    ChangeNotifier::new(move |values| {
        if token.is_cancelled() {
            debug!(provider = index, "dropping change after cancellation");
            return;
        }
        config.apply_change(index, &values);
    })
}

async fn run_session(
    provider: Arc<dyn Provider>,
    token: CancellationToken,
    notifier: ChangeNotifier,
    sink: Arc<dyn DiagnosticSink>,
    ready: oneshot::Sender<Setup>,
) {
    let Some(watcher) = provider.watcher() else {
        let _ = ready.send(Ok(()));
        return;
    };

    let mut session = watcher.watch(token, notifier);

    // A session that fails before it ever suspends never got established.
    match futures::poll!(&mut session) {
        Poll::Ready(result) => {
            let _ = ready.send(result);
            return;
        }
        Poll::Pending => {
            let _ = ready.send(Ok(()));
        }
    }

    match session.await {
        Ok(()) => debug!(provider = ?provider, "watch session ended"),
        Err(err) => sink.watch_failed(provider.as_ref(), &err),
    }
}

async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "watch session task aborted");
        }
    }
}
