use std::time::Duration;

use serde::Deserialize;
use strata::{CancellationToken, Config, FileProvider};

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), strata::ConfigError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter("strata=debug")
        .init();

    let config = Config::builder()
        .with_file("demos/default.toml", true)
        .with_env("DEMO", "__")
        .with_provider(
            FileProvider::new("demos/dev.toml", false).with_poll_interval(Duration::from_secs(1)),
        )
        .build()?;

    let app: AppSection = config.unmarshal("app")?;
    println!("App: {} (debug={})", app.name, app.debug);

    config.on_change(
        |config| match config.unmarshal::<AppSection>("app") {
            Ok(app) => println!("App changed: {} (debug={})", app.name, app.debug),
            Err(err) => eprintln!("app section unusable: {err}"),
        },
        ["app"],
    );

    // Edit demos/dev.toml while this runs; Ctrl-C to stop.
    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            token.cancel();
        }
    });

    config.watch(token).await
}
