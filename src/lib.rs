//! Layered configuration with live reload.
//!
//! A [`Config`] merges the data of an ordered list of [`Provider`]s into one
//! case-insensitive tree, later providers overriding earlier ones leaf by
//! leaf. Providers that also implement [`Watcher`] can push changes while
//! [`Config::watch`] runs; every change is published as a new immutable
//! snapshot and delivered to the [`Config::on_change`] subscribers whose
//! path prefixes it touches.

pub mod config;

pub use config::{
    ChangeNotifier, Config, ConfigBuilder, ConfigError, DiagnosticSink, EnvProvider,
    FileProvider, Provider, ProviderError, TracingSink, Values, Watcher,
};
pub use tokio_util::sync::CancellationToken;
