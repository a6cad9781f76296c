//! Configuration loading, merging and live reload.

mod builder;
mod dispatch;
mod env;
mod error;
mod file;
mod handle;
mod sink;
mod source;
mod store;
pub mod tree;
mod watch;

pub use builder::ConfigBuilder;
pub use env::EnvProvider;
pub use error::{ConfigError, ProviderError};
pub use file::FileProvider;
pub use handle::Config;
pub use sink::{DiagnosticSink, TracingSink};
pub use source::{ChangeNotifier, Provider, Values, Watcher};
pub use tree::{Splitter, Tree};
