//! The published snapshot and the per-provider trees it is folded from.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use super::error::{ConfigError, ProviderError};
use super::source::{Provider, Values};
use super::tree::{self, Tree};

/// Holds the current snapshot and the ordered provider list.
///
/// Readers load the snapshot pointer without locking. Writers serialize on
/// the per-provider trees, rebuild the merged tree from scratch and swap it
/// in. The provider list is fixed at construction and never locked.
pub(crate) struct Store {
    snapshot: ArcSwap<Tree>,
    providers: Vec<Arc<dyn Provider>>,
    /// Each provider's tree as of its last load or change, by index.
    trees: Mutex<Vec<Tree>>,
}

impl Store {
    pub(crate) fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let trees = vec![Tree::new(); providers.len()];
        Self {
            snapshot: ArcSwap::from_pointee(Tree::new()),
            providers,
            trees: Mutex::new(trees),
        }
    }

    pub(crate) fn current(&self) -> Arc<Tree> {
        self.snapshot.load_full()
    }

    pub(crate) fn providers(&self) -> Vec<(usize, Arc<dyn Provider>)> {
        self.providers.iter().cloned().enumerate().collect()
    }

    /// Loads every provider in registration order and publishes the result.
    ///
    /// Nothing is published unless every provider loads. `on_publish` runs
    /// with the previous and new snapshot while writers are still excluded.
    pub(crate) fn load(
        &self,
        build: impl Fn(&Values) -> Tree,
        on_publish: impl FnOnce(&Tree, &Tree),
    ) -> Result<(), ConfigError> {
        let mut trees = self.trees.lock();

        let loaded = self
            .providers
            .iter()
            .map(|provider| provider.load().map(|values| build(&values)))
            .collect::<Result<Vec<_>, ProviderError>>()
            .map_err(ConfigError::Load)?;
        *trees = loaded;

        self.publish(&trees, on_publish);
        Ok(())
    }

    /// Replaces one provider's tree and republishes if the merged view changed.
    pub(crate) fn replace(&self, index: usize, tree: Tree, on_publish: impl FnOnce(&Tree, &Tree)) {
        let mut trees = self.trees.lock();

        let Some(current) = trees.get_mut(index) else {
            return;
        };
        if *current == tree {
            debug!(provider = ?self.providers[index], "provider data unchanged");
            return;
        }
        *current = tree;

        self.publish(&trees, on_publish);
    }

    fn publish(&self, trees: &[Tree], on_publish: impl FnOnce(&Tree, &Tree)) {
        let merged = trees
            .iter()
            .fold(Tree::new(), |merged, tree| tree::merge(&merged, tree));

        let old = self.snapshot.load_full();
        if *old == merged {
            debug!("merged configuration unchanged; skipping publish");
            return;
        }

        let new = Arc::new(merged);
        self.snapshot.store(Arc::clone(&new));
        debug!(providers = trees.len(), "published configuration snapshot");

        on_publish(&old, &new);
    }
}
