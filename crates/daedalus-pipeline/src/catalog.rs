//! Versioned action-descriptor catalog.
//!
//! The catalog holds an immutable snapshot of every action. Replacing the
//! snapshot bumps the version, which invalidates every version-keyed cache,
//! and notifies subscribers through a `watch` channel.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::descriptor::{ActionDescriptor, ActionId};

/// One published set of actions.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    version: u64,
    actions: Vec<Arc<ActionDescriptor>>,
}

impl CatalogSnapshot {
    /// Version this snapshot was published under.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Actions in registration order.
    #[must_use]
    pub fn actions(&self) -> &[Arc<ActionDescriptor>] {
        &self.actions
    }

    /// Finds an action by id.
    #[must_use]
    pub fn find(&self, id: ActionId) -> Option<&Arc<ActionDescriptor>> {
        self.actions.iter().find(|a| a.id() == id)
    }

    /// Finds an action by display name.
    #[must_use]
    pub fn find_by_name(&self, display_name: &str) -> Option<&Arc<ActionDescriptor>> {
        self.actions.iter().find(|a| a.display_name() == display_name)
    }
}

/// The shared action catalog.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = ActionDescriptorCatalog::new(vec![orders_get, orders_create]);
/// assert_eq!(catalog.version(), 1);
///
/// catalog.replace(reloaded_actions);
/// assert_eq!(catalog.version(), 2);
/// ```
#[derive(Debug)]
pub struct ActionDescriptorCatalog {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    version_tx: watch::Sender<u64>,
}

impl ActionDescriptorCatalog {
    /// Publishes `actions` as version 1.
    #[must_use]
    pub fn new(actions: Vec<ActionDescriptor>) -> Self {
        let snapshot = CatalogSnapshot {
            version: 1,
            actions: actions.into_iter().map(Arc::new).collect(),
        };
        let (version_tx, _) = watch::channel(1);
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            version_tx,
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// The current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot.read().version
    }

    /// Finds an action in the current snapshot.
    #[must_use]
    pub fn find(&self, id: ActionId) -> Option<Arc<ActionDescriptor>> {
        self.snapshot.read().find(id).cloned()
    }

    /// Replaces every action and bumps the version. Returns the new version.
    pub fn replace(&self, actions: Vec<ActionDescriptor>) -> u64 {
        let version = {
            let mut guard = self.snapshot.write();
            let version = guard.version + 1;
            *guard = Arc::new(CatalogSnapshot {
                version,
                actions: actions.into_iter().map(Arc::new).collect(),
            });
            version
        };
        self.version_tx.send_replace(version);
        info!(version, "action catalog replaced");
        version
    }

    /// Receives the version after every replacement.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}

impl Default for ActionDescriptorCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ActionOutput, FnActionHandler};

    fn action(name: &str) -> ActionDescriptor {
        ActionDescriptor::endpoint(
            name,
            Arc::new(FnActionHandler::new(|_, _| async { Ok(ActionOutput::Empty) })),
        )
        .build()
    }

    #[test]
    fn test_replace_bumps_version() {
        let catalog = ActionDescriptorCatalog::new(vec![action("a")]);
        let before = catalog.snapshot();
        assert_eq!(catalog.version(), 1);

        assert_eq!(catalog.replace(vec![action("b"), action("c")]), 2);
        assert_eq!(catalog.version(), 2);
        assert_eq!(catalog.snapshot().actions().len(), 2);
        // Old readers keep their snapshot.
        assert_eq!(before.actions().len(), 1);
        assert!(catalog.snapshot().find_by_name("a").is_none());
    }

    #[test]
    fn test_find() {
        let catalog = ActionDescriptorCatalog::new(vec![action("a")]);
        let id = catalog.snapshot().actions()[0].id();
        assert!(catalog.find(id).is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_new_version() {
        let catalog = ActionDescriptorCatalog::default();
        let mut rx = catalog.subscribe();
        catalog.replace(vec![action("a")]);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), 2);
    }
}
