//! Per-action invoker state, cached against the catalog version.
//!
//! An entry holds the ordered filter items and the method executor for one
//! action. Instances that are not reusable are dropped from the cached copy
//! and recreated by the filter providers on every request.

use daedalus_core::cache::CacheStats;
use daedalus_core::{ServiceProvider, VersionedCache};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::ActionDescriptorCatalog;
use crate::descriptor::{ActionDescriptor, ActionId};
use crate::error::PipelineResult;
use crate::executor::ActionMethodExecutor;
use crate::filters::{
    sort_filter_descriptors, DefaultFilterProvider, Filter, FilterDescriptor, FilterItem, FilterProvider,
    FilterProviderContext, FilterScope, FilterSet,
};

/// Cached state for one action.
#[derive(Debug)]
pub struct InvokerCacheEntry {
    filter_items: Vec<FilterItem>,
    executor: ActionMethodExecutor,
}

impl InvokerCacheEntry {
    /// Ordered filter items; non-reusable items carry no instance.
    #[must_use]
    pub fn filter_items(&self) -> &[FilterItem] {
        &self.filter_items
    }

    /// The method executor.
    #[must_use]
    pub const fn executor(&self) -> &ActionMethodExecutor {
        &self.executor
    }

    fn needs_providers(&self) -> bool {
        self.filter_items.iter().any(|item| item.filter.is_none())
    }
}

/// Invoker state for every action, keyed by action identity.
#[derive(Debug)]
pub struct InvokerCache {
    catalog: Arc<ActionDescriptorCatalog>,
    providers: Vec<Arc<dyn FilterProvider>>,
    global_filters: Vec<FilterDescriptor>,
    cache: VersionedCache<ActionId, InvokerCacheEntry>,
}

impl InvokerCache {
    /// Creates a cache.
    ///
    /// `global_filters` apply to every action. An empty provider list falls
    /// back to [`DefaultFilterProvider`].
    #[must_use]
    pub fn new(
        catalog: Arc<ActionDescriptorCatalog>,
        mut providers: Vec<Arc<dyn FilterProvider>>,
        global_filters: Vec<Filter>,
    ) -> Self {
        if providers.is_empty() {
            providers.push(Arc::new(DefaultFilterProvider));
        }
        providers.sort_by_key(|p| p.order());
        Self {
            catalog,
            providers,
            global_filters: global_filters
                .into_iter()
                .map(|f| FilterDescriptor::new(f, FilterScope::Global))
                .collect(),
            cache: VersionedCache::new(),
        }
    }

    /// Adds a global filter descriptor, such as a factory.
    #[must_use]
    pub fn with_global_descriptor(mut self, descriptor: FilterDescriptor) -> Self {
        self.global_filters.push(descriptor);
        self
    }

    /// The catalog this cache follows.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ActionDescriptorCatalog> {
        &self.catalog
    }

    /// Returns the cached entry for `action` and the filters to run for
    /// this request.
    pub fn get(
        &self,
        action: &ActionDescriptor,
        services: &dyn ServiceProvider,
    ) -> PipelineResult<(Arc<InvokerCacheEntry>, FilterSet)> {
        let version = self.catalog.version();
        let mut fresh = None;
        let entry = self.cache.try_get_or_insert_with(&action.id(), version, || {
            let items = self.materialize(action, services, self.declared(action))?;
            let filters: Vec<Filter> = items.iter().filter_map(|item| item.filter.clone()).collect();
            fresh = Some(filters);
            debug!(action = action.display_name(), version, "invoker cache entry built");
            Ok::<_, crate::error::PipelineError>(InvokerCacheEntry {
                filter_items: items
                    .into_iter()
                    .map(|mut item| {
                        if !item.is_reusable {
                            item.filter = None;
                        }
                        item
                    })
                    .collect(),
                executor: ActionMethodExecutor::for_action(action),
            })
        })?;

        let filters = match fresh {
            Some(filters) => filters,
            None if entry.needs_providers() => self
                .materialize(action, services, entry.filter_items.clone())?
                .into_iter()
                .filter_map(|item| item.filter)
                .collect(),
            None => entry
                .filter_items
                .iter()
                .filter_map(|item| item.filter.clone())
                .collect(),
        };
        Ok((entry, FilterSet::from_filters(filters)))
    }

    /// Drops entries built for older catalog versions.
    pub fn purge_stale(&self) -> usize {
        self.cache.purge_stale(self.catalog.version())
    }

    /// Number of cached actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hit and miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Purges stale entries whenever the catalog publishes a new version.
    ///
    /// The task ends when the cache or the catalog is dropped.
    pub fn spawn_purge_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut versions = self.catalog.subscribe();
        tokio::spawn(async move {
            while versions.changed().await.is_ok() {
                let version = *versions.borrow_and_update();
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.cache.purge_stale(version);
                debug!(version, purged, "invoker cache purged");
            }
        })
    }

    fn declared(&self, action: &ActionDescriptor) -> Vec<FilterItem> {
        let mut descriptors: Vec<FilterDescriptor> = self
            .global_filters
            .iter()
            .chain(action.filters())
            .cloned()
            .collect();
        sort_filter_descriptors(&mut descriptors);
        descriptors.into_iter().map(FilterItem::new).collect()
    }

    fn materialize(
        &self,
        action: &ActionDescriptor,
        services: &dyn ServiceProvider,
        items: Vec<FilterItem>,
    ) -> PipelineResult<Vec<FilterItem>> {
        let mut ctx = FilterProviderContext {
            action,
            services,
            results: items,
        };
        for provider in &self.providers {
            provider.on_providers_executing(&mut ctx)?;
        }
        for provider in self.providers.iter().rev() {
            provider.on_providers_executed(&mut ctx)?;
        }
        Ok(ctx.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ActionOutput, FnActionHandler};
    use crate::filters::{ActionFilter, FnFilterFactory};
    use async_trait::async_trait;
    use daedalus_core::Container;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Noop;

    #[async_trait]
    impl ActionFilter for Noop {}

    fn action_with(descriptor: FilterDescriptor) -> ActionDescriptor {
        ActionDescriptor::endpoint(
            "a",
            Arc::new(FnActionHandler::new(|_, _| async { Ok(ActionOutput::Empty) })),
        )
        .filter(Filter::action(Noop))
        .filter_descriptor(descriptor)
        .build()
    }

    fn counting_factory(reusable: bool, counter: &Arc<AtomicUsize>) -> FilterDescriptor {
        let counter = Arc::clone(counter);
        FilterDescriptor::factory(
            Arc::new(FnFilterFactory::new(reusable, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Filter::action(Noop))
            })),
            FilterScope::Action,
        )
    }

    #[test]
    fn test_entry_reused_within_version() {
        let created = Arc::new(AtomicUsize::new(0));
        let catalog = Arc::new(ActionDescriptorCatalog::new(vec![action_with(counting_factory(
            true, &created,
        ))]));
        let action = Arc::clone(&catalog.snapshot().actions()[0]);
        let cache = InvokerCache::new(Arc::clone(&catalog), Vec::new(), vec![Filter::action(Noop)]);
        let services = Container::new();

        let (first, filters) = cache.get(&action, &services).expect("entry");
        assert_eq!(filters.action.len(), 3);
        let (second, _) = cache.get(&action, &services).expect("entry");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_non_reusable_factory_runs_per_request() {
        let created = Arc::new(AtomicUsize::new(0));
        let catalog = Arc::new(ActionDescriptorCatalog::new(vec![action_with(counting_factory(
            false, &created,
        ))]));
        let action = Arc::clone(&catalog.snapshot().actions()[0]);
        let cache = InvokerCache::new(Arc::clone(&catalog), Vec::new(), Vec::new());
        let services = Container::new();

        for _ in 0..3 {
            let (entry, filters) = cache.get(&action, &services).expect("entry");
            assert_eq!(filters.action.len(), 2);
            assert!(entry.filter_items().iter().any(|item| item.filter.is_none()));
        }
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_catalog_replace_invalidates() {
        let created = Arc::new(AtomicUsize::new(0));
        let catalog = Arc::new(ActionDescriptorCatalog::new(vec![action_with(counting_factory(
            true, &created,
        ))]));
        let action = Arc::clone(&catalog.snapshot().actions()[0]);
        let cache = InvokerCache::new(Arc::clone(&catalog), Vec::new(), Vec::new());
        let services = Container::new();

        let (before, _) = cache.get(&action, &services).expect("entry");
        catalog.replace(vec![action_with(counting_factory(true, &created))]);
        let (after, _) = cache.get(&action, &services).expect("entry");
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_global_filters_run_first() {
        let catalog = Arc::new(ActionDescriptorCatalog::default());
        let action = action_with(FilterDescriptor::new(Filter::action(Noop), FilterScope::Controller));
        let cache = InvokerCache::new(catalog, Vec::new(), vec![Filter::action(Noop)]);
        let (entry, _) = cache.get(&action, &Container::new()).expect("entry");
        let scopes: Vec<FilterScope> = entry.filter_items().iter().map(|i| i.descriptor.scope()).collect();
        assert_eq!(
            scopes,
            [FilterScope::Global, FilterScope::Controller, FilterScope::Action]
        );
    }

    #[tokio::test]
    async fn test_purge_task_follows_catalog() {
        let catalog = Arc::new(ActionDescriptorCatalog::new(vec![action_with(FilterDescriptor::new(
            Filter::action(Noop),
            FilterScope::Action,
        ))]));
        let action = Arc::clone(&catalog.snapshot().actions()[0]);
        let cache = Arc::new(InvokerCache::new(Arc::clone(&catalog), Vec::new(), Vec::new()));
        let task = cache.spawn_purge_task();
        cache.get(&action, &Container::new()).expect("entry");
        assert_eq!(cache.len(), 1);

        catalog.replace(Vec::new());
        for _ in 0..50 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(cache.is_empty());
        drop(cache);
        catalog.replace(Vec::new());
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("task ends")
            .expect("task ok");
    }
}
