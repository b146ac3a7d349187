//! Action constraints and selection among candidate actions.
//!
//! Constraint instances are resolved per action and cached against the
//! catalog version, like filters. Non-reusable constraint factories run
//! on every selection.

use daedalus_core::{RequestContext, ServiceProvider, VersionedCache};
use http::Method;
use mime::Mime;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::ActionDescriptorCatalog;
use crate::descriptor::{ActionDescriptor, ActionId};
use crate::error::{PipelineError, PipelineResult};

/// What a constraint sees when deciding.
#[derive(Debug, Clone, Copy)]
pub struct ActionConstraintContext<'a> {
    /// The request.
    pub request: &'a RequestContext,
    /// Every candidate under consideration.
    pub candidates: &'a [Arc<ActionDescriptor>],
    /// The candidate being evaluated.
    pub current: &'a ActionDescriptor,
}

/// Decides whether an action can serve a request.
pub trait ActionConstraint: Send + Sync + fmt::Debug {
    /// Evaluation order.
    fn order(&self) -> i32 {
        0
    }

    /// Whether the candidate accepts the request.
    fn accept(&self, ctx: &ActionConstraintContext<'_>) -> bool;
}

/// Creates constraint instances.
pub trait ActionConstraintFactory: Send + Sync + fmt::Debug {
    /// Whether one instance may serve every request.
    fn is_reusable(&self) -> bool {
        false
    }

    /// Creates a constraint.
    fn create_instance(&self, services: &dyn ServiceProvider) -> Arc<dyn ActionConstraint>;
}

/// A declared constraint.
#[derive(Debug, Clone)]
pub enum ConstraintDescriptor {
    /// A ready instance.
    Instance(Arc<dyn ActionConstraint>),
    /// A factory.
    Factory(Arc<dyn ActionConstraintFactory>),
}

impl ConstraintDescriptor {
    /// Wraps an instance.
    pub fn instance(constraint: impl ActionConstraint + 'static) -> Self {
        Self::Instance(Arc::new(constraint))
    }
}

/// Accepts requests whose method is in the list.
#[derive(Debug, Clone)]
pub struct HttpMethodConstraint {
    methods: Vec<Method>,
}

impl HttpMethodConstraint {
    /// Order of this constraint.
    pub const ORDER: i32 = 100;

    /// Accepts `methods`; an empty list accepts everything.
    #[must_use]
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }

    /// Allowed methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

impl ActionConstraint for HttpMethodConstraint {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn accept(&self, ctx: &ActionConstraintContext<'_>) -> bool {
        self.methods.is_empty() || self.methods.contains(ctx.request.method())
    }
}

/// Accepts requests whose `Content-Type` matches one of the listed types.
///
/// Requests without a content type are accepted.
#[derive(Debug, Clone)]
pub struct ConsumesConstraint {
    content_types: Vec<Mime>,
}

impl ConsumesConstraint {
    /// Order of this constraint.
    pub const ORDER: i32 = 200;

    /// Accepts the given media types; wildcards are allowed.
    #[must_use]
    pub fn new(content_types: Vec<Mime>) -> Self {
        Self { content_types }
    }
}

impl ActionConstraint for ConsumesConstraint {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    fn accept(&self, ctx: &ActionConstraintContext<'_>) -> bool {
        let Some(content_type) = ctx.request.content_type() else {
            return true;
        };
        let Ok(request_type) = content_type.parse::<Mime>() else {
            return false;
        };
        self.content_types.iter().any(|allowed| {
            (allowed.type_() == mime::STAR || allowed.type_() == request_type.type_())
                && (allowed.subtype() == mime::STAR || allowed.subtype() == request_type.subtype())
        })
    }
}

#[derive(Debug, Clone)]
struct ConstraintItem {
    descriptor: ConstraintDescriptor,
    constraint: Option<Arc<dyn ActionConstraint>>,
}

/// Resolved constraints per action, keyed by catalog version.
#[derive(Debug)]
pub struct ActionConstraintCache {
    catalog: Arc<ActionDescriptorCatalog>,
    cache: VersionedCache<ActionId, Vec<ConstraintItem>>,
}

impl ActionConstraintCache {
    /// Creates a cache tied to `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<ActionDescriptorCatalog>) -> Self {
        Self {
            catalog,
            cache: VersionedCache::new(),
        }
    }

    /// Constraints for `action` in evaluation order.
    pub fn get_constraints(
        &self,
        action: &ActionDescriptor,
        services: &dyn ServiceProvider,
    ) -> Vec<Arc<dyn ActionConstraint>> {
        let version = self.catalog.version();
        let items = self.cache.get_or_insert_with(&action.id(), version, || {
            let mut items: Vec<ConstraintItem> = action
                .constraints()
                .iter()
                .map(|descriptor| ConstraintItem {
                    constraint: match descriptor {
                        ConstraintDescriptor::Instance(c) => Some(Arc::clone(c)),
                        ConstraintDescriptor::Factory(f) if f.is_reusable() => Some(f.create_instance(services)),
                        ConstraintDescriptor::Factory(_) => None,
                    },
                    descriptor: descriptor.clone(),
                })
                .collect();
            items.sort_by_key(|item| item.constraint.as_ref().map_or(0, |c| c.order()));
            items
        });
        items
            .iter()
            .map(|item| match (&item.constraint, &item.descriptor) {
                (Some(constraint), _) => Arc::clone(constraint),
                (None, ConstraintDescriptor::Factory(factory)) => factory.create_instance(services),
                (None, ConstraintDescriptor::Instance(constraint)) => Arc::clone(constraint),
            })
            .collect()
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
}

/// Picks the action that serves a request among route-matched candidates.
#[derive(Debug)]
pub struct ActionSelector {
    constraints: ActionConstraintCache,
}

impl ActionSelector {
    /// Creates a selector tied to `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<ActionDescriptorCatalog>) -> Self {
        Self {
            constraints: ActionConstraintCache::new(catalog),
        }
    }

    /// The constraint cache.
    #[must_use]
    pub const fn constraint_cache(&self) -> &ActionConstraintCache {
        &self.constraints
    }

    /// Candidates whose every constraint accepts the request.
    pub fn select_candidates(
        &self,
        request: &RequestContext,
        candidates: &[Arc<ActionDescriptor>],
    ) -> Vec<Arc<ActionDescriptor>> {
        self.evaluate(request, candidates)
            .into_iter()
            .map(|(action, _)| action)
            .collect()
    }

    /// The single best candidate.
    ///
    /// Among accepted candidates, those with the most constraints win.
    /// Returns `None` when nothing accepts and an error when the winners tie.
    pub fn select_best(
        &self,
        request: &RequestContext,
        candidates: &[Arc<ActionDescriptor>],
    ) -> PipelineResult<Option<Arc<ActionDescriptor>>> {
        let accepted = self.evaluate(request, candidates);
        let Some(best) = accepted.iter().map(|(_, count)| *count).max() else {
            debug!(candidates = candidates.len(), "no action accepted the request");
            return Ok(None);
        };
        let mut winners: Vec<Arc<ActionDescriptor>> = accepted
            .into_iter()
            .filter(|(_, count)| *count == best)
            .map(|(action, _)| action)
            .collect();
        if winners.len() > 1 {
            return Err(PipelineError::AmbiguousMatch {
                candidates: winners.iter().map(|a| a.display_name().to_string()).collect(),
            });
        }
        Ok(winners.pop())
    }

    fn evaluate(
        &self,
        request: &RequestContext,
        candidates: &[Arc<ActionDescriptor>],
    ) -> Vec<(Arc<ActionDescriptor>, usize)> {
        let services = request.services().as_ref();
        candidates
            .iter()
            .filter_map(|candidate| {
                let constraints = self.constraints.get_constraints(candidate, services);
                let ctx = ActionConstraintContext {
                    request,
                    candidates,
                    current: candidate,
                };
                constraints
                    .iter()
                    .all(|c| c.accept(&ctx))
                    .then(|| (Arc::clone(candidate), constraints.len()))
            })
            .collect()
    }
}
