//! Validator providers and the per-metadata validator cache.

use daedalus_core::{MetadataKey, ModelMetadata};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::ValidationError;
use crate::validator::{ModelValidator, RuleValidator};

/// Contributes validators for a metadata node.
pub trait ModelValidatorProvider: Send + Sync + fmt::Debug {
    /// Appends validators for `metadata`.
    fn create_validators(
        &self,
        metadata: &ModelMetadata,
        validators: &mut Vec<Arc<dyn ModelValidator>>,
    ) -> Result<(), ValidationError>;
}

/// Turns the [`ValidationRule`](daedalus_core::ValidationRule)s declared on
/// metadata into validators. `Required` rules are placed first.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleValidatorProvider;

impl ModelValidatorProvider for RuleValidatorProvider {
    fn create_validators(
        &self,
        metadata: &ModelMetadata,
        validators: &mut Vec<Arc<dyn ModelValidator>>,
    ) -> Result<(), ValidationError> {
        let (required, others): (Vec<_>, Vec<_>) = metadata
            .validators()
            .iter()
            .partition(|rule| rule.is_required());
        for rule in required.into_iter().chain(others) {
            validators.push(Arc::new(RuleValidator::new(rule.clone())?));
        }
        Ok(())
    }
}

/// Applies one validator to metadata matching a predicate.
pub struct ConditionalValidatorProvider {
    predicate: Box<dyn Fn(&ModelMetadata) -> bool + Send + Sync>,
    validator: Arc<dyn ModelValidator>,
}

impl ConditionalValidatorProvider {
    /// Creates the provider.
    pub fn new<P>(predicate: P, validator: Arc<dyn ModelValidator>) -> Self
    where
        P: Fn(&ModelMetadata) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            validator,
        }
    }
}

impl fmt::Debug for ConditionalValidatorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalValidatorProvider")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl ModelValidatorProvider for ConditionalValidatorProvider {
    fn create_validators(
        &self,
        metadata: &ModelMetadata,
        validators: &mut Vec<Arc<dyn ModelValidator>>,
    ) -> Result<(), ValidationError> {
        if (self.predicate)(metadata) {
            validators.push(Arc::clone(&self.validator));
        }
        Ok(())
    }
}

/// Validators aggregated across providers, cached per metadata key.
///
/// Concurrent misses may both build the list; the first insert wins.
#[derive(Debug)]
pub struct ValidatorCache {
    providers: Vec<Arc<dyn ModelValidatorProvider>>,
    entries: DashMap<MetadataKey, Arc<[Arc<dyn ModelValidator>]>>,
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(vec![Arc::new(RuleValidatorProvider)])
    }
}

impl ValidatorCache {
    /// Creates a cache over an ordered provider list.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ModelValidatorProvider>>) -> Self {
        Self {
            providers,
            entries: DashMap::new(),
        }
    }

    /// Returns the validators for `metadata`.
    pub fn get_validators(
        &self,
        metadata: &ModelMetadata,
    ) -> Result<Arc<[Arc<dyn ModelValidator>]>, ValidationError> {
        if let Some(hit) = self
            .entries
            .get(metadata.key())
            .map(|e| Arc::clone(e.value()))
        {
            return Ok(hit);
        }

        let mut validators = Vec::new();
        for provider in &self.providers {
            provider.create_validators(metadata, &mut validators)?;
        }
        debug!(
            metadata = %metadata.key(),
            count = validators.len(),
            "validators resolved"
        );
        let validators: Arc<[Arc<dyn ModelValidator>]> = validators.into();
        Ok(Arc::clone(
            self.entries
                .entry(metadata.key().clone())
                .or_insert(validators)
                .value(),
        ))
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
