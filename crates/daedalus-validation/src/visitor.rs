//! Recursive, cycle-safe validation of a bound model graph.
//!
//! The visitor walks the graph depth first. For every node it
//!
//! 1. applies overrides recorded by the binders in the
//!    [`ValidationStateDictionary`] (key, metadata, strategy, suppression),
//! 2. marks composite nodes visited before descending, so a node reachable
//!    twice (aliasing or a cycle) is validated once,
//! 3. runs the member validators declared on the property or parameter,
//! 4. visits the children produced by the node's [`ValidationStrategy`],
//! 5. runs the type-level validators, unless a child failed and
//!    [`MvcOptions::validate_complex_types_if_child_validation_fails`] is off.
//!
//! Depth and collection-size guards return an error instead of recursing
//! further.

use daedalus_core::names::create_property_model_name;
use daedalus_core::{
    MetadataKind, ModelMetadata, ModelMetadataProvider, ModelStateDictionary, ModelValidationState,
    ModelValue, MvcOptions, ValidationStateDictionary, ValidationStrategy,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::error::{ValidationError, ValidationResult};
use crate::provider::ValidatorCache;
use crate::strategy::enumerate_children;
use crate::validator::{ModelValidationContext, ModelValidator};

type Validators = Arc<[Arc<dyn ModelValidator>]>;

/// Validates one model graph into a [`ModelStateDictionary`].
///
/// # Example
///
/// ```
/// use daedalus_core::{
///     ModelMetadataProvider, ModelObject, ModelStateDictionary, ModelType, ModelValue,
///     MvcOptions, PropertyDescriptor, TypeDescriptor, ValidationRule, ValidationStateDictionary,
/// };
/// use daedalus_validation::{ValidationVisitor, ValidatorCache};
///
/// let provider = ModelMetadataProvider::builder()
///     .register(
///         TypeDescriptor::new("Person")
///             .property(PropertyDescriptor::new("name", ModelType::string()).validator(ValidationRule::required())),
///     )
///     .build();
/// let cache = ValidatorCache::default();
/// let options = MvcOptions::default();
/// let mut model_state = ModelStateDictionary::new();
/// let mut validation_state = ValidationStateDictionary::new();
///
/// let person = ModelObject::new("Person");
/// let metadata = provider.for_type(&ModelType::complex("Person"));
/// let mut visitor = ValidationVisitor::new(&provider, &cache, &options, &mut model_state, &mut validation_state);
/// let valid = visitor.validate(&metadata, "person", &ModelValue::Object(person), false).unwrap();
///
/// assert!(!valid);
/// assert_eq!(model_state.errors("person.name"), vec!["The name field is required."]);
/// ```
#[derive(Debug)]
pub struct ValidationVisitor<'a> {
    provider: &'a ModelMetadataProvider,
    cache: &'a ValidatorCache,
    options: &'a MvcOptions,
    model_state: &'a mut ModelStateDictionary,
    validation_state: &'a mut ValidationStateDictionary,
    depth: usize,
}

impl<'a> ValidationVisitor<'a> {
    /// Creates a visitor for one validation pass.
    pub fn new(
        provider: &'a ModelMetadataProvider,
        cache: &'a ValidatorCache,
        options: &'a MvcOptions,
        model_state: &'a mut ModelStateDictionary,
        validation_state: &'a mut ValidationStateDictionary,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
            model_state,
            validation_state,
            depth: 0,
        }
    }

    /// Validates `model` under `key`. Returns whether the subtree is valid.
    ///
    /// A null model is not validated unless `always_validate_at_top_level`
    /// is set; an existing model-state entry for it is marked valid.
    pub fn validate(
        &mut self,
        metadata: &Arc<ModelMetadata>,
        key: &str,
        model: &ModelValue,
        always_validate_at_top_level: bool,
    ) -> ValidationResult<bool> {
        if model.is_null() && !always_validate_at_top_level {
            if self.model_state.get(key).is_some() {
                self.model_state.mark_field_valid(key);
            }
            return Ok(self.model_state.validation_state(key) != ModelValidationState::Invalid);
        }
        self.visit(metadata, key, model, None)
    }

    fn visit(
        &mut self,
        metadata: &Arc<ModelMetadata>,
        key: &str,
        model: &ModelValue,
        container: Option<&ModelValue>,
    ) -> ValidationResult<bool> {
        if self.model_state.has_reached_max_errors() {
            self.model_state.suppress_validation(key);
            return Ok(false);
        }

        let mut metadata = Arc::clone(metadata);
        let mut key = key.to_string();
        let mut strategy = None;
        if let Some(entry) = model.object_id().and_then(|id| self.validation_state.get(id)) {
            if entry.suppress_validation {
                self.model_state.suppress_validation(&key);
                return Ok(true);
            }
            if let Some(override_key) = &entry.key {
                key.clone_from(override_key);
            }
            if let Some(override_metadata) = &entry.metadata {
                metadata = Arc::clone(override_metadata);
            }
            strategy = entry.strategy.clone();
        }

        if metadata.validate_never() {
            self.model_state.suppress_validation(&key);
            return Ok(true);
        }

        if let Some(id) = model.object_id() {
            if !self.validation_state.mark_visited(id) {
                trace!(key = %key, object = %id, "already validated");
                return Ok(true);
            }
        }

        self.depth += 1;
        let result = match self.options.max_validation_depth {
            Some(max) if self.depth > max => {
                warn!(key = %key, max, "maximum validation depth exceeded");
                Err(ValidationError::max_depth(max, &key))
            }
            _ => self.visit_node(&metadata, &key, model, container, strategy),
        };
        self.depth -= 1;
        result
    }

    fn visit_node(
        &mut self,
        metadata: &Arc<ModelMetadata>,
        key: &str,
        model: &ModelValue,
        container: Option<&ModelValue>,
        strategy: Option<ValidationStrategy>,
    ) -> ValidationResult<bool> {
        let members = self.member_validators(metadata)?;
        self.run_validators(&members, metadata, key, model, container);

        if !model.is_composite() {
            let type_level = self.type_validators(metadata)?;
            self.run_validators(&type_level, metadata, key, model, container);
            return Ok(self.finish(key));
        }

        let strategy = strategy.unwrap_or_default();
        let children_valid =
            if !metadata.validate_children() || strategy == ValidationStrategy::SuppressChildren {
                self.model_state.suppress_validation(key);
                true
            } else {
                let children = enumerate_children(
                    &strategy,
                    self.provider,
                    metadata,
                    key,
                    model,
                    self.options.max_validation_collection_size,
                )?;
                let mut valid = true;
                for child in &children {
                    valid &= self.visit(&child.metadata, &child.key, &child.model, Some(model))?;
                }
                valid
            };

        if children_valid || self.options.validate_complex_types_if_child_validation_fails {
            let type_level = self.type_validators(metadata)?;
            self.run_validators(&type_level, metadata, key, model, container);
        } else {
            debug!(key, "type validators skipped after child failure");
        }
        Ok(self.finish(key))
    }

    fn member_validators(&self, metadata: &ModelMetadata) -> ValidationResult<Validators> {
        if metadata.kind() == MetadataKind::Type {
            return Ok(Arc::from(Vec::new()));
        }
        self.cache.get_validators(metadata)
    }

    fn type_validators(&self, metadata: &ModelMetadata) -> ValidationResult<Validators> {
        let type_metadata = self.provider.for_type(metadata.model_type());
        self.cache.get_validators(&type_metadata)
    }

    // A key already invalid from binding is not validated again.
    fn run_validators(
        &mut self,
        validators: &[Arc<dyn ModelValidator>],
        metadata: &ModelMetadata,
        key: &str,
        model: &ModelValue,
        container: Option<&ModelValue>,
    ) {
        if validators.is_empty()
            || self.model_state.validation_state(key) == ModelValidationState::Invalid
        {
            return;
        }
        let ctx = ModelValidationContext {
            metadata,
            container,
            model,
            key,
        };
        for validator in validators {
            for result in validator.validate(&ctx) {
                let error_key = create_property_model_name(key, &result.member_name);
                if !self.model_state.try_add_model_error(&error_key, result.message) {
                    return;
                }
            }
        }
    }

    fn finish(&mut self, key: &str) -> bool {
        if self.model_state.field_validation_state(key) == ModelValidationState::Invalid {
            return false;
        }
        if self.model_state.get(key).is_some() {
            self.model_state.mark_field_valid(key);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::{
        ModelObject, ModelType, PropertyDescriptor, TypeDescriptor, ValidationRule,
        ValidationStateEntry,
    };

    fn provider() -> ModelMetadataProvider {
        ModelMetadataProvider::builder()
            .register(
                TypeDescriptor::new("Node")
                    .property(
                        PropertyDescriptor::new("name", ModelType::string())
                            .validator(ValidationRule::required()),
                    )
                    .property(PropertyDescriptor::new("next", ModelType::complex("Node"))),
            )
            .register(
                TypeDescriptor::new("Range")
                    .property(PropertyDescriptor::new("low", ModelType::int()))
                    .property(
                        PropertyDescriptor::new("high", ModelType::int())
                            .validator(ValidationRule::range(0.0, 100.0)),
                    )
                    .validator(ValidationRule::custom("ordered", |v| {
                        let range = v.as_object()?;
                        let low = range.get("low")?.as_i64()?;
                        let high = range.get("high")?.as_i64()?;
                        (low > high).then(|| "low must not exceed high".to_string())
                    })),
            )
            .build()
    }

    struct Harness {
        provider: ModelMetadataProvider,
        cache: ValidatorCache,
        options: MvcOptions,
        model_state: ModelStateDictionary,
        validation_state: ValidationStateDictionary,
    }

    impl Harness {
        fn new(options: MvcOptions) -> Self {
            Self {
                provider: provider(),
                cache: ValidatorCache::default(),
                options,
                model_state: ModelStateDictionary::new(),
                validation_state: ValidationStateDictionary::new(),
            }
        }

        fn validate(&mut self, type_name: &str, key: &str, model: &ModelValue) -> ValidationResult<bool> {
            let metadata = self.provider.for_type(&ModelType::complex(type_name));
            ValidationVisitor::new(
                &self.provider,
                &self.cache,
                &self.options,
                &mut self.model_state,
                &mut self.validation_state,
            )
            .validate(&metadata, key, model, false)
        }
    }

    fn node(name: &str) -> Arc<ModelObject> {
        let node = ModelObject::new("Node");
        node.set("name", name.into());
        node
    }

    #[test]
    fn test_self_reference_terminates() {
        let a = ModelObject::new("Node");
        a.set("next", ModelValue::Object(Arc::clone(&a)));

        let mut harness = Harness::new(MvcOptions::default());
        let valid = harness
            .validate("Node", "a", &ModelValue::Object(a))
            .expect("terminates");
        assert!(!valid);
        assert_eq!(harness.model_state.errors("a.name").len(), 1);
        assert_eq!(harness.model_state.error_count(), 1);
    }

    #[test]
    fn test_shared_child_validated_once() {
        let shared = ModelObject::new("Node");
        let root = node("root");
        let middle = node("middle");
        root.set("next", ModelValue::Object(Arc::clone(&middle)));
        middle.set("next", ModelValue::Object(Arc::clone(&shared)));
        shared.set("next", ModelValue::Object(Arc::clone(&middle)));

        let mut harness = Harness::new(MvcOptions::default());
        harness
            .validate("Node", "", &ModelValue::Object(root))
            .expect("terminates");
        assert_eq!(harness.model_state.error_count(), 1);
        assert_eq!(harness.model_state.errors("next.next.name").len(), 1);
    }

    #[test]
    fn test_depth_guard() {
        let head = node("0");
        let mut tail = Arc::clone(&head);
        for i in 1..10 {
            let next = node(&i.to_string());
            tail.set("next", ModelValue::Object(Arc::clone(&next)));
            tail = next;
        }

        let options = MvcOptions {
            max_validation_depth: Some(5),
            ..MvcOptions::default()
        };
        let mut harness = Harness::new(options);
        let err = harness
            .validate("Node", "n", &ModelValue::Object(head))
            .expect_err("too deep");
        // The fifth node is at depth 5; its first property crosses the limit.
        assert_eq!(
            err,
            ValidationError::max_depth(5, "n.next.next.next.next.name")
        );
    }

    #[test]
    fn test_depth_guard_disabled() {
        let head = node("0");
        let mut tail = Arc::clone(&head);
        for i in 1..50 {
            let next = node(&i.to_string());
            tail.set("next", ModelValue::Object(Arc::clone(&next)));
            tail = next;
        }
        let options = MvcOptions {
            max_validation_depth: None,
            ..MvcOptions::default()
        };
        let mut harness = Harness::new(options);
        assert!(harness.validate("Node", "n", &ModelValue::Object(head)).expect("valid"));
    }

    #[test]
    fn test_type_validators_skipped_after_child_failure() {
        let range = ModelObject::new("Range");
        range.set("low", ModelValue::Int(500));
        range.set("high", ModelValue::Int(200));

        let mut harness = Harness::new(MvcOptions::default());
        harness
            .validate("Range", "r", &ModelValue::Object(Arc::clone(&range)))
            .expect("validated");
        assert_eq!(harness.model_state.errors("r.high").len(), 1);
        assert!(harness.model_state.errors("r").is_empty());

        let options = MvcOptions {
            validate_complex_types_if_child_validation_fails: true,
            ..MvcOptions::default()
        };
        let mut harness = Harness::new(options);
        harness
            .validate("Range", "r", &ModelValue::Object(range))
            .expect("validated");
        assert_eq!(harness.model_state.errors("r"), vec!["low must not exceed high"]);
    }

    #[test]
    fn test_binding_error_is_not_revalidated() {
        let range = ModelObject::new("Range");
        range.set("high", ModelValue::Int(900));

        let mut harness = Harness::new(MvcOptions::default());
        harness.model_state.set_model_value("r.high", vec!["x".into()], "x");
        harness.model_state.try_add_model_error("r.high", "The value 'x' is not valid for high.");
        harness
            .validate("Range", "r", &ModelValue::Object(range))
            .expect("validated");
        assert_eq!(harness.model_state.errors("r.high").len(), 1);
    }

    #[test]
    fn test_suppressed_entry_skips_subtree() {
        let root = ModelObject::new("Node");
        let mut harness = Harness::new(MvcOptions::default());
        harness
            .validation_state
            .insert(root.id(), ValidationStateEntry::suppressed());
        harness.model_state.set_model_value("root.name", vec![], "");

        let valid = harness
            .validate("Node", "root", &ModelValue::Object(root))
            .expect("validated");
        assert!(valid);
        assert_eq!(
            harness.model_state.validation_state("root.name"),
            ModelValidationState::Skipped
        );
    }

    #[test]
    fn test_bound_entries_are_marked_valid() {
        let root = node("ok");
        let mut harness = Harness::new(MvcOptions::default());
        harness.model_state.set_model_value("root.name", vec!["ok".into()], "ok");
        assert!(harness
            .validate("Node", "root", &ModelValue::Object(root))
            .expect("validated"));
        assert_eq!(
            harness.model_state.validation_state("root.name"),
            ModelValidationState::Valid
        );
        assert!(harness.model_state.is_valid());
    }

    #[test]
    fn test_max_errors_stops_validation() {
        let head = ModelObject::new("Node");
        let mut tail = Arc::clone(&head);
        for _ in 0..10 {
            let next = ModelObject::new("Node");
            tail.set("next", ModelValue::Object(Arc::clone(&next)));
            tail = next;
        }
        let mut harness = Harness::new(MvcOptions::default());
        harness.model_state.set_max_allowed_errors(3);
        let valid = harness
            .validate("Node", "n", &ModelValue::Object(head))
            .expect("validated");
        assert!(!valid);
        assert_eq!(harness.model_state.error_count(), 3);
    }
}
