//! Validation of cyclic, aliased and oversized model graphs.

use daedalus_core::{
    ModelMetadataProvider, ModelObject, ModelStateDictionary, ModelType, ModelValue, MvcOptions,
    PropertyDescriptor, TypeDescriptor, ValidationRule, ValidationStateDictionary,
};
use daedalus_validation::{ObjectModelValidator, ValidationError, ValidatorCache};
use proptest::prelude::*;
use std::sync::Arc;

fn validator(options: MvcOptions) -> (Arc<ModelMetadataProvider>, ObjectModelValidator) {
    let provider = Arc::new(
        ModelMetadataProvider::builder()
            .register(
                TypeDescriptor::new("Employee")
                    .property(
                        PropertyDescriptor::new("name", ModelType::string())
                            .validator(ValidationRule::required()),
                    )
                    .property(PropertyDescriptor::new("manager", ModelType::complex("Employee")))
                    .property(PropertyDescriptor::new(
                        "reports",
                        ModelType::list_of(ModelType::complex("Employee")),
                    )),
            )
            .build(),
    );
    let validator = ObjectModelValidator::new(
        Arc::clone(&provider),
        Arc::new(ValidatorCache::default()),
        Arc::new(options),
    );
    (provider, validator)
}

fn run(
    options: MvcOptions,
    root: &Arc<ModelObject>,
) -> (Result<bool, ValidationError>, ModelStateDictionary) {
    let (provider, validator) = validator(options);
    let metadata = provider.for_type(&ModelType::complex("Employee"));
    let mut model_state = ModelStateDictionary::new();
    let mut validation_state = ValidationStateDictionary::new();
    let result = validator.validate(
        &mut model_state,
        &mut validation_state,
        &metadata,
        "employee",
        &ModelValue::Object(Arc::clone(root)),
    );
    (result, model_state)
}

#[test]
fn test_manager_reporting_to_itself_terminates() {
    let boss = ModelObject::new("Employee");
    boss.set("manager", ModelValue::Object(Arc::clone(&boss)));
    boss.set(
        "reports",
        ModelValue::list(vec![ModelValue::Object(Arc::clone(&boss))]),
    );

    let (result, model_state) = run(MvcOptions::default(), &boss);
    assert_eq!(result, Ok(false));
    assert_eq!(model_state.error_count(), 1);
    assert_eq!(
        model_state.errors("employee.name"),
        vec!["The name field is required."]
    );
}

#[test]
fn test_report_list_items_are_keyed_by_index() {
    let boss = ModelObject::new("Employee");
    boss.set("name", "Grace".into());
    let named = ModelObject::new("Employee");
    named.set("name", "Alan".into());
    let unnamed = ModelObject::new("Employee");
    boss.set(
        "reports",
        ModelValue::list(vec![ModelValue::Object(named), ModelValue::Object(unnamed)]),
    );

    let (result, model_state) = run(MvcOptions::default(), &boss);
    assert_eq!(result, Ok(false));
    assert!(model_state.errors("employee.reports[0].name").is_empty());
    assert_eq!(model_state.errors("employee.reports[1].name").len(), 1);
}

#[test]
fn test_oversized_report_list_is_rejected() {
    let boss = ModelObject::new("Employee");
    let reports = (0..5)
        .map(|_| ModelValue::Object(ModelObject::new("Employee")))
        .collect();
    boss.set("reports", ModelValue::list(reports));

    let options = MvcOptions {
        max_validation_collection_size: 4,
        ..MvcOptions::default()
    };
    let (result, _) = run(options, &boss);
    assert_eq!(
        result,
        Err(ValidationError::collection_too_large(4, 5, "employee.reports"))
    );
}

proptest! {
    #[test]
    fn test_management_rings_validate_each_employee_once(size in 1usize..24) {
        let employees: Vec<_> = (0..size).map(|_| ModelObject::new("Employee")).collect();
        for (i, employee) in employees.iter().enumerate() {
            let manager = &employees[(i + 1) % size];
            employee.set("manager", ModelValue::Object(Arc::clone(manager)));
        }

        let options = MvcOptions { max_validation_depth: None, ..MvcOptions::default() };
        let (result, model_state) = run(options, &employees[0]);
        prop_assert_eq!(result, Ok(false));
        prop_assert_eq!(model_state.error_count(), size);
    }

    #[test]
    fn test_depth_guard_trips_only_past_the_limit(chain in 1usize..20, max in 2usize..20) {
        let head = ModelObject::new("Employee");
        head.set("name", "0".into());
        let mut tail = Arc::clone(&head);
        for i in 1..chain {
            let next = ModelObject::new("Employee");
            next.set("name", i.to_string().into());
            tail.set("manager", ModelValue::Object(Arc::clone(&next)));
            tail = next;
        }

        let options = MvcOptions { max_validation_depth: Some(max), ..MvcOptions::default() };
        let (result, _) = run(options, &head);
        // The deepest employee sits at depth `chain`; its properties one below.
        if chain < max {
            prop_assert_eq!(result, Ok(true));
        } else {
            prop_assert!(matches!(result, Err(ValidationError::MaxDepthExceeded { .. })), "expected MaxDepthExceeded, got {:?}", result);
        }
    }
}
