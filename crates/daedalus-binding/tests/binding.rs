//! End-to-end parameter binding against request data.

use daedalus_binding::{
    default_model_binder_providers, default_value_provider_factories, BindingError,
    CompositeValueProvider, InputFormatter, JsonInputFormatter, ModelBinderFactory,
    ModelBindingResult, ParameterBinder, ValueProvider,
};
use daedalus_core::di::Container;
use daedalus_core::testing::RequestBuilder;
use daedalus_core::{
    ModelErrorKind, ModelMetadataProvider, ModelStateDictionary, ModelType, ModelValue, MvcOptions,
    ParameterDescriptor, PropertyDescriptor, RequestContext, TypeDescriptor, ValidationRule,
};
use daedalus_validation::{ObjectModelValidator, ValidatorCache};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn metadata_provider() -> Arc<ModelMetadataProvider> {
    Arc::new(
        ModelMetadataProvider::builder()
            .register(
                TypeDescriptor::new("Address")
                    .property(
                        PropertyDescriptor::new("street", ModelType::string())
                            .validator(ValidationRule::required()),
                    )
                    .property(PropertyDescriptor::new("city", ModelType::string())),
            )
            .register(
                TypeDescriptor::new("Person")
                    .property(
                        PropertyDescriptor::new("name", ModelType::string())
                            .validator(ValidationRule::required()),
                    )
                    .property(PropertyDescriptor::new("age", ModelType::int()))
                    .property(PropertyDescriptor::new("address", ModelType::complex("Address"))),
            )
            .register(
                TypeDescriptor::new("Node")
                    .property(PropertyDescriptor::new("value", ModelType::int()))
                    .property(PropertyDescriptor::new("next", ModelType::complex("Node"))),
            )
            .register(
                TypeDescriptor::new("Order")
                    .property(PropertyDescriptor::new("id", ModelType::int()))
                    .property(PropertyDescriptor::new(
                        "lines",
                        ModelType::list_of(ModelType::int()),
                    )),
            )
            .build(),
    )
}

fn parameter_binder(options: MvcOptions) -> ParameterBinder {
    let provider = metadata_provider();
    let options = Arc::new(options);
    let formatters: Arc<[Arc<dyn InputFormatter>]> = Arc::new([Arc::new(JsonInputFormatter) as Arc<dyn InputFormatter>]);
    let factory = Arc::new(ModelBinderFactory::new(
        Arc::clone(&provider),
        default_model_binder_providers(formatters),
    ));
    let validator = ObjectModelValidator::new(
        Arc::clone(&provider),
        Arc::new(ValidatorCache::default()),
        Arc::clone(&options),
    );
    ParameterBinder::new(provider, factory, validator, options)
}

async fn bind_with(
    options: MvcOptions,
    request: &RequestContext,
    parameter: &ParameterDescriptor,
) -> (Result<ModelBindingResult, BindingError>, ModelStateDictionary) {
    let binder = parameter_binder(options);
    let providers = CompositeValueProvider::create(&default_value_provider_factories(), request)
        .await
        .expect("value providers");
    let value_provider: Arc<dyn ValueProvider> = Arc::new(providers);
    let mut model_state = ModelStateDictionary::new();
    let result = binder
        .bind_parameter(request, &value_provider, &mut model_state, "Tests.Action", parameter)
        .await;
    (result, model_state)
}

async fn bind(
    request: &RequestContext,
    parameter: &ParameterDescriptor,
) -> (ModelBindingResult, ModelStateDictionary) {
    let (result, model_state) = bind_with(MvcOptions::default(), request, parameter).await;
    (result.expect("binding"), model_state)
}

fn ints(value: &ModelValue) -> Vec<i64> {
    value
        .as_list()
        .expect("list")
        .items()
        .iter()
        .map(|item| item.as_i64().expect("int"))
        .collect()
}

#[tokio::test]
async fn test_absent_optional_object_stays_unset() {
    let request = RequestBuilder::get("/people?name=Ann&age=3").build();
    let parameter = ParameterDescriptor::new("person", ModelType::complex("Person"));
    let (result, model_state) = bind(&request, &parameter).await;

    let person = result.model().and_then(ModelValue::as_object).expect("person");
    assert_eq!(person.get("name"), Some(ModelValue::string("Ann")));
    assert_eq!(person.get("age"), Some(ModelValue::Int(3)));
    assert!(person.get("address").is_none());
    assert_eq!(model_state.error_count(), 0);
}

#[tokio::test]
async fn test_nested_object_binds_when_posted() {
    let request = RequestBuilder::post("/people")
        .form("name=Ann&address.city=Oslo")
        .build();
    let parameter = ParameterDescriptor::new("person", ModelType::complex("Person"));
    let (result, model_state) = bind(&request, &parameter).await;

    let person = result.model().and_then(ModelValue::as_object).expect("person");
    let address = person.get("address").expect("address");
    let address = address.as_object().expect("object");
    assert_eq!(address.get("city"), Some(ModelValue::string("Oslo")));
    assert_eq!(
        model_state.errors("address.street"),
        vec!["The street field is required."]
    );
}

#[tokio::test]
async fn test_indexed_collection_binds_in_order() {
    let request = RequestBuilder::post("/").form("ids[0]=1&ids[1]=2&ids[2]=3").build();
    let parameter = ParameterDescriptor::new("ids", ModelType::list_of(ModelType::int()));
    let (result, _) = bind(&request, &parameter).await;
    assert_eq!(ints(result.model().expect("ids")), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_positional_indexes_stop_at_first_gap() {
    let request = RequestBuilder::post("/").form("ids[0]=1&ids[2]=3").build();
    let parameter = ParameterDescriptor::new("ids", ModelType::list_of(ModelType::int()));
    let (result, _) = bind(&request, &parameter).await;
    assert_eq!(ints(result.model().expect("ids")), vec![1]);
}

#[tokio::test]
async fn test_explicit_indexes_read_every_listed_entry() {
    let request = RequestBuilder::post("/")
        .form("ids.index=a&ids.index=b&ids[a]=5&ids[b]=6")
        .build();
    let parameter = ParameterDescriptor::new("ids", ModelType::list_of(ModelType::int()));
    let (result, _) = bind(&request, &parameter).await;
    assert_eq!(ints(result.model().expect("ids")), vec![5, 6]);
}

#[tokio::test]
async fn test_repeated_keys_bind_a_collection() {
    let request = RequestBuilder::get("/?ids=4&ids=5").build();
    let parameter = ParameterDescriptor::new("ids", ModelType::list_of(ModelType::int()));
    let (result, _) = bind(&request, &parameter).await;
    assert_eq!(ints(result.model().expect("ids")), vec![4, 5]);
}

#[tokio::test]
async fn test_collection_size_guard_aborts_binding() {
    let options = MvcOptions {
        max_model_binding_collection_size: 2,
        ..MvcOptions::default()
    };
    let request = RequestBuilder::get("/?ids=1&ids=2&ids=3").build();
    let parameter = ParameterDescriptor::new("ids", ModelType::list_of(ModelType::int()));
    let (result, _) = bind_with(options, &request, &parameter).await;
    assert!(matches!(
        result,
        Err(BindingError::CollectionTooLarge { max: 2, .. })
    ));
}

#[tokio::test]
async fn test_self_referencing_type_binds_through_placeholder() {
    let request = RequestBuilder::post("/")
        .form("value=1&next.value=2&next.next.value=3")
        .build();
    let parameter = ParameterDescriptor::new("node", ModelType::complex("Node"));
    let (result, _) = bind(&request, &parameter).await;

    let first = result.model().and_then(ModelValue::as_object).expect("node");
    assert_eq!(first.get("value"), Some(ModelValue::Int(1)));
    let second = first.get("next").expect("second");
    let second = second.as_object().expect("object");
    assert_eq!(second.get("value"), Some(ModelValue::Int(2)));
    let third = second.get("next").expect("third");
    let third = third.as_object().expect("object");
    assert_eq!(third.get("value"), Some(ModelValue::Int(3)));
    assert!(third.get("next").is_none());
}

#[tokio::test]
async fn test_recursion_guard_aborts_deep_input() {
    let options = MvcOptions {
        max_model_binding_recursion_depth: 3,
        ..MvcOptions::default()
    };
    let request = RequestBuilder::post("/")
        .form("next.next.next.next.value=1")
        .build();
    let parameter = ParameterDescriptor::new("node", ModelType::complex("Node"));
    let (result, _) = bind_with(options, &request, &parameter).await;
    assert!(matches!(
        result,
        Err(BindingError::MaxRecursionDepthExceeded { max: 3, .. })
    ));
}

#[tokio::test]
async fn test_dictionary_short_form() {
    let request = RequestBuilder::post("/").form("prices[apple]=3&prices[pear]=4").build();
    let parameter = ParameterDescriptor::new(
        "prices",
        ModelType::map_of(ModelType::string(), ModelType::int()),
    );
    let (result, model_state) = bind(&request, &parameter).await;

    let prices = result.model().and_then(ModelValue::as_map).expect("map");
    assert_eq!(prices.len(), 2);
    assert_eq!(prices.get("apple"), Some(&ModelValue::Int(3)));
    assert_eq!(prices.get("pear"), Some(&ModelValue::Int(4)));
    assert_eq!(model_state.error_count(), 0);
}

#[tokio::test]
async fn test_dictionary_indexed_form() {
    let request = RequestBuilder::post("/")
        .form("prices[0].Key=apple&prices[0].Value=3&prices[1].Key=fig&prices[1].Value=9")
        .build();
    let parameter = ParameterDescriptor::new(
        "prices",
        ModelType::map_of(ModelType::string(), ModelType::int()),
    );
    let (result, _) = bind(&request, &parameter).await;

    let prices = result.model().and_then(ModelValue::as_map).expect("map");
    assert_eq!(prices.get("apple"), Some(&ModelValue::Int(3)));
    assert_eq!(prices.get("fig"), Some(&ModelValue::Int(9)));
}

#[tokio::test]
async fn test_unconvertible_value_is_recorded() {
    let request = RequestBuilder::get("/?age=abc").build();
    let parameter = ParameterDescriptor::new("age", ModelType::int());
    let (result, model_state) = bind(&request, &parameter).await;

    assert!(!result.is_model_set());
    assert_eq!(model_state.errors("age"), vec!["The value 'abc' is not valid for age."]);
    assert_eq!(
        model_state.get("age").map(|entry| entry.attempted_value.as_deref()),
        Some(Some("abc"))
    );
}

#[tokio::test]
async fn test_bind_required_parameter_reports_missing_value() {
    let request = RequestBuilder::get("/").build();
    let parameter = ParameterDescriptor::new("id", ModelType::int()).bind_required();
    let (result, model_state) = bind(&request, &parameter).await;

    assert!(!result.is_model_set());
    assert_eq!(
        model_state.errors("id"),
        vec!["A value for the 'id' parameter or property was not provided."]
    );
}

#[tokio::test]
async fn test_required_parameter_validated_when_missing() {
    let request = RequestBuilder::get("/").build();
    let parameter = ParameterDescriptor::new("id", ModelType::nullable(ModelType::int()))
        .validator(ValidationRule::required());
    let (_, model_state) = bind(&request, &parameter).await;
    assert_eq!(model_state.errors("id"), vec!["The id field is required."]);
}

#[tokio::test]
async fn test_body_binds_json() {
    let request = RequestBuilder::post("/orders")
        .json(r#"{"id": 7, "lines": [1, 2]}"#)
        .build();
    let parameter = ParameterDescriptor::new("order", ModelType::complex("Order")).from_body();
    let (result, model_state) = bind(&request, &parameter).await;

    let order = result.model().and_then(ModelValue::as_object).expect("order");
    assert_eq!(order.get("id"), Some(ModelValue::Int(7)));
    assert_eq!(model_state.error_count(), 0);
}

#[tokio::test]
async fn test_body_conversion_error_is_keyed_by_path() {
    let request = RequestBuilder::post("/orders")
        .json(r#"{"id": 7, "lines": [1, "two"]}"#)
        .build();
    let parameter = ParameterDescriptor::new("order", ModelType::complex("Order")).from_body();
    let (result, model_state) = bind(&request, &parameter).await;

    assert!(!result.is_model_set());
    assert!(model_state.has_error_kind(ModelErrorKind::InputFormatter));
    assert_eq!(model_state.errors("lines[1]").len(), 1);
}

#[tokio::test]
async fn test_body_with_unsupported_content_type() {
    let request = RequestBuilder::post("/orders")
        .header("content-type", "text/csv")
        .body("id,lines")
        .build();
    let parameter = ParameterDescriptor::new("order", ModelType::complex("Order")).from_body();
    let (result, model_state) = bind(&request, &parameter).await;

    assert!(!result.is_model_set());
    assert!(model_state.has_error_kind(ModelErrorKind::UnsupportedContentType));
    assert_eq!(model_state.errors(""), vec!["Unsupported content type 'text/csv'."]);
}

#[tokio::test]
async fn test_empty_body_is_an_error_unless_allowed() {
    let request = RequestBuilder::post("/orders").json("").build();
    let parameter = ParameterDescriptor::new("order", ModelType::complex("Order")).from_body();

    let (result, model_state) = bind(&request, &parameter).await;
    assert!(!result.is_model_set());
    assert_eq!(model_state.errors(""), vec!["A non-empty request body is required."]);

    let options = MvcOptions {
        allow_empty_input_in_body_model_binding: true,
        ..MvcOptions::default()
    };
    let (result, model_state) = bind_with(options, &request, &parameter).await;
    assert_eq!(result.expect("binding"), ModelBindingResult::Success(ModelValue::Null));
    assert_eq!(model_state.error_count(), 0);
}

#[tokio::test]
async fn test_header_binds_by_parameter_name() {
    let request = RequestBuilder::get("/")
        .header("x-tenant", "acme")
        .header("x-tags", "a, b")
        .build();

    let tenant = ParameterDescriptor::new("x-tenant", ModelType::string()).from_header();
    let (result, _) = bind(&request, &tenant).await;
    assert_eq!(result.into_model(), Some(ModelValue::string("acme")));

    let tags = ParameterDescriptor::new("x-tags", ModelType::list_of(ModelType::string())).from_header();
    let (result, _) = bind(&request, &tags).await;
    let tags = result.into_model().expect("tags");
    let tags: Vec<_> = tags
        .as_list()
        .expect("list")
        .items()
        .iter()
        .filter_map(ModelValue::as_str)
        .map(str::to_string)
        .collect();
    assert_eq!(tags, vec!["a", "b"]);
}

#[derive(Debug)]
struct Clock {
    offset: i64,
}

#[tokio::test]
async fn test_services_and_cancellation_are_bound() {
    let mut container = Container::new();
    container.register(Arc::new(Clock { offset: 2 }));
    let token = CancellationToken::new();
    let request = RequestBuilder::get("/")
        .services(Arc::new(container))
        .cancellation(token.clone())
        .build();

    let clock = ParameterDescriptor::new("clock", ModelType::service::<Clock>());
    let (result, _) = bind(&request, &clock).await;
    let clock = result
        .model()
        .and_then(ModelValue::as_service::<Clock>)
        .expect("clock");
    assert_eq!(clock.offset, 2);

    let ct = ParameterDescriptor::new("ct", ModelType::CancellationToken);
    let (result, _) = bind(&request, &ct).await;
    token.cancel();
    let Some(ModelValue::CancellationToken(bound)) = result.into_model() else {
        panic!("expected a token");
    };
    assert!(bound.is_cancelled());
}

#[tokio::test]
async fn test_missing_service_is_an_error() {
    let request = RequestBuilder::get("/").build();
    let clock = ParameterDescriptor::new("clock", ModelType::service::<Clock>());
    let (result, _) = bind_with(MvcOptions::default(), &request, &clock).await;
    assert!(matches!(result, Err(BindingError::Service(_))));
}
