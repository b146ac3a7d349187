//! The assembled pipeline: configuration, dispatch and error rendering.

use daedalus::config::ConfigFormat;
use daedalus::core::testing::RequestBuilder;
use daedalus::prelude::*;
use http::{Method, StatusCode};

fn order_metadata() -> ModelMetadataProvider {
    ModelMetadataProvider::builder()
        .register(
            TypeDescriptor::new("Order")
                .property(PropertyDescriptor::new("id", ModelType::int()))
                .property(
                    PropertyDescriptor::new("quantity", ModelType::int())
                        .validator(ValidationRule::Range { min: 1.0, max: 100.0 }),
                ),
        )
        .build()
}

fn get_order() -> ActionDescriptor {
    ActionDescriptor::builder(
        "Orders",
        "Get",
        Arc::new(FnActionHandler::new(|_, args: ActionArguments| async move {
            let id: i64 = args.get_as("id")?;
            if id == 404 {
                return Err(anyhow::Error::new(MvcError::not_found(format!("order {id}"))));
            }
            ActionOutput::json(&serde_json::json!({ "id": id }))
        })),
    )
    .parameter(ParameterDescriptor::new("id", ModelType::int()).bind_required())
    .constraint(ConstraintDescriptor::instance(HttpMethodConstraint::new(vec![Method::GET])))
    .build()
}

fn create_order() -> ActionDescriptor {
    ActionDescriptor::builder(
        "Orders",
        "Create",
        Arc::new(FnActionHandler::new(|_, args: ActionArguments| async move {
            let order: serde_json::Value = args.get_as("order")?;
            Ok(ActionOutput::Result(Arc::new(ObjectResult::new(order).with_status(StatusCode::CREATED))))
        })),
    )
    .parameter(ParameterDescriptor::new("order", ModelType::complex("Order")).from_body())
    .constraint(ConstraintDescriptor::instance(HttpMethodConstraint::new(vec![Method::POST])))
    .build()
}

fn mvc() -> Mvc {
    Mvc::builder()
        .metadata(order_metadata())
        .actions([get_order(), create_order()])
        .api_behavior(true)
        .build()
}

fn json_body(response: http::Response<bytes::Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).expect("json body")
}

#[tokio::test]
async fn test_invoke_by_name() {
    let response = mvc()
        .invoke_by_name(RequestBuilder::get("/orders?id=7").build(), "Orders.Get")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response)["id"], 7);
}

#[tokio::test]
async fn test_unknown_action_is_not_found() {
    let request = RequestBuilder::get("/").build();
    let request_id = request.request_id().to_string();
    let response = mvc().invoke_by_name(request, "Orders.Delete").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["request_id"], request_id.as_str());
}

#[tokio::test]
async fn test_action_error_keeps_its_status() {
    let response = mvc()
        .invoke_by_name(RequestBuilder::get("/orders?id=404").build(), "Orders.Get")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response)["error"]["message"], "Not found: order 404");
}

#[tokio::test]
async fn test_api_behavior_rejects_invalid_model() {
    let response = mvc()
        .invoke_by_name(RequestBuilder::get("/orders?id=seven").build(), "Orders.Get")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response)["errors"].is_object());
}

#[tokio::test]
async fn test_body_validation_failure() {
    let response = mvc()
        .invoke_by_name(
            RequestBuilder::post("/orders")
                .json(r#"{ "id": 1, "quantity": 0 }"#)
                .build(),
            "Orders.Create",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsupported_content_type_without_api_behavior() {
    let mvc = Mvc::builder()
        .metadata(order_metadata())
        .action(create_order())
        .build();
    let response = mvc
        .invoke_by_name(
            RequestBuilder::post("/orders")
                .header("content-type", "text/xml")
                .body("<order/>")
                .build(),
            "Orders.Create",
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_dispatch_selects_by_method() {
    let mvc = mvc();
    let candidates = mvc.catalog().snapshot().actions().to_vec();

    let response = mvc
        .dispatch(RequestBuilder::get("/orders?id=3").build(), &candidates)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = mvc
        .dispatch(
            RequestBuilder::post("/orders")
                .json(r#"{ "id": 2, "quantity": 5 }"#)
                .build(),
            &candidates,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response)["quantity"], 5);
}

#[tokio::test]
async fn test_dispatch_without_accepting_candidate() {
    let mvc = mvc();
    let candidates = mvc.catalog().snapshot().actions().to_vec();
    let response = mvc
        .dispatch(RequestBuilder::new(Method::DELETE, "/orders/1").build(), &candidates)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dispatch_ambiguous_candidates() {
    let handler = Arc::new(FnActionHandler::new(|_, _| async { Ok(ActionOutput::Empty) }));
    let mvc = Mvc::builder()
        .action(ActionDescriptor::builder("Orders", "A", Arc::clone(&handler) as Arc<dyn ActionHandler>).build())
        .action(ActionDescriptor::builder("Orders", "B", handler).build())
        .build();
    let candidates = mvc.catalog().snapshot().actions().to_vec();

    let response = mvc.dispatch(RequestBuilder::get("/").build(), &candidates).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response)["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test(start_paused = true)]
async fn test_configured_timeout() {
    let config = ConfigLoader::new()
        .with_string("[mvc]\nrequest_timeout_ms = 50\n", ConfigFormat::Toml)
        .expect("toml")
        .load()
        .expect("config");

    let slow = ActionDescriptor::endpoint(
        "Slow",
        Arc::new(FnActionHandler::new(|_, _| async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(ActionOutput::Empty)
        })),
    )
    .build();
    let mvc = Mvc::builder().config(&config).action(slow).build();
    assert_eq!(mvc.options().request_timeout_ms, Some(50));

    let response = mvc.invoke_by_name(RequestBuilder::get("/").build(), "Slow").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json_body(response)["error"]["code"], "TIMEOUT");
}

#[tokio::test]
async fn test_catalog_replace_purges_invoker_cache() {
    let mvc = mvc();
    let task = mvc.spawn_cache_maintenance();

    let response = mvc
        .invoke_by_name(RequestBuilder::get("/orders?id=1").build(), "Orders.Get")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cache = Arc::clone(mvc.invoker().invoker_cache());
    assert_eq!(cache.len(), 1);

    mvc.catalog().replace(vec![get_order()]);
    for _ in 0..50 {
        if cache.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(cache.is_empty());

    let response = mvc
        .invoke_by_name(RequestBuilder::get("/orders?id=2").build(), "Orders.Get")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache.len(), 1);
    task.abort();
}
