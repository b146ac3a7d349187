//! Factories producing value providers for a request.

use async_trait::async_trait;
use daedalus_core::{BindingSource, RequestContext};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BindingError, BindingResult};
use crate::value_provider::{CompositeValueProvider, NameValueProvider, ValueProvider};

/// Creates zero or more value providers for a request.
#[async_trait]
pub trait ValueProviderFactory: Send + Sync + fmt::Debug {
    /// Appends this factory's providers for `request`.
    async fn create_value_provider(
        &self,
        request: &RequestContext,
        providers: &mut Vec<Arc<dyn ValueProvider>>,
    ) -> BindingResult<()>;
}

/// Url-encoded and multipart form fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormValueProviderFactory;

#[async_trait]
impl ValueProviderFactory for FormValueProviderFactory {
    async fn create_value_provider(
        &self,
        request: &RequestContext,
        providers: &mut Vec<Arc<dyn ValueProvider>>,
    ) -> BindingResult<()> {
        let Some(form) = request.form() else {
            return Ok(());
        };
        let form = form.map_err(|e| BindingError::InvalidForm(e.to_string()))?;
        providers.push(Arc::new(NameValueProvider::new(BindingSource::Form, form.fields)));
        Ok(())
    }
}

/// Route values captured by the router.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteValueProviderFactory;

#[async_trait]
impl ValueProviderFactory for RouteValueProviderFactory {
    async fn create_value_provider(
        &self,
        request: &RequestContext,
        providers: &mut Vec<Arc<dyn ValueProvider>>,
    ) -> BindingResult<()> {
        let values = request
            .route_values()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()));
        providers.push(Arc::new(NameValueProvider::new(BindingSource::Path, values)));
        Ok(())
    }
}

/// Query string parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryStringValueProviderFactory;

#[async_trait]
impl ValueProviderFactory for QueryStringValueProviderFactory {
    async fn create_value_provider(
        &self,
        request: &RequestContext,
        providers: &mut Vec<Arc<dyn ValueProvider>>,
    ) -> BindingResult<()> {
        let query = request.query().unwrap_or_default();
        let pairs = serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring undecodable query string");
            Vec::new()
        });
        providers.push(Arc::new(NameValueProvider::new(BindingSource::Query, pairs)));
        Ok(())
    }
}

/// The default factories: form, then route values, then query string.
#[must_use]
pub fn default_value_provider_factories() -> Vec<Arc<dyn ValueProviderFactory>> {
    vec![
        Arc::new(FormValueProviderFactory),
        Arc::new(RouteValueProviderFactory),
        Arc::new(QueryStringValueProviderFactory),
    ]
}

impl CompositeValueProvider {
    /// Runs `factories` in order and aggregates their providers, keeping the
    /// factory order as precedence.
    pub async fn create(
        factories: &[Arc<dyn ValueProviderFactory>],
        request: &RequestContext,
    ) -> BindingResult<Self> {
        let mut providers = Vec::new();
        for factory in factories {
            factory.create_value_provider(request, &mut providers).await?;
        }
        debug!(count = providers.len(), "value providers created");
        Ok(Self::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::testing::RequestBuilder;

    #[tokio::test]
    async fn test_default_factories_precedence() {
        let request = RequestBuilder::post("/orders/5?id=9&sort=asc")
            .route_value("id", "5")
            .form("id=3&note=hi")
            .build();
        let composite = CompositeValueProvider::create(&default_value_provider_factories(), &request)
            .await
            .expect("providers");

        assert_eq!(composite.len(), 3);
        assert_eq!(composite.get_value("id").first_value(), Some("3"));
        assert_eq!(composite.get_value("sort").first_value(), Some("asc"));

        let query = composite.filter(&BindingSource::Query).expect("query");
        assert_eq!(query.get_value("id").first_value(), Some("9"));
        let route = composite.filter(&BindingSource::Path).expect("route");
        assert_eq!(route.get_value("id").first_value(), Some("5"));
    }

    #[tokio::test]
    async fn test_non_form_request_has_no_form_provider() {
        let request = RequestBuilder::get("/items?page=2").build();
        let composite = CompositeValueProvider::create(&default_value_provider_factories(), &request)
            .await
            .expect("providers");
        assert_eq!(composite.len(), 2);
        assert!(composite.filter(&BindingSource::Form).is_none());
    }
}
