//! Invokes an action handler and turns its output into a result.

use daedalus_core::{ModelValue, RequestContext};
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::{ActionArguments, ActionDescriptor, ActionOutput};
use crate::error::{PipelineError, PipelineResult};
use crate::results::{BoxedActionResult, EmptyResult, ObjectResult};

/// Calls an action's handler with arguments in parameter order.
#[derive(Debug, Clone)]
pub struct ActionMethodExecutor {
    parameter_names: Arc<[String]>,
}

impl ActionMethodExecutor {
    /// Creates an executor for `action`.
    #[must_use]
    pub fn for_action(action: &ActionDescriptor) -> Self {
        Self {
            parameter_names: action.parameters().iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Parameter names in declaration order.
    #[must_use]
    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    /// Invokes the handler.
    ///
    /// Arguments are reordered to match the parameter list. Parameters that
    /// were not bound are passed as [`ModelValue::Null`]; extra arguments set
    /// by filters follow in insertion order.
    pub async fn execute(
        &self,
        action: &ActionDescriptor,
        request: Arc<RequestContext>,
        mut arguments: ActionArguments,
    ) -> PipelineResult<BoxedActionResult> {
        let mut ordered = ActionArguments::new();
        for name in self.parameter_names.iter() {
            let value = arguments.remove(name).unwrap_or(ModelValue::Null);
            ordered.insert(name.clone(), value);
        }
        for (name, value) in arguments.iter() {
            ordered.insert(name, value.clone());
        }

        let output = action
            .handler()
            .invoke(request, ordered)
            .await
            .map_err(|e| PipelineError::action(action.display_name(), e))?;
        debug!(action = action.display_name(), "action method returned");
        Ok(Self::convert(output))
    }

    fn convert(output: ActionOutput) -> BoxedActionResult {
        match output {
            ActionOutput::Result(result) => result,
            ActionOutput::Value(value) => Arc::new(ObjectResult::new(value)),
            ActionOutput::Empty => Arc::new(EmptyResult),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FnActionHandler;
    use daedalus_core::testing::RequestBuilder;
    use daedalus_core::{ModelType, MvcError, ParameterDescriptor};

    fn echo_action() -> ActionDescriptor {
        ActionDescriptor::builder(
            "Orders",
            "Echo",
            Arc::new(FnActionHandler::new(|_, args: ActionArguments| async move {
                let names: Vec<&str> = args.iter().map(|(k, _)| k).collect();
                anyhow::ensure!(names == ["id", "page", "extra"], "unexpected order {names:?}");
                anyhow::ensure!(matches!(args.get("page"), Some(ModelValue::Null)), "page should be null");
                Ok(ActionOutput::Empty)
            })),
        )
        .parameter(ParameterDescriptor::new("id", ModelType::int()))
        .parameter(ParameterDescriptor::new("page", ModelType::int()))
        .build()
    }

    #[tokio::test]
    async fn test_arguments_follow_parameter_order() {
        let action = echo_action();
        let executor = ActionMethodExecutor::for_action(&action);
        assert_eq!(executor.parameter_names(), ["id", "page"]);

        let mut arguments = ActionArguments::new();
        arguments.insert("extra", ModelValue::Bool(true));
        arguments.insert("id", ModelValue::Int(7));
        let request = Arc::new(RequestBuilder::get("/").build());
        let result = executor.execute(&action, request, arguments).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_handler_error_is_wrapped() {
        let action = ActionDescriptor::endpoint(
            "fail",
            Arc::new(FnActionHandler::new(|_, _| async {
                Err::<ActionOutput, _>(MvcError::not_found("nothing here").into())
            })),
        )
        .build();
        let executor = ActionMethodExecutor::for_action(&action);
        let err = executor
            .execute(&action, Arc::new(RequestBuilder::get("/").build()), ActionArguments::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Action { ref action, .. } if action == "fail"));
    }
}
