//! Authorization filter backed by a pluggable policy evaluator.
//!
//! The pipeline only interprets the outcome: `Challenge` becomes a 401,
//! `Forbid` a 403. Actions marked allow-anonymous skip evaluation.

use async_trait::async_trait;
use daedalus_core::{Principal, RequestContext};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::descriptor::ActionDescriptor;
use crate::filters::{AuthorizationFilter, AuthorizationFilterContext};
use crate::results::{ChallengeResult, ForbidResult};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The request may proceed.
    Success,
    /// The caller must authenticate.
    Challenge,
    /// The caller is authenticated but not permitted.
    Forbid {
        /// Why access was denied.
        reason: String,
    },
}

/// Requirements an action declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    /// Policy name for logs.
    pub name: Option<String>,
    /// Any one of these roles grants access. Empty means any authenticated user.
    pub roles: Vec<String>,
    /// Whether anonymous callers are challenged.
    pub require_authenticated: bool,
}

impl AuthorizationPolicy {
    /// Requires an authenticated caller.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            name: None,
            roles: Vec::new(),
            require_authenticated: true,
        }
    }

    /// Requires an authenticated caller in one of `roles`.
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            roles: roles.into_iter().map(Into::into).collect(),
            require_authenticated: true,
        }
    }

    /// Names the policy.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Evaluates a policy for a request.
#[async_trait]
pub trait AuthorizationService: Send + Sync + fmt::Debug {
    /// Evaluates `policy` for `user` invoking `action`.
    async fn authorize(
        &self,
        user: &Principal,
        policy: &AuthorizationPolicy,
        action: &ActionDescriptor,
        request: &RequestContext,
    ) -> AuthorizationOutcome;
}

/// Role checks against the request principal.
#[derive(Debug, Default, Clone, Copy)]
pub struct RolesAuthorizationService;

#[async_trait]
impl AuthorizationService for RolesAuthorizationService {
    async fn authorize(
        &self,
        user: &Principal,
        policy: &AuthorizationPolicy,
        _action: &ActionDescriptor,
        _request: &RequestContext,
    ) -> AuthorizationOutcome {
        if !user.is_authenticated() {
            return if policy.require_authenticated || !policy.roles.is_empty() {
                AuthorizationOutcome::Challenge
            } else {
                AuthorizationOutcome::Success
            };
        }
        if policy.roles.is_empty() || policy.roles.iter().any(|r| user.is_in_role(r)) {
            AuthorizationOutcome::Success
        } else {
            AuthorizationOutcome::Forbid {
                reason: format!("requires one of the roles: {}", policy.roles.join(", ")),
            }
        }
    }
}

/// Evaluates a policy and short-circuits with 401 or 403.
#[derive(Debug, Clone)]
pub struct AuthorizeFilter {
    policy: AuthorizationPolicy,
    service: Arc<dyn AuthorizationService>,
}

impl AuthorizeFilter {
    /// Uses [`RolesAuthorizationService`].
    #[must_use]
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self::with_service(policy, Arc::new(RolesAuthorizationService))
    }

    /// Uses a custom evaluator.
    #[must_use]
    pub fn with_service(policy: AuthorizationPolicy, service: Arc<dyn AuthorizationService>) -> Self {
        Self { policy, service }
    }

    /// The policy.
    #[must_use]
    pub const fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }
}

#[async_trait]
impl AuthorizationFilter for AuthorizeFilter {
    async fn on_authorization(&self, ctx: &mut AuthorizationFilterContext<'_>) -> anyhow::Result<()> {
        let action = &ctx.action_context.action;
        if action.allow_anonymous() {
            debug!(action = action.display_name(), "anonymous access allowed");
            return Ok(());
        }
        let request = &ctx.action_context.request;
        let outcome = self
            .service
            .authorize(request.user(), &self.policy, action, request)
            .await;
        match outcome {
            AuthorizationOutcome::Success => {}
            AuthorizationOutcome::Challenge => {
                warn!(action = action.display_name(), policy = ?self.policy.name, "authentication required");
                ctx.result = Some(Arc::new(ChallengeResult::default()));
            }
            AuthorizationOutcome::Forbid { reason } => {
                warn!(
                    action = action.display_name(),
                    user = ?request.user().name,
                    reason = %reason,
                    "authorization denied"
                );
                ctx.result = Some(Arc::new(ForbidResult));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ActionOutput, FnActionHandler};
    use crate::filters::ActionContext;
    use daedalus_core::testing::RequestBuilder;

    fn run_ctx(user: Principal, allow_anonymous: bool) -> ActionContext {
        let mut builder = ActionDescriptor::endpoint(
            "admin",
            Arc::new(FnActionHandler::new(|_, _| async { Ok(ActionOutput::Empty) })),
        );
        if allow_anonymous {
            builder = builder.allow_anonymous();
        }
        ActionContext::new(
            Arc::new(RequestBuilder::get("/admin").user(user).build()),
            Arc::new(builder.build()),
            200,
        )
    }

    async fn authorize(filter: &AuthorizeFilter, actx: &mut ActionContext) -> bool {
        let mut ctx = AuthorizationFilterContext {
            action_context: actx,
            result: None,
        };
        filter.on_authorization(&mut ctx).await.expect("filter");
        ctx.result.is_none()
    }

    #[tokio::test]
    async fn test_roles() {
        let filter = AuthorizeFilter::new(AuthorizationPolicy::roles(["admin"]));
        assert!(authorize(&filter, &mut run_ctx(Principal::user("ada", ["admin"]), false)).await);
        assert!(!authorize(&filter, &mut run_ctx(Principal::user("bob", ["user"]), false)).await);
        assert!(!authorize(&filter, &mut run_ctx(Principal::anonymous(), false)).await);
    }

    #[tokio::test]
    async fn test_allow_anonymous_bypasses() {
        let filter = AuthorizeFilter::new(AuthorizationPolicy::authenticated());
        assert!(authorize(&filter, &mut run_ctx(Principal::anonymous(), true)).await);
    }

    #[tokio::test]
    async fn test_outcomes() {
        let service = RolesAuthorizationService;
        let actx = run_ctx(Principal::anonymous(), false);
        let policy = AuthorizationPolicy::authenticated();
        assert_eq!(
            service
                .authorize(&Principal::anonymous(), &policy, &actx.action, &actx.request)
                .await,
            AuthorizationOutcome::Challenge
        );
        let outcome = service
            .authorize(
                &Principal::user("bob", ["user"]),
                &AuthorizationPolicy::roles(["admin"]),
                &actx.action,
                &actx.request,
            )
            .await;
        assert!(matches!(outcome, AuthorizationOutcome::Forbid { .. }));
        assert_eq!(
            service
                .authorize(&Principal::anonymous(), &AuthorizationPolicy::default(), &actx.action, &actx.request)
                .await,
            AuthorizationOutcome::Success
        );
    }
}
