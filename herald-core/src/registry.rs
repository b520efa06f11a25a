//! # Registry Seam
//!
//! The mediator resolves handlers and behaviors through a [`HandlerRegistry`]
//! instead of owning them. Every `send`, every `publish`, and every
//! notification delivery attempt opens its own [`ResolutionScope`], so
//! registries that build handlers per scope hand out fresh instances each
//! time.

use crate::{
    behavior::{DynHandlerBehavior, DynNotificationBehavior, DynPipelineBehavior},
    handler::{DynNotificationHandler, DynRequestHandler},
    message::{HandlerId, Notification, Request},
    retry::RetryPolicyStore,
};
use std::sync::Arc;

/// A handler resolved from a scope, tagged with its registration identity.
///
/// The identity is stable across scopes: resolving the same registration in
/// two scopes yields the same `id`, even when the instances differ.
pub struct Resolved<H: ?Sized> {
    /// Registration identity.
    pub id: HandlerId,
    /// The handler instance.
    pub handler: Arc<H>,
}

impl<H: ?Sized> Clone for Resolved<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: self.handler.clone(),
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for Resolved<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved").field("id", &self.id).finish()
    }
}

/// Source of handler scopes and per-type retry policies.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be used as a handler registry",
    label = "missing `HandlerRegistry` implementation",
    note = "Use `herald_std::Registry` or implement `create_scope` and `retry_policies`."
)]
pub trait HandlerRegistry: Send + Sync + 'static {
    /// The scope type handed out by this registry.
    type Scope: ResolutionScope;

    /// Open a new resolution scope.
    fn create_scope(&self) -> Self::Scope;

    /// Retry policies keyed by notification type.
    fn retry_policies(&self) -> &RetryPolicyStore;
}

impl<T: HandlerRegistry> HandlerRegistry for Arc<T> {
    type Scope = T::Scope;

    fn create_scope(&self) -> Self::Scope {
        (**self).create_scope()
    }

    fn retry_policies(&self) -> &RetryPolicyStore {
        (**self).retry_policies()
    }
}

/// A unit of resolution.
///
/// Behaviors are returned in registration order; the first one returned is
/// the outermost stage of the chain.
pub trait ResolutionScope: Send + Sync + 'static {
    /// The handler for request type `R`, if one is registered.
    fn request_handler<R: Request>(&self) -> Option<Arc<dyn DynRequestHandler<R>>>;

    /// Every handler registered for notification type `N`.
    fn notification_handlers<N: Notification>(&self) -> Vec<Resolved<dyn DynNotificationHandler<N>>>;

    /// One handler of notification type `N`, by registration identity.
    fn notification_handler<N: Notification>(&self, id: HandlerId) -> Option<Resolved<dyn DynNotificationHandler<N>>> {
        self.notification_handlers::<N>()
            .into_iter()
            .find(|resolved| resolved.id == id)
    }

    /// Behaviors wrapping the handler of request type `R`.
    fn pipeline_behaviors<R: Request>(&self) -> Vec<Arc<dyn DynPipelineBehavior<R>>>;

    /// Behaviors wrapping the publish of notification type `N`.
    fn notification_behaviors<N: Notification>(&self) -> Vec<Arc<dyn DynNotificationBehavior<N>>>;

    /// Behaviors wrapping each handler invocation for notification type `N`.
    fn handler_behaviors<N: Notification>(&self) -> Vec<Arc<dyn DynHandlerBehavior<N>>>;

    /// Whether at least one handler is registered for `N`.
    fn has_notification_handlers<N: Notification>(&self) -> bool {
        !self.notification_handlers::<N>().is_empty()
    }
}
