//! Queued notifications.
//!
//! The queue is shared by every notification type, so what travels through it
//! is type-erased. An envelope carries the notification together with a
//! planner monomorphized for its type at publish time; the worker calls the
//! planner against a fresh resolution scope to turn the envelope back into
//! typed, ready-to-run handler invocations.

use futures::{FutureExt, future::BoxFuture};
use herald_core::{
    BoxError, HandlerId, MessageKind, Next, Notification, ResolutionScope, Resolved, compose,
};
use std::{any::Any, sync::Arc};

/// A notification with its type erased.
pub(crate) type ErasedMessage = Arc<dyn Any + Send + Sync>;

type Planner<S> = fn(&S, &ErasedMessage, Option<HandlerId>) -> Vec<DeliveryAttempt>;

/// One handler invocation, handler behaviors included.
pub(crate) struct DeliveryAttempt {
    pub(crate) handler: HandlerId,
    pub(crate) run: BoxFuture<'static, Result<(), BoxError>>,
}

/// A queued notification.
///
/// A fresh envelope targets every handler of its type. When the worker fans
/// it out, each handler gets its own copy pinned to it, so retries and
/// dead-lettering happen per handler.
pub(crate) struct NotificationEnvelope<S> {
    pub(crate) message: ErasedMessage,
    pub(crate) kind: MessageKind,
    pub(crate) retry_count: u32,
    pub(crate) target: Option<HandlerId>,
    planner: Planner<S>,
}

impl<S> Clone for NotificationEnvelope<S> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            kind: self.kind,
            retry_count: self.retry_count,
            target: self.target,
            planner: self.planner,
        }
    }
}

impl<S: ResolutionScope> NotificationEnvelope<S> {
    pub(crate) fn new<N: Notification>(notification: Arc<N>) -> Self {
        Self {
            message: notification,
            kind: MessageKind::of::<N>(),
            retry_count: 0,
            target: None,
            planner: plan::<N, S>,
        }
    }

    /// A copy of this envelope bound to `handler`.
    pub(crate) fn pinned(&self, handler: HandlerId) -> Self {
        Self {
            target: Some(handler),
            ..self.clone()
        }
    }

    /// Resolve the envelope's handlers in `scope` and prepare one attempt per handler.
    ///
    /// Handlers that are no longer registered are skipped; an envelope pinned
    /// to a removed handler yields nothing.
    pub(crate) fn plan(&self, scope: &S) -> Vec<DeliveryAttempt> {
        (self.planner)(scope, &self.message, self.target)
    }
}

fn plan<N: Notification, S: ResolutionScope>(
    scope: &S,
    message: &ErasedMessage,
    target: Option<HandlerId>,
) -> Vec<DeliveryAttempt> {
    let Ok(notification) = message.clone().downcast::<N>() else {
        return Vec::new();
    };

    let handlers = match target {
        Some(id) => scope.notification_handler::<N>(id).into_iter().collect(),
        None => scope.notification_handlers::<N>(),
    };
    if handlers.is_empty() {
        return Vec::new();
    }

    let behaviors = Arc::new(scope.handler_behaviors::<N>());
    handlers
        .into_iter()
        .map(|Resolved { id, handler }| {
            let notification = notification.clone();
            let behaviors = behaviors.clone();
            let run = async move {
                let notification: &N = &notification;
                let handler = &*handler;
                let terminal = Next::new(move || handler.handle_dyn(notification));
                compose(terminal, behaviors.as_slice(), move |behavior, next| {
                    behavior.handle_dyn(notification, next)
                })
                .await
            }
            .boxed();

            DeliveryAttempt { handler: id, run }
        })
        .collect()
}
