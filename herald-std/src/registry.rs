//! Runtime handler registry.
//!
//! [`Registry`] is the standard [`HandlerRegistry`]. It stores handlers and
//! behaviors in per-message-type tables and can be modified at any time, also
//! while a mediator is running: every resolution scope reads the tables as
//! they are when the scope resolves.
//!
//! Handlers are registered either as a shared instance or as a factory. A
//! factory runs at most once per [`RegistryScope`], and the mediator opens a
//! new scope for every `send`, `publish`, and delivery attempt.

use herald_core::{
    DynHandlerBehavior, DynNotificationBehavior, DynNotificationHandler, DynPipelineBehavior,
    DynRequestHandler, HandlerBehavior, HandlerId, HandlerRegistry, Notification,
    NotificationBehavior, NotificationHandler, PipelineBehavior, RegistryError, Request,
    RequestHandler, ResolutionScope, Resolved, RetryPolicy, RetryPolicyStore,
};
use parking_lot::{Mutex, RwLock};
use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

type Factory<H> = Arc<dyn Fn() -> Arc<H> + Send + Sync>;

enum Provider<H: ?Sized> {
    Shared(Arc<H>),
    Scoped(Factory<H>),
}

impl<H: ?Sized> Clone for Provider<H> {
    fn clone(&self) -> Self {
        match self {
            Provider::Shared(handler) => Provider::Shared(handler.clone()),
            Provider::Scoped(factory) => Provider::Scoped(factory.clone()),
        }
    }
}

struct Registration<H: ?Sized> {
    id: HandlerId,
    provider: Provider<H>,
}

impl<H: ?Sized> Clone for Registration<H> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            provider: self.provider.clone(),
        }
    }
}

type RequestEntry<R> = Option<Registration<dyn DynRequestHandler<R>>>;
type NotificationEntries<N> = Vec<Registration<dyn DynNotificationHandler<N>>>;
type PipelineEntries<R> = Vec<Arc<dyn DynPipelineBehavior<R>>>;
type NotificationBehaviorEntries<N> = Vec<Arc<dyn DynNotificationBehavior<N>>>;
type HandlerBehaviorEntries<N> = Vec<Arc<dyn DynHandlerBehavior<N>>>;

/// Tables keyed by their own type.
#[derive(Default)]
struct Tables {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Tables {
    fn get<T: Any>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|table| table.downcast_ref::<T>())
    }

    fn update<T, O>(&mut self, f: impl FnOnce(&mut T) -> O) -> O
    where
        T: Any + Default + Send + Sync,
    {
        let mut table = self
            .entries
            .remove(&TypeId::of::<T>())
            .and_then(|table| table.downcast::<T>().ok())
            .map(|table| *table)
            .unwrap_or_default();
        let output = f(&mut table);
        self.entries.insert(TypeId::of::<T>(), Box::new(table));
        output
    }
}

/// The standard handler registry.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::builder()
///     .request_handler::<Ping, _>(PingHandler)
///     .notification_handler::<OrderPlaced, _>(SendReceipt)
///     .notification_handler::<OrderPlaced, _>(UpdateStock)
///     .handler_behavior::<OrderPlaced, _>(LoggingBehavior)
///     .build()?;
/// ```
pub struct Registry {
    tables: Arc<RwLock<Tables>>,
    policies: RetryPolicyStore,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with the default retry policy.
    pub fn new() -> Self {
        Self::with_retry_policies(RetryPolicyStore::new())
    }

    /// Create an empty registry using `policies` for retry lookups.
    pub fn with_retry_policies(policies: RetryPolicyStore) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            policies,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a fluent registration.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    fn next_id(&self) -> HandlerId {
        HandlerId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_request<R: Request>(
        &self,
        provider: Provider<dyn DynRequestHandler<R>>,
    ) -> Result<HandlerId, RegistryError> {
        let id = self.next_id();
        self.tables.write().update::<RequestEntry<R>, _>(|entry| {
            if entry.is_some() {
                return Err(RegistryError::DuplicateRequestHandler(type_name::<R>()));
            }
            *entry = Some(Registration { id, provider });
            Ok(id)
        })
    }

    fn insert_notification<N: Notification>(
        &self,
        provider: Provider<dyn DynNotificationHandler<N>>,
    ) -> HandlerId {
        let id = self.next_id();
        self.tables
            .write()
            .update::<NotificationEntries<N>, _>(|entries| entries.push(Registration { id, provider }));
        id
    }

    /// Register the handler for request type `R`.
    ///
    /// Fails if `R` already has a handler.
    pub fn add_request_handler<R, H>(&self, handler: H) -> Result<HandlerId, RegistryError>
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.insert_request::<R>(Provider::Shared(Arc::new(handler)))
    }

    /// Register a factory building the handler for request type `R` once per scope.
    pub fn add_scoped_request_handler<R, H, F>(&self, factory: F) -> Result<HandlerId, RegistryError>
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: Factory<dyn DynRequestHandler<R>> =
            Arc::new(move || Arc::new(factory()) as Arc<dyn DynRequestHandler<R>>);
        self.insert_request::<R>(Provider::Scoped(factory))
    }

    /// Remove the handler for request type `R`. Returns `false` if there was none.
    pub fn remove_request_handler<R: Request>(&self) -> bool {
        self.tables
            .write()
            .update::<RequestEntry<R>, _>(|entry| entry.take().is_some())
    }

    /// Whether request type `R` has a handler.
    pub fn has_request_handler<R: Request>(&self) -> bool {
        self.tables
            .read()
            .get::<RequestEntry<R>>()
            .is_some_and(Option::is_some)
    }

    /// Add a handler for notification type `N`.
    pub fn add_notification_handler<N, H>(&self, handler: H) -> HandlerId
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.insert_notification::<N>(Provider::Shared(Arc::new(handler)))
    }

    /// Add a handler for notification type `N` and set the type's retry policy.
    ///
    /// The policy applies to every handler of `N`, not only this one.
    pub fn add_notification_handler_with_policy<N, H>(&self, handler: H, policy: RetryPolicy) -> HandlerId
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        self.set_retry_policy::<N>(policy);
        self.add_notification_handler::<N, H>(handler)
    }

    /// Add a factory building a handler for notification type `N` once per scope.
    ///
    /// Each delivery attempt runs in its own scope, so a retried delivery gets
    /// a fresh instance.
    pub fn add_scoped_notification_handler<N, H, F>(&self, factory: F) -> HandlerId
    where
        N: Notification,
        H: NotificationHandler<N>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: Factory<dyn DynNotificationHandler<N>> =
            Arc::new(move || Arc::new(factory()) as Arc<dyn DynNotificationHandler<N>>);
        self.insert_notification::<N>(Provider::Scoped(factory))
    }

    /// Remove one notification handler. Returns `false` if `id` was not registered for `N`.
    ///
    /// Deliveries already queued for the removed handler are dropped when
    /// they are dequeued.
    pub fn remove_notification_handler<N: Notification>(&self, id: HandlerId) -> bool {
        self.tables
            .write()
            .update::<NotificationEntries<N>, _>(|entries| {
                let before = entries.len();
                entries.retain(|registration| registration.id != id);
                entries.len() != before
            })
    }

    /// Number of handlers registered for notification type `N`.
    pub fn notification_handler_count<N: Notification>(&self) -> usize {
        self.tables
            .read()
            .get::<NotificationEntries<N>>()
            .map_or(0, Vec::len)
    }

    /// Append a behavior to the pipeline of request type `R`.
    pub fn add_pipeline_behavior<R, B>(&self, behavior: B)
    where
        R: Request,
        B: PipelineBehavior<R>,
    {
        self.tables
            .write()
            .update::<PipelineEntries<R>, _>(|entries| entries.push(Arc::new(behavior)));
    }

    /// Append a behavior to the publish pipeline of notification type `N`.
    pub fn add_notification_behavior<N, B>(&self, behavior: B)
    where
        N: Notification,
        B: NotificationBehavior<N>,
    {
        self.tables
            .write()
            .update::<NotificationBehaviorEntries<N>, _>(|entries| entries.push(Arc::new(behavior)));
    }

    /// Append a behavior around every handler invocation for notification type `N`.
    pub fn add_handler_behavior<N, B>(&self, behavior: B)
    where
        N: Notification,
        B: HandlerBehavior<N>,
    {
        self.tables
            .write()
            .update::<HandlerBehaviorEntries<N>, _>(|entries| entries.push(Arc::new(behavior)));
    }

    /// Set the retry policy of notification type `N`.
    pub fn set_retry_policy<N: Notification>(&self, policy: RetryPolicy) {
        self.policies.set_for::<N>(policy);
    }
}

impl HandlerRegistry for Registry {
    type Scope = RegistryScope;

    fn create_scope(&self) -> Self::Scope {
        RegistryScope {
            tables: self.tables.clone(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn retry_policies(&self) -> &RetryPolicyStore {
        &self.policies
    }
}

/// One resolution scope of a [`Registry`].
///
/// Shared handlers resolve to the registered instance. Scoped handlers are
/// built on first resolution and reused for the rest of the scope.
pub struct RegistryScope {
    tables: Arc<RwLock<Tables>>,
    instances: Mutex<HashMap<HandlerId, Box<dyn Any + Send + Sync>>>,
}

impl RegistryScope {
    fn instantiate<H>(&self, registration: &Registration<H>) -> Arc<H>
    where
        H: ?Sized + Send + Sync + 'static,
    {
        let factory = match &registration.provider {
            Provider::Shared(handler) => return handler.clone(),
            Provider::Scoped(factory) => factory,
        };

        if let Some(handler) = self
            .instances
            .lock()
            .get(&registration.id)
            .and_then(|instance| instance.downcast_ref::<Arc<H>>())
        {
            return handler.clone();
        }

        // Factories run outside the lock; they may resolve from this scope.
        let handler = factory();
        self.instances
            .lock()
            .insert(registration.id, Box::new(handler.clone()));
        handler
    }

    fn behaviors<T: Any + Clone>(&self) -> Option<T> {
        self.tables.read().get::<T>().cloned()
    }
}

impl ResolutionScope for RegistryScope {
    fn request_handler<R: Request>(&self) -> Option<Arc<dyn DynRequestHandler<R>>> {
        let registration = self
            .tables
            .read()
            .get::<RequestEntry<R>>()
            .and_then(|entry| entry.clone())?;
        Some(self.instantiate(&registration))
    }

    fn notification_handlers<N: Notification>(&self) -> Vec<Resolved<dyn DynNotificationHandler<N>>> {
        let registrations = self
            .tables
            .read()
            .get::<NotificationEntries<N>>()
            .cloned()
            .unwrap_or_default();

        registrations
            .iter()
            .map(|registration| Resolved {
                id: registration.id,
                handler: self.instantiate(registration),
            })
            .collect()
    }

    fn notification_handler<N: Notification>(&self, id: HandlerId) -> Option<Resolved<dyn DynNotificationHandler<N>>> {
        let registration = self
            .tables
            .read()
            .get::<NotificationEntries<N>>()
            .and_then(|entries| entries.iter().find(|registration| registration.id == id).cloned())?;

        Some(Resolved {
            id: registration.id,
            handler: self.instantiate(&registration),
        })
    }

    fn pipeline_behaviors<R: Request>(&self) -> Vec<Arc<dyn DynPipelineBehavior<R>>> {
        self.behaviors::<PipelineEntries<R>>().unwrap_or_default()
    }

    fn notification_behaviors<N: Notification>(&self) -> Vec<Arc<dyn DynNotificationBehavior<N>>> {
        self.behaviors::<NotificationBehaviorEntries<N>>()
            .unwrap_or_default()
    }

    fn handler_behaviors<N: Notification>(&self) -> Vec<Arc<dyn DynHandlerBehavior<N>>> {
        self.behaviors::<HandlerBehaviorEntries<N>>()
            .unwrap_or_default()
    }

    fn has_notification_handlers<N: Notification>(&self) -> bool {
        self.tables
            .read()
            .get::<NotificationEntries<N>>()
            .is_some_and(|entries| !entries.is_empty())
    }
}

/// Builder for constructing a [`Registry`].
///
/// Registration errors are deferred: the first one is returned by
/// [`build`](Self::build).
pub struct RegistryBuilder {
    registry: Registry,
    error: Option<RegistryError>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Create a new empty registry builder.
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            error: None,
        }
    }

    fn record(mut self, result: Result<HandlerId, RegistryError>) -> Self {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Register the handler for request type `R`.
    pub fn request_handler<R: Request, H: RequestHandler<R>>(self, handler: H) -> Self {
        let result = self.registry.add_request_handler::<R, H>(handler);
        self.record(result)
    }

    /// Register a per-scope factory for the handler of request type `R`.
    pub fn scoped_request_handler<R, H, F>(self, factory: F) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let result = self.registry.add_scoped_request_handler::<R, H, F>(factory);
        self.record(result)
    }

    /// Add a handler for notification type `N`.
    pub fn notification_handler<N: Notification, H: NotificationHandler<N>>(self, handler: H) -> Self {
        self.registry.add_notification_handler::<N, H>(handler);
        self
    }

    /// Add a per-scope factory for a handler of notification type `N`.
    pub fn scoped_notification_handler<N, H, F>(self, factory: F) -> Self
    where
        N: Notification,
        H: NotificationHandler<N>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.registry
            .add_scoped_notification_handler::<N, H, F>(factory);
        self
    }

    /// Append a pipeline behavior for request type `R`.
    pub fn pipeline_behavior<R: Request, B: PipelineBehavior<R>>(self, behavior: B) -> Self {
        self.registry.add_pipeline_behavior::<R, B>(behavior);
        self
    }

    /// Append a publish behavior for notification type `N`.
    pub fn notification_behavior<N: Notification, B: NotificationBehavior<N>>(self, behavior: B) -> Self {
        self.registry.add_notification_behavior::<N, B>(behavior);
        self
    }

    /// Append a handler behavior for notification type `N`.
    pub fn handler_behavior<N: Notification, B: HandlerBehavior<N>>(self, behavior: B) -> Self {
        self.registry.add_handler_behavior::<N, B>(behavior);
        self
    }

    /// Set the retry policy of notification type `N`.
    pub fn retry_policy<N: Notification>(self, policy: RetryPolicy) -> Self {
        self.registry.set_retry_policy::<N>(policy);
        self
    }

    /// Set the policy used by notification types without their own policy.
    pub fn default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.registry.policies.set_default(policy);
        self
    }

    /// Build the registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{BoxError, Next, RetryPolicy};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Ping(u32);

    impl Request for Ping {
        type Response = u32;
    }

    struct Echo;

    impl RequestHandler<Ping> for Echo {
        async fn handle(&self, request: &Ping) -> Result<u32, BoxError> {
            Ok(request.0)
        }
    }

    struct Created;
    impl Notification for Created {}

    struct Noop;

    impl NotificationHandler<Created> for Noop {
        async fn handle(&self, _notification: &Created) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Passthrough;

    impl PipelineBehavior<Ping> for Passthrough {
        async fn handle<'a>(&'a self, _request: &'a Ping, next: Next<'a, u32>) -> Result<u32, BoxError> {
            next.await
        }
    }

    #[test]
    fn test_duplicate_request_handler_rejected() {
        let registry = Registry::new();
        registry.add_request_handler::<Ping, _>(Echo).unwrap();

        let err = registry.add_request_handler::<Ping, _>(Echo).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRequestHandler(name) if name.ends_with("Ping")));
    }

    #[test]
    fn test_builder_reports_first_error() {
        let result = Registry::builder()
            .request_handler::<Ping, _>(Echo)
            .request_handler::<Ping, _>(Echo)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_request_handler() {
        let registry = Registry::new();
        assert!(registry.create_scope().request_handler::<Ping>().is_none());

        registry.add_request_handler::<Ping, _>(Echo).unwrap();
        let handler = registry.create_scope().request_handler::<Ping>().unwrap();
        assert_eq!(handler.handle_dyn(&Ping(5)).await.unwrap(), 5);

        assert!(registry.remove_request_handler::<Ping>());
        assert!(!registry.has_request_handler::<Ping>());
    }

    #[test]
    fn test_notification_handlers_keep_identity() {
        let registry = Registry::new();
        let first = registry.add_notification_handler::<Created, _>(Noop);
        let second = registry.add_notification_handler::<Created, _>(Noop);
        assert_ne!(first, second);

        let scope = registry.create_scope();
        let ids: Vec<_> = scope
            .notification_handlers::<Created>()
            .iter()
            .map(|resolved| resolved.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
        assert!(scope.has_notification_handlers::<Created>());

        assert!(registry.remove_notification_handler::<Created>(first));
        assert!(!registry.remove_notification_handler::<Created>(first));
        assert_eq!(registry.notification_handler_count::<Created>(), 1);
    }

    #[test]
    fn test_scoped_factory_runs_once_per_scope() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let counter = built.clone();
        registry.add_scoped_notification_handler::<Created, _, _>(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Noop
        });

        let scope = registry.create_scope();
        scope.notification_handlers::<Created>();
        scope.notification_handlers::<Created>();
        assert_eq!(built.load(Ordering::SeqCst), 1);

        registry.create_scope().notification_handlers::<Created>();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_single_notification_handler() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let counter = built.clone();
        registry.add_scoped_notification_handler::<Created, _, _>(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Noop
        });
        let shared = registry.add_notification_handler::<Created, _>(Noop);

        let resolved = registry.create_scope().notification_handler::<Created>(shared).unwrap();
        assert_eq!(resolved.id, shared);
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(registry
            .create_scope()
            .notification_handler::<Created>(HandlerId::new(999))
            .is_none());
    }

    #[test]
    fn test_has_handlers_does_not_build_scoped_instances() {
        let built = Arc::new(AtomicUsize::new(0));
        let registry = Registry::new();
        let counter = built.clone();
        registry.add_scoped_notification_handler::<Created, _, _>(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Noop
        });

        assert!(registry.create_scope().has_notification_handlers::<Created>());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_behaviors_in_registration_order() {
        let registry = Registry::new();
        registry.add_pipeline_behavior::<Ping, _>(Passthrough);
        registry.add_pipeline_behavior::<Ping, _>(Passthrough);

        let scope = registry.create_scope();
        assert_eq!(scope.pipeline_behaviors::<Ping>().len(), 2);
        assert!(scope.handler_behaviors::<Created>().is_empty());
        assert!(scope.notification_behaviors::<Created>().is_empty());
    }

    #[test]
    fn test_retry_policies() {
        let registry = Registry::builder()
            .default_retry_policy(RetryPolicy::new(5, Duration::ZERO))
            .build()
            .unwrap();
        assert_eq!(registry.retry_policies().get_or_default_for::<Created>().max_attempts(), 5);

        registry.set_retry_policy::<Created>(RetryPolicy::new(2, Duration::ZERO));
        assert_eq!(registry.retry_policies().get_or_default_for::<Created>().max_attempts(), 2);
    }
}
