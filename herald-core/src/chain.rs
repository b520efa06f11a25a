//! # Behavior Chain
//!
//! The onion construction shared by request pipelines and notification
//! pipelines. A chain is built by folding an ordered behavior list from last to
//! first around a terminal action, so invoking the result runs:
//!
//! ```text
//! b[0] before -> b[1] before -> ... -> terminal -> ... -> b[1] after -> b[0] after
//! ```
//!
//! Each behavior receives a [`Next`] bound to the next-inner stage. A behavior
//! that drops its `Next` without awaiting it short-circuits the chain: the
//! terminal and every inner behavior are skipped.

use crate::error::BoxError;
use futures::future::BoxFuture;
use std::future::IntoFuture;

/// The rest of a pipeline, as seen from one stage.
///
/// `Next` is consumed when it runs, so a stage can delegate at most once.
/// It can be awaited directly:
///
/// ```rust,ignore
/// async fn handle<'a>(&'a self, request: &'a R, next: Next<'a, R::Response>) -> Result<R::Response, BoxError> {
///     let response = next.await?;
///     Ok(response)
/// }
/// ```
pub struct Next<'a, T> {
    run: Box<dyn FnOnce() -> BoxFuture<'a, Result<T, BoxError>> + Send + 'a>,
}

impl<'a, T> Next<'a, T> {
    /// Wrap a deferred stage.
    pub fn new<F>(stage: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'a, Result<T, BoxError>> + Send + 'a,
    {
        Self {
            run: Box::new(stage),
        }
    }

    /// Start the rest of the pipeline.
    pub fn run(self) -> BoxFuture<'a, Result<T, BoxError>> {
        (self.run)()
    }
}

impl<'a, T> IntoFuture for Next<'a, T> {
    type Output = Result<T, BoxError>;
    type IntoFuture = BoxFuture<'a, Result<T, BoxError>>;

    fn into_future(self) -> Self::IntoFuture {
        self.run()
    }
}

/// Compose `behaviors` around `terminal`.
///
/// `invoke` adapts one behavior to the stage signature; it is called at most
/// once per behavior, and only when the enclosing stage delegates.
///
/// # Example
///
/// ```rust,ignore
/// let terminal = Next::new(|| handler.handle_dyn(&request));
/// let chain = compose(terminal, &behaviors, |behavior, next| {
///     behavior.handle_dyn(&request, next)
/// });
/// let response = chain.await?;
/// ```
pub fn compose<'a, T, B, F>(terminal: Next<'a, T>, behaviors: &'a [B], invoke: F) -> Next<'a, T>
where
    T: 'a,
    B: Sync,
    F: Fn(&'a B, Next<'a, T>) -> BoxFuture<'a, Result<T, BoxError>> + Copy + Send + 'a,
{
    behaviors
        .iter()
        .rev()
        .fold(terminal, |next, behavior| {
            Next::new(move || invoke(behavior, next))
        })
}
