//! Handler execution modes.
//!
//! Every registered operation is either [`Handler::Sync`] (runs to completion
//! on the accept flow) or [`Handler::Async`] (returns a future the session
//! drives on its own task). Invoking a handler yields an [`Outcome`] so the
//! caller branches on the mode explicitly.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::exchange::Exchange;
use crate::types::{McpError, McpResult};

type SyncFn<Req, Res> = dyn Fn(Exchange, Req) -> McpResult<Res> + Send + Sync;
type AsyncFn<Req, Res> = dyn Fn(Exchange, Req) -> BoxFuture<'static, McpResult<Res>> + Send + Sync;

pub enum Handler<Req, Res> {
    Sync(Arc<SyncFn<Req, Res>>),
    Async(Arc<AsyncFn<Req, Res>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMode {
    Sync,
    Async,
}

impl<Req, Res> Clone for Handler<Req, Res> {
    fn clone(&self) -> Self {
        match self {
            Handler::Sync(f) => Handler::Sync(Arc::clone(f)),
            Handler::Async(f) => Handler::Async(Arc::clone(f)),
        }
    }
}

impl<Req, Res> std::fmt::Debug for Handler<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{:?}", self.mode())
    }
}

impl<Req, Res> Handler<Req, Res> {
    pub fn mode(&self) -> HandlerMode {
        match self {
            Handler::Sync(_) => HandlerMode::Sync,
            Handler::Async(_) => HandlerMode::Async,
        }
    }
}

impl<Req, Res> Handler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Exchange, Req) -> McpResult<Res> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(Exchange, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Res>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |exchange, request| f(exchange, request).boxed()))
    }

    /// Run the handler. Panics are caught and reported as `HandlerFault`.
    pub(crate) fn invoke(&self, exchange: Exchange, request: Req) -> Outcome<Res> {
        match self {
            Handler::Sync(f) => {
                let result = catch_unwind(AssertUnwindSafe(|| f(exchange, request)))
                    .unwrap_or_else(|payload| Err(fault_from_panic(payload)));
                Outcome::Ready(result)
            }
            Handler::Async(f) => match catch_unwind(AssertUnwindSafe(|| f(exchange, request))) {
                Ok(future) => Outcome::Deferred(
                    AssertUnwindSafe(future)
                        .catch_unwind()
                        .map(|settled| settled.unwrap_or_else(|payload| Err(fault_from_panic(payload))))
                        .boxed(),
                ),
                Err(payload) => Outcome::Ready(Err(fault_from_panic(payload))),
            },
        }
    }
}

fn fault_from_panic(payload: Box<dyn Any + Send>) -> McpError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    tracing::error!("Handler panicked: {message}");
    McpError::HandlerFault(message)
}

/// Result of invoking a handler: settled already, or still running.
pub enum Outcome<T> {
    Ready(McpResult<T>),
    Deferred(BoxFuture<'static, McpResult<T>>),
}

impl<T: Send + 'static> Outcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    /// Wait for the outcome, whichever mode produced it.
    pub async fn settle(self) -> McpResult<T> {
        match self {
            Outcome::Ready(result) => result,
            Outcome::Deferred(future) => future.await,
        }
    }

    /// Attach a continuation that runs when the outcome settles.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        U: Send + 'static,
        F: FnOnce(McpResult<T>) -> McpResult<U> + Send + 'static,
    {
        match self {
            Outcome::Ready(result) => Outcome::Ready(f(result)),
            Outcome::Deferred(future) => Outcome::Deferred(future.map(f).boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;

    #[tokio::test]
    async fn test_sync_handler_settles_immediately() {
        let handler: Handler<i32, i32> = Handler::sync(|_, x| Ok(x * 2));
        assert_eq!(handler.mode(), HandlerMode::Sync);
        let outcome = handler.invoke(Exchange::detached(), 21);
        assert!(outcome.is_ready());
        assert_eq!(outcome.settle().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_async_handler_is_deferred() {
        let handler: Handler<i32, i32> = Handler::asynchronous(|_, x| async move { Ok(x + 1) });
        assert_eq!(handler.mode(), HandlerMode::Async);
        let outcome = handler.invoke(Exchange::detached(), 1);
        assert!(!outcome.is_ready());
        assert_eq!(outcome.settle().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panics_become_handler_faults() {
        let sync: Handler<(), ()> = Handler::sync(|_, _| panic!("sync boom"));
        let err = sync.invoke(Exchange::detached(), ()).settle().await.unwrap_err();
        assert!(matches!(err, McpError::HandlerFault(ref m) if m == "sync boom"));

        let deferred: Handler<(), ()> = Handler::asynchronous(|_, _| async move {
            tokio::task::yield_now().await;
            if true {
                panic!("async boom");
            }
            Ok(())
        });
        let err = deferred
            .invoke(Exchange::detached(), ())
            .settle()
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::HandlerFault(ref m) if m == "async boom"));
    }

    #[test]
    fn test_debug_names_the_mode() {
        let sync: Handler<(), ()> = Handler::sync(|_, _| Ok(()));
        let deferred: Handler<(), ()> = Handler::asynchronous(|_, _| async move { Ok(()) });
        assert_eq!(format!("{sync:?}"), "Handler::Sync");
        assert_eq!(format!("{deferred:?}"), "Handler::Async");
    }

    #[tokio::test]
    async fn test_map_runs_after_settle() {
        let handler: Handler<(), &'static str> =
            Handler::asynchronous(|_, _| async move { Ok("done") });
        let mapped = handler
            .invoke(Exchange::detached(), ())
            .map(|r| r.map(|s| s.len()));
        assert_eq!(mapped.settle().await.unwrap(), 4);
    }
}
