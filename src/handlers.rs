//! Ordered handler registries for sync and error notifications.
//!
//! Handlers run in registration order. A handler that returns an error or
//! panics is logged and skipped; the remaining handlers still run.
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

pub struct Handlers<E: ?Sized> {
    name: &'static str,
    handlers: Vec<Box<dyn FnMut(&E) -> anyhow::Result<()> + Send>>,
}

impl<E: ?Sized> Handlers<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub fn push(&mut self, handler: impl FnMut(&E) -> anyhow::Result<()> + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler; returns how many failed.
    pub fn notify(&mut self, event: &E) -> usize {
        let mut failures = 0;
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(registry = self.name, index, error = %format!("{err:#}"), "handler failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(registry = self.name, index, "handler panicked");
                }
            }
        }
        failures
    }
}

impl<E: ?Sized> std::fmt::Debug for Handlers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("name", &self.name)
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// Handler that may await, for the async sync manager.
#[async_trait]
pub trait AsyncHandler<E: Sync + ?Sized>: Send + Sync {
    async fn handle(&self, event: &E) -> anyhow::Result<()>;
}

#[async_trait]
impl<E, F> AsyncHandler<E> for F
where
    E: Sync + ?Sized,
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

pub struct AsyncHandlers<E: Sync + ?Sized> {
    name: &'static str,
    handlers: Vec<Box<dyn AsyncHandler<E>>>,
}

impl<E: Sync + ?Sized> AsyncHandlers<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub fn push(&mut self, handler: impl AsyncHandler<E> + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn notify(&self, event: &E) -> usize {
        let mut failures = 0;
        for (index, handler) in self.handlers.iter().enumerate() {
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(registry = self.name, index, error = %format!("{err:#}"), "handler failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(registry = self.name, index, "handler panicked");
                }
            }
        }
        failures
    }
}

impl<E: Sync + ?Sized> std::fmt::Debug for AsyncHandlers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncHandlers")
            .field("name", &self.name)
            .field("len", &self.handlers.len())
            .finish()
    }
}
