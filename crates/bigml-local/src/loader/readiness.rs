//! Single-fire readiness with queued listeners
//!
//! A [`Readiness`] starts loading, resolves exactly once to a ready value or
//! an error, and replays every listener queued meanwhile in registration
//! order. Listeners registered after resolution run immediately.

use crate::error::{Error, LoadError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type Listener<T> = Box<dyn FnOnce(Result<Arc<T>>) + Send>;

enum State<T> {
    Loading(Vec<Listener<T>>),
    Ready(Arc<T>),
    Failed(Error),
}

/// Readiness state of a locally held resource
pub struct Readiness<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for Readiness<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Loading(Vec::new())),
        }
    }
}

impl<T> fmt::Debug for Readiness<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            State::Loading(listeners) => format!("Loading({} pending)", listeners.len()),
            State::Ready(_) => "Ready".to_string(),
            State::Failed(err) => format!("Failed({})", err),
        };
        f.debug_struct("Readiness").field("state", &state).finish()
    }
}

impl<T> Readiness<T> {
    /// A readiness still loading
    pub fn new() -> Self {
        Self::default()
    }

    /// A readiness already resolved to `result`
    pub fn resolved(result: Result<Arc<T>>) -> Self {
        let state = match result {
            Ok(value) => State::Ready(value),
            Err(err) => State::Failed(err),
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), State::Ready(_))
    }

    /// True once ready or failed
    pub fn is_resolved(&self) -> bool {
        !matches!(&*self.lock(), State::Loading(_))
    }

    /// The ready value, if any
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            State::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// The load error, if loading failed
    pub fn error(&self) -> Option<Error> {
        match &*self.lock() {
            State::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Listeners waiting for resolution
    pub fn pending(&self) -> usize {
        match &*self.lock() {
            State::Loading(listeners) => listeners.len(),
            _ => 0,
        }
    }

    /// Runs `listener` once resolved; immediately if already resolved.
    pub fn on_ready<F>(&self, listener: F)
    where
        F: FnOnce(Result<Arc<T>>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.lock();
            match &mut *state {
                State::Loading(listeners) => {
                    listeners.push(Box::new(listener));
                    return;
                }
                State::Ready(value) => Ok(Arc::clone(value)),
                State::Failed(err) => Err(err.clone()),
            }
        };
        listener(outcome);
    }

    /// Resolves the state and replays the queued listeners in order.
    ///
    /// Returns false, leaving the state untouched, when already resolved.
    pub fn resolve(&self, result: Result<Arc<T>>) -> bool {
        let listeners = {
            let mut state = self.lock();
            let State::Loading(listeners) = &mut *state else {
                return false;
            };
            let listeners = std::mem::take(listeners);
            *state = match &result {
                Ok(value) => State::Ready(Arc::clone(value)),
                Err(err) => State::Failed(err.clone()),
            };
            listeners
        };
        for listener in listeners {
            listener(result.clone());
        }
        true
    }

    /// Waits for resolution
    pub async fn wait(&self) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.on_ready(move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .unwrap_or_else(|_| Err(Error::Load(LoadError::Abandoned)))
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
