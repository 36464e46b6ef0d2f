//! Liveness token for async work started on behalf of a view.
//!
//! A catalog or payment request may resolve after the view that issued it
//! has gone away. Completions go through [`ViewScope::apply`], which drops
//! the mutation once the scope is closed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

#[derive(Clone, Debug)]
pub struct ViewScope {
    alive: Arc<AtomicBool>,
}

impl Default for ViewScope {
    fn default() -> Self { Self::new() }
}

impl ViewScope {
    pub fn new() -> Self {
        Self { alive: Arc::new(AtomicBool::new(true)) }
    }

    pub fn is_live(&self) -> bool { self.alive.load(Ordering::Acquire) }

    /// Marks the view as torn down. Every clone observes it.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Runs `mutate` only while the scope is live.
    pub fn apply<T: ?Sized, R>(&self, target: &mut T, mutate: impl FnOnce(&mut T) -> R) -> Option<R> {
        if !self.is_live() {
            debug!("dropping late completion for closed view");
            return None;
        }
        Some(mutate(target))
    }

    /// Awaits `work` and hands back its output only if the scope is still
    /// live when it resolves.
    pub async fn complete<F: Future>(&self, work: F) -> Option<F::Output> {
        let output = work.await;
        if self.is_live() { Some(output) } else {
            debug!("discarding response for closed view");
            None
        }
    }
}
