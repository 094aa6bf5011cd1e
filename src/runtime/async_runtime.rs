// File: src/runtime/async_runtime.rs
//
// Tokio runtime wrapper for the nexting-stack units.
// Units are spawned onto whatever runtime is already driving the caller;
// outside of one, a global lazily created runtime is used instead.

use once_cell::sync::Lazy;
use std::future::Future;
use std::io;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::errors::{ErrorCode, IckError};

/// Global tokio runtime instance, initialized lazily on first access
static RUNTIME: Lazy<io::Result<Runtime>> = Lazy::new(Runtime::new);

/// Async runtime wrapper providing task execution capabilities
pub struct AsyncRuntime;

impl AsyncRuntime {
    /// Get reference to the global tokio runtime
    pub fn runtime() -> Result<&'static Runtime, IckError> {
        RUNTIME
            .as_ref()
            .map_err(|e| IckError::io(ErrorCode::E778, format!("(no runtime: {})", e)))
    }

    /// Spawn a unit on the current runtime, or on the global one when
    /// called from plain synchronous code.
    pub fn spawn<F>(future: F) -> Result<JoinHandle<F::Output>, IckError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => Ok(handle.spawn(future)),
            Err(_) => Ok(Self::runtime()?.spawn(future)),
        }
    }

    /// Block the current thread until the future completes.
    /// Must not be called from inside a runtime.
    pub fn block_on<F>(future: F) -> Result<F::Output, IckError>
    where
        F: Future,
    {
        Ok(Self::runtime()?.block_on(future))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_block_on_simple() {
        let result = AsyncRuntime::block_on(async { 42 }).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_spawn_outside_runtime_uses_global() {
        let handle = AsyncRuntime::spawn(async { 7 }).unwrap();
        let result = AsyncRuntime::block_on(handle).unwrap();
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_spawn_inside_runtime_uses_current() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            handles.push(
                AsyncRuntime::spawn(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap(),
            );
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
