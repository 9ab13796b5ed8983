//! Scoped resource execution.
//!
//! # Responsibilities
//! - Acquire a resource, run work against it on a pool, release it
//! - Release exactly once on success, failure, panic, saturation or timeout
//! - Report release failures without touching the primary result
//!
//! # Design Decisions
//! - The release action lives in the handle's `Drop`, so no exit path can skip it
//! - The handle moves into the pool task; a timed-out caller stops waiting but
//!   the resource is only released once the abandoned work lets go of it

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::pool::WorkerPool;
use crate::resilience::with_deadline;
use crate::types::{BoxError, DispatchError, DispatchResult};

type ReleaseFn<R> = Box<dyn FnOnce(&mut R) -> Result<(), BoxError> + Send>;

/// An acquired resource paired with its release action.
pub struct ResourceHandle<R> {
    resource: R,
    release: Option<ReleaseFn<R>>,
}

impl<R> ResourceHandle<R> {
    pub fn new<F>(resource: R, release: F) -> Self
    where
        F: FnOnce(&mut R) -> Result<(), BoxError> + Send + 'static,
    {
        Self { resource, release: Some(Box::new(release)) }
    }

    fn release_now(&mut self) {
        let Some(release) = self.release.take() else { return };

        let resource = &mut self.resource;
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || release(resource)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("release action panicked".to_string()),
        };

        match failure {
            None => tracing::debug!("Resource released"),
            Some(reason) => {
                let err = DispatchError::ResourceCleanupFailed(reason);
                metrics::record_resource_cleanup_failure();
                tracing::warn!(error = %err, "Resource release failed");
            }
        }
    }
}

impl<R> Deref for ResourceHandle<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R> DerefMut for ResourceHandle<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R> Drop for ResourceHandle<R> {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for ResourceHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("resource", &self.resource)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Runs work against scoped resources on one pool.
#[derive(Debug, Clone)]
pub struct ScopedExecutor {
    pool: Arc<WorkerPool>,
    deadline: Option<Duration>,
}

impl ScopedExecutor {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool, deadline: None }
    }

    /// Stop waiting after `deadline`; release still follows the work.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub async fn run<Res, T, A, AFut, U, UFut, Rel>(
        &self,
        acquire: A,
        use_fn: U,
        release: Rel,
    ) -> DispatchResult<T>
    where
        A: FnOnce() -> AFut,
        AFut: Future<Output = Result<Res, BoxError>>,
        U: FnOnce(ResourceHandle<Res>) -> UFut + Send + 'static,
        UFut: Future<Output = Result<T, BoxError>> + Send + 'static,
        Rel: FnOnce(&mut Res) -> Result<(), BoxError> + Send + 'static,
        Res: Send + 'static,
        T: Send + 'static,
    {
        let resource = acquire().await.map_err(DispatchError::ResourceAcquisition)?;
        let handle = ResourceHandle::new(resource, release);

        let task = self.pool.submit(move || use_fn(handle))?;
        match self.deadline {
            Some(deadline) => with_deadline(deadline, task).await,
            None => task.await,
        }
    }
}
