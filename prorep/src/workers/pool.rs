use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{ErrorKind, ProrepResult};
use crate::prorep_error;

/// Bounded pool running units of work on the tokio runtime.
///
/// At most `size` units run at once; [`WorkerPool::dispatch`] waits for a free slot before
/// spawning. Results are only collected by [`WorkerPool::wait_all`], which waits for every
/// dispatched unit.
pub struct WorkerPool<T> {
    join_set: JoinSet<ProrepResult<T>>,
    permits: Arc<Semaphore>,
    failed: Arc<AtomicBool>,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a pool running up to `size` units concurrently. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);

        Self {
            join_set: JoinSet::new(),
            permits: Arc::new(Semaphore::new(size)),
            failed: Arc::new(AtomicBool::new(false)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns whether any finished unit has failed or panicked so far.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Spawns `unit` once a slot is free.
    pub async fn dispatch<F>(&mut self, unit: F) -> ProrepResult<()>
    where
        F: Future<Output = ProrepResult<T>> + Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.map_err(|err| {
            prorep_error!(
                ErrorKind::InvalidState,
                "Worker pool is closed",
                source: err
            )
        })?;

        let failed = self.failed.clone();
        self.join_set.spawn(async move {
            let result = match AssertUnwindSafe(unit).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(prorep_error!(
                    ErrorKind::WorkerPanic,
                    "Worker panicked",
                    panic_message(panic.as_ref())
                )),
            };
            if result.is_err() {
                failed.store(true, Ordering::Release);
            }
            drop(permit);

            result
        });
        debug!(in_flight = self.join_set.len(), "dispatched unit to worker pool");

        Ok(())
    }

    /// Waits for every dispatched unit and returns their results.
    ///
    /// If any unit failed or panicked, the errors of all failed units are aggregated into one
    /// error.
    pub async fn wait_all(mut self) -> ProrepResult<Vec<T>> {
        let mut outputs = Vec::with_capacity(self.join_set.len());
        let mut errors = Vec::new();

        while let Some(result) = self.join_set.join_next().await {
            match result {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(err)) => {
                    error!(error = %err, "worker completed with error");
                    errors.push(err);
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("worker task was cancelled");
                    } else {
                        errors.push(prorep_error!(
                            ErrorKind::WorkerPanic,
                            "Worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(outputs)
        } else {
            Err(errors.into())
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::bail;

    #[tokio::test]
    async fn collects_every_output() {
        let mut pool = WorkerPool::new(2);
        for value in 0..5 {
            pool.dispatch(async move { Ok(value) }).await.unwrap();
        }

        let mut outputs = pool.wait_all().await.unwrap();
        outputs.sort();

        assert_eq!(outputs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn never_exceeds_its_size() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(2);

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            pool.dispatch(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }
        pool.wait_all().await.unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failures_are_aggregated() {
        let mut pool = WorkerPool::new(3);
        pool.dispatch(async { Ok(1) }).await.unwrap();
        pool.dispatch(async {
            bail!(ErrorKind::DestinationQueryFailed, "first failure");
        })
        .await
        .unwrap();
        pool.dispatch(async {
            bail!(ErrorKind::ConversionError, "second failure");
        })
        .await
        .unwrap();

        let err = pool.wait_all().await.unwrap_err();

        assert_eq!(err.errors().map(<[_]>::len), Some(2));
    }

    #[tokio::test]
    async fn failure_flag_is_raised() {
        let mut pool = WorkerPool::<()>::new(1);
        pool.dispatch(async {
            bail!(ErrorKind::DestinationQueryFailed, "failure");
        })
        .await
        .unwrap();
        // The single slot is released only once the failing unit finished.
        pool.dispatch(async { Ok(()) }).await.unwrap();

        assert!(pool.has_failed());
        assert!(pool.wait_all().await.is_err());
    }

    #[tokio::test]
    async fn panics_raise_the_failure_flag() {
        let mut pool = WorkerPool::<()>::new(1);
        pool.dispatch(async { panic!("boom") }).await.unwrap();
        pool.dispatch(async { Ok(()) }).await.unwrap();

        assert!(pool.has_failed());
        assert_eq!(pool.wait_all().await.unwrap_err().kind(), ErrorKind::WorkerPanic);
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let mut pool = WorkerPool::<()>::new(1);
        pool.dispatch(async { panic!("boom") }).await.unwrap();

        let err = pool.wait_all().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }
}
