//! Isolated single-request executor.
//!
//! The host calls the bridge synchronously and expects a synchronous return,
//! yet everything behind the bridge is async. Each proxied request therefore
//! gets its own current-thread tokio runtime: the entry call blocks on it
//! until status and headers are known, and the response body keeps driving
//! the same runtime as it is pulled, which is what lets the application task
//! keep producing chunks after the entry call has returned.
//!
//! Hosts sometimes already run inside a tokio runtime. Blocking on a second
//! runtime from such a thread panics, so on the first nested call the
//! executor starts one driver thread that lives as long as it does. Nested
//! callers queue their future on that thread and wait; it blocks on the
//! runtime for the length of each call and sits idle in between. Nothing
//! process-wide is patched.

use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, mpsc};
use std::thread::{self, JoinHandle};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

/// Work handed to the driver thread: one `block_on` on the runtime.
type Job = Box<dyn FnOnce(&Runtime) + Send>;

/// A dedicated scheduler for one proxied request.
///
/// Shared as `Arc<Executor>` between the proxy call and the streamed response
/// body. Dropping the last handle shuts the runtime down, cancelling whatever
/// the application was still doing.
pub struct Executor {
    // `Option` only so that `Drop` can pick the shutdown strategy.
    runtime: Option<Arc<Runtime>>,
    driver: OnceLock<Driver>,
}

/// The thread that blocks on the runtime for nested callers.
///
/// It only drives the runtime while a job is running, so the application
/// makes progress exactly when someone is waiting on it.
struct Driver {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime: Some(Arc::new(runtime)), driver: OnceLock::new() })
    }

    /// Drives `fut` to completion on this executor, blocking the caller.
    pub fn block_on<F>(&self, fut: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            unreachable!("runtime is only taken while dropping");
        };

        if self.driver.get().is_none() && Handle::try_current().is_err() {
            return runtime.block_on(fut);
        }

        // Nested inside a caller's runtime: the driver thread blocks on ours,
        // this thread only waits for the outcome.
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |runtime: &Runtime| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(fut)));
            let _ = done_tx.send(outcome);
        });

        let driver = self.driver.get_or_init(|| Driver::start(Arc::clone(runtime)));
        if let Err(job) = driver.submit(job) {
            thread::scope(|scope| {
                let _ = scope.spawn(|| job(&**runtime)).join();
            });
        }

        match done_rx.recv() {
            Ok(Ok(output)) => output,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => unreachable!("every job reports its outcome"),
        }
    }
}

impl Driver {
    fn start(runtime: Arc<Runtime>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let spawned = thread::Builder::new()
            .name("fnbridge-executor".into())
            .spawn(move || {
                for job in jobs_rx {
                    job(&*runtime);
                }
            });

        match spawned {
            Ok(thread) => {
                debug!("executor driver thread started");
                Self { jobs: Mutex::new(Some(jobs_tx)), thread: Mutex::new(Some(thread)) }
            }
            Err(e) => {
                warn!(error = %e, "failed to start executor driver thread, using scoped threads");
                Self { jobs: Mutex::new(None), thread: Mutex::new(None) }
            }
        }
    }

    /// Queues `job`, or hands it back when there is no driver to run it.
    fn submit(&self, job: Job) -> Result<(), Job> {
        let Ok(jobs) = self.jobs.lock() else {
            return Err(job);
        };
        match jobs.as_ref() {
            Some(jobs) => jobs.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    fn stop(&self) {
        // Closing the queue ends the driver loop.
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
        if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
            let _ = thread.join();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get() {
            driver.stop();
        }
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        // Unique once the driver has been joined.
        if let Ok(runtime) = Arc::try_unwrap(runtime) {
            // A runtime may not block while being dropped from async code.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn explode(really: bool) -> u8 {
        if really {
            panic!("inside");
        }
        0
    }

    #[test]
    fn drives_spawned_tasks() {
        let executor = Executor::new().unwrap();
        let out = executor.block_on(async {
            tokio::spawn(async { 21 * 2 }).await.unwrap()
        });
        assert_eq!(out, 42);
    }

    #[test]
    fn tasks_survive_between_block_on_calls() {
        let executor = Executor::new().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        executor.block_on(async move {
            tokio::spawn(async move {
                for i in 0..3 {
                    tx.send(i).unwrap();
                    tokio::task::yield_now().await;
                }
            });
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut seen = Vec::new();
        loop {
            let rx = Arc::clone(&rx);
            match executor.block_on(async move { rx.lock().await.recv().await }) {
                Some(i) => seen.push(i),
                None => break,
            }
        }
        assert_eq!(seen, [0, 1, 2]);
    }

    #[tokio::test]
    async fn nested_inside_another_runtime() {
        let executor = Executor::new().unwrap();
        let out = executor.block_on(async { "inner" });
        assert_eq!(out, "inner");
        // Dropping here, inside the test runtime, must not panic.
        drop(executor);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_calls_share_one_driver_thread() {
        let executor = Executor::new().unwrap();
        let threads: HashSet<_> = (0..20)
            .map(|_| executor.block_on(async { thread::current().id() }))
            .collect();
        assert_eq!(threads.len(), 1);
        assert!(!threads.contains(&thread::current().id()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_driver_idles_between_calls() {
        let executor = Executor::new().unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        executor.block_on(async move {
            tokio::spawn(async move {
                loop {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            });
        });

        let before = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_panics_propagate_to_the_caller() {
        let executor = Executor::new().unwrap();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            executor.block_on(async { explode(true) })
        }));
        assert!(caught.is_err());
        // The driver survives a panicking call.
        assert_eq!(executor.block_on(async { 7 }), 7);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_drop_cancels_pending_tasks() {
        struct Released(std::sync::mpsc::Sender<()>);
        impl Drop for Released {
            fn drop(&mut self) {
                let _ = self.0.send(());
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let executor = Executor::new().unwrap();
        executor.block_on(async move {
            tokio::spawn(async move {
                let _guard = Released(tx);
                std::future::pending::<()>().await;
            });
            tokio::task::yield_now().await;
        });
        drop(executor);
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn panics_propagate_to_the_caller() {
        let executor = Executor::new().unwrap();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            executor.block_on(async { explode(true) })
        }));
        assert!(caught.is_err());
    }
}
