//! Shared thread pool for the batched Fourier transforms.
//!
//! The pool is the crate's only parallelism; each batch slice is transformed
//! independently, so the thread count is a throughput knob and never changes
//! numerical results.

#[cfg(feature = "parallel")]
use rayon::ThreadPool;

#[cfg(feature = "parallel")]
use std::sync::OnceLock;

#[cfg(feature = "parallel")]
static THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();

#[cfg(feature = "parallel")]
static THREAD_COUNT: OnceLock<usize> = OnceLock::new();

/// Set the number of FFT worker threads (0 = one per logical CPU).
///
/// Takes effect only before the first parallel operation; returns whether the
/// setting was applied.
#[cfg(feature = "parallel")]
pub fn configure_threads(n: usize) -> bool {
    THREAD_COUNT.set(n).is_ok()
}

/// Serial build: there is no pool to configure.
#[cfg(not(feature = "parallel"))]
pub fn configure_threads(_n: usize) -> bool {
    false
}

#[cfg(feature = "parallel")]
fn get_thread_pool() -> &'static ThreadPool {
    THREAD_POOL.get_or_init(|| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(*THREAD_COUNT.get().unwrap_or(&0))
            .build()
            .expect("Failed to build FFT thread pool")
    })
}

/// Run `op` inside the shared pool (or directly in serial builds).
#[cfg(feature = "parallel")]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R + Send,
    R: Send,
{
    get_thread_pool().install(op)
}

/// Run `op` directly; the crate was built without the `parallel` feature.
#[cfg(not(feature = "parallel"))]
pub fn install<OP, R>(op: OP) -> R
where
    OP: FnOnce() -> R,
{
    op()
}
