//! Thread-pool helpers shared by the toolchain driver.

use std::num::NonZeroUsize;

use rayon::ThreadPoolBuilder;

use crate::error::{Error, Result};

/// Parallelism strategy for a batch of independent jobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// Run every job on the calling thread.
    Sequential,
    /// Use rayon's global pool.
    #[default]
    Global,
    /// Use a dedicated pool of `n` threads.
    Threads(NonZeroUsize),
}

impl Parallelism {
    /// Strategy for an optional thread count.
    ///
    /// - `None` → rayon's global pool
    /// - `Some(1)` → sequential
    /// - `Some(n)` → dedicated pool with `n` threads
    #[inline]
    pub fn from_threads(n_threads: Option<NonZeroUsize>) -> Self {
        match n_threads {
            None => Self::Global,
            Some(n) if n.get() == 1 => Self::Sequential,
            Some(n) => Self::Threads(n),
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn allows_parallel(self) -> bool {
        !matches!(self, Self::Sequential)
    }

    /// Cap the strategy by the number of jobs: one job never needs a pool.
    #[inline]
    pub fn correct_for_workload(self, n_jobs: usize) -> Self {
        match self {
            Self::Threads(n) if n_jobs <= 1 || n.get() <= 1 => Self::Sequential,
            Self::Threads(n) => NonZeroUsize::new(n.get().min(n_jobs))
                .map_or(Self::Sequential, Self::Threads),
            Self::Global if n_jobs <= 1 => Self::Sequential,
            other => other,
        }
    }
}

/// Run `f` under the given strategy.
///
/// A dedicated pool is built for [`Parallelism::Threads`]; the other
/// strategies run `f` directly. `f` receives whether it may fan out.
pub fn run_with_threads<T, F>(parallelism: Parallelism, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce(bool) -> T + Send,
{
    match parallelism {
        Parallelism::Sequential => Ok(f(false)),
        Parallelism::Global => Ok(f(true)),
        Parallelism::Threads(n) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n.get())
                .build()
                .map_err(|e| Error::engine(format!("failed to create thread pool: {e}")))?;
            Ok(pool.install(|| f(true)))
        }
    }
}
