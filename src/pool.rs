use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{
    executor::{
        block_on,
        ThreadPool,
    },
    future::{
        FutureExt,
        RemoteHandle,
    },
    task::SpawnExt,
};
use indicatif::ProgressBar;

pub(crate) fn create(threads: Option<usize>) -> anyhow::Result<ThreadPool> {
    let mut builder = ThreadPool::builder();
    if let Some(threads) = threads {
        anyhow::ensure!(threads > 0, "Thread count must be positive");
        builder.pool_size(threads);
    }
    builder.name_prefix("labelgest-worker-");

    Ok(builder.create()?)
}

/// Apply `f` to every item on the pool, reporting completions on a progress
/// bar, and return the results in the order of `items`.
///
/// Every item is submitted before any result is collected. Results are then
/// retrieved in submission order, and the first `Err` met this way is
/// returned as is: later results are not retrieved, and tasks still in flight
/// are left to run to completion. A panic in `f` resumes on the calling
/// thread once its handle is reached, with the same guarantee for the rest.
pub(crate) fn map_progress<T, V, F>(pool: &ThreadPool, items: Vec<T>, f: F) -> anyhow::Result<Vec<V>>
where
    T: Send + 'static,
    V: Send + 'static,
    F: Fn(T) -> anyhow::Result<V> + Send + Sync + 'static,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let pbar = crate::default_progress_bar(items.len() as u64);
    map_with_bar(pool, items, f, &pbar)
}

fn map_with_bar<T, V, F>(pool: &ThreadPool, items: Vec<T>, f: F, pbar: &ProgressBar) -> anyhow::Result<Vec<V>>
where
    T: Send + 'static,
    V: Send + 'static,
    F: Fn(T) -> anyhow::Result<V> + Send + Sync + 'static,
{
    let f = Arc::new(f);

    let mut all_jobs: Vec<RemoteHandle<std::thread::Result<anyhow::Result<V>>>> =
        Vec::with_capacity(items.len());

    for item in items {
        let f = f.clone();
        let pbar = pbar.clone();
        let job = AssertUnwindSafe(async move { f(item) })
            .catch_unwind()
            .inspect(move |_| pbar.inc(1));
        all_jobs.push(pool.spawn_with_handle(job)?);
    }

    let mut results = Vec::with_capacity(all_jobs.len());
    let mut all_jobs = all_jobs.into_iter();

    while let Some(job) = all_jobs.next() {
        match block_on(job) {
            Ok(Ok(value)) => results.push(value),
            Ok(Err(e)) => {
                detach(all_jobs, pbar);
                return Err(e);
            }
            Err(panic) => {
                detach(all_jobs, pbar);
                std::panic::resume_unwind(panic);
            }
        }
    }

    pbar.finish();
    Ok(results)
}

/// Let the remaining tasks run on without anyone waiting for them.
fn detach<V>(rest: impl Iterator<Item = RemoteHandle<V>>, pbar: &ProgressBar) {
    // Dropping a `RemoteHandle` cancels its task.
    rest.for_each(RemoteHandle::forget);
    pbar.abandon();
}
