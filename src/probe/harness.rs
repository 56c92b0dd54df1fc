use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

/// Outcomes of one harness invocation, keyed by probe key.
pub type ProbeResultSet<O> = HashMap<String, O>;

/// Runs `probe` once for every target, each on its own task, and returns once
/// all of them have reported.
///
/// Every outcome is stored under `key(&target)` in a result set guarded by a
/// single lock that is only held for the insert. With `concurrency` set, at
/// most that many probes are in flight at a time; `None` spawns everything at
/// once.
pub async fn run_probes<T, O, K, F, Fut>(
    targets: Vec<T>,
    key: K,
    probe: F,
    concurrency: Option<usize>,
) -> ProbeResultSet<O>
where
    T: Send + 'static,
    O: Send + 'static,
    K: Fn(&T) -> String,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = O> + Send + 'static,
{
    if targets.is_empty() {
        return HashMap::new();
    }

    let results = Arc::new(Mutex::new(HashMap::with_capacity(targets.len())));
    let probe = Arc::new(probe);
    let limiter = concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        let key = key(&target);
        let results = results.clone();
        let probe = probe.clone();
        let limiter = limiter.clone();

        let handle = tokio::spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let outcome = probe(target).await;
            results.lock().await.insert(key, outcome);
        });
        handles.push(handle);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            log::error!("Probe task failed to complete: {}", e);
        }
    }

    std::mem::take(&mut *results.lock().await)
}
