//! Bounded pool for synchronous work (signing, key derivation)

use crate::wallets::{WalletError, WalletResult};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Run `f` on the blocking thread pool once a worker slot is free
    pub async fn run<T, F>(&self, f: F) -> WalletResult<T>
    where
        F: FnOnce() -> WalletResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| WalletError::Internal(format!("Worker pool closed: {}", e)))?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| WalletError::Internal(format!("Worker task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn returns_closure_result() {
        let pool = BlockingPool::new(2);
        assert_eq!(pool.run(|| Ok(21 * 2)).await.unwrap(), 42);

        let err = pool
            .run::<(), _>(|| Err(WalletError::Validation("bad key".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Validation(_)));
    }

    #[tokio::test]
    async fn never_exceeds_worker_count() {
        let pool = BlockingPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
