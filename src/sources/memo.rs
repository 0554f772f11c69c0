use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::error::OrthoError;

/// Keyed single-flight cache for immutable upstream listings.
///
/// Concurrent callers asking for the same key share one fetch; failures are
/// not cached, so the next caller retries.
pub struct Memo<V> {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<V>>>>>,
}

impl<V> Default for Memo<V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Memo<V> {
    pub async fn get_or_try_init<F, Fut>(&self, key: &str, init: F) -> Result<Arc<V>, OrthoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, OrthoError>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(key.to_string()).or_default())
        };
        let value = cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(value))
    }

    /// Drops the entry for `key`; callers still holding its value keep it.
    pub async fn forget(&self, key: &str) {
        self.cells.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn failures_are_retried() {
        let memo: Memo<usize> = Memo::default();
        let calls = AtomicUsize::new(0);

        let first = memo
            .get_or_try_init("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OrthoError::Http("down".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = memo
            .get_or_try_init("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();
        let third = memo
            .get_or_try_init("k", || async { Ok(9) })
            .await
            .unwrap();

        assert_eq!(*second, 7);
        assert_eq!(*third, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forgotten_keys_load_again() {
        let memo: Memo<usize> = Memo::default();
        memo.get_or_try_init("k", || async { Ok(1) }).await.unwrap();
        memo.forget("k").await;

        let value = memo.get_or_try_init("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(*value, 2);
    }
}
