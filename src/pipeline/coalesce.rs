use crate::error::ImageApiError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type SharedRender<T> = Result<T, Arc<ImageApiError>>;

/// Registry of in-flight renders keyed by cache key.
///
/// Concurrent callers with the same key wait on a single render and share its
/// outcome. The entry is dropped once the render settles, so a later miss
/// renders again.
pub struct RenderCoalescer<T> {
    in_flight: Mutex<HashMap<String, Arc<OnceCell<SharedRender<T>>>>>,
}

impl<T> Default for RenderCoalescer<T> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> RenderCoalescer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: String, render: F) -> Result<T, ImageApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ImageApiError>>,
    {
        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };

        // If the initializing caller is dropped, the next waiter takes over.
        let result = cell
            .get_or_init(|| async { render().await.map_err(Arc::new) })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(current) = in_flight.get(&key)
                && Arc::ptr_eq(current, &cell)
            {
                in_flight.remove(&key);
            }
        }

        result.map_err(ImageApiError::Coalesced)
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
