//! Per-parent-id debounce for inverse-link re-matching (spec §4.4 "A small
//! debounce (single-digit milliseconds) coalesces bursts"). A generation
//! counter per id lets a superseded timer discover it has nothing left to do
//! instead of needing a cancellation handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

/// Coalesces repeated triggers for the same id within `delay` into a single
/// firing of the eventual callback.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    generations: Arc<Mutex<HashMap<Uuid, u64>>>,
}

impl Debouncer {
    /// Coalesce bursts within `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay, generations: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Trigger a debounced firing for `id`. If re-triggered again within
    /// `delay`, only the last trigger's spawned task actually invokes `on_fire`.
    pub fn trigger<F, Fut>(&self, id: Uuid, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let generation = {
            let mut generations = self.generations.lock().expect("debounce map poisoned");
            let next = generations.get(&id).copied().unwrap_or(0) + 1;
            generations.insert(id, next);
            next
        };

        let delay = self.delay;
        let generations = Arc::clone(&self.generations);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_current = {
                let generations = generations.lock().expect("debounce map poisoned");
                generations.get(&id).copied() == Some(generation)
            };
            if still_current {
                on_fire().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[tokio::test]
    async fn coalesces_rapid_retriggers_into_one_fire() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let count = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        for _ in 0..5 {
            let count = Arc::clone(&count);
            debouncer.trigger(id, move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn separate_ids_fire_independently() {
        let debouncer = Debouncer::new(Duration::from_millis(10));
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            debouncer.trigger(Uuid::new_v4(), move || async move {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
