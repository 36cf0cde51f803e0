use crate::ResponseCache;
use feinschmecker_core::{ReloadEvent, ReloadListener};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

/// Clears a response cache whenever the knowledge store publishes a new generation.
pub struct ReloadInvalidator<V, C: ResponseCache<V> + ?Sized> {
    cache: Arc<C>,
    _value: PhantomData<fn() -> V>,
}

impl<V, C: ResponseCache<V> + ?Sized> ReloadInvalidator<V, C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self {
            cache,
            _value: PhantomData,
        }
    }
}

impl<V, C: ResponseCache<V> + ?Sized> ReloadListener for ReloadInvalidator<V, C> {
    fn on_reload(&self, event: &ReloadEvent) {
        let dropped = self.cache.len();
        self.cache.clear_all(event.generation);
        info!(
            generation = event.generation,
            dropped, "Invalidated response cache after store reload"
        );
    }
}
