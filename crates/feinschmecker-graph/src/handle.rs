use crate::graph::{GraphError, KnowledgeGraph};
use crate::loader::{load_recipes_from_json, LoadStats};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use feinschmecker_core::{FeinschmeckerError, KnowledgeStore, ReloadEvent, ReloadListener, Result};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

impl From<GraphError> for FeinschmeckerError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Io(e) => FeinschmeckerError::Io(e),
            GraphError::Json(e) => FeinschmeckerError::Serialization(e),
            other @ GraphError::InvalidDocument { .. } => {
                FeinschmeckerError::DataIntegrity(other.to_string())
            }
            other => FeinschmeckerError::Internal(other.to_string()),
        }
    }
}

/// An immutable, fully loaded graph together with the generation it was published as.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    loaded_at: DateTime<Utc>,
    graph: KnowledgeGraph,
}

impl Snapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn store(&self) -> &dyn KnowledgeStore {
        &self.graph
    }
}

/// Owner of the current knowledge graph.
///
/// Readers take a snapshot and keep it for the whole query, so a concurrent reload never
/// exposes a partially built graph. Reloads are serialized and bump the generation by one.
pub struct StoreHandle {
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    reload_lock: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn ReloadListener>>>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::empty()
    }
}

impl StoreHandle {
    /// A handle with no graph published yet. Every read fails with `NotReady` until the
    /// first [`reload`](Self::reload).
    pub fn empty() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn with_graph(graph: KnowledgeGraph) -> Self {
        let handle = Self::empty();
        handle.reload(graph);
        handle
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.current
            .load_full()
            .ok_or_else(|| FeinschmeckerError::NotReady("knowledge store has not been loaded".into()))
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// Last published generation, 0 before the first load.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, listener: Arc<dyn ReloadListener>) {
        self.listeners.write().push(listener);
    }

    /// Publishes `graph` as the new current snapshot and notifies listeners after the swap.
    pub fn reload(&self, graph: KnowledgeGraph) -> u64 {
        let _guard = self.reload_lock.lock();
        let generation = self.generation.load(Ordering::Acquire) + 1;
        let node_count = graph.node_count();
        self.current.store(Some(Arc::new(Snapshot {
            generation,
            loaded_at: Utc::now(),
            graph,
        })));
        self.generation.store(generation, Ordering::Release);

        let event = ReloadEvent {
            generation,
            node_count,
        };
        for listener in self.listeners.read().iter() {
            listener.on_reload(&event);
        }
        info!(generation, node_count, "Knowledge store reloaded");
        generation
    }

    /// Loads a recipe JSON file and publishes it. On failure the current snapshot stays.
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<(u64, LoadStats)> {
        let path = path.as_ref();
        match load_recipes_from_json(path) {
            Ok((graph, stats)) => Ok((self.reload(graph), stats)),
            Err(e) => {
                warn!("Failed to load recipes from {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }
}
