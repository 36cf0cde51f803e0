use crate::compiler::{compile, compile_lookup};
use crate::executor::PlanExecutor;
use crate::pagination::paginate;
use crate::response::{QueryResponse, SearchReply};
use crate::shaper::{shape_rows, RecipeRecord};
use chrono::{DateTime, Utc};
use feinschmecker_cache::{
    canonical_key, CacheStats, InMemoryResponseCache, ReloadInvalidator, ResponseCache,
};
use feinschmecker_core::{
    FilterValidator, KnowledgeStore, NodeLabel, QuerySettings, RawParams, Result, ValidatedQuery,
};
use feinschmecker_graph::{Snapshot, StoreHandle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Summary of the currently published knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub recipe_count: usize,
    pub ingredient_count: usize,
}

/// Synchronous recipe search: validation, compilation, execution, shaping, pagination and
/// response caching over a shared [`StoreHandle`].
pub struct RecipeSearchEngine {
    store: Arc<StoreHandle>,
    validator: FilterValidator,
    cache: Arc<dyn ResponseCache<QueryResponse>>,
}

impl RecipeSearchEngine {
    pub fn new(store: Arc<StoreHandle>, settings: QuerySettings) -> Self {
        Self::with_cache(
            store,
            settings,
            Arc::new(InMemoryResponseCache::<QueryResponse>::new()),
        )
    }

    /// Uses `cache` for responses and registers it for invalidation on store reloads.
    pub fn with_cache(
        store: Arc<StoreHandle>,
        settings: QuerySettings,
        cache: Arc<dyn ResponseCache<QueryResponse>>,
    ) -> Self {
        store.subscribe(Arc::new(ReloadInvalidator::<QueryResponse, _>::new(
            cache.clone(),
        )));
        Self {
            store,
            validator: FilterValidator::new(settings),
            cache,
        }
    }

    pub fn store(&self) -> &Arc<StoreHandle> {
        &self.store
    }

    pub fn validator(&self) -> &FilterValidator {
        &self.validator
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Validates raw parameters and runs the search, serving repeated parameter sets from
    /// the response cache.
    pub fn search(&self, raw: &RawParams) -> Result<QueryResponse> {
        let query = self.validator.validate(raw)?;
        let snapshot = self.store.snapshot()?;
        let key = canonical_key(raw);

        if let Some(hit) = self.cache.get(&key, snapshot.generation()) {
            debug!(key = %key, "Serving search from cache");
            return Ok(hit);
        }

        let response = self.run(&snapshot, &query)?;
        self.cache.put(key, response.clone(), snapshot.generation());
        Ok(response)
    }

    /// Runs an already validated query without consulting the cache.
    pub fn search_validated(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
        let snapshot = self.store.snapshot()?;
        self.run(&snapshot, query)
    }

    /// Like [`search`](Self::search) but always returns one of the two public envelopes.
    pub fn respond(&self, raw: &RawParams) -> SearchReply {
        self.search(raw).into()
    }

    /// Shaped record of a single recipe by its stable identity.
    pub fn recipe(&self, slug: &str) -> Result<Option<RecipeRecord>> {
        let snapshot = self.store.snapshot()?;
        let rows = PlanExecutor::new(snapshot.store()).execute(&compile_lookup(slug))?;
        Ok(shape_rows(&rows)?.into_iter().next())
    }

    pub fn store_info(&self) -> Result<StoreInfo> {
        let snapshot = self.store.snapshot()?;
        let graph = snapshot.graph();
        Ok(StoreInfo {
            generation: snapshot.generation(),
            loaded_at: snapshot.loaded_at(),
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            recipe_count: graph.count(NodeLabel::Recipe),
            ingredient_count: graph.count(NodeLabel::Ingredient),
        })
    }

    fn run(&self, snapshot: &Snapshot, query: &ValidatedQuery) -> Result<QueryResponse> {
        let start = Instant::now();
        let plan = compile(&query.filters);
        let rows = PlanExecutor::new(snapshot.store()).execute(&plan)?;
        let records = shape_rows(&rows)?;
        let response = QueryResponse::from(paginate(records, query.page));

        let elapsed = start.elapsed();
        metrics::counter!("recipe_searches").increment(1);
        metrics::histogram!("recipe_search_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            total = response.meta.total,
            page = response.meta.page,
            returned = response.data.len(),
            generation = snapshot.generation(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Recipe search completed"
        );
        Ok(response)
    }
}
