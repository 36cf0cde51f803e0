use async_trait::async_trait;
use feinschmecker_core::{
    FeinschmeckerError, FilterSet, NodeLabel, Nutrient, PageRequest, Property, QuerySettings,
    Relation, Result, ValidatedQuery,
};
use feinschmecker_graph::{
    load_documents, IngredientLine, KnowledgeGraph, NutrientFacts, RecipeDocument, StoreHandle,
};
use feinschmecker_query::{PageMeta, QueryResponse, RecipeSearchEngine};
use feinschmecker_queue::{
    EngineExecutor, FailureKind, Priority, QueueError, RetryPolicy, SearchExecutor, TaskQueue,
    TaskRunner, TaskState, TaskTransport,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Fails with a transient error a fixed number of times, then succeeds.
struct Flaky {
    failures: u32,
    calls: Mutex<Vec<Instant>>,
}

impl Flaky {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: Mutex::new(Vec::new()),
        })
    }
}

fn empty_response(query: &ValidatedQuery) -> QueryResponse {
    QueryResponse {
        data: Vec::new(),
        meta: PageMeta {
            total: 0,
            page: query.page.page,
            per_page: query.page.per_page,
            total_pages: 0,
        },
    }
}

#[async_trait]
impl SearchExecutor for Flaky {
    async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
        let attempt = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len() as u32
        };
        if attempt <= self.failures {
            return Err(FeinschmeckerError::Connection("store connection reset".into()));
        }
        Ok(empty_response(query))
    }
}

struct Hangs;

#[async_trait]
impl SearchExecutor for Hangs {
    async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(empty_response(query))
    }
}

struct Broken;

#[async_trait]
impl SearchExecutor for Broken {
    async fn execute(&self, _query: &ValidatedQuery) -> Result<QueryResponse> {
        Err(FeinschmeckerError::Compile("unbound variable ?recipe".into()))
    }
}

/// Records the page number of every executed query, so tests can see execution order.
#[derive(Default)]
struct Recorder {
    pages: Mutex<Vec<u32>>,
}

#[async_trait]
impl SearchExecutor for Recorder {
    async fn execute(&self, query: &ValidatedQuery) -> Result<QueryResponse> {
        self.pages.lock().push(query.page.page);
        Ok(empty_response(query))
    }
}

fn query(page: u32) -> ValidatedQuery {
    ValidatedQuery {
        filters: FilterSet {
            vegan: Some(true),
            ..FilterSet::default()
        },
        page: PageRequest::new(page, 20),
    }
}

fn queue_with(executor: Arc<dyn SearchExecutor>, policy: RetryPolicy) -> Arc<TaskQueue> {
    TaskQueue::new(TaskRunner::new(executor, policy), 64)
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_succeed() {
    let executor = Flaky::new(3);
    let queue = queue_with(executor.clone(), RetryPolicy::default());
    queue.start(1);

    let id = queue.submit(query(1), Priority::Normal).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Succeeded);
    assert_eq!(record.retries, 3);
    assert_eq!(record.attempts, 4);
    assert!(record.result.is_some());
    assert!(record.error.is_none());

    let calls = executor.calls.lock().clone();
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.len(), 3);
    for (gap, expected) in gaps.iter().zip([2, 4, 8]) {
        let expected = Duration::from_secs(expected);
        assert!(*gap >= expected, "gap {:?} shorter than {:?}", gap, expected);
        assert!(*gap < expected + Duration::from_millis(50));
    }
    queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let executor = Flaky::new(4);
    let queue = queue_with(executor.clone(), RetryPolicy::default());
    queue.start(1);

    let id = queue.submit(query(1), Priority::Normal).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Failed);
    assert_eq!(record.retries, 3);
    assert_eq!(record.attempts, 4);
    assert_eq!(record.error.unwrap().kind, FailureKind::RetryExhausted);
    assert_eq!(executor.calls.lock().len(), 4);
    queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_execution_budget_aborts_without_retry() {
    let policy = RetryPolicy {
        execution_budget: Duration::from_secs(30),
        ..RetryPolicy::default()
    };
    let queue = queue_with(Arc::new(Hangs), policy);
    queue.start(1);

    let started = Instant::now();
    let id = queue.submit(query(1), Priority::High).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.retries, 0);
    assert_eq!(record.error.unwrap().kind, FailureKind::TimeoutAbort);
    assert!(started.elapsed() < Duration::from_secs(60));
    queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_fails_immediately() {
    let queue = queue_with(Arc::new(Broken), RetryPolicy::default());
    queue.start(2);

    let started = Instant::now();
    let id = queue.submit(query(1), Priority::Normal).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Failed);
    assert_eq!(record.attempts, 1);
    let failure = record.error.unwrap();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert!(failure.message.contains("unbound variable"));
    assert!(started.elapsed() < Duration::from_secs(1));
    queue.shutdown();
}

#[tokio::test]
async fn test_higher_priority_runs_first_and_ties_keep_submission_order() {
    let executor = Arc::new(Recorder::default());
    let queue = queue_with(executor.clone(), RetryPolicy::default());

    let mut ids = Vec::new();
    for (page, priority) in [
        (1, Priority::Low),
        (2, Priority::Normal),
        (3, Priority::Critical),
        (4, Priority::Normal),
        (5, Priority::High),
    ] {
        ids.push(queue.submit(query(page), priority).await.unwrap());
    }
    assert_eq!(queue.queue_size().await, 5);

    queue.start(1);
    for id in ids {
        let record = queue.wait(id).await.unwrap();
        assert_eq!(record.state, TaskState::Succeeded);
    }

    assert_eq!(*executor.pages.lock(), vec![3, 5, 2, 4, 1]);
    assert_eq!(queue.queue_size().await, 0);
    queue.shutdown();
}

#[tokio::test]
async fn test_pending_task_can_be_polled() {
    let queue = queue_with(Arc::new(Recorder::default()), RetryPolicy::default());
    let id = queue.submit(query(3), Priority::Low).await.unwrap();

    let record = queue.poll(id).unwrap();
    assert_eq!(record.state, TaskState::Pending);
    assert_eq!(record.attempts, 0);
    assert_eq!(record.payload.page.page, 3);

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["state"], "PENDING");
}

#[tokio::test]
async fn test_unknown_task_is_reported() {
    let queue = queue_with(Arc::new(Recorder::default()), RetryPolicy::default());
    let missing = Uuid::new_v4();

    assert!(matches!(queue.poll(missing), Err(QueueError::TaskNotFound(id)) if id == missing));
    assert!(matches!(queue.wait(missing).await, Err(QueueError::TaskNotFound(_))));
}

#[tokio::test]
async fn test_full_queue_rejects_submissions() {
    let queue = TaskQueue::new(
        TaskRunner::new(Arc::new(Recorder::default()), RetryPolicy::default()),
        2,
    );
    queue.submit(query(1), Priority::Normal).await.unwrap();
    queue.submit(query(2), Priority::Normal).await.unwrap();

    let err = queue.submit(query(3), Priority::Critical).await.unwrap_err();
    assert!(matches!(err, QueueError::Full(2)));
    assert_eq!(queue.queue_size().await, 2);
}

#[tokio::test]
async fn test_queue_works_behind_transport_trait() {
    let queue = queue_with(Arc::new(Recorder::default()), RetryPolicy::default());
    queue.start(1);
    let transport: Arc<dyn TaskTransport> = queue.clone();

    let id = transport.submit(query(4), Priority::High).await.unwrap();
    let record = transport.wait(id).await.unwrap();
    assert_eq!(record.state, TaskState::Succeeded);
    assert_eq!(transport.poll(id).unwrap().state, TaskState::Succeeded);
    queue.shutdown();
}

fn document(title: &str, vegan: bool) -> RecipeDocument {
    RecipeDocument {
        title: title.to_string(),
        instructions: vec!["Step 1 Chop.".to_string(), "Step 2 Serve.".to_string()],
        ingredients: vec![IngredientLine {
            id: "1 cucumber".to_string(),
            ingredient: "cucumber".to_string(),
            amount: None,
            unit: None,
        }],
        author: "Test Kitchen".to_string(),
        time: 15,
        meal_type: Some("Lunch".to_string()),
        vegan,
        vegetarian: true,
        nutrients: NutrientFacts {
            kcal: 120.0,
            protein: 4.0,
            fat: 2.0,
            carbs: 20.0,
        },
        source: None,
        image: None,
    }
}

/// `good` is complete, `broken` lacks its instructions.
fn graph_with_broken_recipe() -> KnowledgeGraph {
    let mut b = KnowledgeGraph::builder();
    let (time, _) = b.get_or_insert(NodeLabel::Time, "time_10");
    b.set_property(time, Property::AmountOfTime, 10i64).unwrap();
    let (difficulty, _) = b.get_or_insert(NodeLabel::Difficulty, "difficulty_1");
    b.set_property(difficulty, Property::NumericDifficulty, 1i64).unwrap();

    for (slug, instructions) in [("good", Some("Step 1 Season.")), ("broken", None)] {
        let recipe = b.insert_unique(NodeLabel::Recipe, slug).unwrap();
        b.set_property(recipe, Property::RecipeName, slug).unwrap();
        if let Some(text) = instructions {
            b.set_property(recipe, Property::Instructions, text).unwrap();
        }
        b.set_property(recipe, Property::IsVegan, true).unwrap();
        b.set_property(recipe, Property::IsVegetarian, true).unwrap();
        b.relate(recipe, Relation::RequiresTime, time).unwrap();
        b.relate(recipe, Relation::HasDifficulty, difficulty).unwrap();
        for nutrient in Nutrient::ALL {
            let (fact, _) = b.get_or_insert(nutrient.label(), nutrient.param());
            b.set_property(fact, nutrient.amount_property(), 10.0).unwrap();
            b.relate(recipe, nutrient.relation(), fact).unwrap();
        }
    }
    b.build()
}

fn engine_queue(store: StoreHandle) -> Arc<TaskQueue> {
    let engine = Arc::new(RecipeSearchEngine::new(
        Arc::new(store),
        QuerySettings::default(),
    ));
    queue_with(Arc::new(EngineExecutor::new(engine)), RetryPolicy::default())
}

#[tokio::test]
async fn test_engine_search_runs_in_background() {
    let docs = vec![
        document("Cucumber Salad", true),
        document("Tzatziki", false),
        document("Gazpacho", true),
    ];
    let (graph, _) = load_documents(&docs).unwrap();
    let queue = engine_queue(StoreHandle::with_graph(graph));
    queue.start(2);

    let id = queue.submit(query(1), Priority::High).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Succeeded);
    assert_eq!(record.attempts, 1);
    let response = record.result.unwrap();
    assert_eq!(response.meta.total, 2);
    assert_eq!(response.meta.per_page, 20);
    let names: Vec<_> = response.data.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Cucumber Salad", "Gazpacho"]);
    assert_eq!(response.data[0].instructions, vec!["Chop.", "Serve."]);
    queue.shutdown();
}

#[tokio::test]
async fn test_unloaded_store_fails_task_without_retry() {
    let queue = engine_queue(StoreHandle::empty());
    queue.start(1);

    let id = queue.submit(query(1), Priority::Normal).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Failed);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.retries, 0);
    assert!(record.result.is_none());
    assert_eq!(record.error.unwrap().kind, FailureKind::Permanent);
    queue.shutdown();
}

#[tokio::test]
async fn test_recipe_missing_mandatory_field_fails_task() {
    let queue = engine_queue(StoreHandle::with_graph(graph_with_broken_recipe()));
    queue.start(1);

    let everything = ValidatedQuery {
        filters: FilterSet::default(),
        page: PageRequest::new(1, 20),
    };
    let id = queue.submit(everything, Priority::Normal).await.unwrap();
    let record = queue.wait(id).await.unwrap();

    assert_eq!(record.state, TaskState::Failed);
    assert_eq!(record.retries, 0);
    let failure = record.error.unwrap();
    assert_eq!(failure.kind, FailureKind::Permanent);
    assert!(failure.message.contains("broken"), "{}", failure.message);
    queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_finished_tasks_are_evicted_after_retention() {
    let queue = TaskQueue::with_retention(
        TaskRunner::new(Arc::new(Recorder::default()), RetryPolicy::default()),
        64,
        Duration::from_secs(60),
    );
    queue.start(1);

    let id = queue.submit(query(1), Priority::Normal).await.unwrap();
    assert_eq!(queue.wait(id).await.unwrap().state, TaskState::Succeeded);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(queue.poll(id).unwrap().state, TaskState::Succeeded);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(matches!(queue.poll(id), Err(QueueError::TaskNotFound(_))));
    assert!(matches!(queue.wait(id).await, Err(QueueError::TaskNotFound(_))));
    assert_eq!(queue.tracked(), 0);
    queue.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unfinished_tasks_are_never_evicted() {
    let queue = TaskQueue::with_retention(
        TaskRunner::new(Arc::new(Recorder::default()), RetryPolicy::default()),
        64,
        Duration::from_secs(60),
    );
    let id = queue.submit(query(2), Priority::Low).await.unwrap();

    tokio::time::advance(Duration::from_secs(3600)).await;
    queue.evict_expired();
    assert_eq!(queue.poll(id).unwrap().state, TaskState::Pending);
    assert_eq!(queue.tracked(), 1);
}
