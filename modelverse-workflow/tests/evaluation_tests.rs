use approx::assert_relative_eq;
use async_trait::async_trait;
use mockall::mock;
use modelverse_core::{
    BenchmarkKind, CoreError, DatasetProvider, EvaluationConfig, GenerationBackend,
    GenerationRequest, GenerationResponse, LogEvent, LogLevel, Result, ResultArtifact, Sample,
    Subset, Task, TaskId, TaskStatus, TaskStore, TaskUpdate,
};
use modelverse_workflow::*;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

mock! {
    pub Backend {}

    #[async_trait]
    impl GenerationBackend for Backend {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;
    }
}

// ===== Fixtures =====

struct StaticDatasets(Vec<Subset>);

#[async_trait]
impl DatasetProvider for StaticDatasets {
    async fn load(&self, _benchmark: BenchmarkKind) -> Result<Vec<Subset>> {
        Ok(self.0.clone())
    }
}

/// A sample whose question carries the scripted model reply after `|`.
fn sample(id: &str, reply: &str, correct_index: i64) -> Sample {
    Sample::new(
        format!("{id}|{reply}"),
        vec!["red".into(), "green".into(), "blue".into(), "black".into()],
        correct_index,
    )
}

/// The scripted reply embedded in the prompt's question line.
fn scripted_reply(request: &GenerationRequest) -> String {
    let prompt = &request.messages[0].content;
    let question = prompt
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Question: "))
        .unwrap_or_default();
    question.split_once('|').map(|(_, reply)| reply.to_string()).unwrap_or_default()
}

fn question_id(request: &GenerationRequest) -> String {
    let prompt = &request.messages[0].content;
    prompt
        .trim_start_matches("Question: ")
        .split('|')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn scripted_backend() -> MockBackend {
    let mut backend = MockBackend::new();
    backend
        .expect_generate()
        .returning(|request| Ok(GenerationResponse::text(scripted_reply(&request))));
    backend
}

struct Harness {
    store: Arc<InMemoryTaskStore>,
    executor: TaskExecutor,
    runner: Arc<EvaluationRunner>,
    results: TempDir,
    _models: TempDir,
}

fn harness(subsets: Vec<Subset>, backend: MockBackend) -> Harness {
    let store = Arc::new(InMemoryTaskStore::new());
    let models = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let resolver = StaticModelResolver::default().with_model("qwen", models.path());

    let lifecycle = TaskLifecycle::new(store.clone(), Arc::new(TaskLocks::new()));
    let settings = EvaluationSettings {
        results_dir: results.path().to_path_buf(),
        ..EvaluationSettings::default()
    };
    let runner = EvaluationRunner::new(
        lifecycle,
        Arc::new(resolver),
        Arc::new(StaticDatasets(subsets)),
        Arc::new(backend),
        Arc::new(TracingEventSink),
        settings,
    );

    Harness {
        store,
        executor: TaskExecutor::new(256),
        runner: Arc::new(runner),
        results,
        _models: models,
    }
}

fn config(model_id: &str) -> EvaluationConfig {
    EvaluationConfig {
        min_samples: 10,
        max_samples: 20,
        ..EvaluationConfig::new(model_id, "qwen", BenchmarkKind::Mmlu)
    }
}

async fn insert(store: &InMemoryTaskStore, config: EvaluationConfig) -> TaskId {
    let task = Task::evaluation("mmlu-run", config);
    let id = task.id;
    store.insert(task).await.unwrap();
    id
}

async fn run(harness: &Harness, id: TaskId) -> TaskOutcome {
    harness
        .executor
        .spawn(id, harness.runner.clone())
        .unwrap()
        .wait()
        .await
        .unwrap()
}

async fn read_artifact(path: &std::path::Path) -> ResultArtifact {
    let raw = tokio::fs::read_to_string(path).await.unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ===== Completed Runs =====

#[tokio::test]
async fn test_completed_run_aggregates_subjects() {
    let subsets = vec![
        Subset::new(
            "s1",
            vec![
                sample("a1", "A", 0),
                sample("a2", "B", 1),
                sample("a3", "The answer is C.", 2),
                sample("a4", "D", 0),
            ],
        ),
        Subset::new(
            "s2",
            vec![sample("b1", "The answer is B.", 1), sample("b2", ";;;;;;", 2)],
        ),
    ];
    let h = harness(subsets, scripted_backend());
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Completed);

    let task = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 1.0);
    assert!(task.completed_at.is_some());

    let result_path = task.result_path.clone().unwrap();
    assert!(result_path.starts_with(h.results.path()));
    assert_eq!(result_path.file_name().unwrap(), "mmlu_results.json");
    assert_eq!(outcome.result_path, Some(result_path.clone()));

    let artifact = read_artifact(&result_path).await;
    assert_eq!(artifact.total_correct, 4);
    assert_eq!(artifact.total_questions, 6);
    assert_relative_eq!(artifact.average_accuracy, 0.625);
    assert_relative_eq!(artifact.overall_accuracy, 4.0 / 6.0);
    assert_eq!(artifact.subject_results["s2"].unknown_count, 1);

    let metrics = task.metrics.unwrap();
    assert_relative_eq!(metrics.accuracy.unwrap(), 4.0 / 6.0);
    assert_relative_eq!(metrics.average_accuracy.unwrap(), 0.625);
    assert_relative_eq!(metrics.custom_metrics["s1_accuracy"], 0.75);
}

#[tokio::test]
async fn test_invalid_samples_are_skipped() {
    let subsets = vec![Subset::new(
        "s1",
        vec![
            sample("ok1", "A", 0),
            sample("bad", "A", 9),
            Sample::new("", vec!["x".into(), "y".into()], 0),
            sample("ok2", "C", 1),
        ],
    )];
    let h = harness(subsets, scripted_backend());
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Completed);

    let artifact = read_artifact(outcome.result_path.as_deref().unwrap()).await;
    assert_eq!(artifact.total_questions, 2);
    assert_eq!(artifact.total_correct, 1);
    assert_eq!(artifact.sample_errors, 0);

    let logs = h.store.logs(&id).await.unwrap();
    let skipped = logs
        .iter()
        .filter(|event| event.level == LogLevel::Warning && event.content.starts_with("skipping sample"))
        .count();
    assert_eq!(skipped, 2);
}

// ===== Progress =====

#[tokio::test]
async fn test_progress_is_proportional_and_monotonic() {
    let subsets = ["s1", "s2"]
        .iter()
        .map(|name| {
            Subset::new(
                *name,
                (0..5).map(|i| sample(&format!("{name}-{i}"), "A", 0)).collect(),
            )
        })
        .collect();
    let h = harness(subsets, scripted_backend());
    let id = insert(&h.store, config("qwen")).await;
    let mut rx = h.executor.subscribe();

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Completed);

    let mut seen = Vec::new();
    while let Ok(update) = rx.try_recv() {
        seen.push(update.progress);
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    assert!(seen.iter().any(|p| (p - 0.3).abs() < 1e-9), "{seen:?}");
    assert_eq!(seen.last().copied(), Some(1.0));
}

// ===== Failure Containment =====

#[tokio::test]
async fn test_consecutive_errors_abort_only_that_subject() {
    let subsets = vec![
        Subset::new("alpha", (0..8).map(|i| sample(&format!("alpha-{i}"), "A", 0)).collect()),
        Subset::new("beta", (0..3).map(|i| sample(&format!("beta-{i}"), "B", 1)).collect()),
    ];

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut backend = MockBackend::new();
    backend.expect_generate().returning(move |request| {
        counter.fetch_add(1, Ordering::SeqCst);
        let id = question_id(&request);
        // the first two alpha samples answer, the rest of alpha errors
        if id.starts_with("alpha") && id != "alpha-0" && id != "alpha-1" {
            return Err(CoreError::Generation("backend returned 500".to_string()));
        }
        Ok(GenerationResponse::text(scripted_reply(&request)))
    });

    let h = harness(subsets, backend);
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Completed);
    // 2 answered + 5 errors in alpha, 3 in beta
    assert_eq!(calls.load(Ordering::SeqCst), 10);

    let artifact = read_artifact(outcome.result_path.as_deref().unwrap()).await;
    assert_eq!(artifact.sample_errors, 5);
    assert_eq!(artifact.subject_results["alpha"].total, 2);
    assert_eq!(artifact.subject_results["alpha"].correct, 2);
    assert_eq!(artifact.subject_results["beta"].total, 3);
    assert_eq!(artifact.subject_results["beta"].correct, 3);

    let logs = h.store.logs(&id).await.unwrap();
    assert!(logs
        .iter()
        .any(|event| event.level == LogLevel::Error && event.content.contains("consecutive sample errors")));
}

#[tokio::test]
async fn test_interleaved_errors_do_not_abort_subject() {
    let subsets = vec![
        Subset::new("alpha", (0..9).map(|i| sample(&format!("alpha-{i}"), "A", 0)).collect()),
        Subset::new("beta", (0..2).map(|i| sample(&format!("beta-{i}"), "B", 1)).collect()),
    ];

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut backend = MockBackend::new();
    backend.expect_generate().returning(move |request| {
        counter.fetch_add(1, Ordering::SeqCst);
        let id = question_id(&request);
        // the answer at alpha-4 resets the streak before it reaches five
        if id.starts_with("alpha") && id != "alpha-4" {
            return Err(CoreError::Generation("backend returned 500".to_string()));
        }
        Ok(GenerationResponse::text(scripted_reply(&request)))
    });

    let h = harness(subsets, backend);
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 11);

    let artifact = read_artifact(outcome.result_path.as_deref().unwrap()).await;
    assert_eq!(artifact.sample_errors, 8);
    assert_eq!(artifact.subject_results["alpha"].total, 1);
    assert_eq!(artifact.subject_results["alpha"].correct, 1);
    assert_eq!(artifact.subject_results["beta"].total, 2);

    let logs = h.store.logs(&id).await.unwrap();
    assert!(!logs
        .iter()
        .any(|event| event.content.contains("consecutive sample errors")));
}

#[tokio::test]
async fn test_fatal_backend_error_fails_task() {
    let subsets = vec![
        Subset::new("alpha", (0..3).map(|i| sample(&format!("alpha-{i}"), "A", 0)).collect()),
        Subset::new("beta", (0..3).map(|i| sample(&format!("beta-{i}"), "B", 1)).collect()),
        Subset::new("gamma", (0..3).map(|i| sample(&format!("gamma-{i}"), "C", 2)).collect()),
    ];

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut backend = MockBackend::new();
    backend.expect_generate().returning(move |request| {
        counter.fetch_add(1, Ordering::SeqCst);
        if question_id(&request).starts_with("beta") {
            return Err(CoreError::ResourceUnavailable("server went away".to_string()));
        }
        Ok(GenerationResponse::text(scripted_reply(&request)))
    });

    let h = harness(subsets, backend);
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Failed);
    // alpha in full, then the first beta sample; gamma never starts
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let task = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error_message.as_deref(),
        Some("Resource unavailable: server went away")
    );

    let partial = task.result_path.unwrap();
    assert_eq!(partial.file_name().unwrap(), PARTIAL_RESULTS_FILE);
    let artifact = read_artifact(&partial).await;
    assert_eq!(artifact.subject_results["alpha"].total, 3);
    assert_eq!(artifact.subject_results["beta"].total, 0);
    assert!(!artifact.subject_results.contains_key("gamma"));
}

#[tokio::test]
async fn test_empty_dataset_fails_task() {
    let h = harness(Vec::new(), MockBackend::new());
    let id = insert(&h.store, config("qwen")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Failed);

    let task = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error_message.as_deref(),
        Some("Resource unavailable: no MMLU data available")
    );
    assert!(task.result_path.is_none());
}

#[tokio::test]
async fn test_missing_model_fails_fast() {
    let h = harness(vec![Subset::new("s1", vec![sample("a", "A", 0)])], MockBackend::new());
    let id = insert(&h.store, config("llama")).await;

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Failed);

    let task = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error_message.unwrap().contains("llama"));
}

#[tokio::test]
async fn test_task_runs_at_most_once() {
    let h = harness(vec![Subset::new("s1", vec![sample("a", "A", 0)])], scripted_backend());
    let id = insert(&h.store, config("qwen")).await;

    assert_eq!(run(&h, id).await.status, TaskStatus::Completed);

    let second = run(&h, id).await;
    assert_eq!(second.status, TaskStatus::Failed);
    assert!(second.error.unwrap().contains("cannot start"));
    assert_eq!(h.store.get(&id).await.unwrap().unwrap().status, TaskStatus::Completed);
}

/// Delegates to the in-memory store but rejects progress updates from
/// halfway through the run.
struct FlakyStore(InMemoryTaskStore);

#[async_trait]
impl TaskStore for FlakyStore {
    async fn insert(&self, task: Task) -> Result<()> {
        self.0.insert(task).await
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.0.get(id).await
    }

    async fn update(&self, id: &TaskId, update: TaskUpdate) -> Result<Task> {
        if update.status.is_none() && update.progress.is_some_and(|p| p >= 0.5) {
            return Err(CoreError::ResourceUnavailable("task store offline".into()));
        }
        self.0.update(id, update).await
    }

    async fn append_log(&self, id: &TaskId, text: &str, level: LogLevel) -> Result<()> {
        self.0.append_log(id, text, level).await
    }

    async fn logs(&self, id: &TaskId) -> Result<Vec<LogEvent>> {
        self.0.logs(id).await
    }
}

#[tokio::test]
async fn test_top_level_failure_writes_partial_results() {
    let store = Arc::new(FlakyStore(InMemoryTaskStore::new()));
    let models = tempfile::tempdir().unwrap();
    let results = tempfile::tempdir().unwrap();
    let runner = EvaluationRunner::new(
        TaskLifecycle::new(store.clone(), Arc::new(TaskLocks::new())),
        Arc::new(StaticModelResolver::default().with_model("qwen", models.path())),
        Arc::new(StaticDatasets(vec![Subset::new(
            "s1",
            vec![sample("a", "A", 0), sample("b", "B", 1)],
        )])),
        Arc::new(scripted_backend()),
        Arc::new(TracingEventSink),
        EvaluationSettings {
            results_dir: results.path().to_path_buf(),
            ..EvaluationSettings::default()
        },
    );
    let id = insert(&store.0, config("qwen")).await;

    let outcome = TaskExecutor::new(16)
        .spawn(id, Arc::new(runner))
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(outcome.status, TaskStatus::Failed);

    let task = store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error_message.as_deref(),
        Some("Resource unavailable: task store offline")
    );

    let partial = task.result_path.unwrap();
    assert_eq!(partial.file_name().unwrap(), PARTIAL_RESULTS_FILE);
    let artifact = read_artifact(&partial).await;
    assert_eq!(artifact.total_questions, 1);
    assert_eq!(artifact.total_correct, 1);
}

// ===== Cancellation =====

#[tokio::test]
async fn test_cancellation_keeps_answers_so_far() {
    let subsets = vec![Subset::new(
        "s1",
        (0..8).map(|i| sample(&format!("q{i}"), "A", 0)).collect(),
    )];

    let executor = TaskExecutor::new(256);
    let id_slot = Arc::new(std::sync::Mutex::new(None::<TaskId>));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut backend = MockBackend::new();
    {
        let executor = executor.clone();
        let id_slot = id_slot.clone();
        let calls = calls.clone();
        backend.expect_generate().returning(move |request| {
            if calls.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                if let Some(id) = *id_slot.lock().unwrap() {
                    executor.cancel(&id);
                }
            }
            Ok(GenerationResponse::text(scripted_reply(&request)))
        });
    }

    let mut h = harness(subsets, backend);
    h.executor = executor;
    let id = insert(&h.store, config("qwen")).await;
    *id_slot.lock().unwrap() = Some(id);

    let outcome = run(&h, id).await;
    assert_eq!(outcome.status, TaskStatus::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let task = h.store.get(&id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Stopped);
    assert!(task.stopped_at.is_some());
    assert!(task.progress > 0.0 && task.progress < 1.0);

    let artifact = read_artifact(task.result_path.as_deref().unwrap()).await;
    assert_eq!(artifact.total_questions, 3);
    assert_eq!(
        task.metrics.unwrap().custom_metrics.get("total_questions").copied(),
        Some(3.0)
    );
}
