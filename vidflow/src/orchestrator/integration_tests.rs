//! End-to-end job lifecycle tests.

use super::*;
use crate::core::{JobStatus, JobType, REQUEST_OWNER};
use crate::errors::StageErrorCause;
use crate::events::CollectingEventSink;
use crate::pipeline::PipelineCatalog;
use crate::registry::JobRegistry;
use crate::stages::{FnExecutor, NoOpExecutor};
use crate::store::InMemoryJobStore;
use crate::testing::{
    registry_with, sample_request, three_stage_pipeline, FailingExecutor, GatedExecutor,
    PanickingExecutor, RecordingExecutor, StaticExecutor, TrespassingExecutor,
};
use pretty_assertions::assert_eq;

fn writer(key: &str) -> Arc<StaticExecutor> {
    Arc::new(StaticExecutor::writing(key, json!(key)))
}

fn request_keys(record: &JobRecord) -> Vec<String> {
    record
        .context
        .keys_owned_by(REQUEST_OWNER)
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_all_stages_succeed() {
    let sink = Arc::new(CollectingEventSink::new());
    let pipeline = three_stage_pipeline(writer("out1"), writer("out2"), writer("out3"));
    let registry = JobRegistry::builder(
        PipelineCatalog::empty().with_pipeline(JobType::VideoGeneration, pipeline),
    )
    .events(sink.clone())
    .build();

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();
    registry.shutdown().await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.current_stage, None);
    assert!(record.error.is_none());
    assert!(record.completed_at.is_some());
    assert_eq!(record.context.get("out3"), Some(&json!("out3")));
    assert_eq!(record.context.owner("out2"), Some("stage2"));

    assert_eq!(
        sink.event_types(),
        vec![
            "job.submitted",
            "job.started",
            "stage.started",
            "stage.completed",
            "stage.started",
            "stage.completed",
            "stage.started",
            "stage.completed",
            "job.completed",
        ]
    );

    let submitted = sink.events_of_type("job.submitted");
    let data = submitted[0].1.as_ref().unwrap();
    assert_eq!(data["fingerprint"], json!(sample_request().fingerprint()));
}

#[tokio::test]
async fn test_invalid_input_at_second_stage() {
    let stage3 = writer("out3");
    let registry = registry_with(
        three_stage_pipeline(
            writer("out1"),
            Arc::new(FailingExecutor::new(StageErrorCause::InvalidInput, "missing concepts")),
            stage3.clone(),
        ),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 20);
    assert_eq!(record.current_stage.as_deref(), Some("stage2"));
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.cause, StageErrorCause::InvalidInput);
    assert_eq!(error.stage_name, "stage2");
    assert!(!error.retryable);
    assert_eq!(stage3.call_count(), 0);
}

#[tokio::test]
async fn test_failure_keeps_context_of_earlier_stages() {
    let recorder = Arc::new(RecordingExecutor::new("out2"));
    let registry = registry_with(
        three_stage_pipeline(
            writer("out1"),
            recorder.clone(),
            Arc::new(FailingExecutor::new(StageErrorCause::UpstreamServiceError, "tts down")),
        ),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 70);

    let mut expected = request_keys(&record);
    expected.push("out1".to_string());
    expected.push("out2".to_string());
    expected.sort();
    let mut actual: Vec<String> = record.context.keys().into_iter().map(str::to_string).collect();
    actual.sort();
    assert_eq!(actual, expected);

    let seen = recorder.seen_keys();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(&"out1".to_string()));
    assert!(!seen[0].contains(&"out2".to_string()));
}

#[tokio::test]
async fn test_cancel_during_stage_lets_it_finish() {
    let gate = Arc::new(GatedExecutor::succeeding("out2"));
    let stage3 = writer("out3");
    let registry = registry_with(three_stage_pipeline(writer("out1"), gate.clone(), stage3.clone()), 4);

    let job_id = registry.submit(sample_request()).await.unwrap();
    gate.entered().await;
    registry.request_cancel(job_id).unwrap();

    let in_flight = registry.get(job_id).unwrap();
    assert_eq!(in_flight.status, JobStatus::Processing);

    gate.release();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.progress, 70);
    assert_eq!(record.current_stage, None);
    assert_eq!(record.cancel_reason.as_deref(), Some(CANCELLED_BY_USER));
    assert!(record.context.contains_key("out2"));
    assert!(record.error.is_none());
    assert_eq!(stage3.call_count(), 0);
}

#[tokio::test]
async fn test_failure_wins_over_pending_cancellation() {
    let gate = Arc::new(GatedExecutor::failing(StageErrorCause::Timeout, "render farm slow"));
    let registry = registry_with(three_stage_pipeline(writer("out1"), gate.clone(), writer("out3")), 4);

    let job_id = registry.submit(sample_request()).await.unwrap();
    gate.entered().await;
    registry.request_cancel(job_id).unwrap();
    gate.release();

    let record = registry.wait_for(job_id).await.unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 20);
    assert_eq!(record.error.as_ref().unwrap().cause, StageErrorCause::Timeout);
    assert!(record.cancel_reason.is_none());
}

#[tokio::test]
async fn test_cancel_before_first_stage() {
    let stage1 = writer("out1");
    let pipeline = three_stage_pipeline(stage1.clone(), writer("out2"), writer("out3"));
    let pending = JobRecord::new(JobId::new(), sample_request());
    let (sender, _) = watch::channel(Arc::new(pending));
    let token = Arc::new(CancellationToken::new());
    token.cancel(CANCELLED_BY_USER);

    let record = JobOrchestrator::new(Arc::new(sender), Arc::new(pipeline), token)
        .run()
        .await;

    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(record.progress, 0);
    assert!(record.started_at.is_some());
    assert_eq!(stage1.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_admission() {
    let gate = Arc::new(GatedExecutor::succeeding("out1"));
    let registry = registry_with(three_stage_pipeline(gate.clone(), writer("out2"), writer("out3")), 1);

    let first = registry.submit(sample_request()).await.unwrap();
    gate.entered().await;
    let second = registry.submit(sample_request()).await.unwrap();
    assert_eq!(registry.get(second).unwrap().status, JobStatus::Pending);

    registry.request_cancel(second).unwrap();
    let cancelled = registry.wait_for(second).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.progress, 0);
    assert!(cancelled.started_at.is_some());
    assert_eq!(registry.get(first).unwrap().status, JobStatus::Processing);

    gate.release();
    assert_eq!(registry.wait_for(first).await.unwrap().status, JobStatus::Completed);

    gate.release();
    let third = registry.submit(sample_request()).await.unwrap();
    assert_eq!(registry.wait_for(third).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_concurrent_cancellations_both_succeed() {
    let sink = Arc::new(CollectingEventSink::new());
    let gate = Arc::new(GatedExecutor::succeeding("out2"));
    let registry = JobRegistry::builder(PipelineCatalog::empty().with_pipeline(
        JobType::VideoGeneration,
        three_stage_pipeline(writer("out1"), gate.clone(), writer("out3")),
    ))
    .events(sink.clone())
    .build();

    let job_id = registry.submit(sample_request()).await.unwrap();
    gate.entered().await;

    let (a, b) = (registry.clone(), registry.clone());
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.request_cancel(job_id) }),
        tokio::spawn(async move { b.request_cancel(job_id) }),
    );
    assert!(first.unwrap().is_ok());
    assert!(second.unwrap().is_ok());

    gate.release();
    let record = registry.wait_for(job_id).await.unwrap();
    registry.shutdown().await;

    assert_eq!(record.status, JobStatus::Cancelled);
    assert_eq!(sink.events_of_type("job.cancel_requested").len(), 1);
    assert_eq!(sink.events_of_type("job.cancelled").len(), 1);
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let registry = registry_with(
        three_stage_pipeline(writer("out1"), writer("out2"), writer("out3")),
        4,
    );
    let job_id = registry.submit(sample_request()).await.unwrap();
    let mut rx = registry.subscribe(job_id).unwrap();

    let mut seen = Vec::new();
    loop {
        let record = Arc::clone(&*rx.borrow_and_update());
        seen.push(record.progress);
        if record.is_terminal() {
            assert_eq!(record.status, JobStatus::Completed);
            break;
        }
        rx.changed().await.unwrap();
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_panicking_stage_fails_job() {
    let registry = registry_with(
        three_stage_pipeline(writer("out1"), writer("out2"), Arc::new(PanickingExecutor)),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 70);
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.cause, StageErrorCause::UpstreamServiceError);
    assert_eq!(error.stage_name, "stage3");
    assert!(error.message.contains("renderer crashed"));
}

#[tokio::test]
async fn test_write_to_foreign_key_rejected() {
    let registry = registry_with(
        three_stage_pipeline(
            writer("out1"),
            Arc::new(TrespassingExecutor::new("out1")),
            writer("out3"),
        ),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 20);
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.cause, StageErrorCause::InvalidInput);
    assert!(!error.retryable);
    assert_eq!(record.context.get("out1"), Some(&json!("out1")));
    assert_eq!(record.context.owner("out1"), Some("stage1"));
}

#[tokio::test]
async fn test_request_keys_are_read_only() {
    let registry = registry_with(
        three_stage_pipeline(
            Arc::new(TrespassingExecutor::new("request.title")),
            writer("out2"),
            writer("out3"),
        ),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.progress, 0);
    assert_eq!(record.current_stage.as_deref(), Some("stage1"));
    assert_eq!(
        record.context.get("request.title"),
        Some(&json!("Attention Is All You Need"))
    );
}

#[tokio::test]
async fn test_error_attributed_to_running_stage() {
    let mislabeled = Arc::new(FnExecutor::new("mislabeled", |_ctx| {
        Err(StageError::upstream("somewhere_else", "boom"))
    }));
    let registry = registry_with(
        three_stage_pipeline(Arc::new(NoOpExecutor), mislabeled, Arc::new(NoOpExecutor)),
        4,
    );

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();

    assert_eq!(record.error.as_ref().unwrap().stage_name, "stage2");
    assert_eq!(record.current_stage.as_deref(), Some("stage2"));
}

#[tokio::test]
async fn test_committed_records_are_persisted() {
    let store = Arc::new(InMemoryJobStore::new());
    let registry = JobRegistry::builder(PipelineCatalog::empty().with_pipeline(
        JobType::VideoGeneration,
        three_stage_pipeline(writer("out1"), writer("out2"), writer("out3")),
    ))
    .store(store.clone())
    .build();

    let job_id = registry.submit(sample_request()).await.unwrap();
    let record = registry.wait_for(job_id).await.unwrap();
    registry.shutdown().await;

    let stored = store.load(job_id).await.unwrap().unwrap();
    assert_eq!(stored, *record);
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_terminal_record_left_untouched() {
    let done = JobRecord::new(JobId::new(), sample_request())
        .start(Some("stage1"))
        .unwrap()
        .cancel("operator")
        .unwrap();
    let stage1 = writer("out1");
    let (sender, _) = watch::channel(Arc::new(done.clone()));

    let record = JobOrchestrator::new(
        Arc::new(sender),
        Arc::new(three_stage_pipeline(stage1.clone(), writer("out2"), writer("out3"))),
        Arc::new(CancellationToken::new()),
    )
    .run()
    .await;

    assert_eq!(*record, done);
    assert_eq!(stage1.call_count(), 0);
}
