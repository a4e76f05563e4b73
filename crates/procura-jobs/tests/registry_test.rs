use anyhow::{anyhow, Context};
use procura_core::JobId;
use procura_jobs::{Cancelled, Job, JobRegistry, JobStatus};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

async fn wait_for_terminal(registry: &JobRegistry, id: &JobId) -> Job {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let job = registry.get(id).expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        assert!(Instant::now() < deadline, "job {id} never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn metadata(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[tokio::test]
async fn test_successful_job_records_result() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", metadata(&[("department", "LIMA")]), |ctx| async move {
        ctx.sleep(Duration::from_millis(50)).await?;
        Ok(json!({ "value": 42 }))
    });

    assert_eq!(job.status, JobStatus::Queued);
    let early = registry.get(&job.id).unwrap();
    assert!(matches!(early.status, JobStatus::Queued | JobStatus::Running));
    assert!(early.result.is_none());
    assert!(early.error.is_none());

    let done = wait_for_terminal(&registry, &job.id).await;
    assert_eq!(done.status, JobStatus::Succeeded);
    assert_eq!(done.result.as_ref().unwrap()["value"], 42);
    assert!(done.error.is_none());
    assert_eq!(done.metadata.get("department").map(String::as_str), Some("LIMA"));
    assert!(done.updated_at >= done.created_at);
}

#[tokio::test]
async fn test_failing_job_records_error() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |_| async {
        Err(anyhow!("boom"))
    });

    let done = wait_for_terminal(&registry, &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error.as_deref().unwrap().contains("boom"));
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_error_includes_cause_chain() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |_| async {
        Err::<serde_json::Value, _>(anyhow!("container missing"))
            .context("search results did not load")
    });

    let done = wait_for_terminal(&registry, &job.id).await;
    let error = done.error.unwrap();
    assert!(error.contains("search results did not load"));
    assert!(error.contains("container missing"));
}

#[tokio::test]
async fn test_panicking_job_is_failed() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |_| async {
        if true {
            panic!("selector table exhausted");
        }
        Ok(json!(null))
    });

    let done = wait_for_terminal(&registry, &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    let error = done.error.unwrap();
    assert!(error.contains("task panicked"));
    assert!(error.contains("selector table exhausted"));
}

#[tokio::test]
async fn test_cancel_running_job() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |ctx| async move {
        ctx.sleep(Duration::from_secs(10)).await?;
        Ok(json!({ "value": "never" }))
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = Instant::now();
    assert!(registry.cancel(&job.id));

    let done = wait_for_terminal(&registry, &job.id).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(2));

    // Give the body time to observe the token; the record must not change.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = registry.get(&job.id).unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert!(after.result.is_none());
    assert!(after.error.is_none());
}

#[tokio::test]
async fn test_cancel_twice_returns_false() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |ctx| async move {
        ctx.sleep(Duration::from_secs(10)).await?;
        Ok(json!(null))
    });

    assert!(registry.cancel(&job.id));
    let first = registry.get(&job.id).unwrap();

    assert!(!registry.cancel(&job.id));
    let second = registry.get(&job.id).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_cancel_before_start_skips_body() {
    let registry = JobRegistry::new();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();

    // The single-threaded test runtime does not poll the spawned runner
    // until this task yields.
    let job = registry.create_job("test", BTreeMap::new(), move |_| async move {
        flag.store(true, Ordering::SeqCst);
        Ok(json!(null))
    });
    assert!(registry.cancel(&job.id));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(registry.get(&job.id).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_terminal_job_preserves_outcome() {
    let registry = JobRegistry::new();
    let ok = registry.create_job("test", BTreeMap::new(), |_| async { Ok(json!({ "value": 1 })) });
    let failed = registry.create_job("test", BTreeMap::new(), |_| async { Err(anyhow!("boom")) });

    wait_for_terminal(&registry, &ok.id).await;
    wait_for_terminal(&registry, &failed.id).await;

    assert!(!registry.cancel(&ok.id));
    assert!(!registry.cancel(&failed.id));

    let ok = registry.get(&ok.id).unwrap();
    assert_eq!(ok.status, JobStatus::Succeeded);
    assert_eq!(ok.result, Some(json!({ "value": 1 })));

    let failed = registry.get(&failed.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("boom"));
}

#[tokio::test]
async fn test_body_ignoring_cancellation_stays_cancelled() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |_| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(json!({ "value": "late" }))
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(registry.cancel(&job.id));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let done = registry.get(&job.id).unwrap();
    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(done.result.is_none());
}

#[tokio::test]
async fn test_body_reporting_cancelled_is_not_failed() {
    let registry = JobRegistry::new();
    let job = registry.create_job("test", BTreeMap::new(), |_| async {
        Err(anyhow::Error::new(Cancelled).context("stopped between pages"))
    });

    let done = wait_for_terminal(&registry, &job.id).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(done.error.is_none());
}

#[tokio::test]
async fn test_unknown_job() {
    let registry = JobRegistry::new();
    let id = JobId::generate();
    assert!(registry.get(&id).is_none());
    assert!(!registry.cancel(&id));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_jobs_run_concurrently() {
    let registry = JobRegistry::new();
    let started = Instant::now();
    let jobs: Vec<Job> = (0..8)
        .map(|i| {
            registry.create_job("test", BTreeMap::new(), move |ctx| async move {
                ctx.sleep(Duration::from_millis(200)).await?;
                Ok(json!({ "value": i }))
            })
        })
        .collect();

    for job in &jobs {
        let done = wait_for_terminal(&registry, &job.id).await;
        assert_eq!(done.status, JobStatus::Succeeded);
    }
    assert!(started.elapsed() < Duration::from_millis(1200));
}
