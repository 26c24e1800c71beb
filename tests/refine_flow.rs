//! End-to-end refine flow: cache, retries, breaker and timeouts together.

use std::time::Duration;

use refine_guard::error::RecoveryAction;
use refine_guard::resilience::BreakerState;
use refine_guard::{RefineError, RefineOptions};

mod common;
use common::{harness, test_config, CountingTemplates, Reply, ScriptedBackend};

const EXPECTED_KEY: &str = r#"{"backendId":"a","modelId":"m1","strict":true,"template":"default","text":"improve my login flow"}"#;

#[tokio::test]
async fn test_login_flow_is_cached_after_first_call() {
    let backend = ScriptedBackend::new("a", Reply::Refine("[refined] "));
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::new());

    let first = h
        .refiner
        .refine("improve my login flow", None, &RefineOptions::default())
        .await
        .unwrap();
    assert_eq!(first.refined_text, "[refined] improve my login flow");
    assert_eq!(first.template_used, "default");
    assert_eq!(first.iteration, 1);
    assert_eq!(first.backend_id, "a");
    assert!(!first.from_cache);

    let cache = h.refiner.cache().unwrap();
    assert!(cache.has(EXPECTED_KEY));

    let second = h
        .refiner
        .refine("improve my login flow", None, &RefineOptions::default())
        .await
        .unwrap();
    assert_eq!(second.refined_text, first.refined_text);
    assert!(second.from_cache);

    assert_eq!(backend.calls(), 1);
    assert_eq!(h.templates.loads(), 1);
}

#[tokio::test]
async fn test_cache_hit_reports_requested_iteration() {
    let backend = ScriptedBackend::new("a", Reply::Refine("> "));
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::new());

    h.refiner.refine("text", None, &RefineOptions::default()).await.unwrap();
    let options = RefineOptions {
        iteration: Some(4),
        ..RefineOptions::default()
    };
    let hit = h.refiner.refine("text", None, &options).await.unwrap();
    assert!(hit.from_cache);
    assert_eq!(hit.iteration, 4);
}

#[tokio::test]
async fn test_strict_mode_change_misses_cache() {
    let backend = ScriptedBackend::new("a", Reply::Refine("> "));
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::new());

    h.refiner.refine("text", None, &RefineOptions::default()).await.unwrap();

    let mut relaxed = test_config("a", "m1");
    relaxed.backend.strict = false;
    h.settings.store(relaxed);

    let result = h.refiner.refine("text", None, &RefineOptions::default()).await.unwrap();
    assert!(!result.from_cache);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_template_failure_spends_no_backend_budget() {
    let backend = ScriptedBackend::new("a", Reply::Refine("> "));
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::failing());

    let err = h
        .refiner
        .refine("text", None, &RefineOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RefineError::TemplateLoad {
            template_id: "default".into(),
            message: "permission denied".into(),
        }
    );
    assert_eq!(err.recovery("offline"), RecoveryAction::Retry);
    assert_eq!(backend.calls(), 0);
    // The breaker was never consulted.
    assert!(h.refiner.breakers().existing("a").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let backend = ScriptedBackend::with_script(
        "a",
        [Reply::Fail("503 Service Unavailable"), Reply::Fail("rate limit exceeded")],
        Reply::Refine("> "),
    );
    let mut config = test_config("a", "m1");
    config.retries.max_retries = 3;
    let h = harness(config, &[backend.clone()], CountingTemplates::new());

    let result = h.refiner.refine("text", None, &RefineOptions::default()).await.unwrap();
    assert_eq!(result.refined_text, "> text");
    assert_eq!(backend.calls(), 3);

    let snapshot = h.refiner.breakers().get("a").snapshot();
    assert_eq!(snapshot.state, BreakerState::Closed);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_fails_fast() {
    let backend = ScriptedBackend::new("a", Reply::Fail("401 Unauthorized"));
    let mut config = test_config("a", "m1");
    config.retries.max_retries = 3;
    let h = harness(config, &[backend.clone()], CountingTemplates::new());

    let err = h
        .refiner
        .refine("text", None, &RefineOptions::default())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RefineError::Backend {
            backend_id: "a".into(),
            message: "401 Unauthorized".into(),
            attempts: 1,
        }
    );
    assert_eq!(backend.calls(), 1);
    assert_eq!(h.refiner.breakers().get("a").snapshot().failure_count, 1);
    assert!(h.refiner.cache().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_count_as_one_breaker_failure() {
    let backend = ScriptedBackend::new("a", Reply::Fail("502 Bad Gateway"));
    let mut config = test_config("a", "m1");
    config.retries.max_retries = 2;
    let h = harness(config, &[backend.clone()], CountingTemplates::new());

    let err = h
        .refiner
        .refine("text", None, &RefineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RefineError::Backend { attempts: 3, .. }));
    assert_eq!(backend.calls(), 3);
    assert_eq!(h.refiner.breakers().get("a").snapshot().failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers() {
    let backend = ScriptedBackend::with_script(
        "a",
        [Reply::Fail("500"), Reply::Fail("500"), Reply::Fail("500")],
        Reply::Refine("> "),
    );
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::new());

    for i in 0..3 {
        let text = format!("text {i}");
        let err = h
            .refiner
            .refine(&text, None, &RefineOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "backend");
    }

    let err = h
        .refiner
        .refine("rejected", None, &RefineOptions::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RefineError::CircuitOpen {
            backend_id: "a".into(),
            state: BreakerState::Open,
        }
    );
    assert_eq!(
        err.recovery("offline"),
        RecoveryAction::UseFallback {
            fallback_id: "offline".into()
        }
    );
    assert_eq!(backend.calls(), 3);

    tokio::time::advance(Duration::from_secs(30)).await;

    // Two successful probes close the breaker.
    h.refiner.refine("probe 1", None, &RefineOptions::default()).await.unwrap();
    assert_eq!(h.refiner.breakers().get("a").state(), BreakerState::HalfOpen);
    h.refiner.refine("probe 2", None, &RefineOptions::default()).await.unwrap();
    assert_eq!(h.refiner.breakers().get("a").state(), BreakerState::Closed);
    assert_eq!(backend.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let backend = ScriptedBackend::new("a", Reply::Fail("503"));
    let h = harness(test_config("a", "m1"), &[backend.clone()], CountingTemplates::new());

    for i in 0..3 {
        let _ = h.refiner.refine(&format!("t{i}"), None, &RefineOptions::default()).await;
    }
    assert_eq!(h.refiner.breakers().get("a").state(), BreakerState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;
    let err = h
        .refiner
        .refine("probe", None, &RefineOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind().as_str(), "backend");
    assert_eq!(h.refiner.breakers().get("a").state(), BreakerState::Open);

    // The reset timeout starts over.
    tokio::time::advance(Duration::from_secs(29)).await;
    let err = h
        .refiner
        .refine("again", None, &RefineOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RefineError::CircuitOpen { .. }));
    assert_eq!(backend.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_hung_backend_times_out_and_is_retried() {
    let backend = ScriptedBackend::new("a", Reply::Hang);
    let mut config = test_config("a", "m1");
    config.retries.max_retries = 1;
    config.timeouts.request_secs = 1;
    let h = harness(config, &[backend.clone()], CountingTemplates::new());

    let err = h
        .refiner
        .refine("text", None, &RefineOptions::default())
        .await
        .unwrap_err();

    match err {
        RefineError::Backend {
            message, attempts, ..
        } => {
            assert!(message.contains("timed out"), "{message}");
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.calls(), 2);
}
