//! End-to-end flows through a [`ResilienceContext`]
//!
//! Guarded calls feed the shared metrics store and breaker registry, and the
//! recovery manager built by the same context sees those breakers.

use bulwark_core::{
    BreakerError, CircuitState, DeadlineError, DependencyId, ErrorKind, HealthStatus, ManualClock,
    RecoveryStrategy, ResilienceConfig, ResilienceContext, ServiceConfig, ServiceStatus,
    SystemHealth,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.breaker.failure_threshold = 2;
    config.breaker.recovery_timeout_seconds = 30;
    config.deadline.base_timeout_seconds = 1;
    config
}

fn context() -> (Arc<ManualClock>, ResilienceContext) {
    let clock = ManualClock::starting_now();
    let ctx = ResilienceContext::with_clock(&config(), clock.clone()).expect("valid config");
    (clock, ctx)
}

fn dep(name: &str) -> DependencyId {
    DependencyId::parse(name).expect("valid id")
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = config();
    config.breaker.failure_threshold = 0;
    assert!(ResilienceContext::from_config(&config).is_err());
}

#[tokio::test]
async fn test_success_feeds_adaptive_history() {
    let (_clock, ctx) = context();
    let analyzer = dep("analyzer");
    let deadline = ctx.deadline("analyze");

    let value = ctx
        .guarded_call(&analyzer, &deadline, || async { Ok::<_, String>(42) })
        .await
        .expect("call should succeed");

    assert_eq!(value, 42);
    assert_eq!(ctx.adaptive().history().len(), 1);
    assert!(ctx.metrics().history().is_empty());
    assert!(ctx.breakers().get(&analyzer).expect("breaker").is_closed());
}

#[tokio::test]
async fn test_failures_open_breaker_and_are_counted() {
    let (_clock, ctx) = context();
    let analyzer = dep("analyzer");
    let deadline = ctx.deadline("analyze");
    let invoked = AtomicU32::new(0);

    for _ in 0..2 {
        let result = ctx
            .guarded_call(&analyzer, &deadline, || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection refused")
            })
            .await;
        assert!(matches!(
            result,
            Err(BreakerError::Inner(DeadlineError::Inner("connection refused")))
        ));
    }
    assert_eq!(
        ctx.breakers().get(&analyzer).expect("breaker").state(),
        CircuitState::Open
    );

    let result = ctx
        .guarded_call(&analyzer, &deadline, || async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &str>(())
        })
        .await;
    assert!(result.expect_err("breaker should be open").is_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 2);

    let counts = ctx.metrics().error_counts();
    assert_eq!(counts.get(&ErrorKind::OperationFailure), Some(&2));
    assert_eq!(counts.get(&ErrorKind::BreakerOpen), Some(&1));
    assert!(ctx
        .metrics()
        .history()
        .iter()
        .all(|record| record.dependency.as_ref() == Some(&analyzer)));
    // Only the two calls that ran count against the dependency
    assert_eq!(ctx.metrics().get_service_health(&analyzer).recent_errors, 2);
}

#[tokio::test]
async fn test_fast_fails_leave_dependency_health_alone() {
    let (_clock, ctx) = context();
    let search = dep("search");
    let deadline = ctx.deadline("query");
    ctx.breakers().force_open(&search);
    let invoked = AtomicU32::new(0);

    for _ in 0..3 {
        let result = ctx
            .guarded_call(&search, &deadline, || async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(result.expect_err("breaker is forced open").is_open());
    }

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(
        ctx.metrics().error_counts().get(&ErrorKind::BreakerOpen),
        Some(&3)
    );
    let report = ctx.metrics().get_service_health(&search);
    assert_eq!(report.recent_errors, 0);
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(!ctx.metrics().should_trigger_recovery(&search));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_counts_as_breaker_failure() {
    let (_clock, ctx) = context();
    let slow = dep("slow");
    let deadline = ctx.deadline("fetch");

    let result = ctx
        .guarded_call(&slow, &deadline, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, String>(())
        })
        .await;

    match result {
        Err(BreakerError::Inner(DeadlineError::Exceeded { operation, limit })) => {
            assert_eq!(operation, "fetch");
            assert_eq!(limit, Duration::from_secs(1));
        }
        other => panic!("expected deadline expiry, got {other:?}"),
    }
    assert_eq!(ctx.breakers().get(&slow).expect("breaker").failure_count(), 1);
    assert_eq!(
        ctx.metrics().error_counts().get(&ErrorKind::DeadlineExceeded),
        Some(&1)
    );
}

#[tokio::test]
async fn test_fallback_is_used_and_counted() {
    let (_clock, ctx) = context();
    let cache = dep("cache");
    let deadline = ctx.deadline("lookup");

    let value = ctx
        .guarded_call_or_else(
            &cache,
            &deadline,
            || async { Err::<String, _>("miss") },
            || "default".to_string(),
        )
        .await;
    assert_eq!(value, "default");

    let value = ctx
        .guarded_call_or_else(
            &cache,
            &deadline,
            || async { Ok::<_, &str>("hit".to_string()) },
            || "default".to_string(),
        )
        .await;
    assert_eq!(value, "hit");
    assert_eq!(ctx.metrics().fallback_usage(), 1);
}

#[tokio::test]
async fn test_recovery_closes_breaker_opened_by_calls() {
    let (_clock, ctx) = context();
    let store = dep("store");
    let healthy = Arc::new(AtomicBool::new(false));

    let probe_flag = healthy.clone();
    let recover_flag = healthy.clone();
    ctx.recovery().register(
        ServiceConfig::new(
            store.clone(),
            move || {
                let healthy = probe_flag.load(Ordering::SeqCst);
                async move { Ok::<_, anyhow::Error>(healthy) }
            },
            move || {
                recover_flag.store(true, Ordering::SeqCst);
                async { Ok::<_, anyhow::Error>(true) }
            },
        )
        .strategy(RecoveryStrategy::Immediate),
    );

    let deadline = ctx.deadline("write");
    for _ in 0..2 {
        let _ = ctx
            .guarded_call(&store, &deadline, || async { Err::<(), _>("disk full") })
            .await;
    }
    assert!(ctx.breakers().get(&store).expect("breaker").is_open());

    let report = ctx.recovery().poll_once().await;
    assert_eq!(report.failed, vec![store.clone()]);
    assert_eq!(report.launched, vec![store.clone()]);
    ctx.recovery().wait_for_recoveries().await;

    assert!(healthy.load(Ordering::SeqCst));
    assert!(ctx.breakers().get(&store).expect("breaker").is_closed());
    let checker = ctx.recovery().checker(&store).expect("registered");
    assert_eq!(checker.status(), ServiceStatus::Healthy);

    let history = ctx.recovery().recovery_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert!(!history[0].manual);
    assert_eq!(ctx.metrics().recovery_stats().successful, 1);

    let status = ctx.recovery().get_system_status();
    assert_eq!(status.overall_health, SystemHealth::Healthy);
    assert_eq!(status.healthy_services, 1);
}

#[tokio::test]
async fn test_status_export_lands_on_disk() {
    let (_clock, ctx) = context();
    ctx.recovery().register(ServiceConfig::new(
        dep("queue"),
        || async { Ok::<_, anyhow::Error>(true) },
        || async { Ok::<_, anyhow::Error>(true) },
    ));
    ctx.recovery().poll_once().await;

    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("status.json");
    let export = ctx.recovery().export_status(Some(&path)).await;

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("status file")).expect("valid json");
    assert_eq!(json["total_services"], 1);
    assert_eq!(export.status.total_services, 1);
    assert!(json.get("export_timestamp").is_some());
    assert!(json["recovery_history"].as_array().expect("array").is_empty());
}
