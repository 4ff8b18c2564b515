use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use streamkit::build_info::BuildInfo;
use streamkit::health::{HealthConfig, HealthState, Reporter};
use streamkit::metrics::{gather_text, init_metrics};
use streamkit::monitor::{MonitorSummary, TopicMonitor};
use streamkit::stream::{consume, MemoryBroker, Publisher, StreamConfig};
use tokio_util::sync::CancellationToken;

fn stream() -> StreamConfig {
    StreamConfig {
        prefix: "mon".to_string(),
        topic: "clicks".to_string(),
        timeout_ms: 10_000,
        interval_ms: 4_000,
        ..Default::default()
    }
}

/// Monitor a topic through traffic, a stall and shutdown
#[tokio::test(start_paused = true)]
async fn test_monitor_end_to_end() {
    init_metrics();
    let broker = MemoryBroker::new();
    let build = BuildInfo::from_parts("clicks-monitor", "v2.0.0", "abc", "0", "ci");
    let reporter = Reporter::new(
        HealthConfig::for_service("clicks-monitor"),
        &build,
        Some(Arc::new(broker.clone()) as Arc<dyn Publisher>),
    );
    reporter.initialize().await.unwrap();

    let token = CancellationToken::new();
    let mut monitor = TopicMonitor::new(reporter.clone()).with_token(token.clone());

    let producer = broker.clone();
    let observer = reporter.clone();
    let driver = tokio::spawn(async move {
        while producer.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..3 {
            producer.produce("mon.clicks", b"click").unwrap();
        }

        // first timeout at 10s sees traffic, the second at 20s a stall
        tokio::time::sleep(Duration::from_secs(21)).await;
        let stalled = observer.health();

        producer.produce("mon.clicks", b"late").unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        let recovered = observer.health();

        token.cancel();
        (stalled, recovered)
    });

    let summary = consume(&broker, &stream(), &mut monitor, ()).await.unwrap();
    let (stalled, recovered) = driver.await.unwrap();

    assert_eq!(
        summary,
        MonitorSummary {
            messages: 4,
            bytes: 19,
            errors: 0,
            stalls: 1,
        }
    );

    assert_eq!(stalled.state, HealthState::Degraded);
    assert_eq!(stalled.message, "mon.clicks stalled");
    assert_eq!(stalled.data.as_ref().unwrap()["stalled"], true);
    assert_eq!(recovered.state, HealthState::Healthy);

    reporter
        .stop_with_final_state(HealthState::Maintenance, "done")
        .await
        .unwrap();

    let last: Value = serde_json::from_slice(
        broker
            .published_on("svc.health.clicks-monitor")
            .last()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(last["state"], "gray");
    assert_eq!(last["data"]["messages"], 4);
    assert_eq!(last["data"]["subscription"], "mon.clicks");

    let metrics = gather_text();
    assert!(metrics.contains(r#"stream_messages_consumed_total{subscription="mon.clicks"} 4"#));
    assert!(metrics.contains(r#"stream_runs_finished_total{subscription="mon.clicks"} 1"#));
    assert!(metrics.contains("health_reports_published_total"));
}
