use anyhow::Context;
use axum::routing::get;
use clap::Parser;
use std::sync::Arc;
use streamkit::{
    build_info::BuildInfo,
    config::Config,
    health::{health_router, HealthState, HttpSignal, Reporter, Signal},
    metrics::{gather_text, init_metrics},
    monitor::TopicMonitor,
    stream::{consume, Broker, KafkaBroker, KafkaPublisher, MemoryBroker, Publisher, StreamBackend, StreamConsumer},
    telemetry,
};

/// Watch a topic and publish its traffic as service health
#[derive(Debug, Parser)]
#[command(name = "streamkit-monitor", version, about)]
struct Cli {
    /// Override file layered over the embedded defaults
    #[arg(short, long, env = "STREAMKIT_CONFIG")]
    config: Option<String>,

    /// Comma separated bootstrap brokers
    #[arg(long)]
    brokers: Option<String>,

    /// Topic prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Topic to monitor, without prefix
    #[arg(short, long)]
    topic: Option<String>,

    /// Monitor every topic starting with the full topic name
    #[arg(long)]
    glob: bool,

    /// Service name used for health reports
    #[arg(short, long)]
    service: Option<String>,

    /// Use the in-process broker instead of Kafka
    #[arg(long)]
    memory: bool,

    /// Stall detection period in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// HTTP port for /health and /metrics; 0 disables the server
    #[arg(long)]
    http_port: Option<u16>,

    /// Mirror health payloads to stdout when the broker is down
    #[arg(long)]
    stdout_fallback: bool,

    /// Also POST the final health state to this URL
    #[arg(long)]
    signal_url: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(brokers) = &self.brokers {
            config.stream.brokers = brokers.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.stream.prefix = prefix.clone();
            config.health.prefix = prefix.clone();
        }
        if let Some(topic) = &self.topic {
            config.stream.topic = topic.clone();
        }
        if self.glob {
            config.stream.glob = true;
        }
        if let Some(service) = &self.service {
            config.health.service = service.clone();
        }
        if self.memory {
            config.stream.backend = StreamBackend::Memory;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.stream.timeout_ms = timeout_ms;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if self.stdout_fallback {
            config.health.stdout_fallback = true;
        }
        if let Some(url) = &self.signal_url {
            config.health.signal_url = Some(url.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;
    cli.apply(&mut config);

    telemetry::init_tracing(&config.observability)?;
    init_metrics();

    let build = BuildInfo::new(config.health.service.clone());
    tracing::info!("Starting streamkit-monitor\n{}", build.banner());

    match config.stream.backend {
        StreamBackend::Kafka => {
            let publisher = KafkaPublisher::new(&config.stream).context("failed to create producer")?;
            run(KafkaBroker::new(), Arc::new(publisher), config, build).await
        }
        StreamBackend::Memory => {
            tracing::warn!("Using the in-process broker; nothing outside this process can publish to it");
            let broker = MemoryBroker::new();
            run(broker.clone(), Arc::new(broker), config, build).await
        }
    }
}

async fn run<B: Broker>(
    broker: B,
    publisher: Arc<dyn Publisher>,
    config: Config,
    build: BuildInfo,
) -> anyhow::Result<()> {
    let signal = config
        .health
        .signal_url
        .as_deref()
        .map(HttpSignal::new)
        .transpose()
        .context("failed to create health signal")?;

    let reporter = Reporter::new(config.health.clone(), &build, Some(publisher));
    reporter.set_error_fn(|e| tracing::warn!(error = %e, "Health reporter error"));

    if let Err(e) = reporter.initialize().await {
        tracing::warn!(error = %e, "Broker not ready, connectivity monitoring continues");
    }
    if let Some(interval) = config.health.report_interval() {
        reporter.start_interval_reporting(interval);
    }

    // Start HTTP server
    if config.server.http_port != 0 {
        let app = health_router(reporter.clone()).route("/metrics", get(|| async { gather_text() }));
        let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
        let listener = tokio::net::TcpListener::bind(&http_addr)
            .await
            .with_context(|| format!("failed to bind {}", http_addr))?;
        tracing::info!("HTTP server listening on http://{}", http_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let mut monitor = TopicMonitor::new(reporter.clone());
    let token = monitor.done();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            token.cancel();
        }
    });

    let result = consume(&broker, &config.stream, &mut monitor, ()).await;

    let (state, message) = match &result {
        Ok(summary) => (
            HealthState::Maintenance,
            format!("stopped after {} messages", summary.messages),
        ),
        Err(e) => (HealthState::Critical, e.to_string()),
    };
    reporter.stop_with_final_state(state, message).await?;

    // the broker may be what failed, so the final state goes out of band too
    if let Some(signal) = &signal {
        let mut final_event = reporter.health();
        let data = final_event.data.take().unwrap_or_default();
        if let Err(e) = signal.report(final_event, data).await {
            tracing::warn!(url = signal.url(), error = %e, "Failed to signal final health");
        }
    }

    let summary = result?;
    tracing::info!(
        messages = summary.messages,
        bytes = summary.bytes,
        errors = summary.errors,
        stalls = summary.stalls,
        "Monitor stopped"
    );
    Ok(())
}
