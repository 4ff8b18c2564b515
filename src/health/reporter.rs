//! Health reporter
//!
//! Owns the health state, the stat store and the connectivity backoff, and
//! runs two independent background tasks: periodic reporting and broker
//! connectivity probing. Both stop when the reporter's shutdown token is
//! cancelled by [`Reporter::stop_with_final_state`].

use crate::build_info::BuildInfo;
use crate::health::backoff::Backoff;
use crate::health::config::HealthConfig;
use crate::health::error::{HealthError, HealthResult};
use crate::health::event::{safe_marshal, HealthEvent, EVENT_TYPE, STATUS_EVENT};
use crate::health::log_writer::BrokerLogWriter;
use crate::health::state::HealthState;
use crate::health::stats::StatStore;
use crate::metrics::HEALTH_METRICS;
use crate::stream::{BrokerError, Publisher, StreamError, SESSION_TIMEOUT_MS};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error callback; invoked off the caller's path
pub type ErrorFn = Arc<dyn Fn(HealthError) + Send + Sync>;

/// Stat refresh callback run before each report
pub type StatFn = Arc<dyn Fn(&Reporter) + Send + Sync>;

struct Status {
    state: HealthState,
    message: String,
    hostname: String,
    broker_healthy: bool,
    broker_error: Option<String>,
}

struct Inner {
    config: HealthConfig,
    service: String,
    version: String,
    topic: String,
    status: Mutex<Status>,
    stats: StatStore,
    stat_fns: DashMap<String, StatFn>,
    publisher: Option<Arc<dyn Publisher>>,
    error_fn: RwLock<Option<ErrorFn>>,
    stdout_fallback: AtomicBool,
    backoff: Mutex<Backoff>,
    shutdown: CancellationToken,
    report_task: Mutex<Option<JoinHandle<()>>>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
    runtime: OnceLock<Handle>,
    stopped: AtomicBool,
}

/// Front door for health reporting. Clones share state.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<Inner>,
}

/// Local hostname from the environment, `"unknown"` when unset
pub fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

impl Reporter {
    /// Create a reporter. Without a publisher every report goes to the
    /// fallback path and the error callback.
    pub fn new(config: HealthConfig, build: &BuildInfo, publisher: Option<Arc<dyn Publisher>>) -> Self {
        let mut hostname = local_hostname();
        if let Some(suffix) = config.hostname_suffix.as_deref().filter(|s| !s.is_empty()) {
            hostname = format!("{}-{}", hostname, suffix);
        }

        let inner = Inner {
            service: config.service.clone(),
            version: build.version.clone(),
            topic: config.full_topic(),
            status: Mutex::new(Status {
                state: HealthState::default(),
                message: String::new(),
                hostname,
                broker_healthy: false,
                broker_error: None,
            }),
            stats: StatStore::new(),
            stat_fns: DashMap::new(),
            publisher,
            error_fn: RwLock::new(None),
            stdout_fallback: AtomicBool::new(config.stdout_fallback),
            backoff: Mutex::new(Backoff::new(config.check_interval(), config.max_check_interval())),
            shutdown: CancellationToken::new(),
            report_task: Mutex::new(None),
            probe_task: Mutex::new(None),
            runtime: OnceLock::new(),
            stopped: AtomicBool::new(false),
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Probe the broker once, start connectivity monitoring and, when the
    /// broker answered, publish an initial report.
    ///
    /// A configuration error aborts before anything starts. Otherwise
    /// monitoring runs even when this returns an error; the error only says
    /// the broker is not usable yet.
    pub async fn initialize(&self) -> HealthResult<()> {
        if self.inner.service.is_empty() {
            return Err(HealthError::Configuration("service name cannot be empty".to_string()));
        }
        let _ = self.inner.runtime.set(Handle::current());

        if let Some(publisher) = &self.inner.publisher {
            let weak = Arc::downgrade(&self.inner);
            publisher.on_error(Arc::new(move |err: BrokerError| {
                if let Some(reporter) = Reporter::from_weak(&weak) {
                    reporter.on_broker_error(err);
                }
            }));
        }

        let healthy = match self.inner.publisher {
            Some(_) => self.check_broker_health().await,
            None => false,
        };
        if healthy {
            self.report_health();
        }
        self.start_health_check();

        info!(
            service = %self.inner.service,
            topic = %self.inner.topic,
            broker_healthy = healthy,
            "Health reporter initialized"
        );

        match (&self.inner.publisher, healthy) {
            (None, _) => Err(HealthError::ProducerMissing {
                topic: self.inner.topic.clone(),
            }),
            (Some(_), false) => Err(HealthError::BrokerUnhealthy(
                self.broker_health().1.unwrap_or_else(|| "unknown".to_string()),
            )),
            (Some(_), true) => Ok(()),
        }
    }

    /// Service name
    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Fully qualified health topic
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn set_error_fn<F>(&self, f: F)
    where
        F: Fn(HealthError) + Send + Sync + 'static,
    {
        *self.inner.error_fn.write() = Some(Arc::new(f));
    }

    /// Mirror payloads to stdout when the broker is unavailable
    pub fn set_stdout_fallback(&self, enabled: bool) {
        self.inner.stdout_fallback.store(enabled, Ordering::Relaxed);
    }

    pub fn add_hostname_suffix(&self, suffix: &str) {
        if suffix.is_empty() {
            return;
        }
        let mut status = self.inner.status.lock();
        status.hostname = format!("{}-{}", status.hostname, suffix);
    }

    /// Current health as a snapshot
    pub fn health(&self) -> HealthEvent {
        let status = self.inner.status.lock();
        let data = self.inner.stats.merged();

        HealthEvent {
            hostname: status.hostname.clone(),
            timestamp: Utc::now().timestamp(),
            event_type: EVENT_TYPE.to_string(),
            name: STATUS_EVENT.to_string(),
            service: self.inner.service.clone(),
            version: self.inner.version.clone(),
            state: status.state,
            message: status.message.clone(),
            data: (!data.is_empty()).then_some(data),
        }
    }

    pub fn set_health(&self, state: HealthState, message: impl Into<String>) {
        let message = message.into();
        let mut status = self.inner.status.lock();
        if status.state != state {
            info!(service = %self.inner.service, from = %status.state, to = %state, message = %message, "Health state changed");
        }
        status.state = state;
        status.message = message;
    }

    /// Register a callback run before every report; replaces any callback
    /// with the same name
    pub fn register_stat_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Reporter) + Send + Sync + 'static,
    {
        self.inner.stat_fns.insert(name.into(), Arc::new(f));
    }

    pub fn clear_stat_fns(&self) {
        self.inner.stat_fns.clear();
    }

    /// Add a stat that is cleared by [`Reporter::clear_stats`]
    pub fn add_stat(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.stats.add(key, value);
    }

    /// Add a stat that acts as a default under transient stats and survives
    /// [`Reporter::clear_stats`]
    pub fn persist_stat(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.stats.persist(key, value);
    }

    pub fn get_stat(&self, key: &str) -> Option<Value> {
        self.inner.stats.get(key)
    }

    /// Clear one transient stat
    pub fn clear_stat(&self, key: &str) {
        self.inner.stats.clear(key);
    }

    /// Clear all transient stats
    pub fn clear_stats(&self) {
        self.inner.stats.clear_transient();
    }

    /// Clear transient and persistent stats
    pub fn clear_all(&self) {
        self.inner.stats.clear_all();
    }

    /// Merged stats as JSON
    pub fn json_stats(&self) -> Vec<u8> {
        safe_marshal(&self.inner.stats.merged())
    }

    /// Broker connectivity and the last probe error
    pub fn broker_health(&self) -> (bool, Option<String>) {
        let status = self.inner.status.lock();
        (status.broker_healthy, status.broker_error.clone())
    }

    /// Snapshot of the probe backoff
    pub fn backoff(&self) -> Backoff {
        self.inner.backoff.lock().clone()
    }

    /// Writer that publishes each write as a log record on `<service>.log`
    pub fn log_writer(&self) -> BrokerLogWriter {
        BrokerLogWriter::new(self.clone(), self.inner.config.log_topic())
    }

    /// Refresh stats, snapshot and publish. Failures go to the error
    /// callback; nothing here blocks on the broker.
    pub fn report_health(&self) {
        let stat_fns: Vec<StatFn> = self
            .inner
            .stat_fns
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for f in stat_fns {
            f(self);
        }

        let payload = safe_marshal(&self.health());
        let fallback = self.inner.stdout_fallback.load(Ordering::Relaxed);
        // failures are delivered through the error callback
        let _ = self.produce(fallback, &self.inner.topic, &payload);
    }

    /// (Re)start periodic reporting. A zero interval only stops the current
    /// task. Must be called from within a tokio runtime.
    pub fn start_interval_reporting(&self, interval: Duration) {
        let mut task = self.inner.report_task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }
        if interval.is_zero() || self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => match Reporter::from_weak(&weak) {
                        Some(reporter) => reporter.report_health(),
                        None => break,
                    },
                }
            }
            debug!("Interval reporting stopped");
        }));

        debug!(service = %self.inner.service, interval = ?interval, "Interval reporting started");
    }

    fn start_health_check(&self) {
        let mut task = self.inner.probe_task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let base = self.inner.backoff.lock().base();
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.shutdown.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + base, base);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => match Reporter::from_weak(&weak) {
                        Some(reporter) => reporter.probe_tick().await,
                        None => break,
                    },
                }
            }
            debug!("Connectivity monitoring stopped");
        }));
    }

    /// One connectivity check: probe only once the backoff allows it, then
    /// reset or grow the backoff
    pub async fn probe_tick(&self) {
        let ready = self.inner.backoff.lock().ready(Instant::now());
        if !ready {
            return;
        }

        let healthy = self.check_broker_health().await;

        let mut backoff = self.inner.backoff.lock();
        if healthy {
            backoff.record_success();
        } else {
            let wait = backoff.record_failure(Instant::now());
            debug!(
                service = %self.inner.service,
                retries = backoff.retries(),
                wait = ?wait,
                "Broker probe failed, backing off"
            );
        }
    }

    async fn check_broker_health(&self) -> bool {
        // without a publisher there is nothing to probe; leave the flag alone
        let Some(publisher) = self.inner.publisher.clone() else {
            return self.inner.status.lock().broker_healthy;
        };

        let timeout = Duration::from_millis(SESSION_TIMEOUT_MS);
        let result = tokio::task::spawn_blocking(move || publisher.probe(timeout))
            .await
            .unwrap_or_else(|e| Err(StreamError::Unreachable(format!("probe task failed: {}", e))));

        let healthy = result.is_ok();
        {
            let mut status = self.inner.status.lock();
            status.broker_healthy = healthy;
            status.broker_error = result.as_ref().err().map(ToString::to_string);
        }

        if let Err(e) = result {
            HEALTH_METRICS
                .probe_failures
                .with_label_values(&[self.inner.service.as_str()])
                .inc();
            self.emit_error(HealthError::BrokerUnhealthy(e.to_string()));
        }
        healthy
    }

    fn on_broker_error(&self, err: BrokerError) {
        if let BrokerError::AllBrokersDown(reason) = &err {
            let mut status = self.inner.status.lock();
            status.broker_healthy = false;
            status.broker_error = Some(reason.clone());
        }
        self.emit_error(HealthError::Broker(err));
    }

    /// Hand a payload to the publisher. When the broker is missing, known
    /// down or rejects the payload, the payload is optionally mirrored to
    /// stdout and the error callback fires. Only a rejected payload is
    /// returned as an error.
    pub(crate) fn produce(&self, fallback: bool, topic: &str, payload: &[u8]) -> HealthResult<()> {
        let healthy = self.inner.status.lock().broker_healthy;

        let result = match &self.inner.publisher {
            Some(publisher) => publisher.produce(topic, payload).map_err(|e| HealthError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            None => Err(HealthError::ProducerMissing {
                topic: topic.to_string(),
            }),
        };

        if healthy && result.is_ok() {
            HEALTH_METRICS
                .reports_published
                .with_label_values(&[self.inner.service.as_str()])
                .inc();
            return Ok(());
        }

        if fallback {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(payload).and_then(|_| stdout.write_all(b"\n"));
        }

        let err = match &result {
            Err(e) => e.clone(),
            Ok(()) => HealthError::BrokerUnavailable {
                topic: topic.to_string(),
            },
        };
        HEALTH_METRICS
            .publish_failures
            .with_label_values(&[self.inner.service.as_str(), err.reason()])
            .inc();
        self.emit_error(err);

        match result {
            Err(HealthError::ProducerMissing { .. }) => Ok(()),
            other => other,
        }
    }

    fn emit_error(&self, err: HealthError) {
        debug!(service = %self.inner.service, error = %err, "Health reporter error");

        let Some(f) = self.inner.error_fn.read().clone() else {
            return;
        };
        let handle = self
            .inner
            .runtime
            .get()
            .cloned()
            .or_else(|| Handle::try_current().ok());
        match handle {
            Some(handle) => {
                handle.spawn(async move { f(err) });
            }
            None => f(err),
        }
    }

    /// Stop with the conventional terminal state and an empty message
    pub async fn stop(&self) -> HealthResult<()> {
        self.stop_with_final_state(HealthState::Maintenance, "").await
    }

    /// Publish a final state, stop both background tasks, flush and release
    /// the publisher. An interval report already in progress is published
    /// first, so the final state is always the last one sent. A second call returns [`HealthError::AlreadyStopped`]
    /// and changes nothing.
    pub async fn stop_with_final_state(&self, state: HealthState, message: impl Into<String>) -> HealthResult<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            warn!(service = %self.inner.service, "Health reporter already stopped");
            return Err(HealthError::AlreadyStopped);
        }

        // an interval report already running must land before the final one
        let report_task = self.inner.report_task.lock().take();
        if let Some(handle) = report_task {
            handle.abort();
            let _ = handle.await;
        }

        self.set_health(state, message);
        self.report_health();

        self.inner.shutdown.cancel();
        self.inner.probe_task.lock().take();

        if let Some(publisher) = self.inner.publisher.clone() {
            let timeout = self.inner.config.flush_timeout();
            tokio::task::spawn_blocking(move || {
                let flushed = publisher.flush(timeout);
                let closed = publisher.close();
                flushed.and(closed)
            })
            .await
            .map_err(|e| HealthError::Shutdown(e.to_string()))?
            .map_err(|e| HealthError::Shutdown(e.to_string()))?;
        }

        info!(service = %self.inner.service, state = %state, "Health reporter stopped");
        Ok(())
    }

    /// True once a stop has begun
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}
