//! Service health reporting
//!
//! A [`Reporter`] keeps the service's health state and stats, publishes
//! snapshots to `<prefix>.health.<service>` on demand or on an interval, and
//! monitors broker connectivity with a linear backoff between failing
//! probes. Publishing never blocks the caller; failures are delivered to an
//! optional error callback.
//!
//! Host snapshots ([`host_health`]) and out-of-band [`Signal`]s over HTTP
//! cover the cases where the broker is not the right or not an available
//! channel.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use streamkit::build_info::BuildInfo;
//! # use streamkit::health::{HealthConfig, HealthState, Reporter};
//! # use streamkit::stream::{MemoryBroker, Publisher};
//! # async fn run() {
//! let broker = MemoryBroker::new();
//! let reporter = Reporter::new(
//!     HealthConfig::for_service("gather"),
//!     &BuildInfo::new("gather"),
//!     Some(Arc::new(broker) as Arc<dyn Publisher>),
//! );
//! let _ = reporter.initialize().await;
//! reporter.set_health(HealthState::Healthy, "a-ok");
//! reporter.report_health();
//! let _ = reporter.stop().await;
//! # }
//! ```

mod backoff;
mod config;
mod error;
mod event;
mod handler;
mod host;
mod log_writer;
mod reporter;
mod signal;
mod state;
mod stats;

pub use backoff::{Backoff, DEFAULT_CHECK_INTERVAL, DEFAULT_MAX_CHECK_INTERVAL};
pub use config::{HealthConfig, DEFAULT_FLUSH_TIMEOUT_MS};
pub use error::{HealthError, HealthResult};
pub use event::{pretty_json, safe_marshal, HealthEvent, EVENT_TYPE, STATUS_EVENT};
pub use handler::{health_router, health_status, host_status, HealthQuery};
pub use host::{host_health, host_health_bytes, CpuStat, DiskUsage, HostHealth, HostInfo, MemoryStat, HOST_EVENT};
pub use log_writer::BrokerLogWriter;
pub use reporter::{local_hostname, ErrorFn, Reporter, StatFn};
pub use signal::{HttpSignal, Signal, SIGNAL_TIMEOUT, SIGNAL_URL};
pub use state::HealthState;
pub use stats::StatStore;
