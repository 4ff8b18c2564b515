//! Consumption driver
//!
//! [`consume`] owns one subscription for its whole lifetime and multiplexes
//! four sources in a single loop: broker events, the interval ticker, the
//! timeout ticker and the consumer's cancellation token. Exactly one source is
//! serviced per iteration and every iteration ends with
//! [`StreamConsumer::process`]. Callbacks never overlap.

use crate::metrics::STREAM_METRICS;
use crate::stream::config::StreamConfig;
use crate::stream::error::StreamError;
use crate::stream::message::{BrokerError, BrokerEvent, BrokerMessage};
use crate::stream::session::Session;
use crate::stream::traits::{Broker, Subscription};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Callback set driven by [`consume`].
///
/// The driver never looks at consumer state; everything domain specific
/// happens here. A callback that blocks stalls the whole driver.
#[async_trait]
pub trait StreamConsumer: Send {
    /// Extra configuration handed to [`StreamConsumer::start`]
    type Config: Send;

    /// Value produced by [`StreamConsumer::finish`]
    type Output: Send;

    /// Consumer error type
    type Error: std::error::Error + Send + Sync + 'static;

    /// Called once before the loop. An error aborts the run and
    /// [`StreamConsumer::finish`] is not called.
    async fn start(&mut self, session: &Session, config: Self::Config) -> Result<(), Self::Error>;

    /// Called for every message, after the session counters were updated.
    /// An error stops the loop.
    async fn message(&mut self, msg: BrokerMessage) -> Result<(), Self::Error>;

    /// Called on every interval tick. An error stops the loop.
    async fn interval(&mut self, _now: DateTime<Utc>) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called on every timeout tick. `stalled` is true when no message
    /// arrived since the previous timeout tick. Returning true stops the loop.
    async fn timeout(&mut self, _now: DateTime<Utc>, _stalled: bool) -> bool {
        false
    }

    /// Called for every broker error, end-of-stream included. Returning true
    /// stops the loop.
    async fn error(&mut self, err: BrokerError) -> bool;

    /// Called once per iteration after whichever source fired.
    /// `Ok(true)` or an error stops the loop.
    async fn process(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    /// Called exactly once when the loop exits; its result is the result of
    /// the run.
    async fn finish(&mut self) -> Result<Self::Output, Self::Error>;

    /// Cancellation signal. Once cancelled the loop stops after one more
    /// [`StreamConsumer::process`] call.
    fn done(&self) -> CancellationToken;
}

/// Failure of a consumption run
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError<E: std::error::Error + 'static> {
    /// Subscription could not be set up; no callback was invoked
    #[error("stream setup failed: {0}")]
    Broker(#[source] StreamError),

    /// Error returned by the consumer's `start` or `finish`
    #[error("consumer failed: {0}")]
    Consumer(#[source] E),
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) -> Instant {
    match ticker {
        Some(t) => t.tick().await,
        None => std::future::pending().await,
    }
}

/// Run `consumer` against a subscription for `stream` until one of its
/// callbacks asks to stop or its token is cancelled.
///
/// A zero `timeout_ms` or `interval_ms` disables the corresponding ticker
/// entirely. Ticks that fire while an iteration is still running are
/// dropped, not queued. There is no forced cancellation: a consumer that
/// never asks to stop keeps the driver running.
pub async fn consume<B, C>(
    broker: &B,
    stream: &StreamConfig,
    consumer: &mut C,
    config: C::Config,
) -> Result<C::Output, ConsumeError<C::Error>>
where
    B: Broker,
    C: StreamConsumer,
{
    let mut subscription = broker.subscribe(stream).await.map_err(ConsumeError::Broker)?;
    let mut session = Session::new(stream.clone());

    let mut timeout_tick = session.timeout().map(ticker);
    let mut interval_tick = session.interval().map(ticker);
    let done = consumer.done();

    consumer.start(&session, config).await.map_err(ConsumeError::Consumer)?;

    let label = session.subscription();
    info!(
        subscription = %label,
        timeout = ?session.timeout(),
        interval = ?session.interval(),
        "Consumption started"
    );

    let mut last = 0u64;
    let mut run = true;
    while run {
        tokio::select! {
            event = subscription.next_event() => match event {
                BrokerEvent::Message(msg) => {
                    session.record_message(msg.len());
                    STREAM_METRICS.messages_consumed.with_label_values(&[label.as_str()]).inc();
                    STREAM_METRICS
                        .bytes_consumed
                        .with_label_values(&[label.as_str()])
                        .inc_by(msg.len() as u64);

                    if let Err(e) = consumer.message(msg).await {
                        debug!(error = %e, "Message callback requested stop");
                        run = false;
                    }
                }
                BrokerEvent::Error(err) => {
                    STREAM_METRICS.broker_errors.with_label_values(&[label.as_str()]).inc();
                    debug!(error = %err, "Broker error event");

                    if consumer.error(err).await {
                        run = false;
                    }
                }
            },
            _ = next_tick(&mut interval_tick) => {
                if let Err(e) = consumer.interval(Utc::now()).await {
                    debug!(error = %e, "Interval callback requested stop");
                    run = false;
                }
            }
            _ = next_tick(&mut timeout_tick) => {
                let stalled = session.messages() == last;
                last = session.messages();

                if consumer.timeout(Utc::now(), stalled).await {
                    debug!(stalled, "Timeout callback requested stop");
                    run = false;
                }
            }
            _ = done.cancelled() => {
                debug!("Consumer cancelled");
                run = false;
            }
        }

        match consumer.process().await {
            Ok(false) => {}
            Ok(true) => run = false,
            Err(e) => {
                debug!(error = %e, "Process callback requested stop");
                run = false;
            }
        }
    }

    STREAM_METRICS.runs_finished.with_label_values(&[label.as_str()]).inc();
    info!(
        subscription = %label,
        messages = session.messages(),
        bytes = session.bytes(),
        "Consumption finished"
    );

    consumer.finish().await.map_err(ConsumeError::Consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::memory::MemoryBroker;
    use crate::stream::traits::Publisher;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    /// Records every callback and stops according to its knobs
    #[derive(Default)]
    struct Recorder {
        token: CancellationToken,
        calls: Vec<&'static str>,
        payloads: Vec<Vec<u8>>,
        stalled: Vec<bool>,
        processed: usize,
        fail_start: bool,
        cancel_in_start: bool,
        stop_after_process: Option<usize>,
        stop_after_timeouts: Option<usize>,
        stop_after_intervals: Option<usize>,
        intervals: usize,
        stop_on_error: bool,
    }

    #[async_trait]
    impl StreamConsumer for Recorder {
        type Config = ();
        type Output = usize;
        type Error = TestError;

        async fn start(&mut self, _session: &Session, _config: ()) -> Result<(), TestError> {
            self.calls.push("start");
            if self.cancel_in_start {
                self.token.cancel();
            }
            if self.fail_start {
                return Err(TestError("start failed"));
            }
            Ok(())
        }

        async fn message(&mut self, msg: BrokerMessage) -> Result<(), TestError> {
            self.calls.push("message");
            self.payloads.push(msg.payload);
            Ok(())
        }

        async fn interval(&mut self, _now: DateTime<Utc>) -> Result<(), TestError> {
            self.calls.push("interval");
            self.intervals += 1;
            match self.stop_after_intervals {
                Some(n) if self.intervals >= n => Err(TestError("enough intervals")),
                _ => Ok(()),
            }
        }

        async fn timeout(&mut self, _now: DateTime<Utc>, stalled: bool) -> bool {
            self.calls.push("timeout");
            self.stalled.push(stalled);
            matches!(self.stop_after_timeouts, Some(n) if self.stalled.len() >= n)
        }

        async fn error(&mut self, _err: BrokerError) -> bool {
            self.calls.push("error");
            self.stop_on_error
        }

        async fn process(&mut self) -> Result<bool, TestError> {
            self.calls.push("process");
            self.processed += 1;
            Ok(matches!(self.stop_after_process, Some(n) if self.processed >= n))
        }

        async fn finish(&mut self) -> Result<usize, TestError> {
            self.calls.push("finish");
            Ok(self.payloads.len())
        }

        fn done(&self) -> CancellationToken {
            self.token.clone()
        }
    }

    fn stream(timeout_ms: u64, interval_ms: u64) -> StreamConfig {
        StreamConfig {
            prefix: "test".to_string(),
            topic: "events".to_string(),
            timeout_ms,
            interval_ms,
            ..Default::default()
        }
    }

    fn count(calls: &[&str], name: &str) -> usize {
        calls.iter().filter(|c| **c == name).count()
    }

    #[tokio::test]
    async fn test_stops_after_fifth_process() {
        let broker = MemoryBroker::new();
        let config = stream(0, 0);
        let mut recorder = Recorder {
            stop_after_process: Some(5),
            ..Default::default()
        };

        let handle = {
            let broker = broker.clone();
            tokio::spawn(async move {
                while broker.subscriber_count() == 0 {
                    tokio::task::yield_now().await;
                }
                for i in 0..10u8 {
                    broker.produce("test.events", &[i]).unwrap();
                }
            })
        };

        let result = consume(&broker, &config, &mut recorder, ()).await.unwrap();
        handle.await.unwrap();

        assert_eq!(result, 5);
        assert_eq!(recorder.payloads, (0..5u8).map(|i| vec![i]).collect::<Vec<_>>());
        assert_eq!(count(&recorder.calls, "finish"), 1);
        assert_eq!(recorder.calls.last(), Some(&"finish"));
    }

    #[tokio::test]
    async fn test_start_error_skips_loop_and_finish() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder {
            fail_start: true,
            ..Default::default()
        };

        let result = consume(&broker, &stream(10, 10), &mut recorder, ()).await;

        assert!(matches!(result, Err(ConsumeError::Consumer(_))));
        assert_eq!(recorder.calls, vec!["start"]);
    }

    #[tokio::test]
    async fn test_setup_error_invokes_nothing() {
        let broker = MemoryBroker::new();
        broker.set_reachable(false);
        let mut recorder = Recorder::default();

        let result = consume(&broker, &stream(0, 0), &mut recorder, ()).await;

        assert!(matches!(result, Err(ConsumeError::Broker(StreamError::Unreachable(_)))));
        assert!(recorder.calls.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_still_processes_once() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder {
            cancel_in_start: true,
            ..Default::default()
        };

        let result = consume(&broker, &stream(0, 0), &mut recorder, ()).await.unwrap();

        assert_eq!(result, 0);
        assert_eq!(recorder.calls, vec!["start", "process", "finish"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_tickers_never_fire() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder::default();
        let token = recorder.token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            token.cancel();
        });

        consume(&broker, &stream(0, 0), &mut recorder, ()).await.unwrap();

        assert_eq!(count(&recorder.calls, "timeout"), 0);
        assert_eq!(count(&recorder.calls, "interval"), 0);
        assert_eq!(recorder.calls, vec!["start", "process", "finish"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_tracks_message_counter() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder {
            stop_after_timeouts: Some(3),
            ..Default::default()
        };

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            producer.produce("test.events", b"late").unwrap();
        });

        consume(&broker, &stream(100, 0), &mut recorder, ()).await.unwrap();

        assert_eq!(recorder.stalled, vec![true, false, true]);
        assert_eq!(recorder.payloads.len(), 1);
        assert_eq!(count(&recorder.calls, "finish"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_error_stops() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder {
            stop_after_intervals: Some(3),
            ..Default::default()
        };

        consume(&broker, &stream(0, 50), &mut recorder, ()).await.unwrap();

        assert_eq!(recorder.intervals, 3);
        assert_eq!(count(&recorder.calls, "process"), 3);
        assert_eq!(count(&recorder.calls, "timeout"), 0);
        assert_eq!(recorder.calls.last(), Some(&"finish"));
    }

    #[tokio::test]
    async fn test_error_callback_decides() {
        let broker = MemoryBroker::new();
        let mut recorder = Recorder {
            stop_on_error: true,
            ..Default::default()
        };

        let injector = broker.clone();
        tokio::spawn(async move {
            while injector.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
            injector.inject_error(BrokerError::PartitionEof { partition: 0 });
        });

        consume(&broker, &stream(0, 0), &mut recorder, ()).await.unwrap();

        assert_eq!(recorder.calls, vec!["start", "error", "process", "finish"]);
    }
}
