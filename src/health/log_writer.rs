//! Service log sink backed by the health reporter's publisher

use crate::health::event::safe_marshal;
use crate::health::reporter::Reporter;
use chrono::Utc;
use serde::Serialize;
use std::io;

#[derive(Serialize)]
struct LogRecord<'a> {
    app: &'a str,
    timestamp: i64,
    msg: &'a str,
}

/// Publishes every write as one `{"app","timestamp","msg"}` record on the
/// service log topic. Records are never mirrored to stdout.
#[derive(Clone)]
pub struct BrokerLogWriter {
    reporter: Reporter,
    topic: String,
}

impl BrokerLogWriter {
    pub(crate) fn new(reporter: Reporter, topic: String) -> Self {
        Self { reporter, topic }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl io::Write for BrokerLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let record = LogRecord {
            app: self.reporter.service(),
            timestamp: Utc::now().timestamp(),
            msg: text.trim_end_matches('\n'),
        };

        self.reporter
            .produce(false, &self.topic, &safe_marshal(&record))
            .map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
