/* In-memory transport for tests: records every buffer it is handed and can be told to fail a
 * chosen call. */
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DriverError, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Feature,
    Write,
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

/* Shared view of the sent log, usable after the transport moved into an actor. */
pub type SentLog = Arc<Mutex<Vec<Sent>>>;

pub struct RecordingTransport {
    sent: SentLog,
    /* Zero-based index of the call that fails, counting both channels. */
    fail_at: Option<usize>,
    calls: usize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_at: None,
            calls: 0,
        }
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::new()
        }
    }

    pub fn log(&self) -> SentLog {
        Arc::clone(&self.sent)
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&mut self, channel: Channel, report: &[u8]) -> Result<(), DriverError> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at == Some(call) {
            return Err(DriverError::NotFound("mock".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            channel,
            bytes: report.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_feature_report(&mut self, report: &[u8]) -> Result<(), DriverError> {
        self.record(Channel::Feature, report)
    }

    async fn write(&mut self, report: &[u8]) -> Result<(), DriverError> {
        self.record(Channel::Write, report)
    }
}
