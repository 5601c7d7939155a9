//! In-memory doubles for the external collaborators

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lettre::Message;
use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::TlsMode;
use crate::notify::{MailTransport, TraceSink, TransportError, TransportReply, TransportSettings};
use crate::store::{DeliveryStatus, FailureQuery, FailureRecord, FailureSource, StoreError};

/// A delivery row as it would sit in the message database
pub fn failure(id: u64, status: DeliveryStatus, scope: &str) -> FailureRecord {
    FailureRecord {
        id,
        message_id: 1000 + id,
        status,
        code: None,
        output: None,
        details: None,
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        mail_from: "app@example.com".to_string(),
        rcpt_to: format!("user{id}@remote.example"),
        subject: Some(format!("Message {id}")),
        scope: scope.to_string(),
    }
}

/// Failure source over a table of delivery rows of any status and scope
#[derive(Default)]
pub struct MemoryFailureSource {
    rows: Mutex<Vec<FailureRecord>>,
    fail_next: Mutex<Option<String>>,
    fetches: AtomicUsize,
}

impl MemoryFailureSource {
    pub fn new(rows: Vec<FailureRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn insert(&self, row: FailureRecord) {
        self.rows.lock().push(row);
    }

    /// Make the next fetch fail with the given message
    pub fn fail_next_fetch(&self, message: &str) {
        *self.fail_next.lock() = Some(message.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FailureSource for MemoryFailureSource {
    async fn fetch(&self, query: FailureQuery) -> Result<Vec<FailureRecord>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_next.lock().take() {
            return Err(StoreError::Unavailable(message));
        }

        let mut matched: Vec<FailureRecord> = self
            .rows
            .lock()
            .iter()
            .filter(|r| query.matches(r.id, &r.status, &r.scope))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.id);
        Ok(matched)
    }
}

/// A message accepted by [`RecordingTransport`]
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Transport that records messages instead of sending them
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failure: Mutex<Option<String>>,
    attempts: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every message with the given diagnostic
    pub fn failing(diagnostic: &str) -> Self {
        let transport = Self::default();
        transport.set_failure(Some(diagnostic));
        transport
    }

    pub fn set_failure(&self, diagnostic: Option<&str>) {
        *self.failure.lock() = diagnostic.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, message: Message) -> Result<TransportReply, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(diagnostic) = self.failure.lock().clone() {
            return Err(TransportError::Other(diagnostic));
        }

        let envelope = message.envelope();
        let formatted = String::from_utf8_lossy(&message.formatted()).into_owned();
        let subject = formatted
            .lines()
            .find_map(|l| l.strip_prefix("Subject: "))
            .unwrap_or_default()
            .to_string();

        self.sent.lock().push(SentMessage {
            from: envelope.from().map(|a| a.to_string()),
            to: envelope.to().iter().map(|a| a.to_string()).collect(),
            subject,
            body: formatted,
        });

        Ok(TransportReply::new("250", vec!["2.0.0 Ok: queued".to_string()]))
    }

    fn settings(&self) -> TransportSettings {
        TransportSettings {
            host: "smtp.test".to_string(),
            port: 2525,
            tls: TlsMode::StartTls,
            authenticated: false,
            insecure: false,
        }
    }
}

/// Trace sink that keeps every line
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().clone()
    }
}

impl TraceSink for RecordingSink {
    fn emit(&self, level: Level, message: &str) {
        self.lines.lock().push((level, message.to_string()));
    }
}

/// Checkpoint held in memory, with a write log
#[derive(Default)]
pub struct MemoryCheckpoint {
    value: Mutex<u64>,
    writes: Mutex<Vec<u64>>,
    fail_writes: Mutex<bool>,
}

impl MemoryCheckpoint {
    pub fn new(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
            ..Default::default()
        }
    }

    pub fn value(&self) -> u64 {
        *self.value.lock()
    }

    pub fn writes(&self) -> Vec<u64> {
        self.writes.lock().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn read(&self) -> Result<u64, CheckpointError> {
        Ok(*self.value.lock())
    }

    fn write(&self, id: u64) -> Result<(), CheckpointError> {
        if *self.fail_writes.lock() {
            return Err(CheckpointError::Write {
                path: "memory".into(),
                source: io::Error::other("disk full"),
            });
        }
        *self.value.lock() = id;
        self.writes.lock().push(id);
        Ok(())
    }
}

/// Formatted log output of the current thread, for asserting on log lines
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Route this thread's events into the capture until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(Level::TRACE)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Captured lines containing `needle`
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|l| l.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
