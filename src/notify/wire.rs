//! Capture of lettre's SMTP wire log
//!
//! With its `tracing` feature lettre emits one debug event per line written to
//! or read from the server. [`capture`] polls a future under a private
//! subscriber that keeps those events, so the exchange of a single delivery
//! can be handed to a [`TraceSink`](super::TraceSink) without passing through
//! the process-wide log filter.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const LETTRE_TARGET: &str = "lettre";

/// Run `future`, returning its output and every lettre event it emitted
pub async fn capture<F: Future>(future: F) -> (F::Output, Vec<(Level, String)>) {
    let recorder = WireRecorder::default();
    let dispatch = Dispatch::new(tracing_subscriber::registry().with(recorder.clone()));

    let output = future.with_subscriber(dispatch).await;
    (output, recorder.take())
}

#[derive(Clone, Default)]
struct WireRecorder {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl WireRecorder {
    fn take(&self) -> Vec<(Level, String)> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl<S: Subscriber> Layer<S> for WireRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(LETTRE_TARGET) {
            return;
        }

        let mut line = LineVisitor::default();
        event.record(&mut line);
        self.lines.lock().push((*metadata.level(), line.finish()));
    }
}

/// Flattens an event into `message key=value ...`
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push_str(&format!(" {}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}
