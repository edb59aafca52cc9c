//! `tracing` layer that persists events into a [`LogStore`].
//!
//! The layer itself is synchronous and cheap: it flattens each event into a
//! [`NewLogEntry`] and hands it to an unbounded channel. A single detached
//! task drains the channel and performs the inserts, so emitting a log line
//! never waits on the database.
//!
//! Compose it like any other subscriber layer:
//!
//! ```ignore
//! let store = LogStore::open("sqlite:logs.db?mode=rwc").await?;
//! let (layer, pump) = SqliteLogLayer::attach(store.clone());
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(layer)
//!     .init();
//! // on shutdown, after the subscriber is gone:
//! pump.join().await;
//! ```

use std::fmt;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::entry::{LogLevel, NewLogEntry};
use crate::store::LogStore;

/// Subscriber layer that forwards events to the store's writer task.
pub struct SqliteLogLayer {
    tx: mpsc::UnboundedSender<NewLogEntry>,
}

/// Handle to the writer task behind a [`SqliteLogLayer`].
///
/// The task exits once the layer (and with it the channel sender) has been
/// dropped and the backlog is flushed. Await [`LogPump::join`] during
/// shutdown to avoid losing trailing entries.
pub struct LogPump {
    handle: JoinHandle<()>,
}

impl SqliteLogLayer {
    /// Builds the layer and spawns its writer task against `store`.
    pub fn attach(store: LogStore) -> (SqliteLogLayer, LogPump) {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewLogEntry>();
        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                if let Err(err) = store.insert(&entry).await {
                    // The store is unavailable; fall back to stderr rather
                    // than dropping the entry silently.
                    eprintln!(
                        "logstore write failed ({err}): [{}] {} {}",
                        entry.level.as_str(),
                        entry.target,
                        entry.message
                    );
                }
            }
        });
        (SqliteLogLayer { tx }, LogPump { handle })
    }
}

impl<S: Subscriber> Layer<S> for SqliteLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let entry = NewLogEntry {
            timestamp: Utc::now(),
            level: LogLevel::from(metadata.level()),
            target: metadata.target().to_string(),
            message: visitor.into_message(),
            file: metadata.file().map(str::to_string),
            line: metadata.line().map(|line| line as i64),
        };
        // Fails only after the pump has shut down.
        let _ = self.tx.send(entry);
    }
}

impl LogPump {
    /// Waits for the writer task to flush its backlog and exit.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Collects the `message` field and renders the rest as `key=value` pairs.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}
