#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Progress event bus: pipeline stages publish, UIs and log sinks subscribe.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};

/// Event record encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: String,
    /// Module producing the event.
    pub source: String,
    /// Event type (e.g., `summarizer.section.completed`).
    pub event_type: String,
    /// Groups events of one summarization run.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// ISO timestamp.
    pub timestamp: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            correlation_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// Attaches the run correlation id.
    #[must_use]
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event to the bus.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver yielding every event published after the call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// In-memory broadcast bus with a bounded backlog.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<EventRecord>,
    capacity: usize,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
}

impl MemoryEventBus {
    /// Creates a new bus retaining at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Snapshot of recent events retained in memory.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events of one run, in publish order.
    #[must_use]
    pub fn correlated(&self, correlation_id: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }
}

/// File-backed publisher appending JSON lines.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            if backlog.len() == self.capacity {
                backlog.pop_front();
            }
            backlog.push_back(event.clone());
        }
        // no subscribers is not an error
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.sender.subscribe())
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
