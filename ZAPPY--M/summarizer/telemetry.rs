use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use parking_lot::Mutex;
use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};
use uuid::Uuid;

/// Builder for summarizer telemetry sinks.
pub struct SummarizerTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl SummarizerTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<SummarizerTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(SummarizerTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                event: self.event_publisher.map(EventHandle::new),
            }),
        })
    }
}

/// Telemetry handle shared across pipeline stages.
#[derive(Clone)]
pub struct SummarizerTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for SummarizerTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizerTelemetry")
            .field("module", &self.inner.module)
            .field("logs", &self.inner.logger.is_some())
            .field("events", &self.inner.event.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    // only built when publishing from outside a tokio runtime
    runtime: OnceCell<Runtime>,
    publisher: Arc<dyn EventPublisher>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runtime: OnceCell::new(),
            publisher,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            let task = handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            let mut pending = self.pending.lock();
            pending.retain(|task| !task.is_finished());
            pending.push(task);
            Ok(())
        } else {
            let runtime = self
                .runtime
                .get_or_try_init(|| Builder::new_current_thread().enable_all().build())?;
            runtime.block_on(self.publisher.publish(record))
        }
    }
}

impl SummarizerTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> SummarizerTelemetryBuilder {
        SummarizerTelemetryBuilder::new(module)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            if logger.enabled(level) {
                let record =
                    LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata);
                logger.log(&record)?;
            }
        }
        Ok(())
    }

    /// Emits an event on the bus, tagged with the run it belongs to.
    pub fn event(&self, event_type: &str, correlation_id: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            let record = EventRecord::new(
                format!("evt-{}", Uuid::new_v4()),
                self.inner.module.clone(),
                event_type,
                payload,
            )
            .correlated(correlation_id);
            handle.publish(record)?;
        }
        Ok(())
    }

    /// Waits for events published from inside a runtime to be delivered.
    pub async fn flush(&self) {
        let Some(handle) = &self.inner.event else {
            return;
        };
        let tasks: Vec<JoinHandle<()>> = handle.pending.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("summarizer.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = SummarizerTelemetry::builder("summarizer")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "summarizer.run.started", json!({ "sections": 3 }))
            .unwrap();
        telemetry
            .event("summarizer.section.completed", "run-1", json!({ "index": 0 }))
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("summarizer.run.started"));
        assert_eq!(bus.correlated("run-1").len(), 1);
    }

    #[test]
    fn min_level_filters_debug_records() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("summarizer.log");
        let telemetry = SummarizerTelemetry::builder("summarizer")
            .log_path(&path)
            .min_level(LogLevel::Warn)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "summarizer.terms.extracted", json!({}))
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "summarizer.section.degraded", json!({ "index": 1 }))
            .unwrap();
        let records = shared_logging::read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "summarizer.section.degraded");
    }

    #[tokio::test]
    async fn flush_waits_for_events_spawned_on_the_runtime() {
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = SummarizerTelemetry::builder("summarizer")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        for index in 0..3 {
            telemetry
                .event("summarizer.section.completed", "run-2", json!({ "index": index }))
                .unwrap();
        }
        telemetry.flush().await;
        assert_eq!(bus.correlated("run-2").len(), 3);
    }
}
