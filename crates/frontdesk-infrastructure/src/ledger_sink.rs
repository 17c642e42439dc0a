//! Call ledger sinks.
//!
//! The engine publishes every ledger record through
//! [`LedgerSink`]; these sinks take it from there without blocking the
//! request path.

use crate::paths::FrontdeskPaths;
use frontdesk_core::config::LedgerConfig;
use frontdesk_core::error::{FrontdeskError, Result};
use frontdesk_core::ledger::{CallRecord, LedgerSink};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One exported ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub record: CallRecord,
}

/// Emits each record as a structured `tracing` event on the `ledger` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLedgerSink;

impl LedgerSink for TracingLedgerSink {
    fn publish(&self, session_id: Option<&str>, record: &CallRecord) {
        let status = match record.outcome.category() {
            None => "success".to_string(),
            Some(category) => format!("{:?}", category).to_lowercase(),
        };
        tracing::info!(
            target: "ledger",
            session_id = session_id.unwrap_or("-"),
            function = %record.function_name,
            status = %status,
            auto_filled = ?record.auto_filled_fields,
            extraction_attempted = record.extraction.as_ref().is_some_and(|r| r.attempted),
            "call recorded"
        );
    }
}

/// Appends records as JSON lines to a file from a background task.
///
/// `publish` only serializes and enqueues. The writer task exits once every
/// clone of the sink has been dropped and the queue is drained.
#[derive(Clone)]
pub struct JsonlLedgerSink {
    sender: mpsc::UnboundedSender<String>,
}

/// Writer task handle returned alongside a [`JsonlLedgerSink`].
pub type LedgerWriter = JoinHandle<Result<()>>;

impl JsonlLedgerSink {
    /// Starts the export configured in `[ledger]`, if enabled.
    pub async fn from_config(config: &LedgerConfig) -> Result<Option<(Self, LedgerWriter)>> {
        if !config.export {
            return Ok(None);
        }
        let path = match config.export_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => FrontdeskPaths::default_ledger_file()
                .map_err(|e| FrontdeskError::config(e.to_string()))?,
        };
        Self::spawn(path).await.map(Some)
    }

    /// Opens (or creates) `path` for appending and starts the writer task.
    pub async fn spawn(path: impl AsRef<Path>) -> Result<(Self, LedgerWriter)> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| FrontdeskError::io(format!("{}: {}", path.display(), e)))?;
        tracing::info!("[JsonlLedgerSink] exporting call ledger to {}", path.display());

        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(line) = receiver.recv().await {
                file.write_all(line.as_bytes()).await?;
                file.write_all(b"\n").await?;
                file.flush().await?;
            }
            tracing::debug!("[JsonlLedgerSink] writer finished");
            Ok::<(), FrontdeskError>(())
        });

        Ok((Self { sender }, writer))
    }
}

impl LedgerSink for JsonlLedgerSink {
    fn publish(&self, session_id: Option<&str>, record: &CallRecord) {
        let line = LedgerLine {
            session_id: session_id.map(str::to_string),
            record: record.clone(),
        };
        match serde_json::to_string(&line) {
            Ok(json) => {
                if self.sender.send(json).is_err() {
                    tracing::warn!("[JsonlLedgerSink] writer stopped, record dropped");
                }
            }
            Err(e) => tracing::warn!("[JsonlLedgerSink] could not serialize record: {}", e),
        }
    }
}

/// Publishes to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutLedgerSink {
    sinks: Vec<Arc<dyn LedgerSink>>,
}

impl FanoutLedgerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn LedgerSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LedgerSink for FanoutLedgerSink {
    fn publish(&self, session_id: Option<&str>, record: &CallRecord) {
        for sink in &self.sinks {
            sink.publish(session_id, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdesk_core::ledger::CallOutcome;
    use frontdesk_core::params::Params;
    use serde_json::json;
    use std::sync::Mutex;

    fn record(function_name: &str) -> CallRecord {
        CallRecord::new(
            function_name,
            Params::new(),
            vec!["PatNum".to_string()],
            CallOutcome::Success {
                result: json!({ "ok": true }),
            },
        )
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");

        let (sink, writer) = JsonlLedgerSink::spawn(&path).await.unwrap();
        sink.publish(Some("call-1"), &record("CreatePatient"));
        sink.publish(None, &record("GetClinicHours"));
        drop(sink);
        writer.await.unwrap().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LedgerLine> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].session_id.as_deref(), Some("call-1"));
        assert_eq!(lines[0].record.function_name, "CreatePatient");
        assert!(lines[1].session_id.is_none());
    }

    #[tokio::test]
    async fn test_export_is_off_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut config = LedgerConfig {
            export: false,
            export_path: Some(path.display().to_string()),
        };
        assert!(JsonlLedgerSink::from_config(&config).await.unwrap().is_none());
        assert!(!path.exists());

        config.export = true;
        let (sink, writer) = JsonlLedgerSink::from_config(&config).await.unwrap().unwrap();
        sink.publish(Some("call-9"), &record("GetClinicHours"));
        drop(sink);
        writer.await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }

    #[derive(Default)]
    struct Counting(Mutex<usize>);

    impl LedgerSink for Counting {
        fn publish(&self, _session_id: Option<&str>, _record: &CallRecord) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let fanout = FanoutLedgerSink::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingLedgerSink));
        fanout.publish(Some("s"), &record("SearchPatients"));

        assert_eq!(fanout.len(), 3);
        assert_eq!(*a.0.lock().unwrap(), 1);
        assert_eq!(*b.0.lock().unwrap(), 1);
    }
}
