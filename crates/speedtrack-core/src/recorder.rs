use crate::errors::StoreError;
use crate::model::Record;
use crate::normalize::normalize;
use crate::probe::ProbeResult;
use crate::scheduler::RunEvent;
use crate::storage::Store;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Persists successful runs published by the scheduler.
///
/// Store failures are logged and dropped here; they never reach the
/// scheduler, which keeps its cadence regardless.
#[derive(Clone)]
pub struct Recorder {
    store: Store,
}

impl Recorder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn persist(&self, result: &ProbeResult) -> Result<Record, StoreError> {
        let record = normalize(result);
        tracing::debug!(event = "speedtest_result", record = ?record);
        self.store.insert_record(&record)?;
        Ok(record)
    }

    pub fn handle(&self, event: &RunEvent) -> Option<Record> {
        match event {
            RunEvent::Started => {
                tracing::info!(event = "speedtest_started", "a speedtest has started");
                None
            }
            RunEvent::Succeeded(result) => match self.persist(result) {
                Ok(record) => {
                    tracing::info!(
                        event = "speedtest_recorded",
                        result_id = record.result_id().unwrap_or_default(),
                        timestamp = record.timestamp().unwrap_or_default(),
                        "speedtest run finished"
                    );
                    Some(record)
                }
                Err(e) => {
                    tracing::error!(
                        event = "speedtest_persist_failed",
                        duplicate = e.is_duplicate(),
                        error = %e,
                        "failed to write speedtest result"
                    );
                    None
                }
            },
            RunEvent::Failed(err) => {
                tracing::error!(
                    event = "speedtest_failed",
                    error = %err,
                    "encountered an issue when executing speedtest"
                );
                None
            }
        }
    }

    /// Consumes events until the scheduler goes away.
    pub fn spawn(self, mut events: broadcast::Receiver<RunEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.handle(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(event = "recorder_lagged", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(event = "recorder_stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ResultLink;
    use std::sync::Arc;

    fn result(id: &str) -> ProbeResult {
        ProbeResult {
            timestamp: Some(chrono::Utc::now()),
            result: Some(ResultLink {
                id: Some(id.into()),
                url: None,
            }),
            ..Default::default()
        }
    }

    fn recorder() -> (Recorder, Store) {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        (Recorder::new(store.clone()), store)
    }

    #[test]
    fn test_success_is_persisted() -> anyhow::Result<()> {
        let (rec, store) = recorder();
        let out = rec.handle(&RunEvent::Succeeded(Arc::new(result("r1"))));
        assert_eq!(out.and_then(|r| r.result_id().map(String::from)), Some("r1".into()));
        assert_eq!(store.count()?, 1);
        Ok(())
    }

    #[test]
    fn test_duplicate_is_logged_and_dropped() -> anyhow::Result<()> {
        let (rec, store) = recorder();
        let ev = RunEvent::Succeeded(Arc::new(result("r1")));
        assert!(rec.handle(&ev).is_some());
        assert!(rec.handle(&ev).is_none());
        assert_eq!(store.count()?, 1);
        assert!(rec.persist(&result("r1")).unwrap_err().is_duplicate());
        Ok(())
    }

    #[test]
    fn test_started_and_failed_write_nothing() -> anyhow::Result<()> {
        let (rec, store) = recorder();
        assert!(rec.handle(&RunEvent::Started).is_none());
        assert!(rec
            .handle(&RunEvent::Failed(Arc::new(anyhow::anyhow!("boom"))))
            .is_none());
        assert_eq!(store.count()?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_spawned_recorder_drains_until_closed() -> anyhow::Result<()> {
        let (rec, store) = recorder();
        let (tx, rx) = broadcast::channel(8);
        let task = rec.spawn(rx);

        tx.send(RunEvent::Started)?;
        tx.send(RunEvent::Succeeded(Arc::new(result("a"))))?;
        tx.send(RunEvent::Succeeded(Arc::new(result("b"))))?;
        drop(tx);

        task.await?;
        assert_eq!(store.count()?, 2);
        Ok(())
    }
}
