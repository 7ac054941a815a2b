use crate::clock::Clock;
use crate::models::{new_id, Record};
use crate::storage::StorageProvider;
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Validates every element of a stored array and orders the survivors newest
/// first; malformed json yields an empty log.
pub fn parse_records<R: Record>(raw: Option<&str>, now_ms: i64) -> (Vec<R>, LoadReport) {
    let Some(raw) = raw else {
        return (Vec::new(), LoadReport::default());
    };

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            warn!("stored log is not an array, starting empty");
            return (Vec::new(), LoadReport::default());
        }
        Err(err) => {
            warn!("failed to parse stored log: {err}");
            return (Vec::new(), LoadReport::default());
        }
    };

    let mut records = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in &items {
        match R::normalize(item, now_ms) {
            Ok(record) => records.push(record),
            Err(reason) => {
                dropped += 1;
                debug!(%reason, "dropping stored record");
            }
        }
    }

    records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

    let report = LoadReport {
        kept: records.len(),
        dropped,
    };
    (records, report)
}

#[derive(Clone)]
struct Snapshot {
    version: u64,
    payload: Option<String>,
}

/// Owns one persisted collection of records.
///
/// Mutations apply to memory right away. The full collection is then handed to
/// a background writer; only the newest snapshot is kept, so bursts collapse
/// into a single write and the last one wins. Failed writes are logged and
/// flip [`EventLog::is_degraded`]; they are not retried.
pub struct EventLog<R: Record> {
    key: String,
    records: Vec<R>,
    clock: Arc<dyn Clock>,
    report: LoadReport,
    version: u64,
    pending: watch::Sender<Snapshot>,
    written: watch::Receiver<u64>,
    degraded: Arc<AtomicBool>,
}

impl<R: Record> EventLog<R> {
    /// Must be called within a tokio runtime; the writer task is spawned here.
    pub async fn load(
        storage: Arc<dyn StorageProvider>,
        key: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = key.into();
        let degraded = Arc::new(AtomicBool::new(false));

        let raw = match storage.get(&key).await {
            Ok(raw) => raw,
            Err(err) => {
                error!(key = %key, "failed to read stored log: {err}");
                degraded.store(true, Ordering::SeqCst);
                None
            }
        };

        let (records, report) = parse_records::<R>(raw.as_deref(), clock.now_ms());
        if report.dropped > 0 {
            warn!(key = %key, dropped = report.dropped, "dropped invalid records while loading");
        }
        info!(key = %key, kept = report.kept, "loaded log");

        let (pending, pending_rx) = watch::channel(Snapshot {
            version: 0,
            payload: None,
        });
        let (written_tx, written) = watch::channel(0u64);
        tokio::spawn(run_writer(
            storage,
            key.clone(),
            pending_rx,
            written_tx,
            Arc::clone(&degraded),
        ));

        Self {
            key,
            records,
            clock,
            report,
            version: 0,
            pending,
            written,
            degraded,
        }
    }

    /// Records newest first.
    pub fn snapshot(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn report(&self) -> LoadReport {
        self.report
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn append(&mut self, draft: R::Draft) -> Option<R> {
        let record = R::from_draft(draft, new_id(), self.clock.now_ms())?;
        self.records.insert(0, record.clone());
        self.schedule_write();
        Some(record)
    }

    /// Returns whether a record was removed; unknown ids are a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|record| record.id() != id);
        let removed = self.records.len() != before;
        self.schedule_write();
        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.schedule_write();
    }

    /// Waits until the newest scheduled snapshot has been handed to storage.
    pub async fn flush(&self) {
        let target = self.version;
        let mut written = self.written.clone();
        // the writer only goes away once the sender is dropped, which cannot
        // happen while `self` is alive
        let _ = written.wait_for(|done| *done >= target).await;
    }

    fn schedule_write(&mut self) {
        let payload = match serde_json::to_string(&self.records) {
            Ok(payload) => payload,
            Err(err) => {
                error!(key = %self.key, "failed to serialize log: {err}");
                self.degraded.store(true, Ordering::SeqCst);
                return;
            }
        };
        self.version += 1;
        self.pending.send_replace(Snapshot {
            version: self.version,
            payload: Some(payload),
        });
    }
}

async fn run_writer(
    storage: Arc<dyn StorageProvider>,
    key: String,
    mut pending: watch::Receiver<Snapshot>,
    written: watch::Sender<u64>,
    degraded: Arc<AtomicBool>,
) {
    while pending.changed().await.is_ok() {
        let snapshot = pending.borrow_and_update().clone();
        let Some(payload) = snapshot.payload else {
            continue;
        };

        match storage.set(&key, &payload).await {
            Ok(()) => {
                if degraded.swap(false, Ordering::SeqCst) {
                    info!(key = %key, "persistence recovered");
                }
            }
            Err(err) => {
                error!(key = %key, "failed to persist log: {err}");
                degraded.store(true, Ordering::SeqCst);
            }
        }
        written.send_replace(snapshot.version);
    }
    debug!(key = %key, "log writer stopped");
}
