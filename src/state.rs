use crate::clock::Clock;
use crate::event_log::EventLog;
use crate::models::{BoxOpen, SmokeEvent, BOX_LOG_KEY, SMOKE_LOG_KEY};
use crate::storage::StorageProvider;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub smokes: Arc<Mutex<EventLog<SmokeEvent>>>,
    pub boxes: Arc<Mutex<EventLog<BoxOpen>>>,
}

impl AppState {
    /// Loads both logs from `storage`; must run inside a tokio runtime.
    pub async fn load(storage: Arc<dyn StorageProvider>, clock: Arc<dyn Clock>) -> Self {
        let smokes = EventLog::load(Arc::clone(&storage), SMOKE_LOG_KEY, Arc::clone(&clock)).await;
        let boxes = EventLog::load(storage, BOX_LOG_KEY, Arc::clone(&clock)).await;
        Self {
            clock,
            smokes: Arc::new(Mutex::new(smokes)),
            boxes: Arc::new(Mutex::new(boxes)),
        }
    }

    pub async fn flush(&self) {
        self.smokes.lock().await.flush().await;
        self.boxes.lock().await.flush().await;
    }
}
