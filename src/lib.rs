pub mod app;
pub mod clock;
pub mod config;
pub mod errors;
pub mod event_log;
pub mod handlers;
pub mod models;
pub mod stats;
pub mod storage;
pub mod ui;
pub mod state;

pub use app::router;
pub use config::Config;
pub use event_log::{EventLog, LoadReport};
pub use state::AppState;
pub use storage::{FileStore, MemoryStore, MirroredStore, StorageProvider};
