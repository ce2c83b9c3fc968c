pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod scheduler;
pub mod tasks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use engine::{
    DayLogEntry, EngineConfig, HeartbeatOutcome, StopReport, TimerEngine, TimerSnapshot,
    TimerStateForAPI, TimerStatus,
};
pub use error::{EngineError, PersistenceError};
pub use persistence::{CellValue, MemoryGateway, PersistenceGateway, Record, SqliteGateway};
pub use runtime::{EngineHandle, EngineRuntime};
pub use tasks::{AddOutcome, TaskRegistry};


/// Logging: `info` by default when RUST_LOG is not set
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
