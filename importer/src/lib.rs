//! Promtitude importer application.
//!
//! Wires the library crates into the background context: the import
//! service task, its processor loop, the status channel clients talk to,
//! and listing discovery feeding the queue. Core logic lives in `crates/`.

pub mod channel;
pub mod discover;
pub mod error;
pub mod processor;
pub mod progress;
pub mod service;
pub mod state;

pub use channel::{Request, Response, ServiceHandle};
pub use error::{Result, ServiceError};
pub use processor::{Processor, ProcessorSettings, RunControl};
pub use progress::{ProgressHub, ProgressSnapshot, Subscription};
pub use service::ImportService;
pub use state::{Phase, ProcessorState, StopReason};

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,promtitude=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
