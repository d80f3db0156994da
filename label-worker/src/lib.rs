//! Label print dispatch worker
//!
//! # Overview
//!
//! Polls a remote queue for pending label jobs and drives each one to a
//! terminal state:
//!
//! - **Job source** (`source`): PostgREST client, fetch + state write-back
//! - **Rendering** (`render`): `.prn` templates + injected dynamic fields
//! - **Dispatch** (`dispatch`): per-format printer delivery with retries
//! - **Counters** (`counters`, `limiter`): durable ticket sequence and
//!   hourly label budget
//! - **Journal** (`journal`): append-only print records and notices
//!
//! A single worker instance owns the state files under the work dir;
//! multiple instances against the same dir would race the ticket
//! sequence.
//!
//! # Module structure
//!
//! ```text
//! label-worker/src/
//! ├── config.rs    # Environment configuration
//! ├── counters.rs  # Durable window + ticket state
//! ├── limiter.rs   # Hourly fixed-window admission
//! ├── job.rs       # Queue rows and label formats
//! ├── source.rs    # Remote queue client
//! ├── render.rs    # Template resolution + ZPL composition
//! ├── dispatch.rs  # Per-format delivery with retries
//! ├── journal.rs   # Append-only print records
//! ├── worker.rs    # The polling loop
//! └── logger.rs    # Tracing setup
//! ```

pub mod config;
pub mod counters;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod journal;
pub mod limiter;
pub mod logger;
pub mod render;
pub mod source;
pub mod worker;

// Re-export public types
pub use config::{Config, ConfigError, PrinterTransport};
pub use counters::{CounterError, CounterResult, CounterStore, RateWindow};
pub use dispatch::{build_printer, DispatchError, DispatchResult, PrintDispatcher};
pub use error::{WorkerError, WorkerResult};
pub use job::{JobState, LabelFormat, PrintJob};
pub use journal::{JournalError, JournalResult, PrintAttempt, PrintJournal};
pub use limiter::RateLimiter;
pub use render::{LabelRenderer, RenderError, RenderResult};
pub use source::{
    ColorCatalog, JobSource, MaterialColors, SourceError, SourceResult, SupabaseJobSource,
};
pub use worker::PrintWorker;

// Re-export logger functions
pub use logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    __          __         __
   / /   ____ _/ /_  ___  / /
  / /   / __ `/ __ \/ _ \/ /
 / /___/ /_/ / /_/ /  __/ /
/_____/\__,_/_.___/\___/_/
 _       __           __
| |     / /___  _____/ /_____  _____
| | /| / / __ \/ ___/ //_/ _ \/ ___/
| |/ |/ / /_/ / /  / ,< /  __/ /
|__/|__/\____/_/  /_/|_|\___/_/
    "#
    );
}
