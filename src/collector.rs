//! Collector Layer
//!
//! Scrape machinery shared by all plugins. Each polled endpoint becomes a
//! [`ScrapeTask`] (one fetch plus an ordered handler list), and a [`TaskPool`]
//! runs the tasks in parallel under a bounded permit count.
//!
//! # Architecture
//!
//! - [`ScrapeTask`]: Fetch → handlers, first handler error stops the task
//! - [`TaskPool`]: Bounded executor isolating failures and panics per task
//! - [`DiagnosticsSink`]: Receives one [`Event`] per task outcome
//! - [`Endpoint`]: Relative path of a polled resource
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use leakwatch::collector::{FetchFn, ScrapeTask, TaskPool, TracingSink};
//! use leakwatch::transport::TransportError;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let pool = TaskPool::new(4, CancellationToken::new(), Arc::new(TracingSink));
//! pool.add_task(ScrapeTask::new(
//!     "static",
//!     FetchFn(|| async { Ok::<_, TransportError>(Bytes::from_static(b"{}")) }),
//!     Vec::new(),
//! ));
//! let report = pool.wait().await;
//! println!("{report}");
//! # }
//! ```

pub mod diagnostics;
mod endpoint;
mod pool;
mod task;

pub use diagnostics::{DiagnosticsSink, Event, EventKind, EventSeverity, MemorySink, TracingSink};
pub use endpoint::Endpoint;
pub use pool::{DEFAULT_CONCURRENCY, PoolReport, TaskOutcome, TaskPool};
pub use task::{EndpointFetch, Fetch, FetchFn, Handler, HandlerError, ScrapeTask, TaskError};
