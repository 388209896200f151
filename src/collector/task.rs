//! Scrape tasks: one fetch followed by an ordered list of handlers.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::DecodeError;
use crate::collector::Endpoint;
use crate::transport::{Credentials, Transport, TransportError};

/// Errors a handler can report.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The response body could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Any other handler-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Errors that end a scrape task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The fetch failed; no handler ran.
    #[error("fetch failed: {0}")]
    Fetch(#[from] TransportError),

    /// Handler `index` failed; later handlers were skipped.
    #[error("handler {index} failed: {source}")]
    Handler {
        index: usize,
        #[source]
        source: HandlerError,
    },
}

impl TaskError {
    /// Whether the task stopped because cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Fetch(TransportError::Canceled))
    }
}

/// Turns a fetched body into metric writes.
///
/// Handlers run synchronously on a pool worker: they must not block and must
/// not keep the body after returning. Metric writes are best-effort; a missing
/// metric is not a handler failure.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, body: &[u8]) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        self(body)
    }
}

/// Produces the raw bytes a task hands to its handlers.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Bytes, TransportError>;
}

/// [`Fetch`] backed by an async closure.
pub struct FetchFn<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut> Fetch for FetchFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, TransportError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<Bytes, TransportError> {
        (self.0)().await
    }
}

/// [`Fetch`] issuing a GET for one endpoint through a shared [`Transport`].
#[derive(Debug, Clone)]
pub struct EndpointFetch {
    transport: Arc<Transport>,
    base_url: Url,
    endpoint: Endpoint,
    credentials: Option<Credentials>,
    cancel: CancellationToken,
}

impl EndpointFetch {
    pub fn new(
        transport: Arc<Transport>,
        base_url: Url,
        endpoint: Endpoint,
        credentials: Option<Credentials>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            base_url,
            endpoint,
            credentials,
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl Fetch for EndpointFetch {
    async fn fetch(&self) -> Result<Bytes, TransportError> {
        self.transport
            .get(
                &self.base_url,
                self.endpoint.as_str(),
                self.credentials.as_ref(),
                &self.cancel,
            )
            .await
    }
}

/// One independent unit of scrape work.
pub struct ScrapeTask {
    name: String,
    fetch: Box<dyn Fetch>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl std::fmt::Debug for ScrapeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeTask")
            .field("name", &self.name)
            .field("handler_count", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl ScrapeTask {
    /// Create a task. `name` is used only for diagnostics.
    pub fn new(
        name: impl Into<String>,
        fetch: impl Fetch,
        handlers: Vec<Arc<dyn Handler>>,
    ) -> Self {
        Self {
            name: name.into(),
            fetch: Box::new(fetch),
            handlers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Fetch, then run every handler in order.
    ///
    /// # Errors
    /// - `TaskError::Fetch` if the fetch fails (no handler runs)
    /// - `TaskError::Handler` for the first failing handler (later ones are skipped)
    pub async fn run(&self) -> Result<(), TaskError> {
        let body = self.fetch.fetch().await?;

        for (index, handler) in self.handlers.iter().enumerate() {
            handler
                .handle(&body)
                .map_err(|source| TaskError::Handler { index, source })?;
        }

        tracing::trace!(
            task = %self.name,
            bytes = body.len(),
            handlers = self.handlers.len(),
            "Scrape task handled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fixed_body(body: &'static [u8]) -> impl Fetch {
        FetchFn(move || std::future::ready(Ok::<_, TransportError>(Bytes::from_static(body))))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn Handler> {
        let log = Arc::clone(log);
        Arc::new(move |body: &[u8]| -> Result<(), HandlerError> {
            log.lock()
                .unwrap()
                .push(format!("{label}:{}", String::from_utf8_lossy(body)));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task = ScrapeTask::new(
            "ordered",
            fixed_body(b"body"),
            vec![recorder(&log, "first"), recorder(&log, "second")],
        );

        task.run().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first:body", "second:body"]);
    }

    #[tokio::test]
    async fn test_first_handler_error_stops_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn Handler> =
            Arc::new(|_: &[u8]| -> Result<(), HandlerError> {
                Err(HandlerError::Other("rejected".to_string()))
            });
        let task = ScrapeTask::new(
            "failing",
            fixed_body(b"body"),
            vec![recorder(&log, "first"), failing, recorder(&log, "third")],
        );

        let err = task.run().await.unwrap_err();
        assert!(matches!(err, TaskError::Handler { index: 1, .. }));
        assert!(err.to_string().contains("rejected"));
        assert_eq!(*log.lock().unwrap(), vec!["first:body"]);
    }

    #[tokio::test]
    async fn test_fetch_error_skips_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task = ScrapeTask::new(
            "unreachable",
            FetchFn(|| async { Err::<Bytes, _>(TransportError::Status { code: 404 }) }),
            vec![recorder(&log, "first")],
        );

        let err = task.run().await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Fetch(TransportError::Status { code: 404 })
        ));
        assert!(!err.is_canceled());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_canceled_fetch() {
        let task = ScrapeTask::new(
            "canceled",
            FetchFn(|| async { Err::<Bytes, _>(TransportError::Canceled) }),
            Vec::new(),
        );
        assert!(task.run().await.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn test_decode_error_converts() {
        let decode: Arc<dyn Handler> = Arc::new(|body: &[u8]| -> Result<(), HandlerError> {
            crate::codec::decode(body)?;
            Ok(())
        });
        let task = ScrapeTask::new("decode", fixed_body(b"{not json"), vec![decode]);

        let err = task.run().await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Handler {
                index: 0,
                source: HandlerError::Decode(_)
            }
        ));
    }

    #[test]
    fn test_task_debug() {
        let task = ScrapeTask::new("dbg", fixed_body(b""), Vec::new());
        let debug = format!("{task:?}");
        assert!(debug.contains("dbg"));
        assert!(debug.contains("handler_count: 0"));
    }
}
