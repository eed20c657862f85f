use crate::codec::{decode_catalog_with, DecodeOptions};
use crate::error::{FetchError, TransportFailure};
use crate::models::Catalog;
use crate::state::{CatalogState, CatalogSubscription};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

/// Where a catalog comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Absolute `http`/`https` URL, validated before any request is made
    Remote(String),
    /// Document bytes already read by the caller, e.g. from an imported file
    Local(Vec<u8>),
}

impl From<&str> for SourceLocation {
    fn from(url: &str) -> Self {
        SourceLocation::Remote(url.to_string())
    }
}

impl From<String> for SourceLocation {
    fn from(url: String) -> Self {
        SourceLocation::Remote(url)
    }
}

impl From<Vec<u8>> for SourceLocation {
    fn from(bytes: Vec<u8>) -> Self {
        SourceLocation::Local(bytes)
    }
}

/// Validates a remote source location
pub fn parse_source_url(input: &str) -> Result<Url, FetchError> {
    let malformed = |reason: &str| FetchError::MalformedLocation {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(input.trim()).map_err(|err| malformed(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(malformed("scheme must be http or https"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(malformed("missing host"));
    }
    Ok(url)
}

/// Retrieves and decodes catalogs, publishing each success as the current
/// catalog.
///
/// Fetches are independent: overlapping calls are not queued, and whichever
/// one completes last decides the published catalog. A failed fetch leaves
/// the published catalog untouched and reports its error only to its caller.
pub struct SourceFetcher<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    state: CatalogState,
    options: DecodeOptions,
    runtime: Option<Handle>,
}

impl<T> Clone for SourceFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> SourceFetcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, DecodeOptions::default())
    }

    /// Callback-style fetches are spawned on the runtime the fetcher is
    /// created in, if any
    pub fn with_options(transport: T, options: DecodeOptions) -> Self {
        Self::build(transport, options, Handle::try_current().ok())
    }

    /// Callback-style fetches are spawned on and complete on `runtime`
    pub fn with_runtime(transport: T, options: DecodeOptions, runtime: Handle) -> Self {
        Self::build(transport, options, Some(runtime))
    }

    fn build(transport: T, options: DecodeOptions, runtime: Option<Handle>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                state: CatalogState::new(),
                options,
                runtime,
            }),
        }
    }

    /// Latest successfully fetched catalog
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.inner.state.current()
    }

    pub fn subscribe(&self) -> CatalogSubscription {
        self.inner.state.subscribe()
    }

    /// Fetches and decodes a catalog, publishing it on success
    pub async fn fetch_source(
        &self,
        location: impl Into<SourceLocation>,
    ) -> Result<Arc<Catalog>, FetchError> {
        let result = self.retrieve_and_decode(location.into()).await;

        match &result {
            Ok(catalog) => {
                self.inner.state.publish(Arc::clone(catalog));
                tracing::info!(
                    "Published catalog {} ({} apps)",
                    catalog.name,
                    catalog.apps.len()
                );
            }
            Err(err) => {
                tracing::warn!("Fetch failed: {}", err);
            }
        }

        result
    }

    /// Callback form of [`fetch_source`](Self::fetch_source).
    ///
    /// Returns immediately. The fetch runs on the fetcher's runtime and
    /// `on_complete` is invoked there exactly once with the result.
    ///
    /// # Panics
    ///
    /// Panics when the fetcher has no runtime and this is called outside one.
    pub fn fetch_source_with<F>(
        &self,
        location: impl Into<SourceLocation>,
        on_complete: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Arc<Catalog>, FetchError>) + Send + 'static,
    {
        let fetcher = self.clone();
        let location = location.into();
        let task = async move {
            let result = fetcher.fetch_source(location).await;
            on_complete(result);
        };

        match &self.inner.runtime {
            Some(runtime) => runtime.spawn(task),
            None => tokio::spawn(task),
        }
    }

    async fn retrieve_and_decode(
        &self,
        location: SourceLocation,
    ) -> Result<Arc<Catalog>, FetchError> {
        let bytes = match location {
            SourceLocation::Remote(input) => {
                let url = parse_source_url(&input)?;
                self.retrieve(&url).await?
            }
            SourceLocation::Local(bytes) => {
                tracing::debug!("Decoding local source ({} bytes)", bytes.len());
                bytes
            }
        };

        if bytes.is_empty() {
            return Err(FetchError::EmptyPayload);
        }

        let catalog = decode_catalog_with(&bytes, self.inner.options)?;
        Ok(Arc::new(catalog))
    }

    async fn retrieve(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .inner
            .transport
            .get(url)
            .await
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                failure: TransportFailure::Network(err),
            })?;

        if !response.is_success() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                failure: TransportFailure::Status(response.status),
            });
        }

        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeError, EmptyVersionsPolicy};
    use crate::transport::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn source_json(name: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "name": name,
            "apps": [{
                "name": "A",
                "bundleIdentifier": "com.a",
                "developerName": "Dev",
                "localizedDescription": "d",
                "iconURL": "http://x/i.png",
                "versions": [{
                    "version": "1.0",
                    "date": "2024-01-01",
                    "downloadURL": "http://x/a.ipa",
                    "size": 100
                }]
            }]
        }))
        .unwrap()
    }

    /// Serves canned responses per URL and counts requests
    #[derive(Default)]
    struct FakeTransport {
        responses: HashMap<String, Result<TransportResponse, String>>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn with(mut self, url: &str, status: u16, body: Vec<u8>) -> Self {
            self.responses
                .insert(url.to_string(), Ok(TransportResponse { status, body }));
            self
        }

        fn failing(mut self, url: &str, message: &str) -> Self {
            self.responses.insert(url.to_string(), Err(message.to_string()));
            self
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(url.as_str()) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(message)) => Err(TransportError::Other(message.clone())),
                None => Ok(TransportResponse {
                    status: 404,
                    body: Vec::new(),
                }),
            }
        }
    }

    /// Holds each response until the test releases it
    #[derive(Default)]
    struct GatedTransport {
        gates: Mutex<HashMap<String, oneshot::Receiver<Vec<u8>>>>,
    }

    impl GatedTransport {
        fn gate(&self, url: &str) -> oneshot::Sender<Vec<u8>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(url.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError> {
            let gate = self
                .gates
                .lock()
                .unwrap()
                .remove(url.as_str())
                .ok_or_else(|| TransportError::Other(format!("no gate for {url}")))?;
            let body = gate
                .await
                .map_err(|_| TransportError::Other("gate dropped".to_string()))?;
            Ok(TransportResponse { status: 200, body })
        }
    }

    #[test]
    fn test_parse_source_url() {
        assert!(parse_source_url("https://example.com/source.json").is_ok());
        assert!(parse_source_url("http://127.0.0.1:8080/").is_ok());

        let inputs = [
            "not a url",
            "",
            "/relative/path.json",
            "ftp://example.com/a",
            "mailto:a@b.c",
        ];
        for input in inputs {
            let err = parse_source_url(input).unwrap_err();
            assert!(
                matches!(err, FetchError::MalformedLocation { .. }),
                "{input:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_decodes_and_publishes() {
        let url = "https://example.com/source.json";
        let transport = FakeTransport::default().with(url, 200, source_json("Test"));
        let fetcher = SourceFetcher::new(transport);
        let mut subscription = fetcher.subscribe();

        let catalog = fetcher.fetch_source(url).await.unwrap();

        assert_eq!(catalog.name, "Test");
        assert_eq!(catalog.apps[0].versions[0].size, 100);
        assert_eq!(fetcher.current().unwrap().name, "Test");
        assert_eq!(subscription.changed().await.unwrap().name, "Test");
    }

    #[tokio::test]
    async fn test_malformed_url_never_hits_transport() {
        let fetcher = SourceFetcher::new(FakeTransport::default());

        let err = fetcher.fetch_source("not a url").await.unwrap_err();

        assert!(matches!(err, FetchError::MalformedLocation { .. }));
        assert_eq!(fetcher.inner.transport.calls.load(Ordering::SeqCst), 0);
        assert!(fetcher.current().is_none());
    }

    #[tokio::test]
    async fn test_error_status_keeps_published_catalog() {
        let good = "https://example.com/good.json";
        let broken = "https://example.com/broken.json";
        let fetcher = SourceFetcher::new(
            FakeTransport::default()
                .with(good, 200, source_json("Good"))
                .with(broken, 503, b"unavailable".to_vec()),
        );

        fetcher.fetch_source(good).await.unwrap();
        let subscription = fetcher.subscribe();

        let err = fetcher.fetch_source(broken).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(fetcher.current().unwrap().name, "Good");
        assert!(!subscription.has_changed(), "failures must not be broadcast");
        assert_eq!(fetcher.inner.transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let url = "https://example.com/source.json";
        let transport = FakeTransport::default().failing(url, "connection refused");
        let fetcher = SourceFetcher::new(transport);

        let err = fetcher.fetch_source(url).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Transport {
                failure: TransportFailure::Network(_),
                ..
            }
        ));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_body_is_empty_payload() {
        let url = "https://example.com/source.json";
        let fetcher = SourceFetcher::new(FakeTransport::default().with(url, 200, Vec::new()));

        let err = fetcher.fetch_source(url).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyPayload));
    }

    #[tokio::test]
    async fn test_invalid_document_is_decode_error_and_not_published() {
        let url = "https://example.com/source.json";
        let transport = FakeTransport::default().with(url, 200, b"{\"apps\": []}".to_vec());
        let fetcher = SourceFetcher::new(transport);

        let err = fetcher.fetch_source(url).await.unwrap_err();

        assert!(matches!(err, FetchError::Decode(DecodeError::Schema { .. })));
        assert!(fetcher.current().is_none());
    }

    #[tokio::test]
    async fn test_local_bytes_skip_transport() {
        let fetcher = SourceFetcher::new(FakeTransport::default());

        let catalog = fetcher.fetch_source(source_json("Imported")).await.unwrap();

        assert_eq!(catalog.name, "Imported");
        assert_eq!(fetcher.current().unwrap().name, "Imported");
        assert_eq!(fetcher.inner.transport.calls.load(Ordering::SeqCst), 0);

        let err = fetcher.fetch_source(Vec::<u8>::new()).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyPayload));
        assert_eq!(fetcher.current().unwrap().name, "Imported");
    }

    #[tokio::test]
    async fn test_decode_options_apply() {
        let mut document: serde_json::Value = serde_json::from_slice(&source_json("Test")).unwrap();
        document["apps"][0]["versions"] = serde_json::json!([]);
        let bytes = serde_json::to_vec(&document).unwrap();

        let strict = SourceFetcher::with_options(
            FakeTransport::default(),
            DecodeOptions {
                empty_versions: EmptyVersionsPolicy::Reject,
            },
        );
        let err = strict.fetch_source(bytes.clone()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(DecodeError::NoVersions { .. })));

        let lenient = SourceFetcher::new(FakeTransport::default());
        let catalog = lenient.fetch_source(bytes).await.unwrap();
        assert!(!catalog.apps[0].is_installable());
    }

    #[tokio::test]
    async fn test_last_completion_wins() {
        let url_a = "https://example.com/a.json";
        let url_b = "https://example.com/b.json";
        let transport = GatedTransport::default();
        let release_a = transport.gate(url_a);
        let release_b = transport.gate(url_b);
        let fetcher = SourceFetcher::new(transport);

        let fetch_a = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_source(url_a).await }
        });
        tokio::task::yield_now().await;
        let fetch_b = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_source(url_b).await }
        });

        // B started after A but finishes first
        release_b.send(source_json("B")).unwrap();
        assert_eq!(fetch_b.await.unwrap().unwrap().name, "B");
        assert_eq!(fetcher.current().unwrap().name, "B");

        release_a.send(source_json("A")).unwrap();
        assert_eq!(fetch_a.await.unwrap().unwrap().name, "A");
        assert_eq!(fetcher.current().unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_callback_invoked_once_with_result() {
        let url = "https://example.com/source.json";
        let transport = FakeTransport::default().with(url, 200, source_json("Callback"));
        let fetcher = SourceFetcher::new(transport);
        let (tx, rx) = oneshot::channel();

        let handle = fetcher.fetch_source_with(url, move |result| {
            tx.send(result.map(|catalog| catalog.name.clone())).unwrap();
        });

        handle.await.unwrap();
        assert_eq!(rx.await.unwrap().unwrap(), "Callback");
        assert_eq!(fetcher.current().unwrap().name, "Callback");
    }

    #[tokio::test]
    async fn test_callback_receives_errors() {
        let fetcher = SourceFetcher::new(FakeTransport::default());
        let (tx, rx) = oneshot::channel();

        fetcher
            .fetch_source_with("not a url", move |result| {
                tx.send(result.err()).unwrap();
            })
            .await
            .unwrap();

        assert!(matches!(
            rx.await.unwrap(),
            Some(FetchError::MalformedLocation { .. })
        ));
    }

    #[test]
    fn test_callback_runs_on_configured_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let fetcher = SourceFetcher::with_runtime(
            FakeTransport::default(),
            DecodeOptions::default(),
            runtime.handle().clone(),
        );
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = fetcher.fetch_source_with(source_json("Local"), move |result| {
            let on_runtime = Handle::try_current().is_ok();
            tx.send((result.map(|catalog| catalog.name.clone()).ok(), on_runtime))
                .unwrap();
        });
        runtime.block_on(handle).unwrap();

        assert_eq!(rx.recv().unwrap(), (Some("Local".to_string()), true));
    }
}
