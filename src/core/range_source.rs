use super::chunked_stream::{write_store, ChunkStore};
use super::error::{PDFError, PDFResult};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use std::sync::{Arc, RwLock};

/// The byte-range source contract.
///
/// A source owns the transport for one document's bytes and a shared
/// `ChunkStore` that tracks what has arrived. The demand-paged accessor
/// drives it: when an operation signals a missing range, the accessor calls
/// `request_range` and retries. The source never interprets the bytes.
#[async_trait]
pub trait RangeSource: Send {
    /// Total byte length of the document.
    fn total_length(&self) -> usize;

    /// The shared chunk store; streams over this store are the "stream
    /// handle" other layers read from.
    fn store(&self) -> Arc<RwLock<ChunkStore>>;

    /// Fetches the half-open byte range `[begin, end)`. Ranges that are
    /// already resident are not fetched again.
    async fn request_range(&mut self, begin: usize, end: usize) -> PDFResult<()>;

    /// Begins fetching every remaining byte, without waiting for
    /// completion.
    fn request_all(&mut self);

    /// Accepts progressively pushed bytes (front-to-back document order).
    fn on_receive_data(&mut self, chunk: &[u8]) -> PDFResult<()>;

    /// Resolves once every byte is resident, returning the complete
    /// buffer.
    async fn loaded_stream(&mut self) -> PDFResult<Vec<u8>>;

    /// Aborts the source: pending and future fetches fail with
    /// `PDFError::Aborted`.
    fn abort(&mut self, reason: &str);
}

/// A range source backed by HTTP range requests.
///
/// `open` probes the server with a HEAD request for the document length and
/// range support; each requested range is fetched chunk-run at a time with
/// `Range: bytes=...` requests expecting `206 Partial Content`.
pub struct HttpRangeSource {
    url: reqwest::Url,
    client: Client,
    store: Arc<RwLock<ChunkStore>>,
    total_length: usize,
    aborted: Option<String>,
}

impl HttpRangeSource {
    pub async fn open(url: reqwest::Url, chunk_size: Option<usize>) -> PDFResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PDFError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let response = client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| PDFError::Transport(format!("HEAD request failed: {}", e)))?;

        let accepts_ranges = response
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        if !accepts_ranges {
            return Err(PDFError::Transport(
                "server does not support range requests".to_string(),
            ));
        }

        let total_length: usize = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| PDFError::Transport("missing Content-Length header".to_string()))?;

        Ok(HttpRangeSource {
            url,
            client,
            store: Arc::new(RwLock::new(ChunkStore::new(total_length, chunk_size))),
            total_length,
            aborted: None,
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    fn check_aborted(&self) -> PDFResult<()> {
        match &self.aborted {
            Some(reason) => Err(PDFError::Aborted(reason.clone())),
            None => Ok(()),
        }
    }

    /// Fetches one chunk-aligned run and commits it to a store.
    async fn fetch_run(
        client: &Client,
        url: &reqwest::Url,
        store: &Arc<RwLock<ChunkStore>>,
        begin: usize,
        end: usize,
    ) -> PDFResult<()> {
        debug!("fetching byte range {}..{}", begin, end);

        let response = client
            .get(url.clone())
            .header("Range", format!("bytes={}-{}", begin, end - 1))
            .send()
            .await
            .map_err(|e| PDFError::Transport(format!("range request failed: {}", e)))?;

        if response.status().as_u16() != 206 {
            return Err(PDFError::Transport(format!(
                "expected 206 Partial Content, got {}",
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| PDFError::Transport(format!("failed to read response body: {}", e)))?;
        if data.len() != end - begin {
            return Err(PDFError::Transport(format!(
                "range response has {} bytes, expected {}",
                data.len(),
                end - begin
            )));
        }

        let mut store = write_store(store)?;
        let chunk_size = store.chunk_size();
        let first = store.chunk_of(begin);
        let last = store.chunk_of(end - 1);
        for chunk_num in first..=last {
            let chunk_begin = (chunk_num * chunk_size).max(begin) - begin;
            let chunk_end = (((chunk_num + 1) * chunk_size).min(end)) - begin;
            store.on_receive_chunk(chunk_num, data[chunk_begin..chunk_end].to_vec())?;
        }
        Ok(())
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    fn total_length(&self) -> usize {
        self.total_length
    }

    fn store(&self) -> Arc<RwLock<ChunkStore>> {
        Arc::clone(&self.store)
    }

    async fn request_range(&mut self, begin: usize, end: usize) -> PDFResult<()> {
        self.check_aborted()?;
        let runs = {
            let store = self
                .store
                .read()
                .map_err(|_| PDFError::Transport("chunk store lock poisoned".to_string()))?;
            store.missing_runs(begin, end)
        };

        for (run_begin, run_end) in runs {
            self.check_aborted()?;
            Self::fetch_run(&self.client, &self.url, &self.store, run_begin, run_end).await?;
        }
        Ok(())
    }

    fn request_all(&mut self) {
        if self.aborted.is_some() {
            return;
        }
        let client = self.client.clone();
        let url = self.url.clone();
        let store = Arc::clone(&self.store);
        let total = self.total_length;

        // Background prefetch; failures are logged, demand-paged reads
        // will retry the ranges they actually need.
        tokio::spawn(async move {
            let runs = match store.read() {
                Ok(s) => s.missing_runs(0, total),
                Err(_) => return,
            };
            for (begin, end) in runs {
                if let Err(e) = Self::fetch_run(&client, &url, &store, begin, end).await {
                    warn!("background prefetch of {}..{} failed: {}", begin, end, e);
                    return;
                }
            }
        });
    }

    fn on_receive_data(&mut self, chunk: &[u8]) -> PDFResult<()> {
        write_store(&self.store)?.push_progressive(chunk)
    }

    async fn loaded_stream(&mut self) -> PDFResult<Vec<u8>> {
        self.request_range(0, self.total_length).await?;
        self.store
            .read()
            .map_err(|_| PDFError::Transport("chunk store lock poisoned".to_string()))?
            .assemble()
    }

    fn abort(&mut self, reason: &str) {
        debug!("aborting range source: {}", reason);
        self.aborted = Some(reason.to_string());
    }
}

/// A range source serving from an in-memory buffer.
///
/// Behaves like a network source without the network: ranges become
/// resident only when requested, every request is logged, and an
/// `unresponsive` variant accepts requests without ever satisfying them.
/// This is the simulator behind the progressive-loading tests and the
/// default backing for pushed-byte scenarios.
pub struct MemoryRangeSource {
    data: Arc<Vec<u8>>,
    store: Arc<RwLock<ChunkStore>>,
    requests: Arc<std::sync::Mutex<Vec<(usize, usize)>>>,
    serve: bool,
    aborted: Option<String>,
}

impl MemoryRangeSource {
    /// A source that satisfies every requested range from `data`.
    pub fn new(data: Vec<u8>, chunk_size: Option<usize>) -> Self {
        let length = data.len();
        MemoryRangeSource {
            data: Arc::new(data),
            store: Arc::new(RwLock::new(ChunkStore::new(length, chunk_size))),
            requests: Arc::new(std::sync::Mutex::new(Vec::new())),
            serve: true,
            aborted: None,
        }
    }

    /// A source that records requests but never delivers bytes. Useful for
    /// exercising stall detection and abort paths.
    pub fn unresponsive(length: usize, chunk_size: Option<usize>) -> Self {
        MemoryRangeSource {
            data: Arc::new(Vec::new()),
            store: Arc::new(RwLock::new(ChunkStore::new(length, chunk_size))),
            requests: Arc::new(std::sync::Mutex::new(Vec::new())),
            serve: false,
            aborted: None,
        }
    }

    /// Shared handle to the request log; stays readable after the source
    /// has moved into an accessor.
    pub fn request_log(&self) -> Arc<std::sync::Mutex<Vec<(usize, usize)>>> {
        Arc::clone(&self.requests)
    }

    fn check_aborted(&self) -> PDFResult<()> {
        match &self.aborted {
            Some(reason) => Err(PDFError::Aborted(reason.clone())),
            None => Ok(()),
        }
    }

    fn fill(&self, begin: usize, end: usize) -> PDFResult<()> {
        let mut store = write_store(&self.store)?;
        let chunk_size = store.chunk_size();
        for (run_begin, run_end) in store.missing_runs(begin, end) {
            let first = run_begin / chunk_size;
            let last = (run_end - 1) / chunk_size;
            for chunk_num in first..=last {
                let chunk_begin = chunk_num * chunk_size;
                let chunk_end = (chunk_begin + chunk_size).min(self.data.len());
                store.on_receive_chunk(chunk_num, self.data[chunk_begin..chunk_end].to_vec())?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RangeSource for MemoryRangeSource {
    fn total_length(&self) -> usize {
        self.store
            .read()
            .map(|s| s.length())
            .unwrap_or(0)
    }

    fn store(&self) -> Arc<RwLock<ChunkStore>> {
        Arc::clone(&self.store)
    }

    async fn request_range(&mut self, begin: usize, end: usize) -> PDFResult<()> {
        self.check_aborted()?;
        if let Ok(mut log) = self.requests.lock() {
            log.push((begin, end));
        }
        if self.serve {
            self.fill(begin, end)?;
        }
        Ok(())
    }

    fn request_all(&mut self) {
        if self.aborted.is_none() && self.serve {
            let _ = self.fill(0, self.data.len());
        }
    }

    fn on_receive_data(&mut self, chunk: &[u8]) -> PDFResult<()> {
        write_store(&self.store)?.push_progressive(chunk)
    }

    async fn loaded_stream(&mut self) -> PDFResult<Vec<u8>> {
        self.check_aborted()?;
        if self.serve {
            self.fill(0, self.data.len())?;
        }
        let store = self
            .store
            .read()
            .map_err(|_| PDFError::Transport("chunk store lock poisoned".to_string()))?;
        if !store.is_complete() {
            return Err(PDFError::Transport(
                "source completed no further data".to_string(),
            ));
        }
        store.assemble()
    }

    fn abort(&mut self, reason: &str) {
        self.aborted = Some(reason.to_string());
    }
}
