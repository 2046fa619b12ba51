use super::base_stream::BaseStream;
use super::chunked_stream::ChunkedStream;
use super::document::PDFDocument;
use super::error::{PDFError, PDFResult};
use super::page::Page;
use super::primitives::Dict;
use super::range_source::{HttpRangeSource, RangeSource};
use super::stream::Stream;
use super::writer::{write_annotation_update, AnnotationRequest};
use log::debug;
use reqwest::Url;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A future resolving to a document's complete bytes, used to gate the
/// layered variant until its base document has materialized.
pub type BytesFuture = Pin<Box<dyn Future<Output = PDFResult<Vec<u8>>> + Send>>;

/// Ceiling on fetch-and-retry rounds within a single operation. The
/// fetched-range guard already ensures termination; this bounds the cost of
/// pathological documents that touch an absurd number of distinct ranges.
const MAX_ENSURE_RETRIES: usize = 64;

/// Outcome of one attempt at an operation: either the result is ready or a
/// byte range must be fetched first.
enum Progress<T> {
    Ready(T),
    Needs((usize, usize)),
}

/// Splits the recoverable missing-range signal from terminal errors. Every
/// error other than `DataMissing` propagates unchanged.
fn classify<T>(result: PDFResult<T>) -> PDFResult<Progress<T>> {
    match result {
        Ok(value) => Ok(Progress::Ready(value)),
        Err(PDFError::DataMissing { begin, end }) => Ok(Progress::Needs((begin, end))),
        Err(e) => Err(e),
    }
}

/// Construction options shared by all accessor variants.
#[derive(Debug, Clone, Default)]
pub struct AccessorOptions {
    /// Password for encrypted documents (kept with the accessor; this
    /// crate does not decrypt)
    pub password: Option<String>,

    /// Base URL that relative document URLs resolve against. Validated
    /// and normalized once at construction.
    pub base_url: Option<String>,

    /// Chunk size for ranged fetching (default 64KB)
    pub chunk_size: Option<usize>,
}

/// How an accessor gets bytes. One accessor type, three policies.
enum FetchStrategy {
    /// All bytes resident from the start.
    Resident { bytes: Arc<Vec<u8>> },

    /// Bytes arrive on demand through a byte-range source.
    Ranged { source: Box<dyn RangeSource> },

    /// An original document plus one appended update fragment. The
    /// one-time concatenation gates every operation; afterwards the
    /// variant behaves exactly like `Resident`.
    Layered {
        base: Option<BytesFuture>,
        update: Vec<u8>,
        merged: Option<Arc<Vec<u8>>>,
    },
}

/// Demand-paged access to one document.
///
/// Wraps a parsed document and resolves operations against it,
/// transparently materializing the byte ranges each operation needs: an
/// attempt that signals a missing range triggers a fetch through the
/// byte-range source and a retry of the same operation from scratch.
///
/// Mutations serialize through `&mut self`: two `annotate` calls on the
/// same accessor cannot overlap, which is what keeps `trailer.Size`
/// read-then-mint safe.
pub struct DocumentAccessor {
    id: String,
    password: Option<String>,
    base_url: Option<Url>,
    strategy: FetchStrategy,
    doc: Option<PDFDocument>,
}

impl DocumentAccessor {
    /// A fully-resident local document.
    pub fn local(id: impl Into<String>, bytes: Vec<u8>, options: AccessorOptions) -> PDFResult<Self> {
        Self::with_options(
            id.into(),
            FetchStrategy::Resident {
                bytes: Arc::new(bytes),
            },
            options,
        )
    }

    /// A progressively-fetched document over an arbitrary range source.
    pub fn network(
        id: impl Into<String>,
        source: Box<dyn RangeSource>,
        options: AccessorOptions,
    ) -> PDFResult<Self> {
        Self::with_options(id.into(), FetchStrategy::Ranged { source }, options)
    }

    /// A progressively-fetched document over HTTP range requests. The URL
    /// may be relative when `options.base_url` is set.
    pub async fn from_url(
        id: impl Into<String>,
        url: &str,
        options: AccessorOptions,
    ) -> PDFResult<Self> {
        let id = id.into();
        let base_url = Self::normalize_base_url(options.base_url.as_deref())?;
        let resolved = match Url::parse(url) {
            Ok(absolute) => absolute,
            // Not an absolute URL: resolve against the base URL if one was
            // configured.
            Err(parse_err) => match &base_url {
                Some(base) => base.join(url).map_err(|e| {
                    PDFError::InvalidRequest(format!("cannot resolve '{}': {}", url, e))
                })?,
                None => {
                    return Err(PDFError::InvalidRequest(format!(
                        "invalid URL '{}' and no base URL set: {}",
                        url, parse_err
                    )));
                }
            },
        };

        let source = HttpRangeSource::open(resolved, options.chunk_size).await?;
        Ok(DocumentAccessor {
            id,
            password: options.password,
            base_url,
            strategy: FetchStrategy::Ranged {
                source: Box::new(source),
            },
            doc: None,
        })
    }

    /// A layered document: original bytes (possibly still loading) plus
    /// one previously produced update fragment.
    pub fn layered(
        id: impl Into<String>,
        base: BytesFuture,
        update: Vec<u8>,
        options: AccessorOptions,
    ) -> PDFResult<Self> {
        Self::with_options(
            id.into(),
            FetchStrategy::Layered {
                base: Some(base),
                update,
                merged: None,
            },
            options,
        )
    }

    fn with_options(
        id: String,
        strategy: FetchStrategy,
        options: AccessorOptions,
    ) -> PDFResult<Self> {
        let base_url = Self::normalize_base_url(options.base_url.as_deref())?;
        Ok(DocumentAccessor {
            id,
            password: options.password,
            base_url,
            strategy,
            doc: None,
        })
    }

    /// Base URLs are validated and normalized once, then cached.
    fn normalize_base_url(base_url: Option<&str>) -> PDFResult<Option<Url>> {
        match base_url {
            None => Ok(None),
            Some(raw) => Url::parse(raw)
                .map(Some)
                .map_err(|e| PDFError::InvalidRequest(format!("invalid base URL '{}': {}", raw, e))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolves an operation against the parsed document, fetching any
    /// byte ranges it turns out to need.
    ///
    /// The operation must be idempotent: each retry re-invokes it from
    /// scratch after the missing range has been made resident. A range
    /// that is signaled again after having been fetched fails the
    /// operation with `PDFError::Stalled`.
    pub async fn ensure<T>(
        &mut self,
        mut op: impl FnMut(&mut PDFDocument) -> PDFResult<T>,
    ) -> PDFResult<T> {
        self.prepare().await?;
        let mut fetched: Vec<(usize, usize)> = Vec::new();

        loop {
            let doc = self
                .doc
                .as_mut()
                .expect("prepare() always builds the document");
            match classify(op(doc))? {
                Progress::Ready(value) => return Ok(value),
                Progress::Needs(range) => self.fetch_or_stall(range, &mut fetched).await?,
            }
        }
    }

    /// Builds the parsed document if it does not exist yet, driving the
    /// same fetch-and-retry protocol for the initial parse.
    async fn prepare(&mut self) -> PDFResult<()> {
        if self.doc.is_some() {
            return Ok(());
        }

        self.materialize_layer().await?;
        let mut fetched: Vec<(usize, usize)> = Vec::new();

        loop {
            let stream = self.make_stream()?;
            match classify(PDFDocument::open(stream))? {
                Progress::Ready(doc) => {
                    self.doc = Some(doc);
                    return Ok(());
                }
                Progress::Needs(range) => self.fetch_or_stall(range, &mut fetched).await?,
            }
        }
    }

    async fn fetch_or_stall(
        &mut self,
        range: (usize, usize),
        fetched: &mut Vec<(usize, usize)>,
    ) -> PDFResult<()> {
        let (begin, end) = range;
        if fetched.contains(&range) || fetched.len() >= MAX_ENSURE_RETRIES {
            return Err(PDFError::Stalled { begin, end });
        }

        debug!("{}: fetching missing range {}..{}", self.id, begin, end);
        match &mut self.strategy {
            // A resident document signaling missing data cannot be helped
            // by fetching; the stall guard turns the re-signal into an
            // error on the next round.
            FetchStrategy::Resident { .. } | FetchStrategy::Layered { .. } => {}
            FetchStrategy::Ranged { source } => source.request_range(begin, end).await?,
        }
        fetched.push(range);
        Ok(())
    }

    /// One-time concatenation gate for the layered variant.
    async fn materialize_layer(&mut self) -> PDFResult<()> {
        if let FetchStrategy::Layered {
            base,
            update,
            merged,
        } = &mut self.strategy
        {
            if merged.is_none() {
                let pending = base.take().ok_or_else(|| {
                    PDFError::Transport("layered base bytes already failed".to_string())
                })?;
                let mut bytes = pending.await?;
                bytes.extend_from_slice(update);
                *merged = Some(Arc::new(bytes));
            }
        }
        Ok(())
    }

    /// A fresh stream over the current bytes. Cheap: resident strategies
    /// share their buffer, the ranged strategy shares its chunk store.
    fn make_stream(&self) -> PDFResult<Box<dyn BaseStream>> {
        match &self.strategy {
            FetchStrategy::Resident { bytes } => {
                Ok(Box::new(Stream::from_shared(Arc::clone(bytes))))
            }
            FetchStrategy::Ranged { source } => {
                Ok(Box::new(ChunkedStream::whole(source.store())?))
            }
            FetchStrategy::Layered {
                merged: Some(bytes),
                ..
            } => Ok(Box::new(Stream::from_shared(Arc::clone(bytes)))),
            FetchStrategy::Layered { merged: None, .. } => Err(PDFError::Transport(
                "layered bytes not materialized yet".to_string(),
            )),
        }
    }

    /// Fetches a page by zero-based index.
    pub async fn get_page(&mut self, index: usize) -> PDFResult<Page> {
        self.ensure(move |doc| doc.get_page(index)).await
    }

    /// Number of pages in the document.
    pub async fn page_count(&mut self) -> PDFResult<usize> {
        self.ensure(|doc| doc.page_count()).await
    }

    /// Snapshot of the merged trailer dictionary.
    pub async fn trailer(&mut self) -> PDFResult<Dict> {
        self.ensure(|doc| Ok(doc.trailer().clone())).await
    }

    /// Snapshot of the document catalog.
    pub async fn catalog(&mut self) -> PDFResult<Dict> {
        self.ensure(|doc| Ok(doc.catalog().clone())).await
    }

    /// Byte offset of the newest cross-reference table.
    pub async fn startxref(&mut self) -> PDFResult<usize> {
        self.ensure(|doc| Ok(doc.startxref())).await
    }

    /// The complete document bytes, fetching whatever is still missing.
    pub async fn full_stream(&mut self) -> PDFResult<Arc<Vec<u8>>> {
        self.materialize_layer().await?;
        match &mut self.strategy {
            FetchStrategy::Resident { bytes } => Ok(Arc::clone(bytes)),
            FetchStrategy::Layered {
                merged: Some(bytes),
                ..
            } => Ok(Arc::clone(bytes)),
            FetchStrategy::Layered { merged: None, .. } => Err(PDFError::Transport(
                "layered bytes not materialized yet".to_string(),
            )),
            FetchStrategy::Ranged { source } => Ok(Arc::new(source.loaded_stream().await?)),
        }
    }

    /// Guarantees availability of `[begin, end)`. Resolves trivially on
    /// documents that are already resident.
    pub async fn ensure_range(&mut self, begin: usize, end: usize) -> PDFResult<()> {
        match &mut self.strategy {
            FetchStrategy::Resident { .. } | FetchStrategy::Layered { .. } => Ok(()),
            FetchStrategy::Ranged { source } => source.request_range(begin, end).await,
        }
    }

    /// Accepts progressively received bytes. A no-op for documents that do
    /// not fetch.
    pub fn push_data(&mut self, chunk: &[u8]) -> PDFResult<()> {
        match &mut self.strategy {
            FetchStrategy::Resident { .. } | FetchStrategy::Layered { .. } => {
                debug!("{}: push_data ignored, document does not fetch", self.id);
                Ok(())
            }
            FetchStrategy::Ranged { source } => source.on_receive_data(chunk),
        }
    }

    /// Aborts pending fetches. Subsequent operations that need missing
    /// data fail with `PDFError::Aborted`; a no-op for resident documents.
    pub fn abort(&mut self, reason: &str) {
        match &mut self.strategy {
            FetchStrategy::Resident { .. } | FetchStrategy::Layered { .. } => {
                debug!("{}: abort ignored, document does not fetch", self.id);
            }
            FetchStrategy::Ranged { source } => source.abort(reason),
        }
    }

    /// Attaches a text annotation and returns the appendable update
    /// fragment.
    ///
    /// The page is resolved before the new object number is minted, so a
    /// failed page lookup commits nothing. On success the fragment is also
    /// committed to this accessor (bytes appended, document re-parsed), so
    /// a subsequent `annotate` builds on the updated `Size`. The caller
    /// owns persisting the returned fragment.
    pub async fn annotate(&mut self, request: &AnnotationRequest) -> PDFResult<Vec<u8>> {
        let full = self.full_stream().await?;
        let file_length = full.len();

        let page = self.get_page(request.page_index).await?;
        let (trailer, prev_startxref) = self
            .ensure(|doc| Ok((doc.trailer().clone(), doc.startxref())))
            .await?;

        let fragment =
            write_annotation_update(&page, &trailer, prev_startxref, file_length, request)?;

        let mut merged = Vec::with_capacity(file_length + fragment.len());
        merged.extend_from_slice(&full);
        merged.extend_from_slice(&fragment);
        self.commit_update(Arc::new(merged))?;

        Ok(fragment)
    }

    /// Derives a layered accessor from this document plus a previously
    /// produced update fragment.
    pub async fn with_update(&mut self, fragment: Vec<u8>) -> PDFResult<DocumentAccessor> {
        let base = self.full_stream().await?;
        let base_bytes = (*base).clone();

        DocumentAccessor::layered(
            format!("{}+update", self.id),
            Box::pin(async move { Ok(base_bytes) }),
            fragment,
            AccessorOptions {
                password: self.password.clone(),
                base_url: self.base_url.as_ref().map(|u| u.to_string()),
                chunk_size: None,
            },
        )
    }

    /// Re-points the accessor at the concatenated bytes and re-parses the
    /// document, extending the object table.
    fn commit_update(&mut self, merged: Arc<Vec<u8>>) -> PDFResult<()> {
        let stream = Box::new(Stream::from_shared(Arc::clone(&merged)));
        match self.doc.as_mut() {
            Some(doc) => doc.update(stream)?,
            None => self.doc = Some(PDFDocument::open(stream)?),
        }
        self.strategy = FetchStrategy::Resident { bytes: merged };
        Ok(())
    }
}
