//! Abstractions over byte-range sources.

use std::fmt::Debug;
use std::ops::Range;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::AsyncCogResult;

#[cfg(feature = "object_store")]
use futures::TryFutureExt;
#[cfg(feature = "object_store")]
use std::sync::Arc;

/// The asynchronous byte-range interface COG files are read through.
///
/// Every fetch is potentially a network round trip, so callers batch and
/// cache aggressively. The returned buffer may be shorter than the requested
/// range when it overruns the end of the object; the parser checks lengths
/// itself. Implementations must tolerate interleaved concurrent calls.
pub trait Source: Debug + Send + Sync {
    /// Retrieve the bytes in `range`.
    ///
    /// Note the returned type is a boxed future, often created by
    /// [`futures::FutureExt::boxed`].
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>>;

    /// Total size of the underlying object, when the driver knows it.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// This allows `Box<dyn Source + '_>` to be used as a Source.
impl Source for Box<dyn Source + '_> {
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        self.as_ref().fetch(range)
    }

    fn size(&self) -> Option<u64> {
        self.as_ref().size()
    }
}

/// A [`Source`] reading from an [`ObjectStore`] instance.
///
/// [`ObjectStore`]: object_store::ObjectStore
#[cfg(feature = "object_store")]
#[derive(Debug, Clone)]
pub struct ObjectReader {
    store: Arc<dyn object_store::ObjectStore>,
    path: object_store::path::Path,
    size: Option<u64>,
}

#[cfg(feature = "object_store")]
impl ObjectReader {
    /// Creates a new [`ObjectReader`] for the provided store and path.
    pub fn new(store: Arc<dyn object_store::ObjectStore>, path: object_store::path::Path) -> Self {
        Self {
            store,
            path,
            size: None,
        }
    }

    /// Attach the object size, usually from [`ObjectStore::head`], so range
    /// requests can be clamped before they hit the store.
    ///
    /// [`ObjectStore::head`]: object_store::ObjectStore::head
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    async fn make_range_request(&self, mut range: Range<u64>) -> AsyncCogResult<Bytes> {
        if let Some(size) = self.size {
            if range.start >= size {
                return Ok(Bytes::new());
            }
            range.end = range.end.min(size);
        }
        self.store
            .get_range(&self.path, range.start as _..range.end as _)
            .map_err(|e| e.into())
            .await
    }
}

#[cfg(feature = "object_store")]
impl Source for ObjectReader {
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        self.make_range_request(range).boxed()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// A [`Source`] that reads from a URL using reqwest range requests.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestReader {
    client: reqwest::Client,
    url: reqwest::Url,
}

#[cfg(feature = "reqwest")]
impl ReqwestReader {
    /// Construct a new ReqwestReader from a reqwest client and URL.
    pub fn new(client: reqwest::Client, url: reqwest::Url) -> Self {
        Self { client, url }
    }

    fn make_range_request(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        let url = self.url.clone();
        let client = self.client.clone();
        // HTTP range is inclusive, so we need to subtract 1 from the end
        let range = format!("bytes={}-{}", range.start, range.end - 1);
        async move {
            let response = client.get(url).header("Range", range).send().await?;
            let bytes = response.bytes().await?;
            Ok(bytes)
        }
        .boxed()
    }
}

#[cfg(feature = "reqwest")]
impl Source for ReqwestReader {
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        self.make_range_request(range)
    }
}

/// A wrapper for things that implement [AsyncRead] and [AsyncSeek] to also
/// implement [`Source`].
///
/// `AsyncRead` and `AsyncSeek` require mutable access while `Source` hands
/// out shared references, so the inner reader lives in a `Mutex`.
///
/// [AsyncRead]: tokio::io::AsyncRead
/// [AsyncSeek]: tokio::io::AsyncSeek
#[cfg(feature = "tokio-fs")]
#[derive(Debug)]
pub struct TokioReader<T: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send + Debug>(
    tokio::sync::Mutex<T>,
);

#[cfg(feature = "tokio-fs")]
impl<T: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send + Debug> TokioReader<T> {
    /// Create a new TokioReader from a reader.
    pub fn new(inner: T) -> Self {
        Self(tokio::sync::Mutex::new(inner))
    }

    async fn make_range_request(&self, range: Range<u64>) -> AsyncCogResult<Bytes> {
        use std::io::SeekFrom;
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let mut file = self.0.lock().await;

        file.seek(SeekFrom::Start(range.start)).await?;

        let to_read = range.end - range.start;
        let mut buffer = Vec::with_capacity(to_read as usize);
        (&mut *file).take(to_read).read_to_end(&mut buffer).await?;

        Ok(buffer.into())
    }
}

#[cfg(feature = "tokio-fs")]
impl<T: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send + Debug> Source
    for TokioReader<T>
{
    fn fetch(&self, range: Range<u64>) -> BoxFuture<'_, AsyncCogResult<Bytes>> {
        self.make_range_request(range).boxed()
    }
}
