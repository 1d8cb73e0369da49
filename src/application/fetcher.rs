use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use futures::{future::BoxFuture, stream::BoxStream, FutureExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{
    api::ApiClient,
    domain::{AppError, BodyStream, DownloadProgress, RemoteResponse},
};

use super::progress::{ProgressThrottle, DEFAULT_UNKNOWN_SIZE_STEP};

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Completed(PathBuf),
    Failed(AppError),
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadEvent::Progress(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetcherConfig {
    /// Largest slice written per read.
    pub chunk_size: usize,
    /// Progress cadence, in bytes, when the length is unknown.
    pub unknown_size_step: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            unknown_size_step: DEFAULT_UNKNOWN_SIZE_STEP,
        }
    }
}

/// Streams a remote body into a file, reporting throttled progress.
///
/// Each call to [`fetch`](Self::fetch) is an independent session. Two sessions on the
/// same destination are not coordinated.
#[derive(Debug, Clone, Default)]
pub struct StreamingFetcher {
    config: FetcherConfig,
}

impl StreamingFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config: FetcherConfig {
                chunk_size: config.chunk_size.max(1),
                ..config
            },
        }
    }

    /// Run `retrieve` and stream its body into `destination`.
    ///
    /// The returned stream yields zero or more `Progress` events followed by exactly
    /// one `Completed` or `Failed`. On failure, or if the stream is dropped early, the
    /// partial file is removed.
    pub fn fetch<F, Fut>(
        &self,
        retrieve: F,
        destination: impl Into<PathBuf>,
    ) -> BoxStream<'static, DownloadEvent>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RemoteResponse, AppError>> + Send + 'static,
    {
        futures::stream::unfold(
            FetchState::Start {
                request: retrieve().boxed(),
                path: destination.into(),
                config: self.config,
            },
            |state| async move {
                match state {
                    FetchState::Start {
                        request,
                        path,
                        config,
                    } => match Session::open(request, path, config).await {
                        Ok(session) => Some((
                            DownloadEvent::Progress(DownloadProgress::new(0, session.total)),
                            FetchState::Downloading(session),
                        )),
                        Err(e) => {
                            warn!(error = %e, "Download failed before transfer");
                            Some((DownloadEvent::Failed(e), FetchState::Finished))
                        }
                    },
                    FetchState::Downloading(mut session) => match session.next_progress().await {
                        Ok(Some(progress)) => Some((
                            DownloadEvent::Progress(progress),
                            FetchState::Downloading(session),
                        )),
                        Ok(None) => match session.finish().await {
                            Ok(path) => Some((DownloadEvent::Completed(path), FetchState::Finished)),
                            Err(e) => Some((DownloadEvent::Failed(e), FetchState::Finished)),
                        },
                        Err(e) => {
                            let e = session.fail(e).await;
                            Some((DownloadEvent::Failed(e), FetchState::Finished))
                        }
                    },
                    FetchState::Finished => None,
                }
            },
        )
        .boxed()
    }

    /// Fetch `url` through `client` into `destination`.
    pub fn download(
        &self,
        client: ApiClient,
        url: String,
        destination: impl Into<PathBuf>,
    ) -> BoxStream<'static, DownloadEvent> {
        let destination = destination.into();
        info!(%url, path = %destination.display(), "Starting download");
        self.fetch(move || async move { client.retrieve(&url).await }, destination)
    }
}

enum FetchState {
    Start {
        request: BoxFuture<'static, Result<RemoteResponse, AppError>>,
        path: PathBuf,
        config: FetcherConfig,
    },
    Downloading(Session),
    Finished,
}

struct Session {
    file: tokio::fs::File,
    reader: ChunkReader,
    downloaded: u64,
    total: Option<u64>,
    throttle: ProgressThrottle,
    chunk_size: usize,
    output: PartialFile,
}

impl Session {
    async fn open(
        request: BoxFuture<'static, Result<RemoteResponse, AppError>>,
        path: PathBuf,
        config: FetcherConfig,
    ) -> Result<Self, AppError> {
        let response = request.await?;
        if !response.is_success() {
            return Err(AppError::Http {
                status: response.status,
            });
        }
        let total = response.declared_length();
        let body = response.body.ok_or(AppError::MissingBody)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed previous download"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let output = PartialFile::new(path);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(output.path())
            .await
        {
            Ok(file) => file,
            Err(e) => {
                output.discard().await;
                return Err(e.into());
            }
        };

        debug!(path = %output.path().display(), ?total, content_type = ?response.content_type, "Transfer started");

        Ok(Self {
            file,
            reader: ChunkReader::new(body, config.chunk_size),
            downloaded: 0,
            total,
            throttle: ProgressThrottle::new(total, config.unknown_size_step),
            chunk_size: config.chunk_size,
            output,
        })
    }

    /// Copy chunks until one is worth reporting. `None` once the body is exhausted.
    async fn next_progress(&mut self) -> Result<Option<DownloadProgress>, AppError> {
        while let Some(chunk) = self.reader.next_chunk().await {
            let chunk = chunk?;
            self.downloaded += chunk.len() as u64;
            if let Some(total) = self.total {
                if self.downloaded > total {
                    return Err(AppError::BodyOverrun { expected: total });
                }
            }
            self.file.write_all(&chunk).await?;

            let short_read = chunk.len() < self.chunk_size;
            if self.throttle.should_emit(self.downloaded, short_read) {
                return Ok(Some(DownloadProgress::new(self.downloaded, self.total)));
            }
        }
        Ok(None)
    }

    async fn finish(self) -> Result<PathBuf, AppError> {
        let Session {
            file,
            downloaded,
            total,
            output,
            ..
        } = self;

        match finalize(file, output.path(), downloaded, total).await {
            Ok(()) => {
                info!(path = %output.path().display(), bytes = downloaded, "Download completed");
                Ok(output.keep())
            }
            Err(e) => {
                warn!(error = %e, "Downloaded file failed verification");
                output.discard().await;
                Err(e)
            }
        }
    }

    async fn fail(self, error: AppError) -> AppError {
        let Session {
            file,
            downloaded,
            output,
            ..
        } = self;
        drop(file);
        warn!(error = %error, bytes = downloaded, "Download failed");
        output.discard().await;
        error
    }
}

async fn finalize(
    mut file: tokio::fs::File,
    path: &Path,
    downloaded: u64,
    total: Option<u64>,
) -> Result<(), AppError> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let len = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(AppError::EmptyOutput),
        Err(e) => return Err(e.into()),
    };
    if len == 0 {
        return Err(AppError::EmptyOutput);
    }
    if let Some(expected) = total {
        let actual = if downloaded != expected { downloaded } else { len };
        if actual != expected {
            return Err(AppError::LengthMismatch { expected, actual });
        }
    }
    Ok(())
}

/// Re-chunks the body into reads of exactly `chunk_size` bytes, gathering across
/// network frames. Only the last read of the body can be shorter.
struct ChunkReader {
    stream: BodyStream,
    pending: Bytes,
    chunk_size: usize,
    exhausted: bool,
}

impl ChunkReader {
    fn new(stream: BodyStream, chunk_size: usize) -> Self {
        Self {
            stream,
            pending: Bytes::new(),
            chunk_size,
            exhausted: false,
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, AppError>> {
        if self.pending.len() >= self.chunk_size {
            return Some(Ok(self.pending.split_to(self.chunk_size)));
        }

        let mut buf = BytesMut::with_capacity(self.chunk_size);
        buf.extend_from_slice(&self.pending);
        self.pending.clear();

        while buf.len() < self.chunk_size && !self.exhausted {
            match self.stream.next().await {
                Some(Ok(frame)) => {
                    let take = frame.len().min(self.chunk_size - buf.len());
                    buf.extend_from_slice(&frame[..take]);
                    self.pending = frame.slice(take..);
                }
                Some(Err(e)) => return Some(Err(e)),
                None => self.exhausted = true,
            }
        }

        if buf.is_empty() {
            None
        } else {
            Some(Ok(buf.freeze()))
        }
    }
}

/// Owns the destination while a session writes to it. Removes the file unless kept.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    async fn discard(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial download")
            }
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // session dropped mid-transfer
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed abandoned download"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove abandoned download")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type Retrieve = Box<dyn FnOnce() -> BoxFuture<'static, Result<RemoteResponse, AppError>>>;

    fn serve(
        status: u16,
        content_length: Option<i64>,
        chunks: Vec<Result<Bytes, AppError>>,
    ) -> Retrieve {
        let response = RemoteResponse {
            status,
            content_length,
            content_type: Some("application/vnd.android.package-archive".to_string()),
            body: Some(stream::iter(chunks).boxed()),
        };
        Box::new(move || futures::future::ready(Ok::<_, AppError>(response)).boxed())
    }

    fn split(data: &[u8], size: usize) -> Vec<Result<Bytes, AppError>> {
        data.chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    async fn run(fetcher: &StreamingFetcher, retrieve: Retrieve, path: &Path) -> Vec<DownloadEvent> {
        fetcher.fetch(retrieve, path).collect().await
    }

    fn assert_well_formed(events: &[DownloadEvent]) {
        let terminal = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminal, 1, "exactly one terminal event");
        assert!(events.last().is_some_and(|e| e.is_terminal()));

        let bytes: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) => Some(p.downloaded),
                _ => None,
            })
            .collect();
        assert!(bytes.windows(2).all(|w| w[0] <= w[1]), "progress never goes back");
    }

    #[tokio::test]
    async fn test_known_length_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let data = vec![0xAB_u8; 10_000_000];

        let events = run(
            &StreamingFetcher::default(),
            serve(200, Some(10_000_000), split(&data, 64 * 1024)),
            &path,
        )
        .await;

        assert_well_formed(&events);
        assert!(matches!(&events[0], DownloadEvent::Progress(p) if p.downloaded == 0));
        match &events[events.len() - 2] {
            DownloadEvent::Progress(p) => {
                assert_eq!(p.downloaded, 10_000_000);
                assert!(p.percent.is_some_and(|pct| (pct - 100.0).abs() < 0.01));
            }
            other => panic!("expected final progress, got {other:?}"),
        }
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(p)) if p == &path));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10_000_000);

        // one event per whole percent plus the initial one
        let progress = events.len() - 1;
        assert!(progress <= 102, "too many progress events: {progress}");
    }

    #[tokio::test]
    async fn test_http_error_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");

        let events = run(&StreamingFetcher::default(), serve(404, None, vec![]), &path).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DownloadEvent::Failed(AppError::Http { status: 404 })
        ));
        assert!(!path.exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_missing_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let retrieve: Retrieve = Box::new(|| {
            futures::future::ready(Ok::<_, AppError>(RemoteResponse {
                status: 200,
                content_length: Some(10),
                content_type: None,
                body: None,
            }))
            .boxed()
        });

        let events = run(&StreamingFetcher::default(), retrieve, &path).await;

        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed(AppError::MissingBody)]
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_transport_failure_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let retrieve = serve(
            200,
            Some(1_000_000),
            vec![
                Ok(Bytes::from(vec![1_u8; 500_000])),
                Err(AppError::Network("connection reset".to_string())),
            ],
        );

        let events = run(&StreamingFetcher::default(), retrieve, &path).await;

        assert_well_formed(&events);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed(AppError::Network(_)))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unknown_length_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut chunks = split(&vec![2_u8; 3 * 1024 * 1024], DEFAULT_CHUNK_SIZE);
        chunks.push(Ok(Bytes::from(vec![2_u8; 100])));

        let events = run(&StreamingFetcher::default(), serve(200, Some(-1), chunks), &path).await;

        assert_well_formed(&events);
        let progress: Vec<DownloadProgress> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(progress.iter().all(|p| p.total.is_none() && p.percent.is_none()));
        assert_eq!(
            progress.iter().map(|p| p.downloaded).collect::<Vec<_>>(),
            vec![0, 1_048_576, 2_097_152, 3_145_728, 3_145_828]
        );
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3_145_828);
    }

    #[tokio::test]
    async fn test_refetch_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let data: Vec<u8> = (0..20_000_u32).map(|i| (i % 251) as u8).collect();
        let fetcher = StreamingFetcher::default();

        for _ in 0..2 {
            let events = run(&fetcher, serve(200, Some(20_000), split(&data, 3000)), &path).await;
            assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
        }

        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[tokio::test]
    async fn test_short_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let events = run(
            &StreamingFetcher::default(),
            serve(200, Some(100), vec![Ok(Bytes::from(vec![0_u8; 60]))]),
            &path,
        )
        .await;

        assert_well_formed(&events);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed(AppError::LengthMismatch {
                expected: 100,
                actual: 60
            }))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_overlong_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let events = run(
            &StreamingFetcher::default(),
            serve(200, Some(10), vec![Ok(Bytes::from(vec![0_u8; 20]))]),
            &path,
        )
        .await;

        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed(AppError::BodyOverrun { expected: 10 }))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"stale").unwrap();

        let events = run(&StreamingFetcher::default(), serve(200, None, vec![]), &path).await;

        assert_well_formed(&events);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed(AppError::EmptyOutput))
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_dropped_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let body: BodyStream = stream::iter(vec![Ok(Bytes::from(vec![9_u8; DEFAULT_CHUNK_SIZE]))])
            .chain(stream::pending())
            .boxed();
        let retrieve: Retrieve = Box::new(move || {
            futures::future::ready(Ok::<_, AppError>(RemoteResponse {
                status: 200,
                content_length: None,
                content_type: None,
                body: Some(body),
            }))
            .boxed()
        });

        let fetcher = StreamingFetcher::new(FetcherConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            unknown_size_step: DEFAULT_CHUNK_SIZE as u64,
        });
        let mut events = fetcher.fetch(retrieve, &path);
        assert!(matches!(events.next().await, Some(DownloadEvent::Progress(p)) if p.downloaded == 0));
        assert!(matches!(
            events.next().await,
            Some(DownloadEvent::Progress(p)) if p.downloaded == DEFAULT_CHUNK_SIZE as u64
        ));
        assert!(path.exists());

        drop(events);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_download_through_client() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/shell.apk")
            .with_status(200)
            .with_body(vec![5_u8; 50_000])
            .create_async()
            .await;
        server
            .mock("GET", "/gone.apk")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = ApiClient::new(crate::api::ApiConfig {
            base_url: server.url(),
            ..Default::default()
        });
        let fetcher = StreamingFetcher::default();

        let ok_path = dir.path().join("updates").join("shell.apk");
        let events: Vec<_> = fetcher
            .download(client.clone(), format!("{}/shell.apk", server.url()), &ok_path)
            .collect()
            .await;
        assert_well_formed(&events);
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(_))));
        assert_eq!(std::fs::metadata(&ok_path).unwrap().len(), 50_000);

        let gone_path = dir.path().join("gone.apk");
        let events: Vec<_> = fetcher
            .download(client, format!("{}/gone.apk", server.url()), &gone_path)
            .collect()
            .await;
        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed(AppError::Http { status: 404 })]
        ));
        assert!(!gone_path.exists());
    }

    #[tokio::test]
    async fn test_chunk_reader_slices_large_frames() {
        let body = stream::iter(vec![Ok(Bytes::from(vec![0_u8; 10_000]))]).boxed();
        let mut reader = ChunkReader::new(body, 4096);

        let mut sizes = Vec::new();
        while let Some(chunk) = reader.next_chunk().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_chunk_reader_gathers_small_frames() {
        let frames: Vec<Result<Bytes, AppError>> =
            (0..10).map(|_| Ok(Bytes::from(vec![1_u8; 1000]))).collect();
        let mut reader = ChunkReader::new(stream::iter(frames).boxed(), 4096);

        let mut sizes = Vec::new();
        while let Some(chunk) = reader.next_chunk().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_unknown_length_odd_frames_keep_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let len = 3 * 1024 * 1024 + 123;
        let chunks = split(&vec![3_u8; len], 10_000);

        let events = run(&StreamingFetcher::default(), serve(200, None, chunks), &path).await;

        assert_well_formed(&events);
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress(p) => Some(p.downloaded),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![0, 1_048_576, 2_097_152, 3_145_728, len as u64]
        );
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len as u64);
    }
}
