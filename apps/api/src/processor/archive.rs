use crate::error::{AppError, AppResult};
use crate::models::{Photo, Variant};
use crate::processor::resolver::DerivativeResolver;
use crate::processor::watermark::WatermarkSnapshot;
use crate::storage::{keys, SharedStorage, Storage};
use axum::body::{Body, Bytes};
use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const STREAM_CHUNK_BYTES: usize = 64 * 1024;
const STREAM_CHANNEL_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub key: String,
}

/// Download name of `photo` served from `key`.
///
/// Originals keep their extension only when `key` is the untouched upload; a
/// watermarked original is a re-encoded JPEG.
pub fn entry_name(photo: &Photo, variant: Variant, key: &str) -> String {
    match variant {
        Variant::Original if key == photo.original_key => {
            format!("{}.{}", photo.base_name(), photo.original_extension())
        }
        Variant::Original => format!("{}.jpg", photo.base_name()),
        other => format!("{}-{}.jpg", photo.base_name(), other.as_str()),
    }
}

pub fn archive_filename(gallery_id: i64, variant: Variant) -> String {
    format!("gallery-{}-{}.zip", gallery_id, variant.as_str())
}

/// Resolves every photo, in gallery order, skipping the ones that fail.
///
/// A second photo with an entry name already taken is left out.
pub async fn collect_entries(
    resolver: &DerivativeResolver,
    photos: &[Photo],
    variant: Variant,
    snapshot: &Arc<WatermarkSnapshot>,
) -> Vec<ArchiveEntry> {
    let mut ordered: Vec<&Photo> = photos.iter().collect();
    ordered.sort_by_key(|p| (p.order_index, p.id));

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(ordered.len());

    for photo in ordered {
        match resolver.resolve_variant(photo, variant, snapshot).await {
            Ok(resolved) => {
                let name = entry_name(photo, variant, &resolved.key);
                if !seen.insert(name.clone()) {
                    warn!("Archive already has an entry named {}, skipping photo {}", name, photo.id);
                    continue;
                }
                entries.push(ArchiveEntry {
                    name,
                    key: resolved.key,
                });
            }
            Err(e) => warn!("Skipping photo {} in {} archive: {}", photo.id, variant, e),
        }
    }

    entries
}

fn entry_options() -> SimpleFileOptions {
    // JPEG payloads do not shrink under deflate
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

/// Writes `entries` into `sink` one at a time and returns how many were added.
///
/// Must run on a blocking thread; storage reads are driven through `runtime`.
fn write_archive<W: Write + Seek>(
    storage: &SharedStorage,
    runtime: &Handle,
    entries: &[ArchiveEntry],
    sink: W,
) -> AppResult<usize> {
    let mut zip = ZipWriter::new(sink);
    // lets a forward-only sink release each entry once its header is final
    zip.set_flush_on_finish_file(true);
    let mut written = 0;

    for entry in entries {
        let bytes = match runtime.block_on(storage.read_bytes(&entry.key)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {} for archive: {}", entry.key, e);
                continue;
            }
        };
        zip.start_file(entry.name.as_str(), entry_options())?;
        zip.write_all(&bytes)?;
        written += 1;
    }

    let mut inner = zip.finish()?;
    inner.flush()?;
    Ok(written)
}

type ChunkSender = mpsc::Sender<Result<Bytes, io::Error>>;

/// Seekable sink that forwards finished bytes to an async body.
///
/// Only the unflushed tail is kept. Seeking behind it fails, which is fine as
/// long as the zip writer flushes after each entry.
struct ChannelWriter {
    tx: ChunkSender,
    /// Bytes already handed to the body.
    sent: u64,
    pending: Vec<u8>,
    /// Cursor relative to `sent`.
    cursor: usize,
}

impl ChannelWriter {
    fn new(tx: ChunkSender) -> Self {
        Self {
            tx,
            sent: 0,
            pending: Vec::with_capacity(STREAM_CHUNK_BYTES),
            cursor: 0,
        }
    }

    fn send_pending(&mut self) -> io::Result<()> {
        for chunk in self.pending.chunks(STREAM_CHUNK_BYTES) {
            self.tx
                .blocking_send(Ok(Bytes::copy_from_slice(chunk)))
                .map_err(|_| closed_receiver())?;
        }
        self.sent += self.pending.len() as u64;
        self.pending.clear();
        self.cursor = 0;
        Ok(())
    }
}

fn closed_receiver() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver closed")
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(closed_receiver());
        }
        let end = self.cursor + buf.len();
        if end > self.pending.len() {
            self.pending.resize(end, 0);
        }
        self.pending[self.cursor..end].copy_from_slice(buf);
        self.cursor = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_pending()
    }
}

impl Seek for ChannelWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let end = self.sent + self.pending.len() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => end.checked_add_signed(delta),
            SeekFrom::Current(delta) => (self.sent + self.cursor as u64).checked_add_signed(delta),
        };
        match target {
            Some(target) if target >= self.sent && target <= end => {
                self.cursor = (target - self.sent) as usize;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "cannot seek outside the unsent part of the archive",
            )),
        }
    }
}

fn is_disconnect(error: &AppError) -> bool {
    match error {
        AppError::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
        AppError::Zip(zip::result::ZipError::Io(e)) => e.kind() == io::ErrorKind::BrokenPipe,
        _ => false,
    }
}

/// Runs the archive writer against the body channel.
///
/// A failure after the first chunk ends the body with an error so the client
/// sees an aborted transfer rather than a short ZIP.
fn write_stream(
    storage: &SharedStorage,
    runtime: &Handle,
    entries: &[ArchiveEntry],
    variant: Variant,
    tx: ChunkSender,
) {
    let errors = tx.clone();
    match write_archive(storage, runtime, entries, ChannelWriter::new(tx)) {
        Ok(written) => info!(
            "Streamed {} archive with {} of {} entries",
            variant,
            written,
            entries.len()
        ),
        Err(e) if is_disconnect(&e) => debug!("Archive client went away, stopping"),
        Err(e) => {
            warn!("Archive stream failed: {}", e);
            let _ = errors.blocking_send(Err(io::Error::other(format!("archive failed: {}", e))));
        }
    }
}

/// Builds the archive on the fly. Nothing is persisted and at most one entry is held in memory.
///
/// Derivatives are resolved before the first byte is sent so an archive with no
/// usable photos can still be answered with a 404.
pub async fn stream_archive(
    resolver: Arc<DerivativeResolver>,
    photos: Vec<Photo>,
    variant: Variant,
    snapshot: Arc<WatermarkSnapshot>,
) -> AppResult<Body> {
    let entries = collect_entries(&resolver, &photos, variant, &snapshot).await;
    if entries.is_empty() {
        return Err(AppError::NotFound(
            "No photos are available for download".to_string(),
        ));
    }

    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
    let storage = resolver.storage().clone();
    let runtime = Handle::current();

    tokio::task::spawn_blocking(move || {
        write_stream(&storage, &runtime, &entries, variant, tx);
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    Ok(Body::from_stream(stream))
}

/// Returns the key of a stored archive for the gallery, building it when absent or when `rebuild` is set.
pub async fn ensure_cached_archive(
    resolver: &Arc<DerivativeResolver>,
    gallery_id: i64,
    photos: &[Photo],
    variant: Variant,
    snapshot: &Arc<WatermarkSnapshot>,
    rebuild: bool,
) -> AppResult<String> {
    let key = keys::archive_key(gallery_id, variant);
    let storage = resolver.storage().clone();

    if !rebuild {
        if let Some(size) = storage.size(&key).await? {
            if size > 0 {
                debug!("Archive cache hit: {}", key);
                return Ok(key);
            }
        }
    }

    let entries = collect_entries(resolver, photos, variant, snapshot).await;
    if entries.is_empty() {
        return Err(AppError::NotFound(
            "No photos are available for download".to_string(),
        ));
    }

    let spool = tempfile::NamedTempFile::new()?;
    let file = spool.reopen()?;
    let runtime = Handle::current();
    let task_storage = storage.clone();
    let written = tokio::task::spawn_blocking(move || {
        write_archive(&task_storage, &runtime, &entries, io::BufWriter::new(file))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Archive task failed: {}", e)))??;

    if written == 0 {
        return Err(AppError::NotFound(
            "No photos are available for download".to_string(),
        ));
    }

    let reader = tokio::fs::File::open(spool.path()).await?;
    storage.save(Box::pin(reader), &key).await?;
    info!("Stored {} archive for gallery {} with {} entries", variant, gallery_id, written);
    Ok(key)
}
