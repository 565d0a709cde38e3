use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use rds_types::{ByteStream, Directory, DirectoryEntry, EntryStream, RdsError, StreamEntry};
use tar::EntryType;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

use crate::entry::{
    decode_header, finish_header, padding_len, parse_pax, TarEntryHeader, BLOCK_SIZE,
};
use crate::error::{PackError, PackResult};

/// Chunks buffered per extracted entry before the extractor waits for the consumer.
pub const ENTRY_CHANNEL_CAPACITY: usize = 8;

/// Largest GNU long-name or PAX record the reader buffers.
pub const MAX_EXTENSION_LEN: u64 = 1024 * 1024;

/// Upper bound on the up-front allocation of [`TarReader::read_to_end`].
const PREALLOC_LIMIT: u64 = 64 * 1024;

/// One archive member produced by [`extract`].
pub struct ExtractedEntry {
    pub header: TarEntryHeader,
    /// Member content. Empty for directories and other non-file members.
    pub data: ByteStream,
}

pub type ExtractStream = Pin<Box<dyn Stream<Item = PackResult<ExtractedEntry>> + Send + 'static>>;

/// Pull based tar parser over a byte stream.
///
/// Only one member is readable at a time: [`next_entry`](Self::next_entry)
/// skips whatever is left of the current member before decoding the next
/// header.
pub struct TarReader {
    source: ByteStream,
    buf: BytesMut,
    /// Archive offset of the first byte in `buf`.
    offset: u64,
    /// Data bytes of the current member not yet handed out.
    remaining: u64,
    /// Padding following the current member's data.
    padding: usize,
    done: bool,
}

impl TarReader {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            offset: 0,
            remaining: 0,
            padding: 0,
            done: false,
        }
    }

    /// Advance to the next member header, or `None` at end of archive.
    pub async fn next_entry(&mut self) -> PackResult<Option<TarEntryHeader>> {
        if self.done {
            return Ok(None);
        }
        self.skip_current().await?;

        let mut long_path: Option<Vec<u8>> = None;
        let mut pax_path: Option<Vec<u8>> = None;
        let mut pax_size: Option<u64> = None;

        loop {
            let header_offset = self.offset;
            let Some(block) = self.read_block().await? else {
                self.done = true;
                return Ok(None);
            };
            if block.iter().all(|b| *b == 0) {
                trace!(target: "rds::pack", offset = header_offset, "end of archive");
                self.done = true;
                return Ok(None);
            }

            let raw = decode_header(&block, header_offset)?;
            let is_extension = matches!(
                raw.entry_type,
                EntryType::GNULongName
                    | EntryType::GNULongLink
                    | EntryType::XHeader
                    | EntryType::XGlobalHeader
            );
            if is_extension && raw.size > MAX_EXTENSION_LEN {
                return Err(PackError::CorruptHeader {
                    offset: header_offset,
                    reason: format!("extension record of {} bytes", raw.size),
                });
            }
            match raw.entry_type {
                EntryType::GNULongName => {
                    let mut name = self.read_exact(raw.size).await?.to_vec();
                    while name.last() == Some(&0) {
                        name.pop();
                    }
                    long_path = Some(name);
                }
                EntryType::XHeader => {
                    let records = self.read_exact(raw.size).await?;
                    let (path, size) = parse_pax(&records);
                    pax_path = path.or(pax_path);
                    pax_size = size.or(pax_size);
                }
                EntryType::XGlobalHeader | EntryType::GNULongLink => {
                    self.read_exact(raw.size).await?;
                }
                _ => {
                    let header = finish_header(raw, pax_path.or(long_path), pax_size);
                    // Directories and links carry no data even if a size is recorded.
                    let data_len = if header.is_file() { header.size } else { 0 };
                    self.remaining = data_len;
                    self.padding = padding_len(data_len);
                    trace!(
                        target: "rds::pack",
                        path = %header.path,
                        size = header.size,
                        kind = ?header.kind,
                        "archive member"
                    );
                    return Ok(Some(header));
                }
            }
        }
    }

    /// Next chunk of the current member's data, `None` once it is exhausted.
    pub async fn read_chunk(&mut self) -> PackResult<Option<Bytes>> {
        if self.remaining == 0 {
            self.discard_padding().await?;
            return Ok(None);
        }
        if self.buf.is_empty() && !self.fill().await? {
            return Err(PackError::UnexpectedEof(self.offset));
        }
        let take = self.buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let chunk = self.buf.split_to(take).freeze();
        self.offset += take as u64;
        self.remaining -= take as u64;
        Ok(Some(chunk))
    }

    /// Read the whole current member into memory.
    pub async fn read_to_end(&mut self) -> PackResult<Bytes> {
        let mut out = BytesMut::with_capacity(self.remaining.min(PREALLOC_LIMIT) as usize);
        while let Some(chunk) = self.read_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    async fn skip_current(&mut self) -> PackResult<()> {
        while self.read_chunk().await?.is_some() {}
        Ok(())
    }

    async fn discard_padding(&mut self) -> PackResult<()> {
        while self.padding > 0 {
            if self.buf.is_empty() && !self.fill().await? {
                return Err(PackError::UnexpectedEof(self.offset));
            }
            let take = self.buf.len().min(self.padding);
            let _ = self.buf.split_to(take);
            self.offset += take as u64;
            self.padding -= take;
        }
        Ok(())
    }

    /// Read `len` data bytes of an extension record plus its padding.
    async fn read_exact(&mut self, len: u64) -> PackResult<Bytes> {
        self.remaining = len;
        self.padding = padding_len(len);
        self.read_to_end().await
    }

    async fn read_block(&mut self) -> PackResult<Option<[u8; BLOCK_SIZE]>> {
        while self.buf.len() < BLOCK_SIZE {
            if !self.fill().await? {
                if self.buf.is_empty() {
                    // Some writers omit the trailing zero blocks.
                    return Ok(None);
                }
                return Err(PackError::UnexpectedEof(self.offset));
            }
        }
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&self.buf.split_to(BLOCK_SIZE));
        self.offset += BLOCK_SIZE as u64;
        Ok(Some(block))
    }

    /// Pull one chunk from the source. Returns `false` at end of stream.
    async fn fill(&mut self) -> PackResult<bool> {
        loop {
            match self.source.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    self.buf.extend_from_slice(&chunk);
                    return Ok(true);
                }
                Some(Err(e)) => return Err(PackError::Io(e)),
                None => return Ok(false),
            }
        }
    }
}

/// Extract every member of the archive in `source` as it streams in.
///
/// A background task parses the archive and feeds each member's content
/// through a bounded channel, so memory stays bounded by the channel size
/// rather than the archive size. Members must be consumed in order: the
/// next member is only produced once the previous one's data was drained
/// or dropped.
pub fn extract(source: ByteStream) -> ExtractStream {
    let (tx, rx) = mpsc::channel::<PackResult<ExtractedEntry>>(1);

    tokio::spawn(async move {
        let mut reader = TarReader::new(source);
        if let Err(err) = drive_extract(&mut reader, &tx).await {
            debug!(target: "rds::pack", error = %err, "archive extraction failed");
            let _ = tx.send(Err(err)).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

async fn drive_extract(
    reader: &mut TarReader,
    tx: &mpsc::Sender<PackResult<ExtractedEntry>>,
) -> PackResult<()> {
    while let Some(header) = reader.next_entry().await? {
        if !header.is_file() {
            let entry = ExtractedEntry {
                header,
                data: Box::pin(stream::empty()),
            };
            if tx.send(Ok(entry)).await.is_err() {
                return Ok(());
            }
            continue;
        }

        let (chunk_tx, chunk_rx) = mpsc::channel::<io::Result<Bytes>>(ENTRY_CHANNEL_CAPACITY);
        let entry = ExtractedEntry {
            header,
            data: Box::pin(ReceiverStream::new(chunk_rx)),
        };
        if tx.send(Ok(entry)).await.is_err() {
            return Ok(());
        }

        // Keep reading after the consumer drops the data stream so the
        // next header lines up.
        let mut wanted = true;
        loop {
            match reader.read_chunk().await {
                Ok(Some(chunk)) => {
                    if wanted && chunk_tx.send(Ok(chunk)).await.is_err() {
                        wanted = false;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = chunk_tx
                        .send(Err(io::Error::new(io::ErrorKind::InvalidData, err.to_string())))
                        .await;
                    return Err(err);
                }
            }
        }
    }
    Ok(())
}

/// Like [`extract`] but yields regular files only, as [`StreamEntry`]s.
pub fn extract_files(source: ByteStream) -> EntryStream {
    let files = extract(source).filter_map(|item| async move {
        match item {
            Ok(entry) if entry.header.is_file() => {
                let size = entry.header.size;
                Some(Ok(StreamEntry::new(entry.header.path, entry.data).with_size(size)))
            }
            Ok(_) => None,
            Err(err) => Some(Err(RdsError::from(err))),
        }
    });
    Box::pin(files)
}

/// Read a whole archive into a directory map, skipping non-file members.
pub async fn extract_directory(source: ByteStream) -> PackResult<Directory<Bytes>> {
    let mut reader = TarReader::new(source);
    let mut dir = Directory::new();
    while let Some(header) = reader.next_entry().await? {
        if !header.is_file() {
            continue;
        }
        let data = reader.read_to_end().await?;
        dir.insert(header.path, DirectoryEntry::fetched(data));
    }
    Ok(dir)
}
