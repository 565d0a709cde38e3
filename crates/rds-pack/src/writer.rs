use std::io;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use rds_types::{collect_bytes, ByteStream, DirectoryArrayEntry, FileData};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::entry::{encode_file_header, end_of_archive, padding_len};
use crate::error::{PackError, PackResult};

/// Archive chunks buffered before the producer waits for the consumer.
pub const PACK_CHANNEL_CAPACITY: usize = 4;

/// Serialize `entries` into a tar archive, produced lazily.
///
/// Entries are written in order by a background task. Streamed entries must
/// declare their size up front since it goes into the header before any
/// content. If an entry fails, the archive stream yields the error as its
/// last item and the remaining sources are dropped.
pub fn pack(entries: Vec<DirectoryArrayEntry<FileData>>) -> ByteStream {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(PACK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let count = entries.len();
        match write_archive(entries, &tx).await {
            Ok(()) => debug!(target: "rds::pack", entries = count, "archive written"),
            Err(PackError::ConsumerClosed) => {
                debug!(target: "rds::pack", "archive consumer closed early");
            }
            Err(err) => {
                warn!(target: "rds::pack", error = %err, "aborting archive");
                let _ = tx.send(Err(err.into())).await;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Build a whole archive in memory.
pub async fn pack_to_bytes(entries: Vec<DirectoryArrayEntry<FileData>>) -> PackResult<Bytes> {
    Ok(collect_bytes(pack(entries)).await?)
}

async fn write_archive(
    entries: Vec<DirectoryArrayEntry<FileData>>,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> PackResult<()> {
    for entry in entries {
        write_entry(entry, tx).await?;
    }
    send(tx, Bytes::copy_from_slice(&end_of_archive())).await
}

async fn write_entry(
    entry: DirectoryArrayEntry<FileData>,
    tx: &mpsc::Sender<io::Result<Bytes>>,
) -> PackResult<()> {
    let DirectoryArrayEntry {
        path, data, size, ..
    } = entry;

    match data {
        FileData::Bytes(content) => {
            let actual = content.len() as u64;
            if let Some(declared) = size.filter(|s| *s != actual) {
                return Err(PackError::SizeMismatch {
                    path,
                    declared,
                    actual,
                });
            }
            let mut block = BytesMut::from(&encode_file_header(&path, actual)?[..]);
            block.extend_from_slice(&content);
            block.resize(block.len() + padding_len(actual), 0);
            send(tx, block.freeze()).await
        }
        FileData::Stream(mut source) => {
            let declared = size.ok_or_else(|| PackError::MissingSize(path.clone()))?;
            send(tx, Bytes::from(encode_file_header(&path, declared)?)).await?;

            let mut written = 0u64;
            while let Some(chunk) = source.next().await {
                let chunk = chunk?;
                written += chunk.len() as u64;
                if written > declared {
                    return Err(PackError::SizeMismatch {
                        path,
                        declared,
                        actual: written,
                    });
                }
                if !chunk.is_empty() {
                    send(tx, chunk).await?;
                }
            }
            if written != declared {
                return Err(PackError::SizeMismatch {
                    path,
                    declared,
                    actual: written,
                });
            }

            let padding = padding_len(declared);
            if padding > 0 {
                send(tx, Bytes::from(vec![0u8; padding])).await?;
            }
            Ok(())
        }
    }
}

async fn send(tx: &mpsc::Sender<io::Result<Bytes>>, chunk: Bytes) -> PackResult<()> {
    tx.send(Ok(chunk))
        .await
        .map_err(|_| PackError::ConsumerClosed)
}
