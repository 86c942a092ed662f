use std::io::SeekFrom;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::TransferError;
use crate::types::PartRange;

/// Read buffer for streaming a part body: 256 KiB.
pub const PART_READ_BUFFER: usize = 256 * 1024;

/// A part's bytes as a stream of buffers.
pub type PartStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Opens the suffix of `range` that starts `from` bytes into the part.
///
/// The stream yields exactly `range.size - from` bytes unless the file was
/// truncated underneath it.
pub async fn open_part_stream(
    path: &Path,
    range: PartRange,
    from: u64,
) -> Result<PartStream, TransferError> {
    if from > range.size {
        return Err(TransferError::InvalidOffset {
            offset: from,
            size: range.size,
        });
    }

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(range.start + from)).await?;
    let limited = file.take(range.size - from);
    Ok(Box::pin(ReaderStream::with_capacity(limited, PART_READ_BUFFER)))
}
