use crate::TransferError;
use crate::types::PartRange;

/// Splits `file_size` bytes into ordered ranges of `part_size` bytes.
///
/// Produces `ceil(file_size / part_size)` ranges covering `[0, file_size)`
/// without gaps or overlaps; only the last range may be shorter.
pub fn chunk(file_size: u64, part_size: u64) -> Result<Vec<PartRange>, TransferError> {
    if part_size == 0 {
        return Err(TransferError::InvalidPartSize);
    }

    let count = file_size.div_ceil(part_size) as usize;
    let mut parts = Vec::with_capacity(count);
    let mut start = 0u64;
    for index in 0..count {
        let size = part_size.min(file_size - start);
        parts.push(PartRange { index, start, size });
        start += size;
    }
    Ok(parts)
}
