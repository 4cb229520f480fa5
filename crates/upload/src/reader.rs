//! Cutting parts from an input stream.
//!
//! One part buffer is allocated per upload call and reused for every part;
//! only the bytes actually read are copied out of it.

use bytes::Bytes;
use std::io;
use stitch_storage::fill_buffer;
use tokio::io::AsyncRead;

/// Read the next part into `buffer` and return a copy of the bytes obtained.
///
/// The part is at most `buffer.len()` bytes; an empty result means the stream
/// has ended.
pub async fn read_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = fill_buffer(reader, buffer).await?;
    if len == 0 {
        return Ok(Bytes::new());
    }
    Ok(Bytes::copy_from_slice(&buffer[..len]))
}
