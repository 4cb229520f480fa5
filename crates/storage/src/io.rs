//! Reader helpers shared by the backends and the uploader.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Fill `buffer` from `reader`, returning the number of bytes obtained.
///
/// A single `read` may return fewer bytes than requested without the stream
/// being exhausted, so this loops until the buffer is full or the stream ends.
/// Returns less than `buffer.len()` only when the stream ended, and 0 only when
/// it ended before any byte was read. Read errors are returned unchanged;
/// `Interrupted` reads are retried.
pub async fn fill_buffer<R>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
