//! The exact-read primitive every fixed and variable size read goes through.
//!
//! A single `read` on a stream socket may return fewer bytes than asked for.
//! These functions loop until the request is satisfied, so nothing above them
//! ever sees a partial read.

use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Upper bound on how far the buffer grows ahead of the bytes actually received.
pub(crate) const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Read exactly `n` bytes from `source`.
///
/// Fails with [`FrameError::Truncated`] the moment the source reports
/// end-of-data before `n` bytes were collected. `n == 0` returns an empty
/// buffer without touching the source.
pub fn read_exactly<R: Read + ?Sized>(source: &mut R, n: usize) -> Result<Bytes> {
    if n == 0 {
        return Ok(Bytes::new());
    }

    let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK_SIZE));
    while buf.len() < n {
        let filled = buf.len();
        let chunk = (n - filled).min(READ_CHUNK_SIZE);
        buf.resize(filled + chunk, 0);
        if let Err(err) = fill(source, &mut buf[filled..]) {
            return Err(offset_truncation(err, filled, n));
        }
    }

    Ok(buf.freeze())
}

/// Read exactly `N` bytes into a stack array. Same contract as [`read_exactly`].
pub fn read_array<R: Read + ?Sized, const N: usize>(source: &mut R) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    fill(source, &mut out)?;
    Ok(out)
}

fn fill<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn offset_truncation(err: FrameError, already: usize, expected: usize) -> FrameError {
    match err {
        FrameError::Truncated { received, .. } => FrameError::Truncated {
            expected,
            received: already + received,
        },
        other => other,
    }
}
