//! Performance utilities: parallel block transforms and write batching.
//!
//! # Parallel transforms
//!
//! [`map_blocks`] applies a codec call to every block of a super-chunk.
//! Blocks carry no dependency on their neighbours, so with the `parallel`
//! feature the work is spread over Rayon's pool; without it the loop is
//! sequential.  Either way results come back in block order, which is the
//! order they must be written to disk.
//!
//! # Write buffer
//!
//! [`WriteBuffer`] accumulates the small per-block writes (32 parity bytes
//! each with the default parameters) and flushes them to the file in large
//! chunks.

use std::io::{self, Write};

use crate::block::Block;

// ── Parallel block transforms ─────────────────────────────────────────────────

/// Apply `f` to every block; the result vector is in block order.
///
/// Every block is processed even if some fail, so callers can report all
/// failures or pick the first one by position.
pub fn map_blocks<T, E, F>(blocks: &[Block], f: F) -> Vec<Result<T, E>>
where
    T: Send,
    E: Send,
    F: Fn(&Block) -> Result<T, E> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        blocks.par_iter().map(f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        blocks.iter().map(f).collect()
    }
}

// ── Write buffer ─────────────────────────────────────────────────────────────

/// Buffered writer with configurable flush threshold.
///
/// Unlike `std::io::BufWriter`, this exposes `bytes_written`, which the
/// streaming loops use to report output sizes.
pub struct WriteBuffer<W: Write> {
    inner:     W,
    buf:       Vec<u8>,
    capacity:  usize,
    pub bytes_written: u64,
}

impl<W: Write> WriteBuffer<W> {
    /// Create a new `WriteBuffer` with the given capacity in bytes.
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            bytes_written: 0,
        }
    }

    fn flush_if_full(&mut self) -> io::Result<()> {
        if self.buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() >= self.capacity {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
            self.inner.write_all(buf)?;
        } else {
            self.buf.extend_from_slice(buf);
            self.flush_if_full()?;
        }
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::frame;

    #[test]
    fn map_blocks_keeps_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let blocks = frame(&data, 7, 0);
        let out: Vec<Result<u64, ()>> = map_blocks(&blocks, |b| Ok(b.index * 2));
        for (i, r) in out.into_iter().enumerate() {
            assert_eq!(r, Ok(i as u64 * 2));
        }
    }

    #[test]
    fn map_blocks_reports_every_failure() {
        let blocks = frame(&[0u8; 40], 4, 0);
        let out = map_blocks(&blocks, |b| if b.index % 3 == 0 { Err(b.index) } else { Ok(()) });
        let failed: Vec<u64> = out.into_iter().filter_map(|r| r.err()).collect();
        assert_eq!(failed, vec![0, 3, 6, 9]);
    }

    #[test]
    fn write_buffer_flushes() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut wb = WriteBuffer::new(&mut buf, 8);
            wb.write_all(b"hello").unwrap();
            wb.write_all(b" world!").unwrap();
            assert_eq!(wb.bytes_written, 12);
            wb.flush().unwrap();
        }
        assert_eq!(&buf, b"hello world!");
    }
}
