//! Block framing: split a byte stream into `k`-byte message blocks.
//!
//! Every block but the last is read verbatim.  A short final block is
//! **left**-padded with zero bytes: the zeros come first, the genuine
//! trailing bytes last.  Stores already on disk depend on this convention,
//! so it must never change to right-padding.
//!
//! Nothing about the padding is persisted.  Block boundaries and the final
//! padding are recomputed from `(file length, k)` every time.

use std::io::{self, Read, Seek, SeekFrom};

/// Default number of message blocks per super-chunk read.
pub const DEFAULT_BLOCKS_PER_CHUNK: usize = 4000;

/// Number of `k`-byte blocks a `len`-byte stream frames into.
pub fn block_count(len: u64, message_size: usize) -> u64 {
    len.div_ceil(message_size as u64)
}

/// Zero bytes prepended to the final block of a `len`-byte stream.
pub fn final_padding(len: u64, message_size: usize) -> usize {
    let k = message_size as u64;
    ((k - len % k) % k) as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position of the block in the file, from 0.
    pub index:   u64,
    /// Exactly `k` bytes, left-padded when `padding > 0`.
    pub message: Vec<u8>,
    /// Leading zero bytes that are not part of the file.
    pub padding: usize,
}

impl Block {
    /// Frame one chunk of at most `k` bytes.
    pub fn from_chunk(index: u64, chunk: &[u8], message_size: usize) -> Self {
        debug_assert!(!chunk.is_empty() && chunk.len() <= message_size);
        let padding = message_size - chunk.len();
        let mut message = vec![0u8; message_size];
        message[padding..].copy_from_slice(chunk);
        Self { index, message, padding }
    }

    /// The bytes that belong to the file.
    pub fn real_bytes(&self) -> &[u8] {
        &self.message[self.padding..]
    }
}

/// Strip a decoded message back to the bytes the file actually holds.
pub fn strip_padding(message: &[u8], padding: usize) -> &[u8] {
    &message[padding..]
}

/// Frame an in-memory buffer.  `first_index` is the index of its first block.
pub fn frame(data: &[u8], message_size: usize, first_index: u64) -> Vec<Block> {
    data.chunks(message_size)
        .enumerate()
        .map(|(i, chunk)| Block::from_chunk(first_index + i as u64, chunk, message_size))
        .collect()
}

/// Streaming framer over any reader.
///
/// Reads `blocks_per_chunk * k` bytes at a time and re-splits the buffer in
/// memory, so peak memory stays bounded while syscalls are amortised.
pub struct BlockReader<R: Read> {
    inner:            R,
    message_size:     usize,
    blocks_per_chunk: usize,
    next_index:       u64,
    bytes_read:       u64,
    buf:              Vec<u8>,
    done:             bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, message_size: usize) -> Self {
        Self::with_chunk_blocks(inner, message_size, DEFAULT_BLOCKS_PER_CHUNK)
    }

    pub fn with_chunk_blocks(inner: R, message_size: usize, blocks_per_chunk: usize) -> Self {
        assert!(message_size > 0, "message size must be positive");
        let blocks_per_chunk = blocks_per_chunk.max(1);
        Self {
            inner,
            message_size,
            blocks_per_chunk,
            next_index: 0,
            bytes_read: 0,
            buf: vec![0u8; message_size * blocks_per_chunk],
            done: false,
        }
    }

    /// Bytes consumed from the underlying reader so far.
    pub fn bytes_read(&self) -> u64 { self.bytes_read }

    /// Next run of up to `blocks_per_chunk` blocks, or `None` at end of stream.
    pub fn next_batch(&mut self) -> io::Result<Option<Vec<Block>>> {
        if self.done {
            return Ok(None);
        }
        let filled = read_full(&mut self.inner, &mut self.buf)?;
        if filled < self.buf.len() {
            self.done = true;
        }
        if filled == 0 {
            return Ok(None);
        }
        self.bytes_read += filled as u64;
        let blocks = frame(&self.buf[..filled], self.message_size, self.next_index);
        self.next_index += blocks.len() as u64;
        Ok(Some(blocks))
    }
}

impl<R: Read + Seek> BlockReader<R> {
    /// Rewind to the first block.
    pub fn restart(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.next_index = 0;
        self.bytes_read = 0;
        self.done = false;
        Ok(())
    }
}

/// Fill `buf` as far as the reader allows.  Returns bytes read; less than
/// `buf.len()` only at end of stream.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn short_final_block_is_left_padded() {
        let blocks = frame(b"abcdefg", 4, 0);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].message, b"abcd");
        assert_eq!(blocks[0].padding, 0);
        assert_eq!(blocks[1].message, b"\0efg");
        assert_eq!(blocks[1].padding, 1);
        assert_eq!(blocks[1].real_bytes(), b"efg");
    }

    #[test]
    fn exact_multiple_has_no_padding() {
        let blocks = frame(&[7u8; 12], 4, 10);
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.padding == 0));
        assert_eq!(blocks.iter().map(|b| b.index).collect::<Vec<_>>(), vec![10, 11, 12]);
    }

    #[test]
    fn scenario_300_bytes() {
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let blocks = frame(&data, 223, 0);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].padding, 146);
        assert_eq!(blocks[1].real_bytes().len(), 77);
        assert_eq!(final_padding(300, 223), 146);
        assert_eq!(block_count(300, 223), 2);
    }

    #[test]
    fn reader_batches_and_restarts() {
        let data: Vec<u8> = (0..25u8).collect();
        let mut reader = BlockReader::with_chunk_blocks(Cursor::new(data.clone()), 4, 3);

        let first = reader.next_batch().unwrap().unwrap();
        assert_eq!(first.len(), 3);
        let second = reader.next_batch().unwrap().unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].index, 3);
        let third = reader.next_batch().unwrap().unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].padding, 3);
        assert_eq!(third[0].real_bytes(), &[24]);
        assert!(reader.next_batch().unwrap().is_none());
        assert_eq!(reader.bytes_read(), 25);

        reader.restart().unwrap();
        let again = reader.next_batch().unwrap().unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn empty_stream_has_no_blocks() {
        let mut reader = BlockReader::new(Cursor::new(Vec::new()), 223);
        assert!(reader.next_batch().unwrap().is_none());
        assert_eq!(block_count(0, 223), 0);
        assert_eq!(final_padding(0, 223), 0);
    }

    proptest! {
        #[test]
        fn padding_is_position_derived(len in 0usize..2000, k in 1usize..300) {
            let data = vec![0xAAu8; len];
            let blocks = frame(&data, k, 0);
            prop_assert_eq!(blocks.len() as u64, block_count(len as u64, k));
            if let Some(last) = blocks.last() {
                prop_assert_eq!(last.padding, final_padding(len as u64, k));
                prop_assert_eq!(last.padding, (k - len % k) % k);
            }
            let rebuilt: Vec<u8> = blocks.iter().flat_map(|b| b.real_bytes().to_vec()).collect();
            prop_assert_eq!(rebuilt, data);
        }
    }
}
