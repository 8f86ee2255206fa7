//! Streaming Create / Check / Fix over generic readers and writers.
//!
//! # Create
//! [`create_stream`] frames the source into `k`-byte blocks, encodes each
//! one and appends only the trailing `p` parity bytes to the store.  The
//! store is the bare concatenation of those parity blocks: no header, no
//! separator, no checksum.
//!
//! # Check / Fix
//! [`check_stream`] and [`fix_stream`] re-frame the source identically,
//! pair each block with its `p` stored parity bytes, and hand the `n`-byte
//! codeword to the codec.  Check collects every failing block; Fix stops at
//! the first block the codec cannot correct.
//!
//! # Super-chunks
//! All three read `blocks_per_chunk` blocks at a time, transform them with
//! [`crate::perf::map_blocks`] and write the results in block order.
//! The cancel token is polled between super-chunks and handed to every codec
//! call, so a hung codec is abandoned mid-chunk.  A super-chunk's output is
//! only written once all of its blocks succeeded, so an interrupted store
//! always holds a whole number of parity blocks.
//!
//! Whether the two sizes agree is the caller's concern (see
//! [`crate::validate`]); a store that runs out early yields
//! [`EccError::EccStoreTruncated`], extra trailing parity is ignored.

use std::io::{self, Read, Write};

use crate::block::{read_full, strip_padding, Block, BlockReader};
use crate::cancel::CancelToken;
use crate::codec::{Codec, CodecError, Decoded};
use crate::error::{EccError, Result};
use crate::perf::{map_blocks, WriteBuffer};
use crate::report::{CheckReport, CreateReport, FixReport};

/// Write batching threshold for store and repaired output.
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

// ── Create ───────────────────────────────────────────────────────────────────

pub fn create_stream<R: Read, W: Write>(
    codec:            &dyn Codec,
    src:              R,
    ecc:              W,
    blocks_per_chunk: usize,
    cancel:           &CancelToken,
) -> Result<CreateReport> {
    let params = codec.params();
    let (k, n) = (params.message_size(), params.result_size());
    let mut blocks_in = BlockReader::with_chunk_blocks(src, k, blocks_per_chunk);
    let mut out = WriteBuffer::new(ecc, WRITE_BUFFER_SIZE);
    let mut blocks = 0u64;

    loop {
        if let Err(e) = cancel.check() {
            out.flush()?;
            return Err(e);
        }
        let Some(batch) = blocks_in.next_batch()? else { break };

        let codewords = map_blocks(&batch, |b| -> std::result::Result<Vec<u8>, CodecError> {
            let cw = codec.encode_until(&b.message, cancel)?;
            if cw.len() != n {
                return Err(CodecError::BlockLength { expected: n, actual: cw.len() });
            }
            Ok(cw)
        });
        let codewords = match codewords.into_iter().collect::<std::result::Result<Vec<_>, _>>() {
            Ok(cw) => cw,
            Err(e) => {
                out.flush()?;
                return Err(e.into());
            }
        };

        for cw in &codewords {
            out.write_all(&cw[k..])?;
        }
        blocks += batch.len() as u64;
    }

    out.flush()?;
    Ok(CreateReport { blocks, ecc_bytes: out.bytes_written })
}

// ── Check ────────────────────────────────────────────────────────────────────

pub fn check_stream<R: Read, E: Read>(
    codec:            &dyn Codec,
    src:              R,
    mut ecc:          E,
    blocks_per_chunk: usize,
    cancel:           &CancelToken,
) -> Result<CheckReport> {
    let p = codec.params().parity_size();
    let mut blocks_in = BlockReader::with_chunk_blocks(src, codec.params().message_size(), blocks_per_chunk);
    let mut parity = Vec::new();
    let mut report = CheckReport { total_blocks: 0, failed_blocks: Vec::new() };

    loop {
        cancel.check()?;
        let Some(batch) = blocks_in.next_batch()? else { break };
        read_parity(&mut ecc, &batch, p, &mut parity)?;

        let first = batch[0].index;
        let verdicts = map_blocks(&batch, |b| {
            codec.verify_until(&codeword(b, &parity, first, p), cancel)
        });
        for (b, verdict) in batch.iter().zip(verdicts) {
            if !verdict? {
                report.failed_blocks.push(b.index);
            }
        }
        report.total_blocks += batch.len() as u64;
    }

    Ok(report)
}

// ── Fix ──────────────────────────────────────────────────────────────────────

pub fn fix_stream<R: Read, E: Read, W: Write>(
    codec:            &dyn Codec,
    src:              R,
    mut ecc:          E,
    out:              W,
    blocks_per_chunk: usize,
    cancel:           &CancelToken,
) -> Result<FixReport> {
    let params = codec.params();
    let (k, n, p) = (params.message_size(), params.result_size(), params.parity_size());
    let mut blocks_in = BlockReader::with_chunk_blocks(src, k, blocks_per_chunk);
    let mut out = WriteBuffer::new(out, WRITE_BUFFER_SIZE);
    let mut parity = Vec::new();
    let mut report = FixReport {
        blocks:            0,
        repaired_blocks:   0,
        corrected_symbols: 0,
        output_bytes:      0,
        identical:         None,
    };

    loop {
        if let Err(e) = cancel.check() {
            out.flush()?;
            return Err(e);
        }
        let Some(batch) = blocks_in.next_batch()? else { break };
        read_parity(&mut ecc, &batch, p, &mut parity)?;

        let first = batch[0].index;
        let decoded = map_blocks(&batch, |b| -> std::result::Result<Decoded, CodecError> {
            let d = codec.decode_until(&codeword(b, &parity, first, p), cancel)?;
            if d.codeword.len() != n {
                return Err(CodecError::BlockLength { expected: n, actual: d.codeword.len() });
            }
            Ok(d)
        });

        // Validate the whole super-chunk before writing any of it.
        let mut corrected = Vec::with_capacity(batch.len());
        for (b, d) in batch.iter().zip(decoded) {
            match d {
                Ok(d) => corrected.push(d),
                Err(CodecError::Uncorrectable) => {
                    out.flush()?;
                    return Err(EccError::UncorrectableBlock { block: b.index });
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (b, d) in batch.iter().zip(&corrected) {
            out.write_all(strip_padding(d.message(k), b.padding))?;
            if d.corrected > 0 {
                report.repaired_blocks += 1;
                report.corrected_symbols += d.corrected as u64;
            }
        }
        report.blocks += batch.len() as u64;
    }

    out.flush()?;
    report.output_bytes = out.bytes_written;
    Ok(report)
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Read exactly one parity block per block of `batch` into `buf`.
fn read_parity<E: Read>(ecc: &mut E, batch: &[Block], p: usize, buf: &mut Vec<u8>) -> Result<()> {
    buf.resize(batch.len() * p, 0);
    let got = read_full(ecc, buf)?;
    if got < buf.len() {
        return Err(EccError::EccStoreTruncated { block: batch[0].index + (got / p) as u64 });
    }
    Ok(())
}

/// `message[k] ++ parity[p]` for block `b` of a batch starting at `first`.
fn codeword(b: &Block, parity: &[u8], first: u64, p: usize) -> Vec<u8> {
    let i = (b.index - first) as usize;
    let mut cw = Vec::with_capacity(b.message.len() + p);
    cw.extend_from_slice(&b.message);
    cw.extend_from_slice(&parity[i * p..(i + 1) * p]);
    cw
}

/// BLAKE3 digest of a whole stream.
pub fn digest<R: Read>(mut reader: R) -> io::Result<[u8; 32]> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = read_full(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}
