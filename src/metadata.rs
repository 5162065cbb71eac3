//! The metadata-chunk stream.
//!
//! SquashFS addresses every on-disk table (inodes, directory entries,
//! fragment descriptors) through a chain of "metadata chunks": a 2-byte
//! little-endian header followed by a payload that, once decompressed,
//! always amounts to [`CHUNK_SIZE`] logical bytes (the final chunk of a
//! stream may be shorter on disk but is still addressed as if full-size).
//!
//! [`ChunkStream::read`] is the single function every other component in
//! this crate funnels metadata reads through, mirroring the original
//! reader's `read_chunk`, which is likewise the only metadata-chunk reader
//! in that codebase.

use crate::compressor::Inflate;
use crate::device::{read_exact_at, BlockDevice};
use crate::error::Squash4Error;

/// Logical size, in bytes, every metadata chunk decompresses to.
pub const CHUNK_SIZE: u32 = 8192;

const LENGTH_MASK: u16 = 0x7FFF;
const UNCOMPRESSED_FLAG: u16 = 0x8000;

/// A chunk-addressed location: the absolute disk offset of a chunk's 2-byte
/// header, plus a logical byte offset from there (which may be `>= CHUNK_SIZE`,
/// meaning "walk forward that many chunks first").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef {
    pub chunk_start_abs: u64,
    pub logical_offset: u32,
}

impl ChunkRef {
    pub fn new(chunk_start_abs: u64, logical_offset: u32) -> Self {
        Self {
            chunk_start_abs,
            logical_offset,
        }
    }
}

/// Reads logical byte ranges out of the metadata-chunk chain, transparently
/// decompressing and walking forward across chunk boundaries.
///
/// Stateless across calls by design (see the "no caching" non-goal): every
/// `read` restarts its chunk walk from the given [`ChunkRef`].
pub struct ChunkStream<'d, D, I> {
    device: &'d mut D,
    inflate: &'d I,
}

impl<'d, D: BlockDevice, I: Inflate> ChunkStream<'d, D, I> {
    pub fn new(device: &'d mut D, inflate: &'d I) -> Self {
        Self { device, inflate }
    }

    /// Deliver `dst.len()` logical bytes starting at `at`.
    pub fn read(&mut self, at: ChunkRef, mut dst: &mut [u8]) -> Result<(), Squash4Error> {
        let mut chunk_start = at.chunk_start_abs;
        let mut logical_offset = at.logical_offset;

        while !dst.is_empty() {
            let mut header_buf = [0u8; 2];
            read_exact_at(self.device, chunk_start, &mut header_buf)?;
            let header = u16::from_le_bytes(header_buf);
            let on_disk_len = (header & LENGTH_MASK) as u64;

            if logical_offset >= CHUNK_SIZE {
                logical_offset -= CHUNK_SIZE;
                chunk_start += 2 + on_disk_len;
                continue;
            }

            let csize = (CHUNK_SIZE - logical_offset).min(dst.len() as u32);
            let payload_start = chunk_start + 2;

            if header & UNCOMPRESSED_FLAG != 0 {
                read_exact_at(
                    self.device,
                    payload_start + logical_offset as u64,
                    &mut dst[..csize as usize],
                )?;
            } else {
                let mut scratch = vec![0u8; on_disk_len as usize];
                read_exact_at(self.device, payload_start, &mut scratch)?;
                self.inflate
                    .inflate(&scratch, logical_offset as usize, &mut dst[..csize as usize])?;
            }

            dst = &mut dst[csize as usize..];
            chunk_start = payload_start + on_disk_len;
            logical_offset = 0;
        }

        Ok(())
    }
}
