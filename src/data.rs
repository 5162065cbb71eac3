//! Regular-file data reads.
//!
//! A regular-file inode addresses its bytes two ways: a run of
//! independently-compressed `block_size`-sized blocks, and an optional
//! trailing "fragment" shared with other files' tails. [`FileReader`] owns
//! the one piece of state this crate caches past a single call — the
//! per-block size table and its cumulated-offset sibling — exactly as
//! spec'd in "one per-open file's decoded block-size table".

use crate::compressor::Inflate;
use crate::device::{read_exact_at, BlockDevice};
use crate::error::Squash4Error;
use crate::fragment::{Fragment, FragmentTable};
use crate::inode::Inode;
use crate::metadata::{ChunkRef, ChunkStream};
use crate::squashfs::SUPERBLOCK_SIZE;

/// Marks a block-size word as "stored uncompressed". Same bit position as
/// [`crate::fragment::STORED_UNCOMPRESSED`]; kept as its own constant since
/// the two fields are logically distinct on-disk words.
const BLOCK_STORED_UNCOMPRESSED: u32 = 0x0100_0000;
const BLOCK_SIZE_MASK: u32 = 0x00FF_FFFF;

/// The subset of a regular-file inode's fields [`FileReader`] needs,
/// independent of whether it came from a `REGULAR` or `LONG_REGULAR` inode.
#[derive(Debug, Clone, Copy)]
struct RegularFileShape {
    /// Absolute disk offset of the first data block, or 0 meaning
    /// "immediately after the superblock".
    chunk: u64,
    fragment: u32,
    offset_in_fragment: u32,
    size: u64,
    /// Chunk reference to the start of the trailing block-size-word array
    /// inside the inode's own metadata-chunk body.
    block_sizes_at: ChunkRef,
}

impl RegularFileShape {
    fn from_inode(inode: &Inode, tail_at: ChunkRef) -> Option<Self> {
        match inode {
            Inode::Regular(r) => Some(Self {
                chunk: r.chunk as u64,
                fragment: r.fragment,
                offset_in_fragment: r.offset_in_fragment,
                size: r.size as u64,
                block_sizes_at: tail_at,
            }),
            Inode::LongRegular(r) => Some(Self {
                chunk: r.chunk,
                fragment: r.fragment,
                offset_in_fragment: r.offset_in_fragment,
                size: r.size,
                block_sizes_at: tail_at,
            }),
            _ => None,
        }
    }

    fn has_fragment(&self) -> bool {
        self.fragment != 0xFFFF_FFFF
    }

    fn data_base(&self) -> u64 {
        if self.chunk == 0 {
            SUPERBLOCK_SIZE
        } else {
            self.chunk
        }
    }
}

/// One open regular file. Borrows nothing; the caller re-supplies the
/// device, inflate implementation, and fragment table on every call, so
/// this type has no lifetime of its own — it exists only to hold the
/// lazily-populated block-size table across calls.
pub struct FileReader {
    shape: RegularFileShape,
    block_size: u32,
    /// `block_sizes[i] & 0x01000000` = uncompressed, low 24 bits = on-disk
    /// size, zero = sparse hole.
    block_sizes: Option<Vec<u32>>,
    /// `cumulated[i]` = sum of on-disk sizes of blocks `0..i`.
    cumulated: Option<Vec<u64>>,
}

impl FileReader {
    pub fn new(inode: &Inode, tail_at: ChunkRef, block_size: u32) -> Result<Self, Squash4Error> {
        let shape = RegularFileShape::from_inode(inode, tail_at)
            .ok_or(Squash4Error::Corrupt("not a regular file inode"))?;
        Ok(Self {
            shape,
            block_size,
            block_sizes: None,
            cumulated: None,
        })
    }

    pub fn size(&self) -> u64 {
        self.shape.size
    }

    fn ensure_block_table<D: BlockDevice, I: Inflate>(
        &mut self,
        device: &mut D,
        inflate: &I,
    ) -> Result<(), Squash4Error> {
        if self.block_sizes.is_some() {
            return Ok(());
        }

        let total_blocks = self.size().div_ceil(self.block_size as u64) as usize;
        let mut raw = vec![0u8; total_blocks * 4];
        ChunkStream::new(device, inflate).read(self.shape.block_sizes_at, &mut raw)?;

        let mut block_sizes = Vec::with_capacity(total_blocks);
        let mut cumulated = Vec::with_capacity(total_blocks);
        let mut running = 0u64;
        for word_bytes in raw.chunks_exact(4) {
            cumulated.push(running);
            let word = u32::from_le_bytes(word_bytes.try_into().unwrap());
            running += (word & BLOCK_SIZE_MASK) as u64;
            block_sizes.push(word);
        }

        self.block_sizes = Some(block_sizes);
        self.cumulated = Some(cumulated);
        Ok(())
    }

    /// Read `dst.len()` bytes starting at `file_offset`.
    pub fn read_at<D: BlockDevice, I: Inflate>(
        &mut self,
        device: &mut D,
        inflate: &I,
        fragments: &FragmentTable,
        file_offset: u64,
        dst: &mut [u8],
    ) -> Result<(), Squash4Error> {
        if dst.is_empty() {
            return Ok(());
        }

        self.ensure_block_table(device, inflate)?;

        // The source always routes through the fragment path once a file
        // carries one, even for ranges that lie wholly in direct blocks.
        if self.shape.has_fragment() {
            return self.read_fragment(device, inflate, fragments, file_offset, dst);
        }

        self.read_direct(device, inflate, file_offset, dst)
    }

    fn read_fragment<D: BlockDevice, I: Inflate>(
        &self,
        device: &mut D,
        inflate: &I,
        fragments: &FragmentTable,
        file_offset: u64,
        dst: &mut [u8],
    ) -> Result<(), Squash4Error> {
        let frag: Fragment = fragments.get(device, inflate, self.shape.fragment)?;
        let a = self.shape.chunk + frag.start;
        let b = self.shape.offset_in_fragment as u64 + file_offset;

        if frag.uncompressed() {
            read_exact_at(device, a + b, dst)?;
        } else {
            let mut scratch = vec![0u8; frag.on_disk_size() as usize];
            read_exact_at(device, a, &mut scratch)?;
            inflate.inflate(&scratch, b as usize, dst)?;
        }
        Ok(())
    }

    fn read_direct<D: BlockDevice, I: Inflate>(
        &self,
        device: &mut D,
        inflate: &I,
        mut file_offset: u64,
        mut dst: &mut [u8],
    ) -> Result<(), Squash4Error> {
        let block_sizes = self.block_sizes.as_ref().unwrap();
        let cumulated = self.cumulated.as_ref().unwrap();
        let a = self.shape.data_base();
        let block_size = self.block_size as u64;

        let mut i = (file_offset / block_size) as usize;
        let mut covered = block_size * i as u64;

        while !dst.is_empty() {
            let boff = file_offset - covered;
            let n = ((block_size - boff) as usize).min(dst.len());

            let word = *block_sizes
                .get(i)
                .ok_or(Squash4Error::Corrupt("block index past end of file"))?;
            let on_disk_size = word & BLOCK_SIZE_MASK;
            let block_addr = a + cumulated[i];

            if word == 0 {
                dst[..n].fill(0);
            } else if word & BLOCK_STORED_UNCOMPRESSED != 0 {
                read_exact_at(device, block_addr + boff, &mut dst[..n])?;
            } else {
                let mut scratch = vec![0u8; on_disk_size as usize];
                read_exact_at(device, block_addr, &mut scratch)?;
                inflate.inflate(&scratch, boff as usize, &mut dst[..n])?;
            }

            dst = &mut dst[n..];
            file_offset += n as u64;
            covered += block_size;
            i += 1;
        }

        Ok(())
    }
}
