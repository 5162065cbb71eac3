//! Fragment descriptors: the tail-packing table that lets many files share
//! the remainder of a block.

use deku::prelude::*;

use crate::compressor::Inflate;
use crate::device::{read_exact_at, BlockDevice};
use crate::error::Squash4Error;
use crate::metadata::{ChunkRef, ChunkStream};

/// Marks a block- or fragment-size word as "stored uncompressed".
pub const STORED_UNCOMPRESSED: u32 = 0x0100_0000;
const SIZE_MASK: u32 = 0x00FF_FFFF;

/// On-disk size of one [`Fragment`] record.
pub const FRAGMENT_SIZE: usize = 16;

/// A single fragment descriptor.
#[derive(Debug, Clone, Copy, DekuRead)]
#[deku(endian = "little")]
pub struct Fragment {
    pub start: u64,
    pub size: u32,
    pub unused: u32,
}

impl Fragment {
    pub fn uncompressed(&self) -> bool {
        self.size & STORED_UNCOMPRESSED != 0
    }

    pub fn on_disk_size(&self) -> u32 {
        self.size & SIZE_MASK
    }
}

/// The fragment descriptor table.
///
/// Addressed the same way as every other metadata structure: the
/// superblock's `fragment_table` field points (via a plain, unchunked u64)
/// at the *base* of a chunk-addressed table, and fragment `k` lives at
/// logical offset `16 * k` from that base.
pub struct FragmentTable {
    base_abs: u64,
}

impl FragmentTable {
    pub fn new<D: BlockDevice>(device: &mut D, table_ptr_abs: u64) -> Result<Self, Squash4Error> {
        let mut buf = [0u8; 8];
        read_exact_at(device, table_ptr_abs, &mut buf)?;
        Ok(Self {
            base_abs: u64::from_le_bytes(buf),
        })
    }

    pub fn get<D: BlockDevice, I: Inflate>(
        &self,
        device: &mut D,
        inflate: &I,
        index: u32,
    ) -> Result<Fragment, Squash4Error> {
        let mut raw = [0u8; FRAGMENT_SIZE];
        let mut stream = ChunkStream::new(device, inflate);
        stream.read(ChunkRef::new(self.base_abs, 16 * index), &mut raw)?;
        let (_, frag) = Fragment::from_bytes((&raw, 0))?;
        Ok(frag)
    }
}
