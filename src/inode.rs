//! Inodes.
//!
//! On disk this is a C union discriminated by a 16-byte shared prologue
//! (`type`, `mode`, `uid`, `gid` each u16, then `mtime: u32`,
//! `inode_number: u32`). This crate models it as a Rust enum instead,
//! decoded in two steps: the fixed-size prologue plus variant body are read
//! through the metadata-chunk stream, and any variable-length tail (a
//! symlink's name, a regular file's block-size array) is left to the caller
//! to fetch from the returned tail [`ChunkRef`], since both need extra
//! context (the superblock's `block_size`) that inode decoding itself
//! doesn't have.

use deku::prelude::*;

use crate::compressor::Inflate;
use crate::device::BlockDevice;
use crate::error::Squash4Error;
use crate::metadata::{ChunkRef, ChunkStream};
use crate::squashfs::SuperBlock;

pub const TYPE_DIR: u16 = 1;
pub const TYPE_REGULAR: u16 = 2;
pub const TYPE_SYMLINK: u16 = 3;
pub const TYPE_LONG_REGULAR: u16 = 9;

const PROLOGUE_SIZE: u32 = 16;

/// A directory inode.
#[derive(Debug, Clone, Copy, DekuRead)]
#[deku(endian = "little")]
pub struct DirInode {
    pub mtime: u32,
    /// Directory-table-relative chunk offset.
    pub start_chunk: u32,
    pub size: u16,
    pub offset: u32,
}

/// A regular file whose data chunk address and size both fit in `u32`.
#[derive(Debug, Clone, Copy, DekuRead)]
#[deku(endian = "little")]
pub struct RegularInode {
    pub mtime: u32,
    /// Absolute disk offset of the first data block, or 0 to mean
    /// immediately after the superblock.
    pub chunk: u32,
    /// `0xFFFFFFFF` means "no fragment".
    pub fragment: u32,
    pub offset_in_fragment: u32,
    pub size: u32,
}

impl RegularInode {
    pub fn has_fragment(&self) -> bool {
        self.fragment != 0xFFFF_FFFF
    }
}

/// A regular file large enough to need 64-bit chunk/size fields.
#[derive(Debug, Clone, Copy, DekuRead)]
#[deku(endian = "little")]
pub struct LongRegularInode {
    pub mtime: u32,
    pub chunk: u64,
    pub fragment: u32,
    pub offset_in_fragment: u32,
    pub size: u64,
}

impl LongRegularInode {
    pub fn has_fragment(&self) -> bool {
        self.fragment != 0xFFFF_FFFF
    }
}

/// A symbolic link; the target name itself is read separately from the tail
/// [`ChunkRef`] returned alongside this inode.
#[derive(Debug, Clone, Copy, DekuRead)]
#[deku(endian = "little")]
pub struct SymlinkInode {
    pub mtime: u32,
    pub namelen: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum Inode {
    Dir(DirInode),
    Regular(RegularInode),
    LongRegular(LongRegularInode),
    Symlink(SymlinkInode),
}

impl Inode {
    pub fn mtime(&self) -> u32 {
        match self {
            Inode::Dir(i) => i.mtime,
            Inode::Regular(i) => i.mtime,
            Inode::LongRegular(i) => i.mtime,
            Inode::Symlink(i) => i.mtime,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Inode::Dir(_))
    }
}

/// Read the inode at `at` (relative to the superblock's `inode_table` base
/// having already been folded into `at.chunk_start_abs` by the caller) and
/// return it along with a [`ChunkRef`] positioned right after its
/// fixed-size body, where any variable-length tail begins.
pub(crate) fn read_inode<D: BlockDevice, I: Inflate>(
    device: &mut D,
    inflate: &I,
    _sb: &SuperBlock,
    at: ChunkRef,
) -> Result<(Inode, ChunkRef), Squash4Error> {
    let mut stream = ChunkStream::new(device, inflate);

    let mut prologue = [0u8; PROLOGUE_SIZE as usize];
    stream.read(at, &mut prologue)?;
    let type_tag = u16::from_le_bytes([prologue[0], prologue[1]]);
    let mtime = u32::from_le_bytes(prologue[8..12].try_into().unwrap());

    let body_at = ChunkRef::new(at.chunk_start_abs, at.logical_offset + PROLOGUE_SIZE);

    let (inode, body_len) = match type_tag {
        TYPE_DIR => {
            let mut raw = [0u8; 10];
            stream.read(body_at, &mut raw)?;
            let start_chunk = u32::from_le_bytes(raw[0..4].try_into().unwrap());
            let size = u16::from_le_bytes(raw[4..6].try_into().unwrap());
            let offset = u32::from_le_bytes(raw[6..10].try_into().unwrap());
            (
                Inode::Dir(DirInode {
                    mtime,
                    start_chunk,
                    size,
                    offset,
                }),
                10,
            )
        }
        TYPE_REGULAR => {
            let mut raw = [0u8; 16];
            stream.read(body_at, &mut raw)?;
            let (_, mut parsed) = RegularInode::from_bytes((&raw, 0))?;
            parsed.mtime = mtime;
            (Inode::Regular(parsed), 16)
        }
        TYPE_LONG_REGULAR => {
            let mut raw = [0u8; 24];
            stream.read(body_at, &mut raw)?;
            let (_, mut parsed) = LongRegularInode::from_bytes((&raw, 0))?;
            parsed.mtime = mtime;
            (Inode::LongRegular(parsed), 24)
        }
        TYPE_SYMLINK => {
            let mut raw = [0u8; 4];
            stream.read(body_at, &mut raw)?;
            let namelen = u32::from_le_bytes(raw);
            (Inode::Symlink(SymlinkInode { mtime, namelen }), 4)
        }
        _ => return Err(Squash4Error::Corrupt("unknown inode type")),
    };

    let tail_at = ChunkRef::new(
        body_at.chunk_start_abs,
        body_at.logical_offset + body_len as u32,
    );
    Ok((inode, tail_at))
}
