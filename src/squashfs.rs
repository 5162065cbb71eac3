//! Superblock and mount handle.

use deku::prelude::*;
use tracing::{instrument, trace};

use crate::compressor::{Inflate, ZlibInflate};
use crate::device::{read_exact_at, BlockDevice};
use crate::error::Squash4Error;
use crate::fragment::FragmentTable;
use crate::inode::Inode;
use crate::metadata::ChunkRef;

/// `0x73717368` little-endian, ASCII `"hsqs"`.
pub const SQUASH_MAGIC: u32 = 0x7371_7368;

/// Fixed on-disk size of the superblock this crate interprets.
pub const SUPERBLOCK_SIZE: u64 = 96;

/// The 96-byte SquashFS v4 superblock, decoded field-by-field little-endian.
///
/// Only the fields this crate's read path needs are interpreted; the
/// remaining bytes of the 96-byte window (compressor id, flags, id/xattr
/// table pointers, and so on) are real SquashFS fields this crate does not
/// use, since UID/GID/xattr resolution and non-zlib compressor selection are
/// both out of scope.
#[derive(Debug, Clone, DekuRead)]
#[deku(endian = "little")]
pub struct SuperBlock {
    pub magic: u32,
    pub inode_count: u32,
    pub mod_time: u32,
    pub block_size: u32,
    pub frag_count: u32,
    pub compressor: u16,
    pub block_log: u16,
    pub flags: u16,
    pub id_count: u16,
    pub version_major: u16,
    pub version_minor: u16,
    /// Packed root-inode reference, 8 bytes wide on disk like every other
    /// table pointer in this struct (teacher's `root_inode: u64`,
    /// `superblock.rs:150`). The low 16 bits are the chunk-relative
    /// offset; the next 16 bits are the directory-table-relative chunk —
    /// on-disk this field is 32 bits wide, but only its low 16 bits are
    /// ever read back (`squash4.c:409`, `grub_le_to_cpu16`).
    pub root_inode: u64,
    pub bytes_used: u64,
    pub id_table: u64,
    pub xattr_table: u64,
    pub inode_table: u64,
    pub dir_table: u64,
    pub fragment_table: u64,
    pub export_table: u64,
}

impl SuperBlock {
    pub fn root_ino_offset(&self) -> u16 {
        (self.root_inode & 0xFFFF) as u16
    }

    pub fn root_ino_chunk(&self) -> u16 {
        ((self.root_inode >> 16) & 0xFFFF) as u16
    }

    pub fn root_inode_ref(&self) -> ChunkRef {
        ChunkRef::new(
            self.inode_table + self.root_ino_chunk() as u64,
            self.root_ino_offset() as u32,
        )
    }
}

/// A mounted image: the parsed superblock, the device handle, and the
/// fragment table's dereferenced base.
pub struct Squash4Fs<D> {
    pub(crate) device: D,
    pub(crate) inflate: ZlibInflate,
    pub superblock: SuperBlock,
    pub(crate) fragments: FragmentTable,
}

impl<D: BlockDevice> Squash4Fs<D> {
    /// Parse the superblock and validate the magic, then dereference the
    /// fragment-table pointer.
    #[instrument(skip(device))]
    pub fn mount(mut device: D) -> Result<Self, Squash4Error> {
        let mut raw = [0u8; SUPERBLOCK_SIZE as usize];
        read_exact_at(&mut device, 0, &mut raw)?;
        let (_, superblock) = SuperBlock::from_bytes((&raw, 0))?;

        if superblock.magic != SQUASH_MAGIC {
            return Err(Squash4Error::BadFs);
        }
        trace!(block_size = superblock.block_size, "mounted squashfs v4 image");

        let fragments = FragmentTable::new(&mut device, superblock.fragment_table)?;

        Ok(Self {
            device,
            inflate: ZlibInflate,
            superblock,
            fragments,
        })
    }

    /// The image's creation time, as recorded in the superblock.
    pub fn mtime(&self) -> u32 {
        self.superblock.mod_time
    }

    pub(crate) fn root_inode(&mut self) -> Result<Inode, Squash4Error> {
        let at = self.superblock.root_inode_ref();
        crate::inode::read_inode(&mut self.device, &self.inflate, &self.superblock, at)
    }
}
