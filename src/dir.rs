//! Directory entry decoding and iteration.

use crate::compressor::Inflate;
use crate::device::BlockDevice;
use crate::error::Squash4Error;
use crate::inode::DirInode;
use crate::metadata::{ChunkRef, ChunkStream};

const HEADER_SIZE: u32 = 12;
const ENTRY_FIXED_SIZE: u32 = 8;

/// What kind of child a directory entry names, taken from the entry's own
/// type tag rather than peeked from the child inode (the two can disagree
/// for reasons the on-disk format does not surface, so the entry's tag is
/// authoritative here, matching the original reader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Symlink,
    Other,
}

impl EntryKind {
    fn from_tag(tag: u16) -> Self {
        match tag {
            crate::inode::TYPE_DIR => EntryKind::Dir,
            crate::inode::TYPE_SYMLINK => EntryKind::Symlink,
            _ => EntryKind::Other,
        }
    }
}

/// One decoded directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub child_inode: ChunkRef,
}

struct GroupState {
    remaining: u32,
    ino_chunk_base: u64,
}

/// Streams the entries of one directory, in the teacher's style of a nested
/// hook rather than a returned `Vec` — directories are not materialized in
/// full, following the lazy-traversal requirement the rest of this crate
/// observes.
pub struct DirIter<'d, D, I> {
    device: &'d mut D,
    inflate: &'d I,
    inode_table_base: u64,
    off: u32,
    end: u32,
    chunk_start_abs: u64,
    group: Option<GroupState>,
}

impl<'d, D: BlockDevice, I: Inflate> DirIter<'d, D, I> {
    pub fn new(
        device: &'d mut D,
        inflate: &'d I,
        dir_table_base: u64,
        inode_table_base: u64,
        dir: &DirInode,
    ) -> Self {
        let chunk_start_abs = dir_table_base + dir.start_chunk as u64;
        let off = dir.offset;
        // Directory size is content length plus three trailing bytes; the
        // on-disk format does not explain the three bytes any further.
        let end = dir.size as u32 + off - 3;
        Self {
            device,
            inflate,
            inode_table_base,
            off,
            end,
            chunk_start_abs,
            group: None,
        }
    }

    fn stream(&mut self) -> ChunkStream<'_, D, I> {
        ChunkStream::new(self.device, self.inflate)
    }

    /// Invoke `hook` for every entry until the directory ends or the hook
    /// asks to stop.
    pub fn for_each_entry<F>(mut self, mut hook: F) -> Result<(), Squash4Error>
    where
        F: FnMut(&DirEntry) -> std::ops::ControlFlow<()>,
    {
        while let Some(entry) = self.next_entry()? {
            if hook(&entry).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<DirEntry>, Squash4Error> {
        loop {
            if self.off >= self.end {
                return Ok(None);
            }

            if self.group.is_none() {
                let mut raw = [0u8; HEADER_SIZE as usize];
                self.stream()
                    .read(ChunkRef::new(self.chunk_start_abs, self.off), &mut raw)?;
                let count = u32::from_le_bytes(raw[0..4].try_into().unwrap());
                let start = u32::from_le_bytes(raw[4..8].try_into().unwrap());
                self.off += HEADER_SIZE;
                self.group = Some(GroupState {
                    remaining: count + 1,
                    ino_chunk_base: self.inode_table_base + start as u64,
                });
            }

            let group = self.group.as_mut().unwrap();
            if group.remaining == 0 {
                self.group = None;
                continue;
            }
            group.remaining -= 1;
            let ino_chunk_base = group.ino_chunk_base;

            let mut fixed = [0u8; ENTRY_FIXED_SIZE as usize];
            self.stream()
                .read(ChunkRef::new(self.chunk_start_abs, self.off), &mut fixed)?;
            self.off += ENTRY_FIXED_SIZE;

            let ino_offset = u16::from_le_bytes(fixed[0..2].try_into().unwrap());
            let type_tag = u16::from_le_bytes(fixed[4..6].try_into().unwrap());
            let name_size = u16::from_le_bytes(fixed[6..8].try_into().unwrap());
            let namelen = name_size as u32 + 1;

            let mut name_buf = vec![0u8; namelen as usize];
            self.stream()
                .read(ChunkRef::new(self.chunk_start_abs, self.off), &mut name_buf)?;
            self.off += namelen;

            let name = String::from_utf8_lossy(&name_buf).into_owned();
            return Ok(Some(DirEntry {
                name,
                kind: EntryKind::from_tag(type_tag),
                child_inode: ChunkRef::new(ino_chunk_base, ino_offset as u32),
            }));
        }
    }
}
