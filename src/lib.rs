//! A read-only reader for [SquashFS](https://en.wikipedia.org/wiki/SquashFS)
//! version 4 images, sized for an early-boot loader: block-level access to a
//! device is all it needs to resolve paths, enumerate directories, read
//! regular file contents, and follow symbolic links.
//!
//! ## Example
//! ```rust,no_run
//! # use std::fs::File;
//! # use std::io::{BufReader, Read};
//! # use squash4::{FileBlockDevice, Squash4Fs};
//! let file = BufReader::new(File::open("image.squashfs").unwrap());
//! let mut fs = Squash4Fs::mount(FileBlockDevice::new(file)).unwrap();
//!
//! fs.read_dir("/", |name, info| {
//!     println!("{name} (dir: {}, mtime: {})", info.is_dir, info.mtime);
//! })
//! .unwrap();
//!
//! let mut handle = fs.open("/hello").unwrap();
//! let mut contents = String::new();
//! handle.read_to_string(&mut contents).unwrap();
//! ```

mod compressor;
mod data;
mod device;
mod dir;
mod error;
mod fragment;
mod inode;
mod metadata;
mod path;
mod squashfs;

use std::io::{self, Read};
use std::ops::ControlFlow;

pub use crate::compressor::{Inflate, ZlibInflate};
pub use crate::device::{BlockDevice, FileBlockDevice, SECTOR_SIZE};
pub use crate::dir::EntryKind as DirEntryKind;
pub use crate::error::Squash4Error;
pub use crate::inode::Inode;
pub use crate::squashfs::{Squash4Fs, SuperBlock, SQUASH_MAGIC};

use crate::data::FileReader;
use crate::dir::DirIter;
use crate::inode::{read_inode, DirInode};

/// What [`Squash4Fs::read_dir`] reports about each entry, beyond its name.
#[derive(Debug, Clone, Copy)]
pub struct DirEntryInfo {
    /// Whether the directory-entry tag marks this child as a directory.
    pub is_dir: bool,
    /// `mtime` of the child inode, same units as [`Squash4Fs::mtime`].
    pub mtime: u32,
}

impl<D: BlockDevice> Squash4Fs<D> {
    /// Enumerate one directory's entries, resolving intermediate path
    /// components (and any symlinks among them) first.
    ///
    /// `hook` is invoked once per entry in on-disk order; unlike
    /// [`crate::dir::DirIter`]'s own iteration, there is no early-exit here —
    /// a directory listing is expected to be exhaustive.
    pub fn read_dir(
        &mut self,
        path: &str,
        mut hook: impl FnMut(&str, DirEntryInfo),
    ) -> Result<(), Squash4Error> {
        let resolved = path::resolve_fully(self, path)?;
        let dir: DirInode = match resolved.inode {
            Inode::Dir(d) => d,
            _ => return Err(Squash4Error::NotADirectory),
        };

        // DirIter borrows `self.device`/`self.inflate` for the lifetime of
        // the iteration; collect the raw entries first so the hook below is
        // free to call back into `self` (e.g. to `stat` a child) without
        // fighting that borrow.
        let mut entries = Vec::new();
        {
            let iter = DirIter::new(
                &mut self.device,
                &self.inflate,
                self.superblock.dir_table,
                self.superblock.inode_table,
                &dir,
            );
            iter.for_each_entry(|entry| {
                entries.push((entry.name.clone(), entry.kind, entry.child_inode));
                ControlFlow::Continue(())
            })?;
        }

        for (name, kind, child_ref) in entries {
            let (child_inode, _tail) =
                read_inode(&mut self.device, &self.inflate, &self.superblock, child_ref)?;
            hook(
                &name,
                DirEntryInfo {
                    is_dir: kind == DirEntryKind::Dir,
                    mtime: child_inode.mtime(),
                },
            );
        }
        Ok(())
    }

    /// Resolve `path` (following any symlinks, including a terminal one) and
    /// attach a read handle to the regular file found there.
    ///
    /// Returns [`Squash4Error::IsADirectory`] if the path names a directory.
    pub fn open(&mut self, path: &str) -> Result<OpenFile<'_, D>, Squash4Error> {
        let resolved = path::resolve_fully(self, path)?;
        match resolved.inode {
            Inode::Dir(_) => Err(Squash4Error::IsADirectory),
            Inode::Symlink(_) => {
                // resolve_fully always dereferences a terminal symlink, so a
                // Symlink variant surviving to here means a dangling or
                // self-referential target slipped past the depth guard.
                Err(Squash4Error::NotFound)
            }
            Inode::Regular(_) | Inode::LongRegular(_) => {
                let block_size = self.superblock.block_size;
                let reader = FileReader::new(&resolved.inode, resolved.tail_at, block_size)?;
                Ok(OpenFile {
                    fs: self,
                    reader,
                    pos: 0,
                })
            }
        }
    }
}

/// A regular file opened via [`Squash4Fs::open`].
///
/// Borrows its mount handle rather than owning a clone of it, since the
/// underlying device and fragment table are shared, read-only state; the
/// only state this handle adds is the lazily-populated block-size table
/// (see [`crate::data::FileReader`]) and a [`Read`]/[`Seek`]-style cursor.
pub struct OpenFile<'fs, D> {
    fs: &'fs mut Squash4Fs<D>,
    reader: FileReader,
    pos: u64,
}

impl<D: BlockDevice> OpenFile<'_, D> {
    /// The file's uncompressed size, as recorded in its inode.
    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    /// Read `dst.len()` bytes starting at the given file offset, independent
    /// of this handle's own [`Read`] cursor position.
    ///
    /// Returns fewer bytes than requested only at end of file; a short read
    /// elsewhere in the image is an error, not a partial count.
    pub fn read_at(&mut self, file_offset: u64, dst: &mut [u8]) -> Result<usize, Squash4Error> {
        let remaining = self.reader.size().saturating_sub(file_offset);
        let n = (dst.len() as u64).min(remaining) as usize;
        if n == 0 {
            return Ok(0);
        }
        self.reader.read_at(
            &mut self.fs.device,
            &self.fs.inflate,
            &self.fs.fragments,
            file_offset,
            &mut dst[..n],
        )?;
        Ok(n)
    }
}

impl<D: BlockDevice> Read for OpenFile<'_, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.pos, buf).map_err(io::Error::from)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;
    use crate::inode::{TYPE_DIR, TYPE_REGULAR};

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    struct TableBuilder {
        buf: Vec<u8>,
    }

    impl TableBuilder {
        fn new() -> Self {
            Self { buf: Vec::new() }
        }

        fn push(&mut self, payload: &[u8]) -> u32 {
            let rel = self.buf.len() as u32;
            let header = (payload.len() as u16) | 0x8000;
            self.buf.extend_from_slice(&header.to_le_bytes());
            self.buf.extend_from_slice(payload);
            rel
        }
    }

    fn inode_prologue(type_tag: u16) -> Vec<u8> {
        let mut v = type_tag.to_le_bytes().to_vec();
        v.extend_from_slice(&[0u8; 6]);
        v.extend_from_slice(&4242u32.to_le_bytes()); // mtime
        v.extend_from_slice(&0u32.to_le_bytes());
        v
    }

    fn dir_inode_body(start_chunk: u32, size: u16, offset: u32) -> Vec<u8> {
        let mut v = inode_prologue(TYPE_DIR);
        v.extend_from_slice(&start_chunk.to_le_bytes());
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(&offset.to_le_bytes());
        v
    }

    fn dir_group(ino_chunk_base: u32, entries: &[(u16, u16, &str)]) -> Vec<u8> {
        let mut out = ((entries.len() as u32) - 1).to_le_bytes().to_vec();
        out.extend_from_slice(&ino_chunk_base.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for (ino_offset, type_tag, name) in entries {
            out.extend_from_slice(&ino_offset.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&type_tag.to_le_bytes());
            out.extend_from_slice(&((name.len() - 1) as u16).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
        }
        out
    }

    /// Builds a one-level image holding `/hello` ("hi\n", one compressed
    /// block, no fragment) so `read_dir`/`open`/`Read` can be exercised
    /// end-to-end against the public API.
    ///
    /// The data block is unchunked (direct-block reads go straight to the
    /// device, not through [`crate::metadata::ChunkStream`]) and is placed
    /// right after the superblock, matching `chunk == 0`'s "immediately
    /// after the superblock" shorthand. The block-size word is appended
    /// directly after the inode's own fixed `REGULAR` fields, inside the
    /// same metadata-chunk push, so that `tail_at` (computed purely from
    /// byte offsets within that one chunk) lands on it.
    fn build_image() -> Vec<u8> {
        let data = b"hi\n";
        let compressed = zlib_compress(data);
        let raw_region = compressed.clone();

        let mut t = TableBuilder::new();

        let mut hello_body = inode_prologue(TYPE_REGULAR);
        hello_body.extend_from_slice(&0u32.to_le_bytes()); // chunk = 0
        hello_body.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // no fragment
        hello_body.extend_from_slice(&0u32.to_le_bytes()); // offset_in_fragment
        hello_body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        hello_body.extend_from_slice(&(compressed.len() as u32).to_le_bytes()); // block_sizes[0]
        let hello_inode = t.push(&hello_body);

        let root_content = dir_group(hello_inode, &[(0, TYPE_REGULAR, "hello")]);
        let root_content_pos = t.push(&root_content);
        let root_inode = t.push(&dir_inode_body(
            root_content_pos,
            root_content.len() as u16 + 3,
            0,
        ));

        let flat_frag_ptr_pos = t.buf.len() as u64;
        t.buf.extend_from_slice(&0u64.to_le_bytes());

        let tables_base = 96 + raw_region.len() as u64;

        let mut sb = vec![0u8; 96];
        sb[0..4].copy_from_slice(&SQUASH_MAGIC.to_le_bytes());
        sb[12..16].copy_from_slice(&131072u32.to_le_bytes());
        // root_inode: low 16 bits = offset (0), next 16 bits = chunk.
        let root_inode_ref = (root_inode as u64) << 16;
        sb[32..40].copy_from_slice(&root_inode_ref.to_le_bytes());
        sb[64..72].copy_from_slice(&tables_base.to_le_bytes());
        sb[72..80].copy_from_slice(&tables_base.to_le_bytes());
        sb[80..88].copy_from_slice(&(tables_base + flat_frag_ptr_pos).to_le_bytes());

        let mut image = sb;
        image.extend_from_slice(&raw_region);
        image.extend_from_slice(&t.buf);
        image
    }

    #[test]
    fn read_dir_lists_root_entry() {
        let image = build_image();
        let dev = FileBlockDevice::new(Cursor::new(image));
        let mut fs = Squash4Fs::mount(dev).unwrap();

        let mut seen = Vec::new();
        fs.read_dir("/", |name, info| seen.push((name.to_string(), info.is_dir)))
            .unwrap();
        assert_eq!(seen, vec![("hello".to_string(), false)]);
    }

    #[test]
    fn open_and_read_full_contents() {
        let image = build_image();
        let dev = FileBlockDevice::new(Cursor::new(image));
        let mut fs = Squash4Fs::mount(dev).unwrap();

        let mut handle = fs.open("/hello").unwrap();
        assert_eq!(handle.size(), 3);
        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hi\n");
    }

    #[test]
    fn open_on_directory_is_an_error() {
        let image = build_image();
        let dev = FileBlockDevice::new(Cursor::new(image));
        let mut fs = Squash4Fs::mount(dev).unwrap();

        let err = fs.open("/").unwrap_err();
        assert!(matches!(err, Squash4Error::IsADirectory));
    }

    #[test]
    fn read_dir_on_regular_file_is_not_a_directory() {
        let image = build_image();
        let dev = FileBlockDevice::new(Cursor::new(image));
        let mut fs = Squash4Fs::mount(dev).unwrap();

        let err = fs.read_dir("/hello", |_, _| {}).unwrap_err();
        assert!(matches!(err, Squash4Error::NotADirectory));
    }
}
