//! Block device abstraction.
//!
//! The on-disk collaborator an early-boot loader already owns: sector-granular
//! random reads. This crate defines the trait seam and ships one concrete
//! implementation over anything that is [`Read`] + [`Seek`], so the same code
//! path runs against a real disk file or an in-memory [`std::io::Cursor`] in
//! tests.

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::Squash4Error;

/// Size in bytes of one sector on the backing device.
pub const SECTOR_SIZE: u64 = 512;

/// Random-access read over the device backing a mounted image.
///
/// Implementations are not required to be sector-aligned internally; the
/// `sector`/`offset_in_sector` split exists to mirror the boot-loader-side
/// collaborator this crate is meant to sit on top of, but a byte offset of
/// `sector * SECTOR_SIZE + offset_in_sector` is all that matters.
pub trait BlockDevice {
    /// Read `dst.len()` bytes starting at the given sector and in-sector offset.
    fn read(&mut self, sector: u64, offset_in_sector: u32, dst: &mut [u8]) -> io::Result<()>;

    /// Read `dst.len()` bytes starting at an absolute byte offset.
    fn read_at(&mut self, abs_offset: u64, dst: &mut [u8]) -> io::Result<()> {
        let sector = abs_offset / SECTOR_SIZE;
        let offset_in_sector = (abs_offset % SECTOR_SIZE) as u32;
        self.read(sector, offset_in_sector, dst)
    }
}

/// Default [`BlockDevice`] over any seekable reader.
pub struct FileBlockDevice<R> {
    inner: R,
}

impl<R: Read + Seek> FileBlockDevice<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> BlockDevice for FileBlockDevice<R> {
    fn read(&mut self, sector: u64, offset_in_sector: u32, dst: &mut [u8]) -> io::Result<()> {
        let abs = sector * SECTOR_SIZE + offset_in_sector as u64;
        self.inner.seek(SeekFrom::Start(abs))?;
        self.inner.read_exact(dst)
    }
}

pub(crate) fn read_exact_at<D: BlockDevice>(
    device: &mut D,
    abs_offset: u64,
    dst: &mut [u8],
) -> Result<(), Squash4Error> {
    device.read_at(abs_offset, dst).map_err(Squash4Error::from)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_at_absolute_offset() {
        let data = (0u8..=255).collect::<Vec<u8>>();
        let mut dev = FileBlockDevice::new(Cursor::new(data));
        let mut buf = [0u8; 4];
        dev.read_at(10, &mut buf).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
    }

    #[test]
    fn read_honors_sector_and_offset() {
        let data = (0u8..=255).collect::<Vec<u8>>();
        let mut dev = FileBlockDevice::new(Cursor::new(data));
        let mut buf = [0u8; 2];
        dev.read(0, 5, &mut buf).unwrap();
        assert_eq!(buf, [5, 6]);
    }
}
