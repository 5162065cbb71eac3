//! Decompression.
//!
//! Every metadata chunk, data block, and fragment that is not flagged
//! "stored uncompressed" is zlib/DEFLATE compressed. Both callers that need
//! decompression (the metadata-chunk reader and the file-data reader) also
//! need to discard a prefix of the decompressed stream without ever
//! materializing the whole thing, so the trait is shaped around a
//! skip-then-deliver contract rather than a plain `decompress(bytes) -> Vec<u8>`.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::Squash4Error;

/// Streaming zlib inflate with an output-side skip.
pub trait Inflate {
    /// Decompress `src`, discard the first `skip_out` bytes of output, then
    /// fill `dst` with the next `dst.len()` bytes.
    fn inflate(&self, src: &[u8], skip_out: usize, dst: &mut [u8]) -> Result<(), Squash4Error>;
}

/// The only supported compressor: zlib via `flate2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibInflate;

impl Inflate for ZlibInflate {
    fn inflate(&self, src: &[u8], skip_out: usize, dst: &mut [u8]) -> Result<(), Squash4Error> {
        let mut decoder = ZlibDecoder::new(src);

        let mut discard = [0u8; 4096];
        let mut remaining = skip_out;
        while remaining > 0 {
            let n = remaining.min(discard.len());
            decoder
                .read_exact(&mut discard[..n])
                .map_err(|_| Squash4Error::Corrupt("short decompressed chunk"))?;
            remaining -= n;
        }

        decoder
            .read_exact(dst)
            .map_err(|_| Squash4Error::Corrupt("short decompressed chunk"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn round_trips_without_skip() {
        let plain = b"hello squashfs world, a bit longer than one block";
        let compressed = zlib_compress(plain);
        let mut out = vec![0u8; plain.len()];
        ZlibInflate.inflate(&compressed, 0, &mut out).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn discards_skip_prefix() {
        let plain = b"0123456789abcdefghij";
        let compressed = zlib_compress(plain);
        let mut out = [0u8; 5];
        ZlibInflate.inflate(&compressed, 10, &mut out).unwrap();
        assert_eq!(&out, b"abcde");
    }
}
