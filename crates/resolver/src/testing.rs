//! Archive fixtures for unit tests.

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};

/// One entry of a fixture tarball.
pub struct TarEntry<'a> {
    pub path: &'a str,
    pub data: &'a [u8],
    pub mode: u32,
    pub kind: EntryType,
}

impl<'a> TarEntry<'a> {
    pub fn file(path: &'a str, data: &'a [u8], mode: u32) -> Self {
        Self {
            path,
            data,
            mode,
            kind: EntryType::Regular,
        }
    }
}

/// Build a gzip-compressed tarball in memory.
pub fn gzip_tarball(entries: &[TarEntry<'_>]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in entries {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry.kind);
        header.set_size(entry.data.len() as u64);
        header.set_mode(entry.mode);
        // set_path rejects `..` and absolute paths; fixtures only use safe ones.
        header.set_path(entry.path).unwrap();
        header.set_cksum();
        builder.append(&header, entry.data).unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Deterministic bytes that do not compress, so truncating the gzip stream
/// cuts through file content rather than trailing padding.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        })
        .collect()
}
