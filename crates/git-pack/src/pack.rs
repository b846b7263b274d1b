//! PackFile: raw, offset-addressed access to a `.pack` file's bytes.
//!
//! This layer knows nothing about an index or about OID lookup — it only
//! parses entry headers and decompresses entry bodies at a given byte
//! offset. Pairing a `PackFile` with a [`crate::index::PackIndex`] and
//! resolving deltas is [`crate::entity::PackEntity`]'s job.

use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use memmap2::Mmap;

use crate::entry::{parse_entry_header, PackEntry};
use crate::zlib::ZlibStreamReader;
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// A memory-mapped `.pack` file, addressed purely by byte offset.
pub struct PackFile {
    data: Mmap,
    pack_path: PathBuf,
    declared_object_count: u32,
}

impl PackFile {
    /// Open a pack file and validate its header. Does not look at any
    /// index.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let declared_object_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        Ok(Self {
            data,
            pack_path,
            declared_object_count,
        })
    }

    /// Number of objects the pack header declares.
    pub fn declared_object_count(&self) -> u32 {
        self.declared_object_count
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parse the entry header at `offset`.
    pub fn info(&self, offset: u64) -> Result<PackEntry, PackError> {
        if offset as usize >= self.data.len() {
            return Err(PackError::CorruptEntry(offset));
        }
        parse_entry_header(&self.data[offset as usize..], offset)
    }

    /// Open a decompressing reader over the entry at `offset`, bounded to
    /// its declared uncompressed size. Does not resolve deltas — the bytes
    /// produced are exactly what's stored (literal content for base
    /// objects, raw delta opcode stream for delta entries).
    pub fn stream(&self, offset: u64) -> Result<ZlibStreamReader<'_>, PackError> {
        let entry = self.info(offset)?;
        let compressed = &self.data[entry.data_offset as usize..];
        Ok(ZlibStreamReader::bounded(
            compressed,
            entry.uncompressed_size as u64,
        ))
    }

    /// Decompress the entry at `offset` fully into a buffer.
    pub fn read_raw(&self, offset: u64) -> Result<(PackEntry, Vec<u8>), PackError> {
        let entry = self.info(offset)?;
        let mut reader = self.stream(offset)?;
        let data = reader
            .read_to_end_vec()
            .map_err(|_| PackError::CorruptEntry(offset))?;
        Ok((entry, data))
    }

    /// Walk the OFS_DELTA chain starting at `offset` purely by following
    /// negative offsets recorded in each entry header — no index needed.
    /// Stops at the first non-delta entry or the first REF_DELTA entry
    /// (returned as the final element, unresolved); resolving a REF_DELTA
    /// base requires an index and is [`crate::entity::PackEntity`]'s job.
    pub fn collect_streams(&self, offset: u64) -> Result<Vec<(PackEntry, Vec<u8>)>, PackError> {
        let mut chain = Vec::new();
        let mut current = offset;
        loop {
            let (entry, data) = self.read_raw(current)?;
            let is_ofs_delta = matches!(entry.entry_type, crate::PackEntryType::OfsDelta { .. });
            let next_offset = match entry.entry_type {
                crate::PackEntryType::OfsDelta { base_offset } => Some(base_offset),
                _ => None,
            };
            chain.push((entry, data));
            match next_offset {
                Some(base_offset) if is_ofs_delta => current = base_offset,
                _ => break,
            }
        }
        Ok(chain)
    }

    /// SHA-1 of all pack bytes preceding the trailing 20-byte checksum.
    pub fn compute_checksum(&self) -> ObjectId {
        let content = &self.data[..self.data.len() - 20];
        let mut hasher = git_hash::hasher::Hasher::new();
        hasher.update(content);
        hasher.finalize()
    }

    /// The trailing 20-byte checksum recorded in the pack itself.
    pub fn trailer_checksum(&self) -> ObjectId {
        let start = self.data.len() - 20;
        ObjectId::from_bytes(&self.data[start..]).expect("valid trailer checksum")
    }

    /// Verify the pack's trailing checksum against its own content.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let expected = self.trailer_checksum();
        let actual = self.compute_checksum();
        if expected != actual {
            return Err(PackError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    /// Iterate sequentially through the pack starting at `start_offset`
    /// (normally [`PACK_HEADER_SIZE`] as `u64`), advancing past each entry
    /// using the zlib reader's compressed-byte accounting — the only
    /// authoritative source of the next entry's offset, since object
    /// boundaries aren't recorded anywhere else.
    pub fn stream_iter(&self, start_offset: u64) -> PackStreamIter<'_> {
        PackStreamIter {
            pack: self,
            offset: start_offset,
            end: self.data.len() as u64 - 20,
        }
    }
}

/// Sequential, offset-accounting-driven iterator over every entry in a
/// pack, from `start_offset` up to the trailing checksum.
pub struct PackStreamIter<'a> {
    pack: &'a PackFile,
    offset: u64,
    end: u64,
}

impl<'a> Iterator for PackStreamIter<'a> {
    type Item = Result<(u64, PackEntry), PackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.end {
            return None;
        }
        let entry = match self.pack.info(self.offset) {
            Ok(e) => e,
            Err(e) => return Some(Err(e)),
        };
        let entry_offset = self.offset;
        let mut reader = match self.pack.stream(entry_offset) {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        let compressed_len = match reader.finish() {
            Ok(n) => n,
            Err(_) => return Some(Err(PackError::CorruptEntry(entry_offset))),
        };
        self.offset = entry.data_offset + compressed_len;
        Some(Ok((entry_offset, entry)))
    }
}
