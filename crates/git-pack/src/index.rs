//! Pack index reading and lookup, both legacy v1 and the current v2 format.
//!
//! v2 layout:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 values
//! Offsets: N × 4-byte offsets (high bit = 1 → use 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```
//!
//! v1 layout (no magic, no CRC32, no 64-bit escape):
//!
//! ```text
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Entries: N × (4-byte offset, 20-byte OID), sorted by OID
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use memmap2::Mmap;

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

const HASH_LEN: usize = 20;

/// Pack index providing OID → offset mapping, over either on-disk format.
pub struct PackIndex {
    data: Mmap,
    version: u32,
    num_objects: u32,
    /// Byte offset where the fanout table starts.
    fanout_offset: usize,
    /// Byte offset where sorted OIDs start (v2) or is unused (v1, entries
    /// are interleaved with offsets instead).
    oid_offset: usize,
    /// Byte offset where CRC32 values start (`None` for v1, which carries
    /// no CRC table).
    crc_offset: Option<usize>,
    /// Byte offset where 32-bit offsets start (v2) or combined
    /// offset+OID entries start (v1).
    offset32_offset: usize,
    /// Byte offset where 64-bit offsets start, if any (v2 only).
    offset64_offset: usize,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open a pack index file, detecting v1 vs. v2 from the magic bytes.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() >= 4 && data[0..4] == IDX_SIGNATURE {
            Self::open_v2(data, idx_path)
        } else {
            Self::open_v1(data, idx_path)
        }
    }

    fn open_v2(data: Mmap, idx_path: PathBuf) -> Result<Self, PackError> {
        if data.len() < 8 + 1024 + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let fanout_offset = 8;
        let last_fanout_pos = fanout_offset + 255 * 4;
        let num_objects = u32::from_be_bytes([
            data[last_fanout_pos],
            data[last_fanout_pos + 1],
            data[last_fanout_pos + 2],
            data[last_fanout_pos + 3],
        ]);

        let n = num_objects as usize;
        let oid_offset = fanout_offset + 1024;
        let crc_offset = oid_offset + n * HASH_LEN;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        let min_size = offset64_offset + 2 * HASH_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            version,
            num_objects,
            fanout_offset,
            oid_offset,
            crc_offset: Some(crc_offset),
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    fn open_v1(data: Mmap, idx_path: PathBuf) -> Result<Self, PackError> {
        if data.len() < 1024 + 2 * HASH_LEN {
            return Err(PackError::InvalidIndex("file too small for v1 index".into()));
        }

        let fanout_offset = 0;
        let last_fanout_pos = fanout_offset + 255 * 4;
        let num_objects = u32::from_be_bytes([
            data[last_fanout_pos],
            data[last_fanout_pos + 1],
            data[last_fanout_pos + 2],
            data[last_fanout_pos + 3],
        ]);

        let n = num_objects as usize;
        let entries_offset = fanout_offset + 1024;
        let entry_size = 4 + HASH_LEN;
        let min_size = entries_offset + n * entry_size + 2 * HASH_LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            version: 1,
            num_objects,
            fanout_offset,
            // v1 stores (offset, oid) pairs back to back; oid_offset marks
            // the start of that combined table and offset32_offset is the
            // same base — per-entry accessors below stride by entry_size.
            oid_offset: entries_offset,
            crc_offset: None,
            offset32_offset: entries_offset,
            offset64_offset: 0,
            idx_path,
        })
    }

    fn entry_stride(&self) -> usize {
        if self.version == 1 {
            4 + HASH_LEN
        } else {
            HASH_LEN
        }
    }

    /// Look up an OID, returning the offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let index = self.bisect(oid.as_bytes())?;
        Some(self.offset_at_index(index as u32))
    }

    /// Resolve a partial (possibly odd-length hex) digest to a single
    /// unique match within this index.
    ///
    /// Pads the partial with zero bytes to a full digest, bisects to find
    /// where it would sort, then walks forward confirming the
    /// canonical-length prefix match. If a second consecutive entry also
    /// matches, the name is ambiguous.
    pub fn partial_sha_to_index(
        &self,
        partial: &[u8; 20],
        canonical_len: usize,
    ) -> Result<Option<u32>, PackError> {
        let n = self.num_objects as usize;
        if n == 0 {
            return Ok(None);
        }

        // Find the first index whose OID is >= the zero-padded partial.
        let mut low = 0usize;
        let mut high = n;
        while low < high {
            let mid = low + (high - low) / 2;
            if self.oid_bytes_at(mid) < &partial[..] {
                low = mid + 1;
            } else {
                high = mid;
            }
        }

        let mut found: Option<usize> = None;
        let mut pos = low;
        while pos < n {
            let candidate_bytes = self.oid_bytes_at(pos);
            let candidate_matches = prefix_matches(candidate_bytes, partial, canonical_len);
            if !candidate_matches {
                break;
            }
            if found.is_some() {
                return Err(PackError::AmbiguousObjectName {
                    partial_hex: hex_prefix(partial, canonical_len),
                });
            }
            found = Some(pos);
            pos += 1;
        }

        Ok(found.map(|i| i as u32))
    }

    fn bisect(&self, target: &[u8]) -> Option<usize> {
        let (lo, hi) = self.fanout_range(target[0]);
        if lo >= hi {
            return None;
        }
        let mut low = lo;
        let mut high = hi;
        while low < high {
            let mid = low + (high - low) / 2;
            let mid_oid = self.oid_bytes_at(mid);
            match mid_oid.cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Get the OID at the given sorted index position.
    pub fn oid_at_index(&self, index: u32) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(index as usize)).expect("valid OID in index")
    }

    /// Get the pack file offset at the given sorted index position.
    pub fn offset_at_index(&self, index: u32) -> u64 {
        if self.version == 1 {
            let pos = self.offset32_offset + index as usize * self.entry_stride();
            return u32::from_be_bytes([
                self.data[pos],
                self.data[pos + 1],
                self.data[pos + 2],
                self.data[pos + 3],
            ]) as u64;
        }

        let pos = self.offset32_offset + index as usize * 4;
        let val = u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]);

        if val & 0x8000_0000 != 0 {
            let idx64 = (val & 0x7FFF_FFFF) as usize;
            let pos64 = self.offset64_offset + idx64 * 8;
            u64::from_be_bytes(self.data[pos64..pos64 + 8].try_into().unwrap())
        } else {
            val as u64
        }
    }

    /// CRC32 at the given sorted index position, if this index carries one
    /// (v1 indices do not).
    pub fn crc32_at_index(&self, index: u32) -> Option<u32> {
        let crc_offset = self.crc_offset?;
        let pos = crc_offset + index as usize * 4;
        Some(u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]))
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN])
            .expect("valid checksum in index trailer")
    }

    pub fn index_checksum(&self) -> ObjectId {
        let start = self.data.len() - HASH_LEN;
        ObjectId::from_bytes(&self.data[start..start + HASH_LEN])
            .expect("valid checksum in index trailer")
    }

    pub fn iter(&self) -> PackIndexIter<'_> {
        PackIndexIter { index: self, pos: 0 }
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = self.fanout_entry(first_byte) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fanout_entry(first_byte - 1) as usize
        };
        (start, end)
    }

    fn fanout_entry(&self, index: u8) -> u32 {
        let pos = self.fanout_offset + index as usize * 4;
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    /// Raw OID bytes at the given sorted index position, regardless of
    /// on-disk layout.
    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        if self.version == 1 {
            let pos = self.oid_offset + index * self.entry_stride() + 4;
            &self.data[pos..pos + HASH_LEN]
        } else {
            let start = self.oid_offset + index * HASH_LEN;
            &self.data[start..start + HASH_LEN]
        }
    }
}

fn prefix_matches(full: &[u8], partial: &[u8; 20], canonical_len: usize) -> bool {
    let full_bytes = canonical_len / 2;
    if full[..full_bytes] != partial[..full_bytes] {
        return false;
    }
    if canonical_len % 2 == 1 {
        let i = full_bytes;
        if full[i] & 0xf0 != partial[i] & 0xf0 {
            return false;
        }
    }
    true
}

fn hex_prefix(partial: &[u8; 20], canonical_len: usize) -> String {
    let full_hex = partial.iter().map(|b| format!("{b:02x}")).collect::<String>();
    full_hex[..canonical_len].to_string()
}

/// Iterator over (OID, offset) pairs in a pack index, in sorted order.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl<'a> Iterator for PackIndexIter<'a> {
    type Item = (ObjectId, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let oid = self.index.oid_at_index(self.pos);
        let offset = self.index.offset_at_index(self.pos);
        self.pos += 1;
        Some((oid, offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for PackIndexIter<'a> {}

#[cfg(test)]
mod tests {
    use super::*;
    use git_hash::hasher::Hasher;
    use std::io::Write;

    fn build_test_index_v2(oids_and_offsets: &[(ObjectId, u64, u32)]) -> Vec<u8> {
        let mut entries: Vec<_> = oids_and_offsets.to_vec();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        let mut fanout = [0u32; 256];
        for (oid, _, _) in &entries {
            fanout[oid.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }

        for (oid, _, _) in &entries {
            buf.extend_from_slice(oid.as_bytes());
        }
        for (_, _, crc) in &entries {
            buf.extend_from_slice(&crc.to_be_bytes());
        }
        for (_, offset, _) in &entries {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }

        buf.extend_from_slice(&[0u8; 20]);
        let mut hasher = Hasher::new();
        hasher.update(&buf);
        let idx_checksum = hasher.finalize();
        buf.extend_from_slice(idx_checksum.as_bytes());

        buf
    }

    fn build_test_index_v1(oids_and_offsets: &[(ObjectId, u64)]) -> Vec<u8> {
        let mut entries: Vec<_> = oids_and_offsets.to_vec();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();
        let mut fanout = [0u32; 256];
        for (oid, _) in &entries {
            fanout[oid.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for (oid, offset) in &entries {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
            buf.extend_from_slice(oid.as_bytes());
        }

        buf.extend_from_slice(&[0u8; 20]);
        let mut hasher = Hasher::new();
        hasher.update(&buf);
        let idx_checksum = hasher.finalize();
        buf.extend_from_slice(idx_checksum.as_bytes());

        buf
    }

    fn write_test_index(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn make_oid(first_byte: u8, suffix: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = first_byte;
        bytes[19] = suffix;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn open_and_lookup_single_object_v2() {
        let dir = tempfile::tempdir().unwrap();
        let oid = make_oid(0xab, 0x01);
        let data = build_test_index_v2(&[(oid, 12, 0xdeadbeef)]);
        let path = write_test_index(dir.path(), "test.idx", &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 1);
        assert_eq!(idx.version(), 2);
        assert_eq!(idx.lookup(&oid), Some(12));
        assert_eq!(idx.lookup(&make_oid(0xab, 0x02)), None);
    }

    #[test]
    fn open_and_lookup_v1() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0x00, 0x01), 100u64),
            (make_oid(0x0a, 0x01), 300u64),
            (make_oid(0xff, 0x01), 400u64),
        ];
        let data = build_test_index_v1(&entries);
        let path = write_test_index(dir.path(), "test.idx", &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.version(), 1);
        assert_eq!(idx.num_objects(), 3);
        for (oid, offset) in &entries {
            assert_eq!(idx.lookup(oid), Some(*offset));
        }
        assert!(idx.crc32_at_index(0).is_none());
    }

    #[test]
    fn lookup_multiple_objects() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0x00, 0x01), 100, 0x111),
            (make_oid(0x00, 0x02), 200, 0x222),
            (make_oid(0x0a, 0x01), 300, 0x333),
            (make_oid(0xff, 0x01), 400, 0x444),
        ];
        let data = build_test_index_v2(&entries);
        let path = write_test_index(dir.path(), "test.idx", &data);

        let idx = PackIndex::open(&path).unwrap();
        for (oid, offset, _) in &entries {
            assert_eq!(idx.lookup(oid), Some(*offset));
        }
    }

    #[test]
    fn partial_sha_resolves_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xab, 0x01), 100, 0),
            (make_oid(0xac, 0x02), 200, 0),
        ];
        let data = build_test_index_v2(&entries);
        let path = write_test_index(dir.path(), "test.idx", &data);
        let idx = PackIndex::open(&path).unwrap();

        let mut partial = [0u8; 20];
        partial[0] = 0xab;
        let found = idx.partial_sha_to_index(&partial, 2).unwrap();
        assert_eq!(found, Some(0));
    }

    #[test]
    fn partial_sha_reports_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xab, 0x01), 100, 0),
            (make_oid(0xab, 0x02), 200, 0),
        ];
        let data = build_test_index_v2(&entries);
        let path = write_test_index(dir.path(), "test.idx", &data);
        let idx = PackIndex::open(&path).unwrap();

        let mut partial = [0u8; 20];
        partial[0] = 0xab;
        let err = idx.partial_sha_to_index(&partial, 2).unwrap_err();
        assert!(matches!(err, PackError::AmbiguousObjectName { .. }));
    }

    #[test]
    fn oid_at_index_returns_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            (make_oid(0xff, 0x01), 100, 0),
            (make_oid(0x00, 0x01), 200, 0),
            (make_oid(0x55, 0x01), 300, 0),
        ];
        let data = build_test_index_v2(&entries);
        let path = write_test_index(dir.path(), "test.idx", &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.oid_at_index(0), make_oid(0x00, 0x01));
        assert_eq!(idx.oid_at_index(1), make_oid(0x55, 0x01));
        assert_eq!(idx.oid_at_index(2), make_oid(0xff, 0x01));
    }

    #[test]
    fn empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let data = build_test_index_v2(&[]);
        let path = write_test_index(dir.path(), "test.idx", &data);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 0);
        assert_eq!(idx.lookup(&make_oid(0x00, 0x00)), None);
        assert_eq!(idx.iter().count(), 0);
    }

    #[test]
    fn index_with_64bit_offsets() {
        let oid = make_oid(0x42, 0x01);
        let mut buf = Vec::new();
        buf.extend_from_slice(&IDX_SIGNATURE);
        buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

        let mut fanout = [0u32; 256];
        for i in 0x42..256 {
            fanout[i] = 1;
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        buf.extend_from_slice(oid.as_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0x8000_0000u32.to_be_bytes());
        let large_offset: u64 = 5 * 1024 * 1024 * 1024;
        buf.extend_from_slice(&large_offset.to_be_bytes());

        buf.extend_from_slice(&[0u8; 20]);
        let mut hasher = Hasher::new();
        hasher.update(&buf);
        let idx_checksum = hasher.finalize();
        buf.extend_from_slice(idx_checksum.as_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = write_test_index(dir.path(), "test.idx", &buf);

        let idx = PackIndex::open(&path).unwrap();
        assert_eq!(idx.num_objects(), 1);
        assert_eq!(idx.lookup(&oid), Some(large_offset));
    }
}
