//! Packed object store: a directory of `.pack`/`.idx` pairs, scanned lazily
//! and cached by an mtime check rather than re-walked on every lookup.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use git_hash::ObjectId;
use git_object::ObjectType;
use git_pack::entity::PackEntity;
use git_pack::PackedObject;

use crate::{ObjectInfo, OdbError};

/// One loaded pack, remembered by the path it was opened from so a rescan
/// can tell which packs are unchanged.
struct Entry {
    path: PathBuf,
    entity: PackEntity,
}

/// Holds every pack under a `pack/` directory, most-recently-used first so a
/// lookup that hits the same pack repeatedly doesn't pay for a full scan.
pub struct PackedObjectStore {
    root: PathBuf,
    entries: Mutex<Vec<Entry>>,
    dir_mtime: Mutex<Option<SystemTime>>,
}

impl PackedObjectStore {
    /// Open the store, scanning `root` for `*.pack` files immediately.
    ///
    /// `root` need not exist yet — an absent directory is treated as an
    /// empty store, since a repository with no packs is common.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, OdbError> {
        let store = Self {
            root: root.as_ref().to_path_buf(),
            entries: Mutex::new(Vec::new()),
            dir_mtime: Mutex::new(None),
        };
        store.update_cache(true)?;
        Ok(store)
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        fs::metadata(&self.root).and_then(|m| m.modified()).ok()
    }

    /// Rescan `root` if its mtime changed since the last scan, or if `force`
    /// is set. Returns whether a rescan actually happened.
    ///
    /// Packs that vanished are dropped; packs that appeared are opened and
    /// added. A pack that fails to open (truncated, missing its `.idx`) is
    /// skipped rather than failing the whole rescan.
    pub fn update_cache(&self, force: bool) -> Result<bool, OdbError> {
        let current = self.current_mtime();
        {
            let last = self.dir_mtime.lock().unwrap();
            if !force && *last == current && current.is_some() {
                return Ok(false);
            }
        }

        let mut pack_paths: Vec<PathBuf> = Vec::new();
        if self.root.is_dir() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "pack") {
                    pack_paths.push(path);
                }
            }
        }
        pack_paths.sort();

        let mut fresh = Vec::with_capacity(pack_paths.len());
        for path in pack_paths {
            match PackEntity::open(&path) {
                Ok(entity) => fresh.push(Entry { path, entity }),
                Err(_) => continue,
            }
        }

        *self.entries.lock().unwrap() = fresh;
        *self.dir_mtime.lock().unwrap() = current;
        Ok(true)
    }

    /// Move the entity at `index` to the front, the lookup order used next
    /// time. A single promotion on hit is enough to keep hot packs cheap to
    /// reach without a full LRU bookkeeping structure.
    fn promote(entries: &mut Vec<Entry>, index: usize) {
        if index != 0 {
            let entry = entries.remove(index);
            entries.insert(0, entry);
        }
    }

    pub fn has_object(&self, oid: &ObjectId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if let Some(pos) = entries.iter().position(|e| e.entity.contains(oid)) {
            Self::promote(&mut entries, pos);
            true
        } else {
            false
        }
    }

    /// Type and size for `oid`, fully resolving any delta chain — the
    /// entity's own `info` only peeks the raw entry header, which for a
    /// delta entry doesn't carry the final object's type or size.
    pub fn info(&self, oid: &ObjectId) -> Option<ObjectInfo> {
        let mut entries = self.entries.lock().unwrap();
        let pos = entries.iter().position(|e| e.entity.contains(oid))?;
        let resolved = entries[pos].entity.stream(oid).ok().flatten()?;
        Self::promote(&mut entries, pos);
        Some(ObjectInfo {
            obj_type: resolved.obj_type,
            size: resolved.data.len(),
        })
    }

    pub fn stream(&self, oid: &ObjectId) -> Result<Option<PackedObject>, OdbError> {
        let mut entries = self.entries.lock().unwrap();
        let Some(pos) = entries.iter().position(|e| e.entity.contains(oid)) else {
            return Ok(None);
        };
        let result = entries[pos].entity.stream(oid)?;
        Self::promote(&mut entries, pos);
        Ok(result)
    }

    /// Resolve a partial digest across every pack, rejecting prefixes that
    /// match distinct objects in two different packs.
    pub fn partial_to_complete_sha(&self, partial_hex: &str) -> Result<Option<ObjectId>, OdbError> {
        let (partial_bytes, canonical_len) =
            git_hash::parse_partial_hex(partial_hex).map_err(|e| OdbError::BadObject(e.to_string()))?;

        let entries = self.entries.lock().unwrap();
        let mut found: Option<ObjectId> = None;
        for entry in entries.iter() {
            if let Some(oid) = entry
                .entity
                .partial_to_complete_sha(&partial_bytes, canonical_len)?
            {
                match found {
                    Some(existing) if existing != oid => {
                        return Err(OdbError::AmbiguousObjectName(partial_hex.to_string()))
                    }
                    _ => found = Some(oid),
                }
            }
        }
        Ok(found)
    }

    /// The paths of every pack currently cached, in lookup order.
    pub fn pack_paths(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.path.clone())
            .collect()
    }

    #[allow(dead_code)]
    fn assert_object_type(_: ObjectType) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use git_hash::hasher::Hasher;
    use std::io::Write;

    fn type_num(t: ObjectType) -> u8 {
        match t {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }

    fn build_idx(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8]) -> Vec<u8> {
        let mut sorted: Vec<_> = entries.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut buf = Vec::new();
        buf.extend_from_slice(&git_pack::IDX_SIGNATURE);
        buf.extend_from_slice(&git_pack::IDX_VERSION.to_be_bytes());

        let mut fanout = [0u32; 256];
        for (oid, _, _) in &sorted {
            fanout[oid.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            buf.extend_from_slice(&count.to_be_bytes());
        }
        for (oid, _, _) in &sorted {
            buf.extend_from_slice(oid.as_bytes());
        }
        for (_, _, crc) in &sorted {
            buf.extend_from_slice(&crc.to_be_bytes());
        }
        for (_, offset, _) in &sorted {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
        buf.extend_from_slice(pack_checksum);
        let mut h = Hasher::new();
        h.update(&buf);
        buf.extend_from_slice(h.finalize().as_bytes());
        buf
    }

    fn write_one_blob_pack(dir: &Path, name: &str, content: &[u8]) -> ObjectId {
        let mut pack_data = Vec::new();
        pack_data.extend_from_slice(git_pack::PACK_SIGNATURE);
        pack_data.extend_from_slice(&git_pack::PACK_VERSION.to_be_bytes());
        pack_data.extend_from_slice(&1u32.to_be_bytes());

        let offset = pack_data.len() as u64;
        let header = git_pack::entry::encode_entry_header(type_num(ObjectType::Blob), content.len() as u64);
        let mut compressed = Vec::new();
        {
            let mut enc = ZlibEncoder::new(&mut compressed, Compression::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap();
        }
        pack_data.extend_from_slice(&header);
        pack_data.extend_from_slice(&compressed);

        let oid = Hasher::hash_object("blob", content);
        let checksum = {
            let mut h = Hasher::new();
            h.update(&pack_data);
            h.finalize()
        };
        pack_data.extend_from_slice(checksum.as_bytes());

        fs::write(dir.join(format!("{name}.pack")), &pack_data).unwrap();
        fs::write(
            dir.join(format!("{name}.idx")),
            build_idx(&[(oid, offset, 0)], checksum.as_bytes()),
        )
        .unwrap();
        oid
    }

    #[test]
    fn open_on_missing_directory_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackedObjectStore::open(dir.path().join("pack")).unwrap();
        assert!(store.pack_paths().is_empty());
    }

    #[test]
    fn finds_object_written_into_a_fresh_pack() {
        let dir = tempfile::tempdir().unwrap();
        let oid = write_one_blob_pack(dir.path(), "p1", b"hello from pack");
        let store = PackedObjectStore::open(dir.path()).unwrap();

        assert!(store.has_object(&oid));
        let obj = store.stream(&oid).unwrap().unwrap();
        assert_eq!(obj.data, b"hello from pack");
    }

    #[test]
    fn update_cache_picks_up_new_packs_after_force_rescan() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackedObjectStore::open(dir.path()).unwrap();
        assert!(store.pack_paths().is_empty());

        let oid = write_one_blob_pack(dir.path(), "p2", b"added later");
        store.update_cache(true).unwrap();

        assert!(store.has_object(&oid));
    }

    #[test]
    fn partial_sha_resolves_within_a_single_pack() {
        let dir = tempfile::tempdir().unwrap();
        let oid = write_one_blob_pack(dir.path(), "p3", b"partial lookup target");
        let store = PackedObjectStore::open(dir.path()).unwrap();

        let hex = oid.to_hex();
        let resolved = store.partial_to_complete_sha(&hex[..10]).unwrap();
        assert_eq!(resolved, Some(oid));
    }

    #[test]
    fn missing_object_reports_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        write_one_blob_pack(dir.path(), "p4", b"something");
        let store = PackedObjectStore::open(dir.path()).unwrap();

        let absent = ObjectId::from_hex("ffffffffffffffffffffffffffffffffffffff00").unwrap();
        assert!(!store.has_object(&absent));
        assert!(store.stream(&absent).unwrap().is_none());
    }
}
