//! Compound store: an ordered list of sub-stores probed in order, with a
//! per-object location cache so a repeat lookup skips straight to the
//! sub-store that answered last time.
//!
//! [`CompoundStore::git_layout`] builds the standard arrangement git itself
//! uses for an objects directory: packed objects first (most objects live
//! there after a gc), then loose objects, then whatever alternates chain in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_object::ObjectType;
use git_pack::PackedObject;

use crate::{ObjectInfo, OdbError, PackedObjectStore, ReferenceStore};

/// One of the kinds of backing store a [`CompoundStore`] can hold.
pub enum SubStore {
    Packed(PackedObjectStore),
    Loose(LooseObjectStore),
    Compound(CompoundStore),
}

impl SubStore {
    fn has_object(&self, oid: &ObjectId) -> bool {
        match self {
            SubStore::Packed(s) => s.has_object(oid),
            SubStore::Loose(s) => s.contains(oid),
            SubStore::Compound(s) => s.has_object(oid),
        }
    }

    fn info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        match self {
            SubStore::Packed(s) => Ok(s.info(oid)),
            SubStore::Loose(s) => Ok(s
                .read_header(oid)?
                .map(|(obj_type, size)| ObjectInfo { obj_type, size })),
            SubStore::Compound(s) => s.info(oid),
        }
    }

    fn stream(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        match self {
            SubStore::Packed(s) => Ok(s
                .stream(oid)?
                .map(|PackedObject { obj_type, data }| (obj_type, data))),
            SubStore::Loose(s) => Ok(s.read(oid)?),
            SubStore::Compound(s) => s.stream(oid),
        }
    }

    fn loose(&self) -> Option<&LooseObjectStore> {
        match self {
            SubStore::Loose(s) => Some(s),
            SubStore::Compound(s) => s.first_loose(),
            SubStore::Packed(_) => None,
        }
    }

    fn partial_to_complete_sha_hex(&self, partial_hex: &str) -> Result<Option<ObjectId>, OdbError> {
        match self {
            SubStore::Packed(s) => s.partial_to_complete_sha(partial_hex),
            SubStore::Loose(s) => Ok(s.partial_to_complete_sha_hex(partial_hex)?),
            SubStore::Compound(s) => s.partial_to_complete_sha_hex(partial_hex),
        }
    }
}

/// A layered view over packed, loose, and alternate object storage.
pub struct CompoundStore {
    root: PathBuf,
    stores: Vec<SubStore>,
    location_cache: Mutex<HashMap<ObjectId, usize>>,
}

impl CompoundStore {
    /// Build an empty compound store that sub-stores can be pushed onto.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            stores: Vec::new(),
            location_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&mut self, store: SubStore) {
        self.stores.push(store);
    }

    /// The layout git itself uses for an objects directory: `pack/`, then
    /// the loose fan-out at the root, then whatever `info/alternates`
    /// chains in.
    pub fn git_layout(root: impl AsRef<Path>) -> Result<Self, OdbError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(OdbError::InvalidDBRoot(root.to_path_buf()));
        }

        let mut store = Self::new(root);
        store.push(SubStore::Packed(PackedObjectStore::open(root.join("pack"))?));
        store.push(SubStore::Loose(LooseObjectStore::open(root)));
        for alternate in ReferenceStore::new(root).load()? {
            store.push(SubStore::Compound(alternate));
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cached_index(&self, oid: &ObjectId) -> Option<usize> {
        self.location_cache.lock().unwrap().get(oid).copied()
    }

    fn remember(&self, oid: ObjectId, index: usize) {
        self.location_cache.lock().unwrap().insert(oid, index);
    }

    pub fn has_object(&self, oid: &ObjectId) -> bool {
        if let Some(index) = self.cached_index(oid) {
            return self.stores[index].has_object(oid);
        }
        for (index, store) in self.stores.iter().enumerate() {
            if store.has_object(oid) {
                self.remember(*oid, index);
                return true;
            }
        }
        false
    }

    pub fn info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        if let Some(index) = self.cached_index(oid) {
            return self.stores[index].info(oid);
        }
        for (index, store) in self.stores.iter().enumerate() {
            if let Some(info) = store.info(oid)? {
                self.remember(*oid, index);
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    pub fn stream(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        if let Some(index) = self.cached_index(oid) {
            return self.stores[index].stream(oid);
        }
        for (index, store) in self.stores.iter().enumerate() {
            if let Some(result) = store.stream(oid)? {
                self.remember(*oid, index);
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn first_loose(&self) -> Option<&LooseObjectStore> {
        self.stores.iter().find_map(|s| s.loose())
    }

    /// Write always lands in the innermost loose store; a store assembled
    /// without one (no such sub-store anywhere in the chain) can't take
    /// writes at all.
    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        let loose = self
            .first_loose()
            .ok_or_else(|| OdbError::UnsupportedOperation("no loose store to write into".into()))?;
        Ok(loose.write_raw(obj_type, content)?)
    }

    /// The one operation that cannot short-circuit on first hit: every
    /// sub-store, including nested compound ones, must be asked so a
    /// prefix ambiguous across two sub-stores is still reported as such.
    pub fn partial_to_complete_sha_hex(&self, partial_hex: &str) -> Result<Option<ObjectId>, OdbError> {
        let mut found: Option<ObjectId> = None;
        for store in &self.stores {
            if let Some(oid) = store.partial_to_complete_sha_hex(partial_hex)? {
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
}
