use std::io::Write;

use flate2::write::ZlibEncoder;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::header;
use git_object::ObjectType;
use git_utils::tempfile::TempFile;

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// Write raw content with a known type. Returns the OID.
    ///
    /// No-op if the object already exists (idempotent). The file is written
    /// atomically: compressed into a temp file in the objects directory, then
    /// renamed into place. On any failure the temp file is removed and the
    /// object is never visible in a partial state.
    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(obj_type, content.len());

        let oid = {
            let mut hasher = Hasher::new();
            hasher.update(&hdr);
            hasher.update(content);
            hasher.finalize()
        };

        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = TempFile::new_for(&final_path)?;
        {
            let file = tmp
                .file_mut()
                .expect("temp file handle available immediately after creation");
            let mut encoder = ZlibEncoder::new(file, self.compression_level);
            encoder.write_all(&hdr)?;
            encoder.write_all(content)?;
            encoder.finish()?;
        }
        // Read-only permissions (0444) on Unix, matching C git.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o444))?;
        }

        // A concurrent writer racing us to the same content-addressed path is
        // harmless; `persist` overwrites via rename on the happy path, and if
        // the platform instead errors because the destination exists, that
        // still means the object is present under its correct name.
        match tmp.persist(&final_path) {
            Ok(()) => Ok(oid),
            Err(_) if self.contains(&oid) => Ok(oid),
            Err(e) => Err(e.into()),
        }
    }

    /// Write content under a caller-supplied OID, trusting it rather than
    /// rehashing.
    ///
    /// Mirrors gitdb's `store()` path for an `IStream` whose `sha` is
    /// already set: the caller already knows the sha (e.g. because it just
    /// read the object out of a pack entity that verified it against its
    /// index), so the header is written and the body compressed without a
    /// second SHA-1 pass over the data. This is the fast path for copying
    /// an object between stores; `write_raw` remains the one to use when
    /// the sha is not already known.
    pub fn write_verbatim(
        &self,
        oid: &ObjectId,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<(), LooseError> {
        if self.contains(oid) {
            return Ok(());
        }

        let hdr = header::write_header(obj_type, content.len());

        let final_path = self.object_path(oid);
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = TempFile::new_for(&final_path)?;
        {
            let file = tmp
                .file_mut()
                .expect("temp file handle available immediately after creation");
            let mut encoder = ZlibEncoder::new(file, self.compression_level);
            encoder.write_all(&hdr)?;
            encoder.write_all(content)?;
            encoder.finish()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o444))?;
        }

        match tmp.persist(&final_path) {
            Ok(()) => Ok(()),
            Err(_) if self.contains(oid) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write from a stream with known type and declared size. Returns the OID.
    pub fn write_stream(
        &self,
        obj_type: ObjectType,
        size: usize,
        reader: &mut dyn std::io::Read,
    ) -> Result<ObjectId, LooseError> {
        let mut content = Vec::with_capacity(size);
        reader.read_to_end(&mut content)?;

        if content.len() != size {
            return Err(LooseError::Corrupt {
                oid: String::new(),
                reason: format!(
                    "stream size mismatch: declared {}, got {}",
                    size,
                    content.len()
                ),
            });
        }

        self.write_raw(obj_type, &content)
    }
}
