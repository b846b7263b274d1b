use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use git_hash::hasher::Hasher;
use git_object::header;
use git_object::ObjectType;

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// Check if a loose object exists.
    pub fn contains(&self, oid: &git_hash::ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read a loose object's type and raw content by OID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    /// Returns `Err` if the object exists but is corrupt.
    pub fn read(
        &self,
        oid: &git_hash::ObjectId,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let decompressed = decompress_all(&compressed, oid)?;
        let (obj_type, size, hdr_len) = header::parse_header(&decompressed)?;
        if decompressed.len() - hdr_len != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!(
                    "declared size {} does not match content length {}",
                    size,
                    decompressed.len() - hdr_len
                ),
            });
        }
        Ok(Some((obj_type, decompressed[hdr_len..].to_vec())))
    }

    /// Read just the header (type + size) without decompressing the full content.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn read_header(
        &self,
        oid: &git_hash::ObjectId,
    ) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let (obj_type, content_size, _header_len) = read_header_from_decoder(&mut decoder, oid)?;
        Ok(Some((obj_type, content_size)))
    }

    /// Read a loose object and verify its hash matches the expected OID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    pub fn read_verified(
        &self,
        oid: &git_hash::ObjectId,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let decompressed = decompress_all(&compressed, oid)?;

        let actual_oid = Hasher::digest(&decompressed);
        if actual_oid != *oid {
            return Err(LooseError::HashMismatch {
                path,
                expected: oid.to_hex(),
                actual: actual_oid.to_hex(),
            });
        }

        let (obj_type, size, hdr_len) = header::parse_header(&decompressed)?;
        if decompressed.len() - hdr_len != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!(
                    "declared size {} does not match content length {}",
                    size,
                    decompressed.len() - hdr_len
                ),
            });
        }
        Ok(Some((obj_type, decompressed[hdr_len..].to_vec())))
    }
}

/// Zlib-decompress the full contents of a loose object file.
pub(crate) fn decompress_all(
    compressed: &[u8],
    oid: &git_hash::ObjectId,
) -> Result<Vec<u8>, LooseError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| LooseError::Decompress {
            oid: oid.to_hex(),
            source: e,
        })?;
    Ok(decompressed)
}

/// Decompress from `decoder` up to and including the header's null terminator,
/// leaving the decoder positioned at the first content byte. Returns the
/// parsed type, content size, and header length (including the null byte).
pub(crate) fn read_header_from_decoder<R: Read>(
    decoder: &mut ZlibDecoder<R>,
    oid: &git_hash::ObjectId,
) -> Result<(ObjectType, usize, usize), LooseError> {
    // Headers are typically well under 32 bytes; 64 leaves plenty of room.
    let mut buf = [0u8; 64];
    let mut filled = 0;

    loop {
        if filled >= buf.len() {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: "header exceeds 64 bytes".into(),
            });
        }
        if buf[..filled].contains(&0) {
            break;
        }
        let n = decoder
            .read(&mut buf[filled..filled + 1])
            .map_err(|e| LooseError::Decompress {
                oid: oid.to_hex(),
                source: e,
            })?;
        if n == 0 {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: "unexpected EOF before header null terminator".into(),
            });
        }
        filled += n;
    }

    let (obj_type, content_size, header_len) = header::parse_header(&buf[..filled])?;
    Ok((obj_type, content_size, header_len))
}
