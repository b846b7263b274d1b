//! Single-level delta application, built on the chunk list algebra.
//!
//! For chains deeper than one level, prefer composing chunk lists directly
//! via [`crate::delta::chunks::DeltaChunkList::connect_with`] (that's what
//! [`crate::entity::PackEntity::resolve_at_offset`] does) rather than
//! calling this repeatedly — it would materialize every intermediate
//! target instead of only the root.

use crate::delta::chunks::DeltaChunkList;
use crate::PackError;

/// Apply a single delta directly against its base, producing the target.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let dcl = DeltaChunkList::from_delta(delta)?;
    if dcl.source_size != base.len() as u64 {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "source size mismatch: delta says {}, base is {}",
                dcl.source_size,
                base.len()
            ),
        });
    }
    dcl.apply(base)
}
