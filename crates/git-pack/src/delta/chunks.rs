//! Delta chunk algebra: a composable, gap-free representation of a delta's
//! effect on its target, built from the opcode stream but never tied to a
//! materialized intermediate buffer.
//!
//! A [`DeltaChunkList`] covers `[0, target_size)` with no gaps and no
//! overlaps. Each [`Chunk`] is either a literal insert or a copy from the
//! delta's base. Multi-level delta chains are composed with
//! [`DeltaChunkList::connect_with`], which substitutes a copy chunk with the
//! slice of the next level down that produced those bytes — so a chain of
//! N deltas resolves to one chunk list referencing only the root object,
//! without ever materializing the N-1 intermediate targets.

use crate::delta::{parse_delta_instructions, DeltaInstruction};
use crate::PackError;

/// Where a chunk's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkSource {
    /// Literal bytes carried by the delta itself.
    Insert(Vec<u8>),
    /// A byte range copied from the base, at this source offset.
    Copy(u64),
}

/// One contiguous, tagged region of a delta's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of this chunk's first byte in the target.
    pub target_offset: u64,
    pub size: u64,
    pub source: ChunkSource,
}

/// A gap-free, non-overlapping, strictly-increasing list of chunks covering
/// `[0, target_size)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaChunkList {
    pub source_size: u64,
    pub target_size: u64,
    pub chunks: Vec<Chunk>,
}

impl DeltaChunkList {
    /// Parse a raw delta opcode stream into a chunk list. Does not compare
    /// `source_size` against an actual base buffer; callers that have one
    /// should check it themselves (see [`super::apply::apply_delta`]).
    pub fn from_delta(delta: &[u8]) -> Result<Self, PackError> {
        let (source_size, target_size, instructions) = parse_delta_instructions(delta)?;

        let mut chunks = Vec::with_capacity(instructions.len());
        let mut to: u64 = 0;
        for instr in instructions {
            let chunk = match instr {
                DeltaInstruction::Copy { offset, size } => Chunk {
                    target_offset: to,
                    size: size as u64,
                    source: ChunkSource::Copy(offset),
                },
                DeltaInstruction::Insert(data) => {
                    let size = data.len() as u64;
                    Chunk {
                        target_offset: to,
                        size,
                        source: ChunkSource::Insert(data),
                    }
                }
            };
            if let ChunkSource::Copy(offset) = chunk.source {
                if offset + chunk.size > source_size as u64 {
                    return Err(PackError::InvalidDelta {
                        offset: 0,
                        reason: format!(
                            "copy out of bounds: offset={offset}, size={}, source_size={source_size}",
                            chunk.size
                        ),
                    });
                }
            }
            to += chunk.size;
            chunks.push(chunk);
        }

        if to != target_size as u64 {
            return Err(PackError::InvalidDelta {
                offset: 0,
                reason: format!(
                    "chunk list covers {to} bytes but delta declares target size {target_size}"
                ),
            });
        }

        Ok(DeltaChunkList {
            source_size: source_size as u64,
            target_size: target_size as u64,
            chunks,
        })
    }

    /// Merge adjacent insert chunks into a single literal run. Copy chunks
    /// are never fused, even when contiguous in the source — each stays a
    /// distinct chunk so its own target offset keeps identifying exactly
    /// which source range produced it. Purely a size optimization; does not
    /// change what `apply` produces.
    pub fn compact(mut self) -> Self {
        let mut merged: Vec<Chunk> = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks.drain(..) {
            if let Some(last) = merged.last_mut() {
                let combined = match (&mut last.source, &chunk.source) {
                    (ChunkSource::Insert(last_data), ChunkSource::Insert(data)) => {
                        last_data.extend_from_slice(data);
                        last.size += chunk.size;
                        true
                    }
                    _ => false,
                };
                if combined {
                    continue;
                }
            }
            merged.push(chunk);
        }
        self.chunks = merged;
        self
    }

    /// Return the portion of this chunk list covering `[offset, offset +
    /// size)` of its target, renumbered so the result's own target offsets
    /// start at zero.
    ///
    /// Moving a chunk's left bound right by `k` bytes increments both the
    /// chunk's (renumbered) target offset and, for copy chunks, its source
    /// offset by `k`; for insert chunks it drops the first `k` bytes of
    /// literal data. The mirror trim on the right simply shortens the
    /// chunk's size (and, for insert, its literal data).
    pub fn slice(&self, offset: u64, size: u64) -> Self {
        let end = offset + size;
        let mut chunks = Vec::new();
        for chunk in &self.chunks {
            let c_start = chunk.target_offset;
            let c_end = chunk.target_offset + chunk.size;
            if c_end <= offset || c_start >= end {
                continue;
            }
            let trim_left = offset.saturating_sub(c_start);
            let trim_right = c_end.saturating_sub(end);
            let new_size = chunk.size - trim_left - trim_right;
            let new_target_offset = c_start.max(offset) - offset;
            let source = match &chunk.source {
                ChunkSource::Insert(data) => {
                    let start = trim_left as usize;
                    let stop = data.len() - trim_right as usize;
                    ChunkSource::Insert(data[start..stop].to_vec())
                }
                ChunkSource::Copy(src_off) => ChunkSource::Copy(src_off + trim_left),
            };
            chunks.push(Chunk {
                target_offset: new_target_offset,
                size: new_size,
                source,
            });
        }
        DeltaChunkList {
            source_size: size,
            target_size: size,
            chunks,
        }
    }

    /// Compose this chunk list (whose copy chunks reference `base`'s
    /// target) with `base` (whose copy chunks reference the level below
    /// it), producing a chunk list whose copy chunks reference only
    /// whatever `base`'s copy chunks referenced — one level down the chain,
    /// without ever materializing `base`'s target bytes.
    pub fn connect_with(&self, base: &DeltaChunkList) -> Self {
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            match &chunk.source {
                ChunkSource::Insert(data) => chunks.push(Chunk {
                    target_offset: chunk.target_offset,
                    size: chunk.size,
                    source: ChunkSource::Insert(data.clone()),
                }),
                ChunkSource::Copy(src_off) => {
                    let sub = base.slice(*src_off, chunk.size);
                    for sub_chunk in sub.chunks {
                        chunks.push(Chunk {
                            target_offset: chunk.target_offset + sub_chunk.target_offset,
                            size: sub_chunk.size,
                            source: sub_chunk.source,
                        });
                    }
                }
            }
        }
        DeltaChunkList {
            source_size: base.source_size,
            target_size: self.target_size,
            chunks,
        }
        .compact()
    }

    /// Materialize the target by reading copy chunks out of `base` (the
    /// literal bytes this chunk list's remaining copy chunks reference —
    /// after a full `connect_with` chain, the root object's bytes).
    ///
    /// Every copy chunk is bounds-checked against `base` before it's
    /// touched, even though `from_delta` already rejects an out-of-bounds
    /// copy at parse time — this is the last line of defense against a
    /// chunk list built by some other, buggier path.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>, PackError> {
        let mut out = vec![0u8; self.target_size as usize];
        for chunk in &self.chunks {
            let start = chunk.target_offset as usize;
            let end = start + chunk.size as usize;
            match &chunk.source {
                ChunkSource::Insert(data) => out[start..end].copy_from_slice(data),
                ChunkSource::Copy(src_off) => {
                    let s = *src_off as usize;
                    let e = s + chunk.size as usize;
                    if e > base.len() {
                        return Err(PackError::InvalidDelta {
                            offset: 0,
                            reason: format!(
                                "copy out of bounds: offset={s}, size={}, base_len={}",
                                chunk.size,
                                base.len()
                            ),
                        });
                    }
                    out[start..end].copy_from_slice(&base[s..e]);
                }
            }
        }
        Ok(out)
    }
}
