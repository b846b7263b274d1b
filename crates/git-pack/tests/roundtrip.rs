//! Round-trip tests: build a pack in-memory → open via [`PackEntity`] →
//! verify every object, including multi-level delta chains.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::ObjectType;
use git_pack::entity::PackEntity;
use git_pack::entry::{encode_entry_header, encode_ofs_delta_offset};
use git_pack::{IDX_SIGNATURE, IDX_VERSION, PACK_SIGNATURE, PACK_VERSION};

fn type_num(t: ObjectType) -> u8 {
    match t {
        ObjectType::Commit => 1,
        ObjectType::Tree => 2,
        ObjectType::Blob => 3,
        ObjectType::Tag => 4,
    }
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn build_insert_delta(source_len: usize, target: &[u8]) -> Vec<u8> {
    use git_pack::delta::{encode_insert, write_varint};
    let mut delta = Vec::new();
    delta.extend_from_slice(&write_varint(source_len));
    delta.extend_from_slice(&write_varint(target.len()));
    for chunk in target.chunks(127) {
        delta.extend_from_slice(&encode_insert(chunk));
    }
    delta
}

fn build_idx(entries: &[(ObjectId, u64, u32)], pack_checksum: &[u8]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

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

/// Writes a plain (non-delta) object and returns (oid, offset).
fn write_plain(pack_data: &mut Vec<u8>, obj_type: ObjectType, content: &[u8]) -> (ObjectId, u64) {
    let offset = pack_data.len() as u64;
    let header = encode_entry_header(type_num(obj_type), content.len() as u64);
    let compressed = compress(content);
    pack_data.extend_from_slice(&header);
    pack_data.extend_from_slice(&compressed);
    let oid = Hasher::hash_object(
        match obj_type {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        },
        content,
    );
    (oid, offset)
}

fn finish_pack(pack_data: &mut Vec<u8>) -> ObjectId {
    let checksum = {
        let mut h = Hasher::new();
        h.update(pack_data);
        h.finalize()
    };
    pack_data.extend_from_slice(checksum.as_bytes());
    checksum
}

fn write_pack_and_index(
    dir: &std::path::Path,
    name: &str,
    pack_data: Vec<u8>,
    entries: &[(ObjectId, u64, u32)],
    checksum: &ObjectId,
) -> std::path::PathBuf {
    let pack_path = dir.join(format!("{name}.pack"));
    let idx_path = dir.join(format!("{name}.idx"));
    std::fs::write(&pack_path, &pack_data).unwrap();
    std::fs::write(&idx_path, build_idx(entries, checksum.as_bytes())).unwrap();
    pack_path
}

#[test]
fn roundtrip_single_blob() {
    let dir = tempfile::tempdir().unwrap();
    let content = b"roundtrip test blob";

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&1u32.to_be_bytes());

    let (oid, offset) = write_plain(&mut pack_data, ObjectType::Blob, content);
    let checksum = finish_pack(&mut pack_data);
    let pack_path = write_pack_and_index(dir.path(), "rt1", pack_data, &[(oid, offset, 0)], &checksum);

    let entity = PackEntity::open(&pack_path).unwrap();
    assert_eq!(entity.size(), 1);

    let obj = entity.stream(&oid).unwrap().unwrap();
    assert_eq!(obj.obj_type, ObjectType::Blob);
    assert_eq!(obj.data, content);
}

#[test]
fn roundtrip_multiple_objects() {
    let dir = tempfile::tempdir().unwrap();
    let objects = [
        (ObjectType::Blob, b"alpha".as_slice()),
        (ObjectType::Blob, b"beta".as_slice()),
        (ObjectType::Blob, b"gamma".as_slice()),
        (ObjectType::Blob, b"delta".as_slice()),
    ];

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut entries = Vec::new();
    for (obj_type, content) in &objects {
        let (oid, offset) = write_plain(&mut pack_data, *obj_type, content);
        entries.push((oid, offset, 0));
    }
    let checksum = finish_pack(&mut pack_data);
    let pack_path = write_pack_and_index(dir.path(), "rt2", pack_data, &entries, &checksum);

    let entity = PackEntity::open(&pack_path).unwrap();
    assert_eq!(entity.size(), objects.len() as u32);

    for (i, (obj_type, content)) in objects.iter().enumerate() {
        let obj = entity.stream(&entries[i].0).unwrap().unwrap();
        assert_eq!(obj.obj_type, *obj_type);
        assert_eq!(obj.data, *content);
    }
}

#[test]
fn roundtrip_with_delta_object() {
    let dir = tempfile::tempdir().unwrap();

    let base_content = b"This is the base content that will be used for delta compression testing in our roundtrip.";
    let modified_content = b"This is the modified content that will be used for delta compression testing in our roundtrip.";

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&2u32.to_be_bytes());

    let (base_oid, base_offset) = write_plain(&mut pack_data, ObjectType::Blob, base_content);

    let delta_offset = pack_data.len() as u64;
    let delta = build_insert_delta(base_content.len(), modified_content);
    let neg = delta_offset - base_offset;
    let header = encode_entry_header(6, delta.len() as u64);
    let ofs = encode_ofs_delta_offset(neg);
    let compressed = compress(&delta);
    pack_data.extend_from_slice(&header);
    pack_data.extend_from_slice(&ofs);
    pack_data.extend_from_slice(&compressed);
    let modified_oid = Hasher::hash_object("blob", modified_content);

    let checksum = finish_pack(&mut pack_data);
    let pack_path = write_pack_and_index(
        dir.path(),
        "rt3",
        pack_data,
        &[(base_oid, base_offset, 0), (modified_oid, delta_offset, 0)],
        &checksum,
    );

    let entity = PackEntity::open(&pack_path).unwrap();
    assert_eq!(entity.size(), 2);

    let obj = entity.stream(&base_oid).unwrap().unwrap();
    assert_eq!(obj.data, base_content.as_slice());

    let obj = entity.stream(&modified_oid).unwrap().unwrap();
    assert_eq!(obj.data, modified_content.as_slice());
}

#[test]
fn roundtrip_verifies_pack_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let objects: Vec<(ObjectType, Vec<u8>)> = (0..10)
        .map(|i| (ObjectType::Blob, format!("object number {i}").into_bytes()))
        .collect();

    let mut pack_data = Vec::new();
    pack_data.extend_from_slice(PACK_SIGNATURE);
    pack_data.extend_from_slice(&PACK_VERSION.to_be_bytes());
    pack_data.extend_from_slice(&(objects.len() as u32).to_be_bytes());

    let mut entries = Vec::new();
    for (obj_type, content) in &objects {
        let (oid, offset) = write_plain(&mut pack_data, *obj_type, content);
        entries.push((oid, offset, 0));
    }
    let checksum = finish_pack(&mut pack_data);
    let pack_path = write_pack_and_index(dir.path(), "rt4", pack_data, &entries, &checksum);

    let entity = PackEntity::open(&pack_path).unwrap();
    entity.pack().verify_checksum().unwrap();
    assert_eq!(entity.size(), 10);
}
