use git_object::header::{parse_header, write_header};
use git_object::ObjectType;

#[test]
fn roundtrip_all_types() {
    for (ty, content) in [
        (ObjectType::Blob, b"hello world\n".as_slice()),
        (ObjectType::Tree, b""),
        (ObjectType::Commit, b"tree deadbeef\n"),
        (ObjectType::Tag, b"object deadbeef\ntype commit\n"),
    ] {
        let hdr = write_header(ty, content.len());
        let mut data = hdr.clone();
        data.extend_from_slice(content);

        let (parsed_ty, size, hdr_len) = parse_header(&data).unwrap();
        assert_eq!(parsed_ty, ty);
        assert_eq!(size, content.len());
        assert_eq!(hdr_len, hdr.len());
        assert_eq!(&data[hdr_len..], content);
    }
}

#[test]
fn header_format_matches_git() {
    let hdr = write_header(ObjectType::Blob, 11);
    assert_eq!(hdr, b"blob 11\0");
}
