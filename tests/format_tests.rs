//! Hand-crafted streams exercising the format's hard failure modes.

use fbom::format::{pack_string_header, StringKind, MAGIC_BYTES};
use fbom::{
    ByteWriter, DataLocation, Endianness, Fbom, FbomCommand, FbomConfig, FbomData, FbomDataFlags,
    FbomError, FbomReader, FbomType, FbomVersion, PoolKind, CURRENT_VERSION,
};

fn stream(endianness: Endianness) -> ByteWriter {
    let mut w = ByteWriter::new(endianness);
    w.write_bytes(&MAGIC_BYTES);
    w.write_u8(endianness.flag_byte());
    w.write_u32(CURRENT_VERSION.to_u32());
    w
}

fn write_string(w: &mut ByteWriter, text: &str) {
    let header = pack_string_header(text.len(), StringKind::Utf8).expect("short string");
    w.write_u32(header);
    w.write_bytes(text.as_bytes());
}

/// `[ObjectStart][id][InPlace][InPlace type "Empty"][ObjectEnd]`
fn write_empty_object(w: &mut ByteWriter, id: u64) {
    w.write_u8(FbomCommand::ObjectStart.as_u8());
    w.write_u64(id);
    w.write_u8(DataLocation::InPlace.as_u8()); // object body follows
    w.write_u8(DataLocation::InPlace.as_u8()); // its type is inline too
    w.write_u8(0); // no parent
    write_string(w, "Empty");
    w.write_u64(0); // fixed size 0
    w.write_u8(0); // no native id
    w.write_u8(FbomCommand::ObjectEnd.as_u8());
}

#[test]
fn zero_roots_is_a_format_error() {
    let bytes = stream(Endianness::Little).into_inner();
    assert!(matches!(
        Fbom::deserialize(&bytes),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn two_roots_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    write_empty_object(&mut w, 1);
    write_empty_object(&mut w, 2);
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn one_root_succeeds() {
    let mut w = stream(Endianness::Little);
    write_empty_object(&mut w, 1);
    let root = Fbom::deserialize(&w.into_inner()).expect("single root");
    assert_eq!(root.ty().name, "Empty");
    assert_eq!(root.unique_id(), 1);
}

#[test]
fn bad_magic_is_a_format_error() {
    let mut w = ByteWriter::new(Endianness::Little);
    w.write_bytes(b"NOPE");
    w.write_u8(0);
    w.write_u32(CURRENT_VERSION.to_u32());
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn unknown_endianness_flag_is_a_format_error() {
    let mut w = ByteWriter::new(Endianness::Little);
    w.write_bytes(&MAGIC_BYTES);
    w.write_u8(0x42);
    w.write_u32(CURRENT_VERSION.to_u32());
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn incompatible_version_is_a_version_error() {
    let mut w = ByteWriter::new(Endianness::Little);
    w.write_bytes(&MAGIC_BYTES);
    w.write_u8(Endianness::Little.flag_byte());
    w.write_u32(FbomVersion::new(CURRENT_VERSION.major + 1, 0, 0).to_u32());
    write_empty_object(&mut w, 1);
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Version(_))
    ));
}

#[test]
fn unexpected_top_level_command_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::DefineProperty.as_u8());
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn truncated_stream_is_a_stream_error() {
    let mut w = stream(Endianness::Little);
    write_empty_object(&mut w, 1);
    let bytes = w.into_inner();
    let cut = &bytes[..bytes.len() - 6];
    assert!(matches!(
        Fbom::deserialize(cut),
        Err(FbomError::Stream(_))
    ));
}

#[test]
fn static_offset_out_of_bounds_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(1); // one declared slot
    w.write_bytes(&[0u8; 8]);
    w.write_u32(5); // offset past the declared count
    w.write_u8(PoolKind::None.as_u8());
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn unpopulated_slot_reference_is_an_invariant_violation() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(1);
    w.write_bytes(&[0u8; 8]);
    w.write_u32(0);
    w.write_u8(PoolKind::None.as_u8()); // declared but never populated
    w.write_u8(FbomCommand::StaticDataEnd.as_u8());

    // Root object referencing the empty slot.
    w.write_u8(FbomCommand::ObjectStart.as_u8());
    w.write_u64(9);
    w.write_u8(DataLocation::Static.as_u8());
    w.write_u32(0);

    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Invariant(_))
    ));
}

fn pooled_object_stream(reference_site_id: u64) -> Vec<u8> {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(1);
    w.write_bytes(&[0u8; 8]);
    w.write_u32(0);
    w.write_u8(PoolKind::Object.as_u8());
    write_empty_object(&mut w, 7); // pooled object carries id 7
    w.write_u8(FbomCommand::StaticDataEnd.as_u8());

    w.write_u8(FbomCommand::ObjectStart.as_u8());
    w.write_u64(reference_site_id);
    w.write_u8(DataLocation::Static.as_u8());
    w.write_u32(0);
    w.into_inner()
}

#[test]
fn permissive_mode_ignores_unique_id_mismatch() {
    let bytes = pooled_object_stream(999);
    let root = Fbom::deserialize(&bytes).expect("permissive default");
    // The pooled object's own id wins.
    assert_eq!(root.unique_id(), 7);
}

#[test]
fn strict_mode_rejects_unique_id_mismatch() {
    let bytes = pooled_object_stream(999);
    let reader = FbomReader::with_config(FbomConfig::new().with_strict_unique_ids());
    assert!(matches!(
        reader.deserialize(&bytes),
        Err(FbomError::Invariant(_))
    ));

    // A matching id passes strict validation.
    let ok = pooled_object_stream(7);
    assert_eq!(reader.deserialize(&ok).expect("ids agree").unique_id(), 7);
}

#[test]
fn nested_static_data_block_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(0);
    w.write_bytes(&[0u8; 8]);
    w.write_u8(FbomCommand::StaticDataStart.as_u8()); // still inside the block
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn stray_static_data_end_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataEnd.as_u8());
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn huge_declared_pool_count_is_rejected_before_allocation() {
    // A few bytes of stream must not be able to demand gigabytes: the
    // declared slot count has to fit in what actually follows.
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(u32::MAX);
    w.write_bytes(&[0u8; 8]);
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn huge_declared_array_count_is_rejected_before_allocation() {
    let payload = u32::MAX.to_le_bytes().to_vec();
    let cell = FbomData::new(FbomType::array(), payload, FbomDataFlags::empty());
    assert!(matches!(
        cell.read_array(&FbomConfig::new()),
        Err(FbomError::Format(_))
    ));
}

#[test]
fn unterminated_static_data_block_is_a_format_error() {
    let mut w = stream(Endianness::Little);
    w.write_u8(FbomCommand::StaticDataStart.as_u8());
    w.write_u32(0);
    w.write_bytes(&[0u8; 8]);
    assert!(matches!(
        Fbom::deserialize(&w.into_inner()),
        Err(FbomError::Format(_))
    ));
}
