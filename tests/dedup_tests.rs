//! Static-pool deduplication behavior, verified through the inspector.

use fbom::{
    Fbom, FbomConfig, FbomData, FbomInspector, FbomObject, FbomType, Name, PoolKind, Result,
};

#[test]
fn repeated_cells_get_exactly_one_pool_entry() -> Result<()> {
    let shared = FbomData::from_byte_buffer(&[0xAB; 256]);

    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    for key in ["a", "b", "c", "d", "e"] {
        let mut child = FbomObject::new(FbomType::structure("Node", 0));
        child.set_property(Name::new("blob"), shared.clone());
        child.set_property(Name::new("tag"), FbomData::from_string(key));
        root.add_child(child);
    }

    let bytes = Fbom::serialize(&root)?;
    let report = FbomInspector::inspect(&bytes, &FbomConfig::new())?;

    // Five reference sites, one pooled payload of 256 bytes.
    let blob_slots = report
        .pool
        .iter()
        .filter(|slot| slot.kind == Some(PoolKind::Data) && slot.detail.contains("256 bytes"))
        .count();
    assert_eq!(blob_slots, 1);

    // Every decode site yields the same value.
    let decoded = Fbom::deserialize(&bytes)?;
    for child in decoded.children() {
        assert_eq!(child.get_property("blob").unwrap(), &shared);
    }
    Ok(())
}

#[test]
fn repeated_types_are_pooled_once() -> Result<()> {
    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    for i in 0..4 {
        root.set_property(Name::new(&format!("v{i}")), FbomData::from_u32(i));
    }

    let bytes = Fbom::serialize(&root)?;
    let report = FbomInspector::inspect(&bytes, &FbomConfig::new())?;

    let u32_slots = report
        .pool
        .iter()
        .filter(|slot| slot.kind == Some(PoolKind::Type) && slot.detail.starts_with("u32"))
        .count();
    assert_eq!(u32_slots, 1);
    Ok(())
}

#[test]
fn name_table_collects_property_names() -> Result<()> {
    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.set_property(Name::new("alpha"), FbomData::from_u8(1));
    root.set_property(Name::new("beta"), FbomData::from_u8(2));

    let bytes = Fbom::serialize(&root)?;
    let report = FbomInspector::inspect(&bytes, &FbomConfig::new())?;
    assert_eq!(report.pool_slots_of_kind(PoolKind::NameTable), 1);
    Ok(())
}

#[test]
fn unique_values_stay_inline() -> Result<()> {
    let mut root = FbomObject::new(FbomType::structure("Lone", 0));
    root.set_property(Name::new("only"), FbomData::from_byte_buffer(&[1, 2, 3]));

    let bytes = Fbom::serialize(&root)?;
    let report = FbomInspector::inspect(&bytes, &FbomConfig::new())?;
    assert_eq!(report.pool_slots_of_kind(PoolKind::Data), 0);
    Ok(())
}

#[test]
fn dedup_does_not_change_decoded_structure() -> Result<()> {
    let shared = FbomData::from_string("the same string in many places");
    let mut root = FbomObject::new(FbomType::structure("Doc", 0));
    root.set_property(Name::new("first"), shared.clone());
    root.set_property(Name::new("second"), shared.clone());
    root.set_property(Name::new("third"), shared);

    let decoded = Fbom::deserialize(&Fbom::serialize(&root)?)?;
    assert_eq!(decoded, root);
    Ok(())
}
