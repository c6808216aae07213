//! External-file reference resolution, caching, and best-effort mode.

use fbom::{
    Fbom, FbomConfig, FbomData, FbomError, FbomObject, FbomReader, FbomType, FbomWriter, Name,
    Result,
};
use tempfile::tempdir;

fn library_object(tag: &str) -> FbomObject {
    let mut node = FbomObject::new(FbomType::structure("Material", 0));
    node.set_property(Name::new("tag"), FbomData::from_string(tag));
    node
}

#[test]
fn external_reference_resolves_against_base_path() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    Fbom::save_to_file(dir.path().join("steel.fbom"), &library_object("steel"))?;

    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.add_child(FbomObject::external("steel.fbom", 0, 0));
    let bytes = FbomWriter::new().serialize(&root)?;

    let reader = FbomReader::with_config(FbomConfig::new().with_base_path(dir.path()));
    let decoded = reader.deserialize(&bytes)?;

    assert_eq!(decoded.children().len(), 1);
    let material = &decoded.children()[0];
    assert_eq!(material.ty().name, "Material");
    assert_eq!(material.get_property("tag").unwrap().as_string()?, "steel");
    Ok(())
}

#[test]
fn repeated_references_load_the_file_once() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shared.fbom");
    Fbom::save_to_file(&path, &library_object("shared"))?;

    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.add_child(FbomObject::external("shared.fbom", 0, 0));
    root.add_child(FbomObject::external("shared.fbom", 0, 0));
    let bytes = FbomWriter::new().serialize(&root)?;

    let config = FbomConfig::new().with_base_path(dir.path());
    let reader = FbomReader::with_config(config.clone());
    let first = reader.deserialize(&bytes)?;
    assert_eq!(first.children()[0], first.children()[1]);

    // Delete the file: a second read over the same session must be served
    // entirely from the external-reference cache.
    std::fs::remove_file(&path).expect("remove");
    let second = FbomReader::with_config(config).deserialize(&bytes)?;
    assert_eq!(second, first);

    // A fresh session has an empty cache and must fail.
    let fresh = FbomReader::with_config(FbomConfig::new().with_base_path(dir.path()));
    assert!(matches!(
        fresh.deserialize(&bytes),
        Err(FbomError::Reference(_))
    ));
    Ok(())
}

#[test]
fn missing_file_is_a_reference_error() {
    let dir = tempdir().expect("tempdir");
    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.add_child(FbomObject::external("missing.fbom", 0, 0));
    let bytes = FbomWriter::new().serialize(&root).expect("serialize");

    let reader = FbomReader::with_config(FbomConfig::new().with_base_path(dir.path()));
    assert!(matches!(
        reader.deserialize(&bytes),
        Err(FbomError::Reference(_))
    ));
}

#[test]
fn tolerant_mode_keeps_a_placeholder() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.set_property(Name::new("intact"), FbomData::from_u32(1));
    root.add_child(FbomObject::external("missing.fbom", 0, 0));
    let bytes = FbomWriter::new().serialize(&root)?;

    let reader = FbomReader::with_config(
        FbomConfig::new()
            .with_base_path(dir.path())
            .tolerate_external_failures(),
    );
    let decoded = reader.deserialize(&bytes)?;

    // The surrounding object survives; the failed reference is a placeholder
    // that still names what it stood for.
    assert_eq!(decoded.get_property("intact").unwrap().read_u32()?, 1);
    let placeholder = &decoded.children()[0];
    let ext = placeholder.external_ref().expect("placeholder keeps its ref");
    assert_eq!(ext.file, "missing.fbom");
    Ok(())
}

#[test]
fn distinct_indices_are_cached_separately() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    Fbom::save_to_file(dir.path().join("lib.fbom"), &library_object("lib"))?;

    let mut root = FbomObject::new(FbomType::structure("Scene", 0));
    root.add_child(FbomObject::external("lib.fbom", 0, 0));
    root.add_child(FbomObject::external("lib.fbom", 1, 0));
    let bytes = FbomWriter::new().serialize(&root)?;

    let config = FbomConfig::new().with_base_path(dir.path());
    let decoded = FbomReader::with_config(config.clone()).deserialize(&bytes)?;
    // Indices other than 0 currently resolve to the same root object, but
    // occupy their own cache slots.
    assert_eq!(decoded.children()[0], decoded.children()[1]);
    assert_eq!(config.external_cache.lock().expect("cache").len(), 2);
    Ok(())
}
