//! Fragments become visible only once their completion marker exists; anything
//! else on disk is ignored or reported, never repaired.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stratum::error::ErrorCode;
use stratum::schema::{ArraySchema, Attribute, Datatype, Dimension};
use stratum::storage::{AttrData, FragmentMeta, LoadInput, FRAGMENTS_DIR, META_FILE, SEALED_FILE};
use stratum::{Context, ReadRequest, Subarray};

fn sparse_points(ctx: &Context) {
    let schema = ArraySchema::builder("pts")
        .dimension(Dimension::int("x", Datatype::I64, 0, 99))
        .attribute(Attribute::new("v", Datatype::I32))
        .sparse(10)
        .build()
        .unwrap();
    ctx.define_array(&schema).unwrap();
    ctx.load(
        "pts",
        LoadInput::SparseBinary {
            coords: [5i64, 9].iter().flat_map(|x| x.to_le_bytes()).collect(),
            attrs: vec![AttrData::Fixed(
                [50i32, 90].iter().flat_map(|v| v.to_le_bytes()).collect(),
            )],
        },
        true,
    )
    .unwrap();
}

fn fragment_dirs(root: &Path) -> Vec<std::path::PathBuf> {
    fs::read_dir(root.join("pts").join(FRAGMENTS_DIR))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[test]
fn unsealed_fragment_is_invisible() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::create(dir.path()).unwrap();
    sparse_points(&ctx);

    let frags = fragment_dirs(dir.path());
    assert_eq!(frags.len(), 1);
    fs::remove_file(frags[0].join(SEALED_FILE)).unwrap();

    assert!(ctx.manager().list_fragments("pts").unwrap().is_empty());
    let result = ctx
        .read("pts", &ReadRequest::new(Subarray::from_ints(&[(0, 99)])))
        .unwrap();
    assert_eq!(result.cells, 0);
}

#[test]
fn duplicate_timestamps_are_reported_as_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::create(dir.path()).unwrap();
    sparse_points(&ctx);

    // Clone the sealed fragment under a new name with the same timestamp, fixing
    // up the metadata so each fragment is individually well formed.
    let original = fragment_dirs(dir.path()).remove(0);
    let original_name = original.file_name().unwrap().to_string_lossy().into_owned();
    let (ts, _) = original_name.split_once('_').unwrap();
    let clone_name = format!("{ts}_{}", "0".repeat(32));
    let clone = original.with_file_name(&clone_name);
    fs::create_dir(&clone).unwrap();
    for entry in fs::read_dir(&original).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), clone.join(entry.file_name())).unwrap();
    }
    let bytes = fs::read(clone.join(META_FILE)).unwrap();
    let mut meta =
        FragmentMeta::deserialize(flexbuffers::Reader::get_root(bytes.as_slice()).unwrap())
            .unwrap();
    meta.id = clone_name;
    let mut ser = flexbuffers::FlexbufferSerializer::new();
    meta.serialize(&mut ser).unwrap();
    fs::write(clone.join(META_FILE), ser.view()).unwrap();

    let err = ctx
        .read("pts", &ReadRequest::new(Subarray::from_ints(&[(0, 99)])))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CorruptData);
}

#[test]
fn mislabeled_fragment_metadata_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Context::create(dir.path()).unwrap();
    sparse_points(&ctx);

    // Rename the fragment directory without touching its metadata.
    let original = fragment_dirs(dir.path()).remove(0);
    let renamed = original.with_file_name("99999999999999999999_deadbeef");
    fs::rename(&original, &renamed).unwrap();

    let err = ctx.manager().list_fragments("pts").unwrap_err();
    assert_eq!(err.code(), ErrorCode::CorruptData);
}
