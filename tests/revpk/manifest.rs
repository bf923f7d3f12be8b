use std::fs;

use packedstore::pak::revpk::format::{LOAD_CACHE, LOAD_VISIBLE, TEXTURE_DEFAULT};
use packedstore::pak::revpk::manifest::{
    read_manifest, write_manifest, ManifestEntry, ManifestWriteItem,
};
use packedstore::pak::revpk::{pack, PackOptions, Reader};

use crate::common::{self, Result};

#[test]
fn default_flags_are_inferred_per_extension() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "materials/m.vmt", b"material");
    common::write_file(&input, "materials/t.vtf", b"texture bytes");
    common::write_file(&input, "audio/a.acache", b"audio cache");

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;

    let vmt = &reader.record("materials/m.vmt").unwrap().chunks[0];
    assert_eq!(vmt.load_flags, LOAD_VISIBLE | LOAD_CACHE);
    assert_eq!(vmt.texture_flags, 0);

    let vtf = &reader.record("materials/t.vtf").unwrap().chunks[0];
    assert_eq!(vtf.texture_flags, TEXTURE_DEFAULT);

    let acache = &reader.record("audio/a.acache").unwrap().chunks[0];
    assert_eq!(acache.load_flags & (1 << 10), 1 << 10, "acache bit should be set");

    Ok(())
}

#[test]
fn manifest_overrides_flags() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "a/b.bin", &[7u8; 64]);

    let out = tmp.path().join("out/test_dir.vpk");
    fs::create_dir_all(tmp.path().join("out"))?;
    write_manifest(
        &out,
        &[ManifestWriteItem {
            path: "a/b.bin".to_string(),
            values: ManifestEntry {
                preload_size: 0,
                load_flags: LOAD_VISIBLE,
                texture_flags: 8,
                use_compression: false,
                de_duplicate: true,
            },
        }],
    )?;

    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    let chunk = &reader.record("a/b.bin").unwrap().chunks[0];
    assert_eq!(chunk.load_flags, LOAD_VISIBLE);
    assert_eq!(chunk.texture_flags, 8);

    Ok(())
}

#[test]
fn manifest_preload_is_stored_inline() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    let contents = b"0123456789";
    common::write_file(&input, "a/b.bin", contents);

    let out = tmp.path().join("out/test_dir.vpk");
    fs::create_dir_all(tmp.path().join("out"))?;
    write_manifest(
        &out,
        &[ManifestWriteItem {
            path: "a/b.bin".to_string(),
            values: ManifestEntry {
                preload_size: 4,
                ..ManifestEntry::default()
            },
        }],
    )?;

    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    let record = reader.record("a/b.bin").unwrap();
    assert_eq!(record.preload_bytes, 4);
    assert_eq!(record.total_logical_length(), contents.len() as u64);

    // Preload plus chunk bytes reassemble the original file.
    assert_eq!(reader.read("a/b.bin")?, contents);

    Ok(())
}

#[test]
fn pack_refreshes_the_manifest() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "materials/m.vmt", b"material");
    common::write_file(&input, "materials/t.vtf", b"texture bytes");

    let out = tmp.path().join("out/test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let map = read_manifest(&out)?.expect("pack should write a manifest");
    assert_eq!(map.len(), 2);

    let vmt = &map["materials/m.vmt"];
    assert_eq!(vmt.load_flags, LOAD_VISIBLE | LOAD_CACHE);
    assert_eq!(vmt.preload_size, 0);
    assert!(vmt.de_duplicate);

    let vtf = &map["materials/t.vtf"];
    assert_eq!(u32::from(vtf.texture_flags), TEXTURE_DEFAULT);

    Ok(())
}

#[test]
fn manifest_is_written_under_locale_stripped_alias_too() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "a/file.txt", b"data");

    let out = tmp.path().join("englishclient_box.pak000_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let manifest_dir = tmp.path().join("manifest");
    assert!(manifest_dir.join("englishclient_box.pak000_dir.txt").is_file());
    assert!(manifest_dir.join("client_box.pak000_dir.txt").is_file());

    Ok(())
}
