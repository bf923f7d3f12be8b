use std::fs;

use packedstore::pak::revpk::manifest::{write_manifest, ManifestEntry, ManifestWriteItem};
use packedstore::pak::revpk::{pack, PackOptions, Reader};
use packedstore::util::path::side_archive_path;

use crate::common::{self, Result};

#[test]
fn identical_chunks_share_an_offset() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "a/x.bin", &[0xAA; 8192]);
    common::write_file(&input, "a/y.bin", &[0xAA; 8192]);

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;

    let x = reader.record("a/x.bin").unwrap();
    let y = reader.record("a/y.bin").unwrap();
    assert_eq!(x.chunks.len(), 1);
    assert_eq!(y.chunks.len(), 1);
    assert_eq!(x.chunks[0].offset, y.chunks[0].offset, "identical chunks should dedup");

    let side_len = fs::metadata(side_archive_path(&out, 999))?.len();
    assert_eq!(side_len, x.chunks[0].stored_length, "only one copy should be stored");

    assert_eq!(reader.read("a/x.bin")?, reader.read("a/y.bin")?);

    Ok(())
}

#[test]
fn hash_equal_but_different_sizes_do_not_collide() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    // Same leading bytes, different lengths: different dedup keys.
    common::write_file(&input, "a/x.bin", &[0x55; 6000]);
    common::write_file(&input, "a/y.bin", &[0x55; 7000]);

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    assert_eq!(reader.read("a/x.bin")?, vec![0x55; 6000]);
    assert_eq!(reader.read("a/y.bin")?, vec![0x55; 7000]);

    Ok(())
}

#[test]
fn manifest_can_disable_dedup() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "a/x.bin", &[0xAA; 8192]);
    common::write_file(&input, "a/y.bin", &[0xAA; 8192]);

    let out = tmp.path().join("out/test_dir.vpk");
    fs::create_dir_all(tmp.path().join("out"))?;

    let no_dedup = ManifestEntry {
        de_duplicate: false,
        use_compression: false,
        ..ManifestEntry::default()
    };
    write_manifest(
        &out,
        &[
            ManifestWriteItem {
                path: "a/x.bin".to_string(),
                values: no_dedup,
            },
            ManifestWriteItem {
                path: "a/y.bin".to_string(),
                values: no_dedup,
            },
        ],
    )?;

    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    let x = reader.record("a/x.bin").unwrap();
    let y = reader.record("a/y.bin").unwrap();
    assert_ne!(x.chunks[0].offset, y.chunks[0].offset, "dedup disabled, offsets must differ");

    let side_len = fs::metadata(side_archive_path(&out, 999))?.len();
    assert_eq!(side_len, 2 * 8192);

    Ok(())
}
