use std::fs;

use packedstore::pak::revpk::{pack, PackOptions, Reader};
use packedstore::util::path::side_archive_path;

use crate::common::{self, Result};

#[test]
fn minimal_round_trip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "materials/debug/empty.vmt", b"hello");

    let out = tmp.path().join("out/test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    let entries: Vec<_> = reader.entries().collect();
    assert_eq!(entries.len(), 1);

    let (path, meta) = entries[0];
    assert_eq!(path, "materials/debug/empty.vmt");
    assert_eq!(meta.crc32, common::compute_crc32(b"hello"));
    assert_eq!(meta.logical_length, 5);
    assert_eq!(meta.archive_index, 999);

    assert_eq!(reader.read("materials/debug/empty.vmt")?, b"hello");

    let side = side_archive_path(&out, 999);
    assert!(side.ends_with("test_999.vpk"));
    assert_eq!(fs::read(side)?, b"hello");

    Ok(())
}

#[test]
fn round_trip_preserves_every_file() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");

    let files: &[(&str, &[u8])] = &[
        ("materials/debug/empty.vmt", b"hello"),
        ("materials/debug/other.vmt", b"\x00\x01\x02\x03"),
        ("scripts/aliases.txt", b"alias one two"),
        ("rootfile.cfg", b"exec autoexec"),
        ("scripts/noext", b"no extension here"),
        ("scripts/empty.bin", b""),
    ];
    for (rel, contents) in files {
        common::write_file(&input, rel, contents);
    }

    let out = tmp.path().join("out/client_roundtrip.pak000_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    assert_eq!(reader.len(), files.len());

    for (rel, contents) in files {
        let bytes = reader.read(rel)?;
        assert_eq!(&bytes, contents, "contents of {rel} should survive");
        assert_eq!(
            common::compute_crc32(&bytes),
            reader.record(rel).unwrap().crc32,
            "stored CRC of {rel} should match the bytes read back"
        );
    }

    Ok(())
}

#[test]
fn chunk_split_boundaries() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "data/exact.bin", &[0x11; 8]);
    common::write_file(&input, "data/over.bin", &[0x22; 9]);
    common::write_file(&input, "data/empty.bin", b"");

    let out = tmp.path().join("test_dir.vpk");
    let options = PackOptions {
        max_part_size: 8,
        ..PackOptions::default()
    };
    pack(&input, &out, &options)?;

    let reader = Reader::open(&out)?;

    let exact = reader.record("data/exact.bin").unwrap();
    assert_eq!(exact.chunks.len(), 1);
    assert_eq!(exact.chunks[0].logical_length, 8);

    let over = reader.record("data/over.bin").unwrap();
    assert_eq!(over.chunks.len(), 2);
    assert_eq!(over.chunks[0].logical_length, 8);
    assert_eq!(over.chunks[1].logical_length, 1);

    let empty = reader.record("data/empty.bin").unwrap();
    assert_eq!(empty.preload_bytes, 0);
    assert!(empty.chunks.is_empty());
    assert_eq!(reader.read("data/empty.bin")?, Vec::<u8>::new());

    assert_eq!(reader.read("data/exact.bin")?, vec![0x11; 8]);
    assert_eq!(reader.read("data/over.bin")?, vec![0x22; 9]);

    Ok(())
}

#[test]
fn sentinel_paths_round_trip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "rootfile.cfg", b"at the root");
    common::write_file(&input, "scripts/noext", b"bare name");

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    assert_eq!(reader.read("rootfile.cfg")?, b"at the root");
    assert_eq!(reader.read("scripts/noext")?, b"bare name");

    Ok(())
}

#[test]
fn incompressible_data_is_stored_as_is() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");

    // Deterministic pseudo-random bytes; LZHAM cannot shrink these, so the
    // chunk must fall back to uncompressed storage.
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    let noise: Vec<u8> = (0..8192)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 56) as u8
        })
        .collect();
    common::write_file(&input, "data/incompressible.bin", &noise);

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    let chunk = &reader.record("data/incompressible.bin").unwrap().chunks[0];
    assert_eq!(chunk.stored_length, 8192);
    assert_eq!(chunk.logical_length, 8192);

    // An uncompressed chunk never goes near the decoder, so this works even
    // when the decoder refuses all input.
    assert_eq!(reader.read("data/incompressible.bin")?, noise);

    Ok(())
}

#[test]
fn packing_is_deterministic() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "materials/a.vmt", b"alpha");
    common::write_file(&input, "materials/b.vmt", b"beta");
    common::write_file(&input, "scripts/c.txt", &[0xAB; 10000]);
    common::write_file(&input, "sound/s.wav", &common::wav_bytes(4096, 22050, 1, 2, 4000));

    let out_a = tmp.path().join("a/test_dir.vpk");
    let out_b = tmp.path().join("b/test_dir.vpk");
    pack(&input, &out_a, &PackOptions::default())?;
    pack(&input, &out_b, &PackOptions::default())?;

    assert_eq!(fs::read(&out_a)?, fs::read(&out_b)?, "dir archives should be byte-identical");
    assert_eq!(
        fs::read(side_archive_path(&out_a, 999))?,
        fs::read(side_archive_path(&out_b, 999))?,
        "side archives should be byte-identical"
    );

    Ok(())
}

#[test]
fn repack_with_refreshed_manifest_is_byte_identical() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "materials/a.vmt", b"alpha");
    common::write_file(&input, "scripts/c.txt", &[0xCD; 9000]);

    let out = tmp.path().join("out/test_dir.vpk");

    // First pack writes the manifest; the second run reads it back.
    pack(&input, &out, &PackOptions::default())?;
    let first_dir = fs::read(&out)?;
    let first_side = fs::read(side_archive_path(&out, 999))?;
    assert!(tmp.path().join("out/manifest/test_dir.txt").is_file());

    pack(&input, &out, &PackOptions::default())?;
    assert_eq!(fs::read(&out)?, first_dir);
    assert_eq!(fs::read(side_archive_path(&out, 999))?, first_side);

    Ok(())
}

#[test]
fn packing_an_empty_directory_yields_an_empty_archive() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    fs::create_dir_all(&input)?;

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let reader = Reader::open(&out)?;
    assert!(reader.is_empty());

    Ok(())
}

#[test]
fn pack_rejects_bad_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    fs::create_dir_all(&input).unwrap();

    let err = pack(&input, tmp.path().join("not_a_dir_archive.vpk"), &PackOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("_dir.vpk"), "got {err}");

    let err = pack(
        tmp.path().join("missing"),
        tmp.path().join("test_dir.vpk"),
        &PackOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("not a directory"), "got {err}");
}
