use std::fs;
use std::fs::File;

use packedstore::pak::revpk::cam::{read_cam_file, CAM_RECORD_MAGIC, WAV_HEADER_FILL};
use packedstore::pak::revpk::{pack, PackOptions, Reader};
use packedstore::util::path::side_archive_path;

use crate::common::{self, Result};

fn cam_path(out_dir_vpk: &std::path::Path) -> std::path::PathBuf {
    let mut p = side_archive_path(out_dir_vpk, 999).into_os_string();
    p.push(".cam");
    p.into()
}

#[test]
fn wav_entry_produces_a_cam_record() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    let wav = common::wav_bytes(4096, 22050, 1, 2, 4000);
    common::write_file(&input, "sound/s.wav", &wav);

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let cam = cam_path(&out);
    assert_eq!(fs::metadata(&cam)?.len(), 32, "one WAV entry, one 32-byte record");

    let records = read_cam_file(&mut File::open(&cam)?)?;
    assert_eq!(records.len(), 1);

    let record = records[0];
    assert_eq!(record.magic, CAM_RECORD_MAGIC);
    assert_eq!(record.original_size, 4096);
    assert_eq!(record.compressed_size, 4096);
    assert_eq!(record.sample_rate, 22050);
    assert_eq!(record.channels, 1);
    assert_eq!(record.sample_count, 2000);
    assert_eq!(record.header_size, 44);

    let reader = Reader::open(&out)?;
    let entry = reader.record("sound/s.wav").unwrap();
    assert_eq!(record.vpk_content_offset, entry.chunks[0].offset);

    // The stored payload carries a blanked RIFF header.
    let stored = reader.read("sound/s.wav")?;
    assert_eq!(stored.len(), wav.len());
    assert!(stored[..44].iter().all(|&b| b == WAV_HEADER_FILL));
    assert_eq!(&stored[44..], &wav[44..]);

    // The stored CRC covers the post-strip bytes.
    assert_eq!(entry.crc32, common::compute_crc32(&stored));

    Ok(())
}

#[test]
fn invalid_wav_is_stored_intact_without_a_record() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");

    // RIFF magic but not WAVE: fails the probe.
    let mut bogus = common::wav_bytes(4096, 22050, 1, 2, 4000);
    bogus[8..12].copy_from_slice(b"AVI ");
    common::write_file(&input, "sound/bogus.wav", &bogus);

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    assert!(!cam_path(&out).exists(), "no CAM record, no .cam file");

    let reader = Reader::open(&out)?;
    assert_eq!(reader.read("sound/bogus.wav")?, bogus, "payload kept with header intact");

    Ok(())
}

#[test]
fn archive_without_wavs_has_no_cam_sidecar() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");
    common::write_file(&input, "a/file.txt", b"data");

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    assert!(!cam_path(&out).exists());

    Ok(())
}

#[test]
fn cam_records_follow_entry_order() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("input");

    // Sorted tree order within the wav extension is by (dir, stem).
    common::write_file(&input, "sound/b/two.wav", &common::wav_bytes(128, 44100, 1, 2, 64));
    common::write_file(&input, "sound/a/one.wav", &common::wav_bytes(256, 22050, 2, 4, 128));
    common::write_file(&input, "materials/m.vmt", b"not audio");

    let out = tmp.path().join("test_dir.vpk");
    pack(&input, &out, &PackOptions::default())?;

    let records = read_cam_file(&mut File::open(cam_path(&out))?)?;
    assert_eq!(records.len(), 2);

    let reader = Reader::open(&out)?;
    let one = reader.record("sound/a/one.wav").unwrap();
    let two = reader.record("sound/b/two.wav").unwrap();

    assert_eq!(records[0].vpk_content_offset, one.chunks[0].offset);
    assert_eq!(records[0].original_size, 256);
    assert_eq!(records[1].vpk_content_offset, two.chunks[0].offset);
    assert_eq!(records[1].original_size, 128);

    Ok(())
}
