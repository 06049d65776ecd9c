use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use lzrescue::error::RescueError;
use lzrescue::header::verify_single_member;
use lzrescue::merge::merge_files;
use lzrescue::oracle::{try_decompress, Verdict};
use lzrescue::repair::repair_file;
use lzrescue::split::split_file;

/// Smallest valid member: empty data, 4 KiB dictionary, 36 bytes total.
const EMPTY_MEMBER: [u8; 36] = [
    0x4C, 0x5A, 0x49, 0x50, 0x01, 0x0C, // "LZIP", version 1, 4 KiB dictionary
    0x00, 0x83, 0xFF, 0xFB, 0xFF, 0xFF, 0xC0, 0x00, 0x00, 0x00, // EOS marker
    0x00, 0x00, 0x00, 0x00, // CRC32 of no data
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // data size 0
    0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // member size 36
];

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

fn corrupt(data: &[u8], mutations: &[(usize, u8)]) -> Vec<u8> {
    let mut data = data.to_vec();
    for &(pos, mask) in mutations {
        data[pos] ^= mask;
    }
    data
}

/// A member that satisfies the header and trailer checks without being
/// decompressible.  Enough for split, which never decodes.
fn undecodable_member(total_size: usize) -> Vec<u8> {
    assert!(total_size >= 36);
    let mut member = vec![0u8; total_size];
    member[0..6].copy_from_slice(b"LZIP\x01\x0C");
    let trailer_size_field = total_size - 8;
    member[trailer_size_field..].copy_from_slice(&(total_size as u64).to_le_bytes());
    member
}

fn assert_decodes(path: &Path) {
    let mut file = fs::File::open(path).unwrap();
    let size = file.metadata().unwrap().len();
    assert_eq!(try_decompress(&mut file, size), Verdict::Accept);
}

// ── Merge ─────────────────────────────────────────────────────────────────────

#[test]
fn merge_two_copies_with_distinct_errors() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.lz", &corrupt(&EMPTY_MEMBER, &[(7, 0x40)]));
    let b = write_file(dir.path(), "b.lz", &corrupt(&EMPTY_MEMBER, &[(12, 0x40)]));
    let out = dir.path().join("fixed.lz");

    merge_files(&[a, b], &out, false).unwrap();
    assert_eq!(fs::read(&out).unwrap(), EMPTY_MEMBER);
    assert_decodes(&out);
}

#[test]
fn merge_single_block_interleaved_damage() {
    // one contiguous damaged region, good bytes split across the copies;
    // only the sliding pivot can separate them
    let dir = TempDir::new().unwrap();
    let a = write_file(
        dir.path(),
        "a.lz",
        &corrupt(&EMPTY_MEMBER, &[(10, 0x40), (11, 0x40)]),
    );
    let b = write_file(
        dir.path(),
        "b.lz",
        &corrupt(&EMPTY_MEMBER, &[(7, 0x40), (8, 0x40)]),
    );
    let out = dir.path().join("fixed.lz");

    merge_files(&[a, b], &out, false).unwrap();
    assert_eq!(fs::read(&out).unwrap(), EMPTY_MEMBER);
}

#[test]
fn merge_rejects_identical_copies() {
    let dir = TempDir::new().unwrap();
    let damaged = corrupt(&EMPTY_MEMBER, &[(9, 0x40)]);
    let a = write_file(dir.path(), "a.lz", &damaged);
    let b = write_file(dir.path(), "b.lz", &damaged);
    let out = dir.path().join("fixed.lz");

    let err = merge_files(&[a, b], &out, false).unwrap_err();
    assert!(matches!(err, RescueError::IdenticalCopies));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn merge_rejects_same_byte_damaged() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.lz", &corrupt(&EMPTY_MEMBER, &[(9, 0x40)]));
    let b = write_file(dir.path(), "b.lz", &corrupt(&EMPTY_MEMBER, &[(9, 0x20)]));
    let out = dir.path().join("fixed.lz");

    let err = merge_files(&[a, b], &out, false).unwrap_err();
    assert!(matches!(err, RescueError::IdenticalDamage));
}

#[test]
fn merge_skips_when_one_copy_is_good() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.lz", &corrupt(&EMPTY_MEMBER, &[(9, 0x40)]));
    let b = write_file(dir.path(), "b.lz", &EMPTY_MEMBER);
    let out = dir.path().join("fixed.lz");

    merge_files(&[a, b], &out, false).unwrap();
    assert!(!out.exists(), "no output should be created when recovery is not needed");
}

#[test]
fn merge_exhaustion_removes_the_output() {
    // both copies damaged at the same two positions, with different values;
    // no assignment can produce the original bytes
    let dir = TempDir::new().unwrap();
    let a = write_file(
        dir.path(),
        "a.lz",
        &corrupt(&EMPTY_MEMBER, &[(7, 0x40), (12, 0x40)]),
    );
    let b = write_file(
        dir.path(),
        "b.lz",
        &corrupt(&EMPTY_MEMBER, &[(7, 0x20), (12, 0x20)]),
    );
    let out = dir.path().join("fixed.lz");

    let err = merge_files(&[a, b], &out, false).unwrap_err();
    assert!(matches!(err, RescueError::MergeExhausted));
    assert_eq!(err.exit_code(), 2);
    assert!(!out.exists(), "exhausted merge must remove its output");
}

#[test]
fn merge_rejects_copies_of_different_sizes() {
    let dir = TempDir::new().unwrap();
    let mut longer = EMPTY_MEMBER.to_vec();
    longer.push(0);
    let a = write_file(dir.path(), "a.lz", &corrupt(&EMPTY_MEMBER, &[(9, 0x40)]));
    let b = write_file(dir.path(), "b.lz", &longer);
    let out = dir.path().join("fixed.lz");

    let err = merge_files(&[a, b], &out, false).unwrap_err();
    assert!(matches!(err, RescueError::SizeMismatch));
}

#[test]
fn merge_rejects_short_files() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.lz", &[0u8; 20]);
    let b = write_file(dir.path(), "b.lz", &[0u8; 20]);
    let out = dir.path().join("fixed.lz");

    let err = merge_files(&[a, b], &out, false).unwrap_err();
    assert!(matches!(err, RescueError::TooShort));
    assert_eq!(err.exit_code(), 2);
}

// ── Repair ────────────────────────────────────────────────────────────────────

#[test]
fn repair_restores_a_single_damaged_byte() {
    let dir = TempDir::new().unwrap();
    let damaged = corrupt(&EMPTY_MEMBER, &[(9, 0x40)]);
    let input = write_file(dir.path(), "in.lz", &damaged);
    let out = dir.path().join("fixed.lz");

    repair_file(&input, &out, false).unwrap();
    let repaired = fs::read(&out).unwrap();
    assert_eq!(repaired, EMPTY_MEMBER);
    assert_decodes(&out);

    // positions above the hit were each mutated and restored; the output
    // must differ from the damaged input in exactly one byte
    let diffs: Vec<usize> = repaired
        .iter()
        .zip(damaged.iter())
        .enumerate()
        .filter(|(_, (r, d))| r != d)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(diffs, vec![9]);
}

#[test]
fn repair_not_needed_on_a_good_file() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "in.lz", &EMPTY_MEMBER);
    let out = dir.path().join("fixed.lz");

    repair_file(&input, &out, false).unwrap();
    assert!(!out.exists());
}

#[test]
fn repair_respects_force_flag() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "in.lz", &corrupt(&EMPTY_MEMBER, &[(9, 0x40)]));
    let out = write_file(dir.path(), "fixed.lz", b"existing");

    let err = repair_file(&input, &out, false).unwrap_err();
    assert!(matches!(err, RescueError::OutputExists(_)));
    assert_eq!(err.exit_code(), 1);

    repair_file(&input, &out, true).unwrap();
    assert_eq!(fs::read(&out).unwrap(), EMPTY_MEMBER);
}

#[test]
fn repair_rejects_multimember_input() {
    let dir = TempDir::new().unwrap();
    let mut two = EMPTY_MEMBER.to_vec();
    two.extend_from_slice(&EMPTY_MEMBER);
    let input = write_file(dir.path(), "in.lz", &two);
    let out = dir.path().join("fixed.lz");

    let err = repair_file(&input, &out, false).unwrap_err();
    assert!(matches!(err, RescueError::MultiMember));
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn repair_rejects_short_input() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "in.lz", &EMPTY_MEMBER[..35]);
    let out = dir.path().join("fixed.lz");

    let err = repair_file(&input, &out, false).unwrap_err();
    assert!(matches!(err, RescueError::TooShort));
}

// ── Split ─────────────────────────────────────────────────────────────────────

// Split prepends `recNNNNN` to the output suffix, so outputs land relative to
// the working directory.  All split scenarios therefore run inside one test,
// each in its own scratch directory.
#[test]
fn split_scenarios() {
    let dir = TempDir::new().unwrap();

    // Three members of different sizes come apart at exactly their sizes and
    // reassemble byte for byte.
    {
        let work = dir.path().join("sizes");
        fs::create_dir(&work).unwrap();
        std::env::set_current_dir(&work).unwrap();

        let mut stream = undecodable_member(100);
        stream.extend_from_slice(&undecodable_member(250));
        stream.extend_from_slice(&undecodable_member(100));
        fs::write("in.lz", &stream).unwrap();

        split_file(Path::new("in.lz"), "in.lz", false).unwrap();

        let mut rebuilt = Vec::new();
        for (name, expected) in [
            ("rec00001in.lz", 100u64),
            ("rec00002in.lz", 250),
            ("rec00003in.lz", 100),
        ] {
            let data = fs::read(name).unwrap();
            assert_eq!(data.len() as u64, expected);
            let mut file = fs::File::open(name).unwrap();
            verify_single_member(&mut file, expected).unwrap();
            rebuilt.extend_from_slice(&data);
        }
        assert!(!Path::new("rec00004in.lz").exists());
        assert_eq!(rebuilt, stream);
    }

    // A boundary hiding behind the chunk seam is still confirmed through the
    // carried window tail.
    {
        let work = dir.path().join("seam");
        fs::create_dir(&work).unwrap();
        std::env::set_current_dir(&work).unwrap();

        let mut stream = undecodable_member(70_000);
        stream.extend_from_slice(&undecodable_member(36));
        fs::write("in.lz", &stream).unwrap();

        split_file(Path::new("in.lz"), "in.lz", false).unwrap();
        assert_eq!(fs::read("rec00001in.lz").unwrap().len(), 70_000);
        assert_eq!(fs::read("rec00002in.lz").unwrap().len(), 36);
    }

    // A magic string inside compressed data is not a boundary: its implied
    // member size does not match the observed distance.
    {
        let work = dir.path().join("falsemagic");
        fs::create_dir(&work).unwrap();
        std::env::set_current_dir(&work).unwrap();

        let mut member = undecodable_member(100);
        member[50..54].copy_from_slice(b"LZIP");
        fs::write("in.lz", &member).unwrap();

        split_file(Path::new("in.lz"), "in.lz", false).unwrap();
        assert_eq!(fs::read("rec00001in.lz").unwrap(), member);
        assert!(!Path::new("rec00002in.lz").exists());
    }

    // Real members survive the round trip and still decode on their own.
    {
        let work = dir.path().join("real");
        fs::create_dir(&work).unwrap();
        std::env::set_current_dir(&work).unwrap();

        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(&EMPTY_MEMBER);
        }
        fs::write("in.lz", &stream).unwrap();

        split_file(Path::new("in.lz"), "in.lz", false).unwrap();
        for name in ["rec00001in.lz", "rec00002in.lz", "rec00003in.lz"] {
            assert_eq!(fs::read(name).unwrap(), EMPTY_MEMBER);
            assert_decodes(Path::new(name));
        }
    }

    // Too-short input is rejected before any output is created.
    {
        let work = dir.path().join("short");
        fs::create_dir(&work).unwrap();
        std::env::set_current_dir(&work).unwrap();

        fs::write("in.lz", &EMPTY_MEMBER[..30]).unwrap();
        let err = split_file(Path::new("in.lz"), "in.lz", false).unwrap_err();
        assert!(matches!(err, RescueError::TooShort));
        assert_eq!(err.exit_code(), 2);
        assert!(!Path::new("rec00001in.lz").exists());
    }

    // leave the scratch directories before TempDir removes them
    std::env::set_current_dir(std::env::temp_dir()).unwrap();
}
