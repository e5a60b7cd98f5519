//! Whole-container behaviour: persistence round trips, concurrent readers and
//! damaged files.

use std::io::SeekFrom;

use proptest::prelude::*;

use super::consts::{HDR_FAT_LIST, SECTOR_SIZE};
use super::xls::{BiffPut, BiffQuery, BiffVersion};
use super::*;
use crate::common::binary::{read_u32_le, write_u32_le};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn write_stream(ole: &mut OleFile, path: &[&str], data: &[u8]) {
    let mut stream = ole.open_stream_path(path, StreamMode::Write).unwrap();
    stream.write(ole, data).unwrap();
    stream.close(ole).unwrap();
}

fn reopen(ole: OleFile) -> OleFile {
    OleFile::from_bytes(ole.into_bytes().unwrap(), OleOptions::default()).unwrap()
}

#[test]
fn test_sizes_around_cutoff_survive_reopen() {
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    for (i, size) in [0usize, 1, 64, 4095, 4096, 4097, 9000].iter().enumerate() {
        write_stream(&mut ole, &[&format!("s{}", i)], &pattern(*size, i as u8));
    }
    let mut ole = reopen(ole);
    for (i, size) in [0usize, 1, 64, 4095, 4096, 4097, 9000].iter().enumerate() {
        let name = format!("s{}", i);
        let data = ole.read_stream(&[&name]).unwrap();
        assert_eq!(data, pattern(*size, i as u8), "stream {}", name);
        let stat = ole.stat(&[&name]).unwrap();
        assert_eq!(stat.size, *size as u64);

        let index = ole.lookup(&[&name]).unwrap();
        let stream = ole.open_stream(index, StreamMode::Read).unwrap();
        let expected = if *size < 4096 {
            StorageKind::Mini
        } else {
            StorageKind::Big
        };
        assert_eq!(stream.kind(), expected);
    }
}

#[test]
fn test_independent_read_handles() {
    let data = pattern(7000, 3);
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Shared"], &data);

    let mut first = ole.open_stream_path(&["Shared"], StreamMode::Read).unwrap();
    let mut second = ole.open_stream_path(&["Shared"], StreamMode::Read).unwrap();
    second.seek(&ole, SeekFrom::Start(5000)).unwrap();

    let mut a = vec![0u8; 100];
    first.read_copy(&ole, &mut a).unwrap();
    let mut b = vec![0u8; 100];
    second.read_copy(&ole, &mut b).unwrap();
    assert_eq!(a, &data[..100]);
    assert_eq!(b, &data[5000..5100]);

    assert_eq!(first.read_to_end(&ole).unwrap(), &data[100..]);
    assert_eq!(second.read_to_end(&ole).unwrap(), &data[5100..]);
}

#[test]
fn test_save_and_open_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested.ole");

    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Top"], b"top level");
    write_stream(&mut ole, &["Storage", "Inner", "Leaf"], &pattern(5000, 9));
    ole.save(&path).unwrap();

    let mut ole = OleFile::open(&path, OleOptions::new().with_read_only(true)).unwrap();
    assert_eq!(ole.root_name().unwrap(), "Root Entry");
    assert_eq!(ole.list(&[]).unwrap(), vec!["Top", "Storage"]);
    assert_eq!(ole.stat(&["Storage"]).unwrap().entry_type, EntryType::Storage);
    assert_eq!(ole.read_stream(&["Top"]).unwrap(), b"top level");
    assert_eq!(
        ole.read_stream(&["storage", "INNER", "leaf"]).unwrap(),
        pattern(5000, 9)
    );
    assert_eq!(
        ole.list_streams().unwrap(),
        vec![
            vec!["Top".to_string()],
            vec!["Storage".to_string(), "Inner".to_string(), "Leaf".to_string()],
        ]
    );
}

#[test]
fn test_rewrite_after_reopen() {
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Grow"], &pattern(1000, 1));
    let mut ole = reopen(ole);

    let mut stream = ole.open_stream_path(&["Grow"], StreamMode::Write).unwrap();
    stream.seek(&ole, SeekFrom::End(0)).unwrap();
    stream.write(&mut ole, &pattern(5000, 2)).unwrap();
    stream.close(&mut ole).unwrap();

    let mut ole = reopen(ole);
    let mut expected = pattern(1000, 1);
    expected.extend(pattern(5000, 2));
    assert_eq!(ole.read_stream(&["Grow"]).unwrap(), expected);
}

#[test]
fn test_unlink_then_reuse() {
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Keep"], b"anchor");
    write_stream(&mut ole, &["Gone"], &pattern(6000, 4));
    let before = ole.len();
    let gone = ole.lookup(&["Gone"]).unwrap();
    let sectors = ole.open_stream(gone, StreamMode::Read).unwrap().sectors().to_vec();

    // The anchor of the root level cannot be removed
    let keep = ole.lookup(&["Keep"]).unwrap();
    assert_eq!(ole.unlink(keep).unwrap_err().kind(), ErrorKind::Misuse);

    ole.unlink(gone).unwrap();
    assert!(!ole.exists(&["Gone"]));
    assert_eq!(ole.list(&[]).unwrap(), vec!["Keep"]);

    write_stream(&mut ole, &["Back"], &pattern(6000, 5));
    let back = ole.lookup(&["Back"]).unwrap();
    assert_eq!(back, gone);
    assert_eq!(ole.open_stream(back, StreamMode::Read).unwrap().sectors(), sectors.as_slice());
    assert_eq!(ole.len(), before);

    let mut ole = reopen(ole);
    assert_eq!(ole.read_stream(&["Back"]).unwrap(), pattern(6000, 5));
    assert_eq!(ole.read_stream(&["Keep"]).unwrap(), b"anchor");
}

#[test]
fn test_growth_across_allocation_table_boundary() {
    // One table sector describes 128 sectors; this needs a second one
    let data = pattern(70_000, 12);
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Big"], &data);
    assert!(ole.len() > 128 * SECTOR_SIZE);

    let mut ole = reopen(ole);
    assert_eq!(ole.read_stream(&["Big"]).unwrap(), data);
    assert_eq!(ole.stat(&["Big"]).unwrap().size, 70_000);
}

#[test]
fn test_workbook_record_in_container() {
    let mut bytes = vec![0x09, 0x08, 0x10, 0x00];
    bytes.extend(pattern(16, 7));
    bytes.extend_from_slice(&[0x0A, 0x00, 0x00, 0x00]);

    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Workbook"], &bytes);
    let mut ole = reopen(ole);

    let mut query = BiffQuery::open(&mut ole, &["Workbook"]).unwrap();
    assert!(query.next(&ole).unwrap());
    assert_eq!(query.opcode(), 0x0809);
    assert_eq!(query.length(), 0x10);
    assert_eq!(query.data(&ole).unwrap(), pattern(16, 7).as_slice());
    assert!(query.next(&ole).unwrap());
    assert_eq!(query.opcode(), 0x000A);
    assert!(!query.next(&ole).unwrap());
}

#[test]
fn test_records_written_then_read_after_reopen() {
    let big: Vec<u8> = pattern(20000, 11);
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    let mut put = BiffPut::create(&mut ole, &["Workbook"], BiffVersion::Biff8).unwrap();
    put.put_u16(&mut ole, 0x0809, 0x0600).unwrap();
    put.put(&mut ole, 0x00FC, &big).unwrap();
    put.put_empty(&mut ole, 0x000A).unwrap();
    put.finish().close(&mut ole).unwrap();
    let mut ole = reopen(ole);

    let mut query = BiffQuery::open(&mut ole, &["Workbook"]).unwrap();
    let mut seen = Vec::new();
    while query.next(&ole).unwrap() {
        seen.push((query.opcode(), query.data(&ole).unwrap().to_vec()));
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], (0x0809, vec![0x00, 0x06]));
    assert_eq!(seen[1].0, 0x00FC);
    assert_eq!(seen[1].1, big);
    assert_eq!(seen[2], (0x000A, Vec::new()));
}

#[test]
fn test_cyclic_chain_in_crafted_file() {
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Loop"], &pattern(8192, 6));
    let start = ole.entry(ole.lookup(&["Loop"]).unwrap()).unwrap().start;
    let mut bytes = ole.into_bytes().unwrap();

    // Point the stream's first sector back at itself
    let table = read_u32_le(&bytes, HDR_FAT_LIST).unwrap() as usize;
    let offset = (table + 1) * SECTOR_SIZE + start as usize * 4;
    write_u32_le(&mut bytes, offset, start).unwrap();

    let mut ole = OleFile::from_bytes(bytes, OleOptions::default()).unwrap();
    let err = ole.read_stream(&["Loop"]).unwrap_err();
    assert!(matches!(err, OleError::CyclicChain { table: "FAT", .. }));
    assert_eq!(err.kind(), ErrorKind::Malformed);
}

#[test]
fn test_not_ole_file() {
    let err = OleFile::from_bytes(vec![0u8; 2048], OleOptions::default()).unwrap_err();
    assert!(matches!(err, OleError::NotOleFile));
    assert!(!is_ole_file(&[0u8; 16]));
}

#[test]
fn test_options_from_json() {
    let options: OleOptions =
        serde_json::from_str(r#"{"growth_sectors": 8, "lenient": false, "read_only": false}"#)
            .unwrap();
    assert!(!options.lenient);

    let mut ole = OleFile::create(options).unwrap();
    write_stream(&mut ole, &["Big"], &pattern(4096, 0));
    // One table sector, one directory sector, then growth in steps of eight
    assert_eq!((ole.len() - SECTOR_SIZE) / SECTOR_SIZE % 8, 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_chunked_writes_round_trip(
        sizes in proptest::collection::vec(0usize..3000, 1..6),
        seed in any::<u8>(),
    ) {
        let mut ole = OleFile::create(OleOptions::default()).unwrap();
        let mut expected = Vec::new();
        let mut stream = ole.open_stream_path(&["Chunks"], StreamMode::Write).unwrap();
        for (i, size) in sizes.iter().enumerate() {
            let chunk = pattern(*size, seed.wrapping_add(i as u8));
            stream.write(&mut ole, &chunk).unwrap();
            expected.extend(chunk);
        }
        stream.close(&mut ole).unwrap();

        let mut ole = reopen(ole);
        prop_assert_eq!(ole.read_stream(&["Chunks"]).unwrap(), expected);
    }
}

fn same_range_through_two_handles(size: usize, offset: usize, len: usize) -> (Vec<u8>, Vec<u8>) {
    let mut ole = OleFile::create(OleOptions::default()).unwrap();
    write_stream(&mut ole, &["Same"], &pattern(size, 21));
    let index = ole.lookup(&["Same"]).unwrap();
    let mut first = ole.open_stream(index, StreamMode::Read).unwrap();
    let mut second = ole.open_stream(index, StreamMode::Read).unwrap();

    let mut a = vec![0u8; len];
    first.seek(&ole, SeekFrom::Start(offset as u64)).unwrap();
    first.read_copy(&ole, &mut a).unwrap();
    let mut b = vec![0u8; len];
    second.seek(&ole, SeekFrom::Start(offset as u64)).unwrap();
    second.read_copy(&ole, &mut b).unwrap();
    (a, b)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_two_handles_read_same_bytes_mini(offset in 0usize..3000, len in 0usize..1000) {
        let (a, b) = same_range_through_two_handles(4000, offset, len);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a, pattern(4000, 21)[offset..offset + len].to_vec());
    }

    #[test]
    fn prop_two_handles_read_same_bytes_big(offset in 0usize..9000, len in 0usize..3000) {
        let (a, b) = same_range_through_two_handles(12_000, offset, len);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a, pattern(12_000, 21)[offset..offset + len].to_vec());
    }
}
