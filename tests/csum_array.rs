//! Storage and retrieval of checksums for array values.

use std::sync::{Arc, Once};

use bytes::Bytes;
use log::info;

use evstore::csum::algo::{CsumKind, compute_csums, verify_fetch};
use evstore::{CsumBuf, CsumIter, Error, Extent, Iod, VersionedStore};

const CSUM_SIZE: u16 = 8;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .is_test(true)
            .try_init();
    });
}

#[derive(Default)]
struct TestCase {
    rec_size: u32,
    chunk_size: u32,
    /// (idx, nr, csum_count)
    update_recxs: Vec<(u64, u64, u32)>,
    /// (idx, nr)
    fetch_recxs: Vec<(u64, u64)>,
    biovs_nr: usize,
    /// (prefix, suffix); unlisted vectors expect no trimming
    biovs: Vec<(u64, u64)>,
    holes_nr: usize,
}

/// Digests for extent `i`: chunk `j` is filled with `(i + 1) * 16 + j`.
fn fake_csums(i: usize, chunk_size: u32, count: u32) -> CsumBuf {
    let mut raw = Vec::new();
    for j in 0..count {
        raw.extend(vec![((i + 1) * 16) as u8 + j as u8; CSUM_SIZE as usize]);
    }
    CsumBuf::new(1, CSUM_SIZE, chunk_size, count, raw).unwrap()
}

fn csum_for_arrays_test_case(test: TestCase) {
    init_logging();
    let store = VersionedStore::new();

    let mut iod = Iod::array("akey", test.rec_size);
    let mut update_csums = Vec::new();
    for (i, &(idx, nr, count)) in test.update_recxs.iter().enumerate() {
        let dcb = fake_csums(i, test.chunk_size, count);
        update_csums.push(dcb.clone());
        iod = iod.with_recx(idx, nr).with_csum(dcb);
    }
    let data: Vec<u8> = b"0123456789ABCDEF"
        .iter()
        .copied()
        .cycle()
        .take(iod.data_len().unwrap())
        .collect();
    store.update(1, &iod, Bytes::from(data)).unwrap();

    let mut fetch_iod = Iod::array("akey", test.rec_size);
    for &(idx, nr) in &test.fetch_recxs {
        fetch_iod = fetch_iod.with_recx(idx, nr);
    }
    let fh = store.fetch_begin(1, &fetch_iod).unwrap();

    assert_eq!(test.biovs_nr, fh.biovs().len());
    for (i, biov) in fh.biovs().iter().enumerate() {
        let (prefix, suffix) = test.biovs.get(i).copied().unwrap_or((0, 0));
        assert_eq!(prefix, biov.prefix_len, "prefix of biov {i}");
        assert_eq!(suffix, biov.suffix_len, "suffix of biov {i}");
    }

    // one descriptor per biov, minus holes
    assert_eq!(test.biovs_nr - test.holes_nr, fh.csums().len());
    assert_eq!(test.holes_nr, fh.holes());

    let updated: Vec<&[u8]> = CsumIter::new(&update_csums).collect();
    let fetched: Vec<&[u8]> = CsumIter::new(fh.csums()).collect();
    assert_eq!(updated, fetched);

    fh.end(Ok(())).unwrap();
}

#[test]
fn single_chunk() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 8, 1)],
        fetch_recxs: vec![(0, 8)],
        biovs_nr: 1,
        ..Default::default()
    });
}

#[test]
fn two_extents() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 8, 1), (8, 8, 1)],
        fetch_recxs: vec![(0, 8), (8, 8)],
        biovs_nr: 2,
        ..Default::default()
    });
}

#[test]
fn two_chunks() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 16, 2)],
        fetch_recxs: vec![(0, 16)],
        biovs_nr: 1,
        ..Default::default()
    });
}

#[test]
fn two_extents_fetched_as_one() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 8, 1), (8, 8, 1)],
        fetch_recxs: vec![(0, 16)],
        biovs_nr: 2,
        ..Default::default()
    });
}

#[test]
fn one_extent_fetched_as_two() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 16, 2)],
        fetch_recxs: vec![(0, 8), (8, 8)],
        biovs_nr: 2,
        ..Default::default()
    });
}

#[test]
fn one_chunk_fetched_partially() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 8, 1)],
        fetch_recxs: vec![(1, 5)],
        biovs_nr: 1,
        biovs: vec![(1, 2)],
        ..Default::default()
    });
}

#[test]
fn partial_chunks_fetched_whole() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 4,
        update_recxs: vec![(2, 4, 2)],
        fetch_recxs: vec![(2, 4)],
        biovs_nr: 1,
        ..Default::default()
    });
}

#[test]
fn partial_chunks_fetched_partially() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 4,
        update_recxs: vec![(2, 4, 2)],
        fetch_recxs: vec![(3, 2)],
        biovs_nr: 1,
        biovs: vec![(4, 4)],
        ..Default::default()
    });
}

#[test]
fn many_sequential_extents() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 16, 2), (16, 4, 1), (20, 10, 2), (30, 6, 2)],
        fetch_recxs: vec![(0, 33)],
        biovs_nr: 4,
        biovs: vec![(0, 0), (0, 0), (0, 0), (0, 3)],
        ..Default::default()
    });
}

#[test]
fn holes() {
    csum_for_arrays_test_case(TestCase {
        chunk_size: 8,
        rec_size: 1,
        update_recxs: vec![(0, 8, 1), (16, 8, 1)],
        fetch_recxs: vec![(0, 24)],
        biovs_nr: 3,
        holes_nr: 1,
        ..Default::default()
    });
}

#[test]
fn split_fetch_matches_combined_fetch() {
    init_logging();
    let alg = CsumKind::Md5;
    let store = VersionedStore::new();
    let data: Vec<u8> = (0u8..16).collect();
    let ext = Extent::new(0, 15);
    let csum = compute_csums(&alg, &ext, 1, 8, &data).unwrap();
    let iod = Iod::array("akey", 1).with_recx(0, 16).with_csum(csum);
    store.update(1, &iod, Bytes::from(data)).unwrap();

    let split = store
        .fetch_begin(1, &Iod::array("akey", 1).with_recx(0, 8).with_recx(8, 8))
        .unwrap();
    let combined = store
        .fetch_begin(1, &Iod::array("akey", 1).with_recx(0, 16))
        .unwrap();
    let a: Vec<&[u8]> = CsumIter::new(split.csums()).collect();
    let b: Vec<&[u8]> = CsumIter::new(combined.csums()).collect();
    assert_eq!(a, b);
    assert_eq!(split.read_payload(), combined.read_payload());
    verify_fetch(&split, &alg).unwrap();
    verify_fetch(&combined, &alg).unwrap();
}

#[test]
fn verify_detects_wrong_digest() {
    init_logging();
    let alg = CsumKind::Sha256;
    let store = VersionedStore::new();
    let ext = Extent::new(0, 15);
    // digests of different bytes than the ones written
    let stale = compute_csums(&alg, &ext, 1, 8, &[9u8; 16]).unwrap();
    let iod = Iod::array("akey", 1).with_recx(0, 16).with_csum(stale);
    store.update(1, &iod, Bytes::from(vec![1u8; 16])).unwrap();

    let fh = store
        .fetch_begin(1, &Iod::array("akey", 1).with_recx(4, 2))
        .unwrap();
    let err = verify_fetch(&fh, &alg).unwrap_err();
    assert!(matches!(err, Error::CsumMismatch { lo: 0, hi: 7 }));
    assert!(fh.end(Err(err)).is_err());
}

#[test]
fn epochs_select_visible_writes() {
    init_logging();
    let alg = CsumKind::Md5;
    let store = VersionedStore::new();
    for (epoch, fill) in [(1u64, b'x'), (5, b'y')] {
        let lo = if epoch == 1 { 0 } else { 4 };
        let ext = Extent::from_recx(lo, 8).unwrap();
        let data = vec![fill; 8 * 4];
        let csum = compute_csums(&alg, &ext, 4, 16, &data).unwrap();
        let iod = Iod::array("akey", 4).with_recx(lo, 8).with_csum(csum);
        store.update(epoch, &iod, Bytes::from(data)).unwrap();
    }
    let fetch = Iod::array("akey", 4).with_recx(0, 12);

    let old = store.fetch_begin(3, &fetch).unwrap();
    let mut expected = vec![b'x'; 32];
    expected.extend(vec![0u8; 16]);
    assert_eq!(old.read_payload(), expected);
    assert_eq!(old.holes(), 1);
    verify_fetch(&old, &alg).unwrap();

    let new = store.fetch_begin(5, &fetch).unwrap();
    let mut expected = vec![b'x'; 16];
    expected.extend(vec![b'y'; 32]);
    assert_eq!(new.read_payload(), expected);
    assert_eq!(new.holes(), 0);
    verify_fetch(&new, &alg).unwrap();
    info!("epoch 5 resolved into {} vectors", new.biovs().len());
}

#[test]
fn empty_key_fetch_is_empty() {
    let store = VersionedStore::new();
    let fh = store
        .fetch_begin(1, &Iod::array("missing", 1).with_recx(0, 8))
        .unwrap();
    assert!(fh.is_empty());
    assert!(fh.csums().is_empty());
}

#[test]
fn concurrent_readers_see_committed_data() {
    init_logging();
    let alg = CsumKind::Sha256;
    let store = Arc::new(VersionedStore::new());
    let data: Vec<u8> = (0..64u8).collect();
    let ext = Extent::new(0, 63);
    let csum = compute_csums(&alg, &ext, 1, 16, &data).unwrap();
    store
        .update(1, &Iod::array("akey", 1).with_recx(0, 64).with_csum(csum), Bytes::from(data.clone()))
        .unwrap();

    std::thread::scope(|s| {
        for t in 0..4u64 {
            let store = Arc::clone(&store);
            let data = &data;
            s.spawn(move || {
                for lo in 0..32u64 {
                    let fh = store
                        .fetch_begin(1, &Iod::array("akey", 1).with_recx(lo + t, 16))
                        .unwrap();
                    verify_fetch(&fh, &alg).unwrap();
                    let start = (lo + t) as usize;
                    assert_eq!(fh.read_payload(), &data[start..start + 16]);
                }
            });
        }
    });
}
