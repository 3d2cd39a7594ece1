mod common;

use std::io::Cursor;

use common::{contiguous, BASE};
use seedsplit::locator::extract_window;
use seedsplit::*;

const INTERVAL: i64 = 50_000;

#[test]
fn locate_literal_blocks() {
    let channels = vec![
        vec![ContiguousBlock::new(0, 100, 10)],
        vec![ContiguousBlock::new(50, 150, 10)],
    ];
    let blocks = BlockLocator::new().locate(&channels).unwrap().unwrap();
    assert_eq!(blocks, vec![ContiguousBlock::new(50, 100, 10)]);
}

#[test]
fn common_windows_of_split_channels() {
    // BHZ covers samples 0..20 with a gap at 8..10, BHN covers 5..25
    let mut bhz = contiguous("BHZ", 0, 8);
    bhz.extend(contiguous("BHZ", 10 * INTERVAL, 10));
    let bhn = contiguous("BHN", 5 * INTERVAL, 20);

    let splitter = Splitter::new(SplitConfig::default()).unwrap();
    let result = splitter
        .split(vec![Cursor::new(bhz), Cursor::new(bhn)])
        .unwrap()
        .unwrap();

    let z = result
        .track(&Key::new("IU", "ANMO", "00", "BHZ", INTERVAL))
        .unwrap();
    let n = result
        .track(&Key::new("IU", "ANMO", "00", "BHN", INTERVAL))
        .unwrap();
    assert_eq!(z.len(), 2, "expected 2 BHZ segments got {}", z.len());

    let channels: Vec<Vec<ContiguousBlock>> = [z, n]
        .iter()
        .map(|segments| {
            segments
                .iter()
                .map(|s| ContiguousBlock::new(s.start_time(), s.end_time(), s.interval()))
                .collect()
        })
        .collect();
    let blocks = BlockLocator::new().locate(&channels).unwrap().unwrap();
    assert_eq!(
        blocks,
        vec![
            ContiguousBlock::new(BASE + 5 * INTERVAL, BASE + 7 * INTERVAL, INTERVAL),
            ContiguousBlock::new(BASE + 10 * INTERVAL, BASE + 19 * INTERVAL, INTERVAL),
        ]
    );

    let window = extract_window(&blocks[0], &[z, n]).unwrap();
    assert_eq!(window.shape(), &[2, 3]);
    // Sample values are the record index within each stream
    assert_eq!(window.row(0).to_vec(), vec![5, 6, 7]);
    assert_eq!(window.row(1).to_vec(), vec![0, 1, 2]);
}

#[test]
fn mismatched_rates() {
    let pool = BlockPool::default();
    let mut a = Sequence::with_rate(pool.clone(), 0, 20.0).unwrap();
    a.append(&[1, 2, 3]).unwrap();
    let mut b = Sequence::with_rate(pool, 0, 40.0).unwrap();
    b.append(&[1, 2, 3]).unwrap();

    let zult = BlockLocator::new().locate(&[vec![a], vec![b]]);
    assert!(
        matches!(
            zult,
            Err(Error::BlockIntervalMismatch {
                expected: 50_000,
                actual: 25_000
            })
        ),
        "got {zult:?}"
    );
}
